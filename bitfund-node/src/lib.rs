#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]

pub mod campaign_store;
pub mod config;
pub mod stdin_wallet;
pub mod workflow;
