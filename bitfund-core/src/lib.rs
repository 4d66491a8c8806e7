#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]

//! Core types and workflow for BitFund contract transactions.
//!
//! The crate covers the path from user intent to an observed on-chain outcome:
//!
//! 1. [`builder`] turns raw campaign/contribution input into a typed
//!    [`builder::ContractCall`] (pure, no I/O).
//! 2. [`submission`] gets it on-chain, either signed locally ([`signing`]) and
//!    broadcast through a [`node_client::NodeClient`], or approved through a
//!    [`wallet::WalletBridge`].
//! 3. [`confirmation`] polls the node until the transaction is confirmed,
//!    failed, or the polling budget is spent.
//!
//! Amounts are fixed-point integers ([`amount::BaseUnits`]) end to end.
//! Directly signed transactions use the chain's consensus encoding, with
//! addresses from [`address`] and asset guards from [`post_condition`].

pub mod address;
pub mod amount;
pub mod builder;
pub mod clarity;
pub mod confirmation;
pub mod node_client;
pub mod post_condition;
pub mod signing;
pub mod state;
pub mod submission;
pub mod wallet;

pub use address::{Network, StacksAddress};
pub use amount::{parse_decimal, AmountError, BaseUnits};
pub use builder::{
    BuildError, BuilderConfig, CampaignInput, ContractCall, ContractDeploy, ContractId,
    ContributionInput, ReadOnlyCall, TransactionPayload, TxBuilder,
};
pub use clarity::{secondary_id_from_result, ClarityValue, Principal};
pub use confirmation::{ConfirmationOutcome, ConfirmationPolicy};
pub use node_client::{AccountInfo, NodeClient, NodeClientError, TxId};
pub use post_condition::{AssetInfo, PostCondition, PostConditionMode};
pub use submission::{
    SubmissionClient, SubmissionMode, SubmissionResult, SubmissionStatus, SubmitError,
};
pub use wallet::{WalletBridge, WalletOutcome};
