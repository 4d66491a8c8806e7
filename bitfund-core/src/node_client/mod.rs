//! Chain node HTTP API contract.
//!
//! Defines the request/response shapes the workflow relies on and a
//! transport-agnostic [`NodeClient`] trait. Transports (HTTP, in-memory mock)
//! are adapters implementing the trait.
//!
//! ## Design constraints
//! - **Explicit shapes**: every response is decoded into a typed struct; unknown
//!   shapes are decode errors, never guessed at.
//! - **No floats**: balances are integer base units carried as strings on the wire.
//! - **Transient vs permanent**: [`NodeClientError::is_transient`] is the single
//!   place that decides what may be retried.
#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_possible_truncation)]

pub mod mock_client;

#[cfg(feature = "node-http")]
pub mod http_client;

use crate::amount::BaseUnits;
use crate::builder::ContractId;
use crate::clarity::ClarityValue;
use crate::signing::SignedTransaction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transaction identifier as reported by the node (or the wallet).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    /// Normalise user/wallet supplied ids: trimmed, `0x` prefix ensured for hex.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let hex_part = s.strip_prefix("0x").unwrap_or(s);
        if hex_part.is_empty() || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Endpoint paths relative to the node base URL.
///
/// `{txid}`, `{address}`, `{contract}` and `{function}` are substituted per
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoints {
    #[serde(default = "default_broadcast_path")]
    pub broadcast: String,
    #[serde(default = "default_tx_status_path")]
    pub tx_status: String,
    #[serde(default = "default_balances_path")]
    pub balances: String,
    #[serde(default = "default_account_path")]
    pub account: String,
    #[serde(default = "default_read_only_path")]
    pub read_only: String,
}

fn default_broadcast_path() -> String {
    "/v2/transactions".to_string()
}

fn default_tx_status_path() -> String {
    "/v2/transactions/{txid}".to_string()
}

fn default_balances_path() -> String {
    "/extended/v1/address/{address}/balances".to_string()
}

fn default_account_path() -> String {
    "/v2/accounts/{address}?proof=0".to_string()
}

fn default_read_only_path() -> String {
    "/v2/contracts/call-read/{address}/{contract}/{function}".to_string()
}

impl Default for NodeEndpoints {
    fn default() -> Self {
        Self {
            broadcast: default_broadcast_path(),
            tx_status: default_tx_status_path(),
            balances: default_balances_path(),
            account: default_account_path(),
            read_only: default_read_only_path(),
        }
    }
}

/// Body returned by the broadcast endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BroadcastResponse {
    Rejected {
        error: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Accepted {
        txid: String,
    },
    Bare(String),
}

impl BroadcastResponse {
    /// Accepted id, or the node's verbatim rejection text.
    pub fn into_result(self) -> Result<TxId, String> {
        match self {
            BroadcastResponse::Accepted { txid } | BroadcastResponse::Bare(txid) => {
                TxId::parse(&txid).ok_or_else(|| format!("node returned malformed txid {txid:?}"))
            }
            BroadcastResponse::Rejected { error, reason } => {
                Err(rejection_text(error, reason.as_deref()))
            }
        }
    }

    /// The node's rejection text when the body is a rejection.
    pub fn rejection(&self) -> Option<String> {
        match self {
            BroadcastResponse::Rejected { error, reason } => {
                Some(rejection_text(error.clone(), reason.as_deref()))
            }
            _ => None,
        }
    }
}

fn rejection_text(error: String, reason: Option<&str>) -> String {
    match reason {
        Some(reason) if !reason.is_empty() => format!("{error}: {reason}"),
        _ => error,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResultInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

/// Body of `GET /v2/transactions/{txid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatusResponse {
    pub tx_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_call: Option<ContractCallInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_result: Option<TxResultInfo>,
}

/// Classified node-side state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeTxStatus {
    Pending,
    Success,
    /// Any terminal non-success status (`abort_by_response`, `dropped_*`, ...).
    Failed,
}

impl TxStatusResponse {
    pub fn status(&self) -> NodeTxStatus {
        match self.tx_status.as_str() {
            "pending" => NodeTxStatus::Pending,
            "success" => NodeTxStatus::Success,
            _ => NodeTxStatus::Failed,
        }
    }

    /// Result payload of the contract call, falling back to `tx_result`.
    pub fn function_result(&self) -> Option<&str> {
        self.contract_call
            .as_ref()
            .and_then(|c| c.function_result.as_deref())
            .or_else(|| {
                self.tx_result
                    .as_ref()
                    .and_then(|r| r.repr.as_deref().or(r.hex.as_deref()))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    #[serde(with = "base_units_string")]
    pub balance: BaseUnits,
}

/// Body of the address balances endpoint (only the fields used here).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalances {
    #[serde(default)]
    pub fungible_tokens: BTreeMap<String, TokenBalance>,
}

impl AccountBalances {
    pub fn token(&self, asset_id: &str) -> BaseUnits {
        self.fungible_tokens
            .get(asset_id)
            .map(|t| t.balance)
            .unwrap_or(BaseUnits::ZERO)
    }
}

/// Body of `GET /v2/accounts/{address}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Next nonce the account must use.
    pub nonce: u64,
    /// Hex-encoded STX balance.
    #[serde(default)]
    pub balance: String,
}

/// Body posted to the read-only endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyRequest {
    pub sender: String,
    /// `0x`-prefixed consensus hex per argument.
    pub arguments: Vec<String>,
}

impl ReadOnlyRequest {
    pub fn new(sender: &str, args: &[ClarityValue]) -> Result<Self, NodeClientError> {
        let arguments = args
            .iter()
            .map(ClarityValue::to_hex)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| NodeClientError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            sender: sender.to_string(),
            arguments,
        })
    }
}

/// Body returned by the read-only endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyResponse {
    pub okay: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ReadOnlyResponse {
    pub fn into_value(self) -> Result<ClarityValue, NodeClientError> {
        if !self.okay {
            return Err(NodeClientError::ReadOnlyFailed(
                self.cause.unwrap_or_else(|| "no cause reported".to_string()),
            ));
        }
        let result = self
            .result
            .ok_or_else(|| NodeClientError::DecodeError("read-only result missing".to_string()))?;
        ClarityValue::decode_result(&result).map_err(|e| NodeClientError::DecodeError(e.to_string()))
    }
}

/// Node capabilities required by the submission workflow.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Broadcast serialized signed transaction bytes.
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TxId, NodeClientError>;

    /// `Ok(None)` when the node does not know the transaction (yet).
    async fn transaction_status(
        &self,
        tx_id: &TxId,
    ) -> Result<Option<TxStatusResponse>, NodeClientError>;

    async fn balances(&self, address: &str) -> Result<AccountBalances, NodeClientError>;

    async fn account(&self, address: &str) -> Result<AccountInfo, NodeClientError>;

    /// Evaluate a read-only function as `sender`.
    async fn call_read_only(
        &self,
        contract: &ContractId,
        function_name: &str,
        sender: &str,
        args: &[ClarityValue],
    ) -> Result<ClarityValue, NodeClientError>;

    /// Next nonce for transactions from `address`.
    async fn account_nonce(&self, address: &str) -> Result<u64, NodeClientError> {
        Ok(self.account(address).await?.nonce)
    }

    /// Balance of one fungible asset; a missing entry is zero.
    async fn token_balance(
        &self,
        address: &str,
        asset_id: &str,
    ) -> Result<BaseUnits, NodeClientError> {
        Ok(self.balances(address).await?.token(asset_id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeClientError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("decode error: {0}")]
    DecodeError(String),
    #[error("broadcast rejected: {0}")]
    Rejected(String),
    #[error("read-only call failed: {0}")]
    ReadOnlyFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<NodeClientError>,
    },
}

impl NodeClientError {
    /// Timeouts, connection failures and 5xx; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            NodeClientError::Network(_)
            | NodeClientError::Timeout
            | NodeClientError::RetryExhausted { .. } => true,
            NodeClientError::HttpStatus(status) => (500..=599).contains(status),
            NodeClientError::Config(_)
            | NodeClientError::DecodeError(_)
            | NodeClientError::Rejected(_)
            | NodeClientError::ReadOnlyFailed(_)
            | NodeClientError::InvalidRequest(_) => false,
        }
    }
}

mod base_units_string {
    use crate::amount::BaseUnits;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(v: &BaseUnits, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&v.get())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BaseUnits, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.trim()
            .parse::<u128>()
            .map(BaseUnits)
            .map_err(serde::de::Error::custom)
    }
}
