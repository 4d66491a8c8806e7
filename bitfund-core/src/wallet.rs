//! Wallet-mediated approval.
//!
//! The wallet receives the unsigned call, does its own signing and broadcast,
//! and reports back either the resulting transaction id or a cancellation.
//! Nothing here touches key material.
#![forbid(unsafe_code)]

use crate::builder::ContractCall;
use crate::clarity::ClarityValue;
use crate::node_client::TxId;
use crate::post_condition::{PostCondition, PostConditionMode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// What the wallet is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCallRequest {
    pub contract_address: String,
    pub contract_name: String,
    pub function_name: String,
    pub function_args: Vec<ClarityValue>,
    pub post_condition_mode: PostConditionMode,
    pub post_conditions: Vec<PostCondition>,
}

impl From<&ContractCall> for WalletCallRequest {
    fn from(call: &ContractCall) -> Self {
        Self {
            contract_address: call.contract.address.clone(),
            contract_name: call.contract.name.clone(),
            function_name: call.function_name.clone(),
            function_args: call.function_args.clone(),
            post_condition_mode: call.post_condition_mode,
            post_conditions: call.post_conditions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletOutcome {
    Approved(TxId),
    Canceled,
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
    #[error("wallet returned an invalid transaction id: {0:?}")]
    InvalidTxId(String),
}

#[async_trait]
pub trait WalletBridge: Send + Sync {
    async fn request_approval(&self, request: WalletCallRequest)
        -> Result<WalletOutcome, WalletError>;
}

/// A request waiting on the user. Dropping it without answering cancels.
#[derive(Debug)]
pub struct PendingApproval {
    pub request: WalletCallRequest,
    reply: oneshot::Sender<WalletOutcome>,
}

impl PendingApproval {
    pub fn finish(self, tx_id: TxId) {
        // Receiver gone means the flow was abandoned; nothing to report to.
        let _ = self.reply.send(WalletOutcome::Approved(tx_id));
    }

    pub fn cancel(self) {
        let _ = self.reply.send(WalletOutcome::Canceled);
    }
}

/// In-process bridge: approval requests are handed to whoever drains the
/// receiver (a UI task, a stdin prompt, a test).
#[derive(Debug, Clone)]
pub struct ChannelWallet {
    tx: mpsc::Sender<PendingApproval>,
}

impl ChannelWallet {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingApproval>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl WalletBridge for ChannelWallet {
    async fn request_approval(
        &self,
        request: WalletCallRequest,
    ) -> Result<WalletOutcome, WalletError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(PendingApproval { request, reply })
            .await
            .map_err(|_| WalletError::Unavailable("approval channel closed".to_string()))?;
        Ok(answer.await.unwrap_or(WalletOutcome::Canceled))
    }
}
