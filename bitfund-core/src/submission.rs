//! Submission and confirmation client.
//!
//! Takes a built payload, gets it on-chain either by signing and broadcasting
//! locally or by handing it to a wallet, then (optionally) polls for the
//! outcome. Each call owns its own [`SubmissionResult`]; nothing is shared
//! between flows.
#![forbid(unsafe_code)]

use crate::builder::{BuildError, TransactionPayload};
use crate::confirmation::{await_confirmation, ConfirmationOutcome, ConfirmationPolicy};
use crate::node_client::{NodeClient, NodeClientError, TxId};
use crate::signing::{SignerError, TransactionSigner};
use crate::state::{TransitionError, WorkflowState, WorkflowTracker};
use crate::wallet::{WalletBridge, WalletCallRequest, WalletError, WalletOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Flat fee in micro-STX when none is configured.
pub const DEFAULT_FEE: u64 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Sign with the configured key and broadcast to the node.
    #[default]
    Direct,
    /// Hand the unsigned call to a wallet for approval.
    Wallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Confirmed,
    Failed,
    Canceled,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SubmissionResultRepr")]
pub struct SubmissionResult {
    /// Absent only when the wallet flow was canceled before broadcast.
    pub transaction_id: Option<TxId>,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_result: Option<String>,
    /// Node status or the reason polling gave up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(rename = "history")]
    tracker: WorkflowTracker,
}

#[derive(Deserialize)]
struct SubmissionResultRepr {
    transaction_id: Option<TxId>,
    status: SubmissionStatus,
    #[serde(default)]
    secondary_id: Option<u64>,
    #[serde(default)]
    function_result: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    history: Option<Vec<WorkflowState>>,
}

impl TryFrom<SubmissionResultRepr> for SubmissionResult {
    type Error = String;

    fn try_from(repr: SubmissionResultRepr) -> Result<Self, Self::Error> {
        let path = match repr.history {
            Some(path) => path,
            None => implied_path(repr.status),
        };
        let tracker = WorkflowTracker::replay(&path).map_err(|e| e.to_string())?;
        if status_of(tracker.state()) != Some(repr.status) {
            return Err(format!(
                "status {:?} does not match workflow state {}",
                repr.status,
                tracker.state()
            ));
        }
        Ok(Self {
            transaction_id: repr.transaction_id,
            status: repr.status,
            secondary_id: repr.secondary_id,
            function_result: repr.function_result,
            detail: repr.detail,
            tracker,
        })
    }
}

/// Path a result with no recorded history must have taken.
fn implied_path(status: SubmissionStatus) -> Vec<WorkflowState> {
    use WorkflowState::*;
    let last = match status {
        SubmissionStatus::Pending => return vec![Built, Submitting, Submitted],
        SubmissionStatus::Canceled => return vec![Built, Submitting, Canceled],
        SubmissionStatus::Confirmed => Confirmed,
        SubmissionStatus::Failed => Failed,
        SubmissionStatus::Unknown => Unknown,
    };
    vec![Built, Submitting, Submitted, Polling, last]
}

/// Status a result reports while its workflow sits in `state`.
fn status_of(state: WorkflowState) -> Option<SubmissionStatus> {
    match state {
        WorkflowState::Submitted => Some(SubmissionStatus::Pending),
        WorkflowState::Canceled => Some(SubmissionStatus::Canceled),
        WorkflowState::Confirmed => Some(SubmissionStatus::Confirmed),
        WorkflowState::Failed => Some(SubmissionStatus::Failed),
        WorkflowState::Unknown => Some(SubmissionStatus::Unknown),
        _ => None,
    }
}

impl SubmissionResult {
    pub fn state(&self) -> WorkflowState {
        self.tracker.state()
    }

    pub fn history(&self) -> &[WorkflowState] {
        self.tracker.history()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("validation failed: {0}")]
    Validation(#[from] BuildError),
    #[error("broadcast failed: {reason}")]
    BroadcastFailed { reason: String },
    #[error("network error: {0}")]
    Network(NodeClientError),
    #[error("signer error: {0}")]
    Signer(#[from] SignerError),
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("direct submission requires a signing key")]
    NoSigner,
    #[error("wallet submission requires a wallet bridge")]
    NoWallet,
    #[error("wallet mode supports contract calls only")]
    UnsupportedInWallet,
    #[error("{0}")]
    State(#[from] TransitionError),
}

pub struct SubmissionClient {
    node: Arc<dyn NodeClient>,
    signer: Option<Arc<dyn TransactionSigner>>,
    wallet: Option<Arc<dyn WalletBridge>>,
    policy: ConfirmationPolicy,
    fee: u64,
}

impl SubmissionClient {
    pub fn new(node: Arc<dyn NodeClient>, policy: ConfirmationPolicy) -> Self {
        Self {
            node,
            signer: None,
            wallet: None,
            policy,
            fee: DEFAULT_FEE,
        }
    }

    /// Fee in micro-STX attached to directly signed transactions.
    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_wallet(mut self, wallet: Arc<dyn WalletBridge>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn node(&self) -> &Arc<dyn NodeClient> {
        &self.node
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    /// Get the payload on-chain. Returns `Pending` with a transaction id, or
    /// `Canceled` when the wallet declined.
    pub async fn submit(
        &self,
        payload: TransactionPayload,
        mode: SubmissionMode,
    ) -> Result<SubmissionResult, SubmitError> {
        let mut tracker = WorkflowTracker::new();
        info!(op = "submit", ?mode, payload = %payload.describe(), "submitting transaction");
        let submitted = match mode {
            SubmissionMode::Direct => self.submit_direct(payload, &mut tracker).await,
            SubmissionMode::Wallet => self.submit_via_wallet(payload, &mut tracker).await,
        };
        submitted.map(|(transaction_id, status)| SubmissionResult {
            transaction_id,
            status,
            secondary_id: None,
            function_result: None,
            detail: None,
            tracker,
        })
    }

    async fn submit_direct(
        &self,
        payload: TransactionPayload,
        tracker: &mut WorkflowTracker,
    ) -> Result<(Option<TxId>, SubmissionStatus), SubmitError> {
        let signer = self.signer.as_ref().ok_or(SubmitError::NoSigner)?;
        tracker.advance(WorkflowState::Submitting)?;

        let sender = signer.address().to_string();
        let nonce = match self.node.account_nonce(&sender).await {
            Ok(nonce) => nonce,
            Err(e) => {
                tracker.advance(WorkflowState::BroadcastFailed)?;
                warn!(error = %e, %sender, "nonce lookup failed");
                return Err(SubmitError::Network(e));
            }
        };
        let signed = match signer.sign(signer.prepare(payload, nonce, self.fee)) {
            Ok(signed) => signed,
            Err(e) => {
                tracker.advance(WorkflowState::BroadcastFailed)?;
                return Err(SubmitError::Signer(e));
            }
        };

        match self.node.broadcast(&signed).await {
            Ok(tx_id) => {
                tracker.advance(WorkflowState::Submitted)?;
                info!(%tx_id, local_id = %signed.tx_id(), nonce, fee = self.fee, "transaction broadcast");
                Ok((Some(tx_id), SubmissionStatus::Pending))
            }
            Err(e) => {
                tracker.advance(WorkflowState::BroadcastFailed)?;
                warn!(error = %e, local_id = %signed.tx_id(), nonce, "broadcast failed");
                Err(match e {
                    NodeClientError::Rejected(reason) => SubmitError::BroadcastFailed { reason },
                    NodeClientError::HttpStatus(status) if !(500..=599).contains(&status) => {
                        SubmitError::BroadcastFailed {
                            reason: format!("http status {status}"),
                        }
                    }
                    other => SubmitError::Network(other),
                })
            }
        }
    }

    async fn submit_via_wallet(
        &self,
        payload: TransactionPayload,
        tracker: &mut WorkflowTracker,
    ) -> Result<(Option<TxId>, SubmissionStatus), SubmitError> {
        let wallet = self.wallet.as_ref().ok_or(SubmitError::NoWallet)?;
        let call = match payload {
            TransactionPayload::ContractCall(call) => call,
            TransactionPayload::ContractDeploy(_) => return Err(SubmitError::UnsupportedInWallet),
        };
        tracker.advance(WorkflowState::Submitting)?;

        match wallet.request_approval(WalletCallRequest::from(&call)).await? {
            WalletOutcome::Approved(tx_id) => {
                tracker.advance(WorkflowState::Submitted)?;
                info!(%tx_id, "wallet approved transaction");
                Ok((Some(tx_id), SubmissionStatus::Pending))
            }
            WalletOutcome::Canceled => {
                tracker.advance(WorkflowState::Canceled)?;
                info!("wallet request canceled");
                Ok((None, SubmissionStatus::Canceled))
            }
        }
    }

    /// Poll a `Pending` result to its outcome.
    pub async fn confirm(&self, mut result: SubmissionResult) -> Result<SubmissionResult, SubmitError> {
        let tx_id = match (&result.transaction_id, result.status) {
            (Some(tx_id), SubmissionStatus::Pending) => tx_id.clone(),
            _ => {
                return Err(SubmitError::State(TransitionError::InvalidTransition {
                    from: result.state(),
                    to: WorkflowState::Polling,
                }))
            }
        };
        result.tracker.advance(WorkflowState::Polling)?;

        match await_confirmation(self.node.as_ref(), &tx_id, &self.policy).await {
            ConfirmationOutcome::Confirmed {
                secondary_id,
                function_result,
            } => {
                result.tracker.advance(WorkflowState::Confirmed)?;
                result.status = SubmissionStatus::Confirmed;
                result.secondary_id = secondary_id;
                result.function_result = function_result;
            }
            ConfirmationOutcome::Failed {
                tx_status,
                function_result,
            } => {
                result.tracker.advance(WorkflowState::Failed)?;
                result.status = SubmissionStatus::Failed;
                result.function_result = function_result;
                result.detail = Some(tx_status);
            }
            ConfirmationOutcome::Unknown { reason, .. } => {
                result.tracker.advance(WorkflowState::Unknown)?;
                result.status = SubmissionStatus::Unknown;
                result.detail = Some(reason);
            }
        }
        Ok(result)
    }

    pub async fn submit_and_confirm(
        &self,
        payload: TransactionPayload,
        mode: SubmissionMode,
    ) -> Result<SubmissionResult, SubmitError> {
        let submitted = self.submit(payload, mode).await?;
        if submitted.status != SubmissionStatus::Pending {
            return Ok(submitted);
        }
        self.confirm(submitted).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ContractCall, ContractDeploy, ContractId, CONTRIBUTE_FN};
    use crate::clarity::ClarityValue;
    use crate::node_client::mock_client::{MockNodeClient, MockStatus};
    use crate::address::Network;
    use crate::signing::Secp256k1Signer;
    use crate::wallet::ChannelWallet;

    fn policy() -> ConfirmationPolicy {
        ConfirmationPolicy {
            initial_delay_ms: 10,
            base_delay_ms: 10,
            max_delay_ms: 20,
            max_attempts: 3,
            timeout_ms: 1_000,
        }
    }

    fn call() -> TransactionPayload {
        TransactionPayload::ContractCall(ContractCall {
            contract: "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM.bitfund"
                .parse::<ContractId>()
                .unwrap(),
            function_name: CONTRIBUTE_FN.to_string(),
            function_args: vec![ClarityValue::UInt(1), ClarityValue::UInt(100)],
            post_condition_mode: Default::default(),
            post_conditions: Vec::new(),
        })
    }

    fn signer() -> Arc<dyn TransactionSigner> {
        Arc::new(Secp256k1Signer::from_secret_hex(&"55".repeat(32), Network::Testnet).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn direct_submit_then_confirm() {
        let node = Arc::new(MockNodeClient::new());
        let signer = signer();
        node.set_nonce(&signer.address().to_string(), 12)
            .push_broadcast(Ok(TxId("0x77".to_string())))
            .push_status(MockStatus::success("(ok u9)"));
        let client = SubmissionClient::new(node.clone(), policy())
            .with_signer(signer)
            .with_fee(2_500);

        let res = client.submit_and_confirm(call(), SubmissionMode::Direct).await.unwrap();
        assert_eq!(res.status, SubmissionStatus::Confirmed);
        assert_eq!(res.transaction_id, Some(TxId("0x77".to_string())));
        assert_eq!(res.secondary_id, Some(9));
        assert_eq!(
            res.history(),
            &[
                WorkflowState::Built,
                WorkflowState::Submitting,
                WorkflowState::Submitted,
                WorkflowState::Polling,
                WorkflowState::Confirmed
            ]
        );
        let sent = node.broadcasted();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].unsigned.nonce, 12);
        assert_eq!(sent[0].unsigned.fee, 2_500);
        sent[0].verify().unwrap();
        assert_eq!(node.account_calls(), 1);
    }

    #[tokio::test]
    async fn nonce_lookup_failure_stops_before_broadcast() {
        let node = Arc::new(FailingAccounts(MockNodeClient::new()));
        let client = SubmissionClient::new(node.clone(), policy()).with_signer(signer());
        assert!(matches!(
            client.submit(call(), SubmissionMode::Direct).await,
            Err(SubmitError::Network(NodeClientError::Timeout))
        ));
        assert_eq!(node.0.broadcast_calls(), 0);
    }

    #[tokio::test]
    async fn result_round_trips_with_history() {
        let node = Arc::new(MockNodeClient::new());
        node.push_status(MockStatus::with_status("abort_by_response", Some("(err u3)")));
        let client = SubmissionClient::new(node, policy()).with_signer(signer());
        let res = client.submit_and_confirm(call(), SubmissionMode::Direct).await.unwrap();
        assert_eq!(res.status, SubmissionStatus::Failed);

        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["history"][4], "failed");
        let back: SubmissionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, res);
        assert_eq!(back.state(), WorkflowState::Failed);
    }

    #[test]
    fn result_without_history_gets_implied_path() {
        let pending: SubmissionResult =
            serde_json::from_str(r#"{"transaction_id":"0x01","status":"pending"}"#).unwrap();
        assert_eq!(pending.state(), WorkflowState::Submitted);

        let canceled: SubmissionResult =
            serde_json::from_str(r#"{"transaction_id":null,"status":"canceled"}"#).unwrap();
        assert_eq!(
            canceled.history(),
            &[WorkflowState::Built, WorkflowState::Submitting, WorkflowState::Canceled]
        );

        let mismatched = r#"{"transaction_id":"0x01","status":"confirmed","history":["built","submitting","submitted"]}"#;
        assert!(serde_json::from_str::<SubmissionResult>(mismatched).is_err());
        let skipped = r#"{"transaction_id":"0x01","status":"confirmed","history":["built","confirmed"]}"#;
        assert!(serde_json::from_str::<SubmissionResult>(skipped).is_err());
    }

    /// Mock whose account endpoint always times out.
    struct FailingAccounts(MockNodeClient);

    #[async_trait::async_trait]
    impl NodeClient for FailingAccounts {
        async fn broadcast(
            &self,
            tx: &crate::signing::SignedTransaction,
        ) -> Result<TxId, NodeClientError> {
            self.0.broadcast(tx).await
        }

        async fn transaction_status(
            &self,
            tx_id: &TxId,
        ) -> Result<Option<crate::node_client::TxStatusResponse>, NodeClientError> {
            self.0.transaction_status(tx_id).await
        }

        async fn balances(
            &self,
            address: &str,
        ) -> Result<crate::node_client::AccountBalances, NodeClientError> {
            self.0.balances(address).await
        }

        async fn account(
            &self,
            _address: &str,
        ) -> Result<crate::node_client::AccountInfo, NodeClientError> {
            Err(NodeClientError::Timeout)
        }

        async fn call_read_only(
            &self,
            contract: &ContractId,
            function_name: &str,
            sender: &str,
            args: &[ClarityValue],
        ) -> Result<ClarityValue, NodeClientError> {
            self.0.call_read_only(contract, function_name, sender, args).await
        }
    }

    #[tokio::test]
    async fn submit_alone_stays_pending() {
        let node = Arc::new(MockNodeClient::new());
        let client = SubmissionClient::new(node.clone(), policy()).with_signer(signer());
        let res = client.submit(call(), SubmissionMode::Direct).await.unwrap();
        assert_eq!(res.status, SubmissionStatus::Pending);
        assert_eq!(res.state(), WorkflowState::Submitted);
        assert_eq!(node.status_calls(), 0);
    }

    #[tokio::test]
    async fn rejection_is_broadcast_failed_with_reason() {
        let node = Arc::new(MockNodeClient::new());
        node.push_broadcast(Err(NodeClientError::Rejected("NotEnoughFunds".to_string())));
        let client = SubmissionClient::new(node.clone(), policy()).with_signer(signer());
        match client.submit_and_confirm(call(), SubmissionMode::Direct).await {
            Err(SubmitError::BroadcastFailed { reason }) => assert_eq!(reason, "NotEnoughFunds"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(node.status_calls(), 0);
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let node = Arc::new(MockNodeClient::new());
        node.push_broadcast(Err(NodeClientError::Timeout));
        let client = SubmissionClient::new(node, policy()).with_signer(signer());
        assert!(matches!(
            client.submit(call(), SubmissionMode::Direct).await,
            Err(SubmitError::Network(NodeClientError::Timeout))
        ));
    }

    #[tokio::test]
    async fn direct_without_signer_is_rejected_before_network() {
        let node = Arc::new(MockNodeClient::new());
        let client = SubmissionClient::new(node.clone(), policy());
        assert!(matches!(
            client.submit(call(), SubmissionMode::Direct).await,
            Err(SubmitError::NoSigner)
        ));
        assert_eq!(node.total_calls(), 0);
    }

    #[tokio::test]
    async fn wallet_cancel_skips_broadcast_and_poll() {
        let node = Arc::new(MockNodeClient::new());
        let (wallet, mut approvals) = ChannelWallet::new(1);
        tokio::spawn(async move {
            if let Some(p) = approvals.recv().await {
                p.cancel();
            }
        });
        let client = SubmissionClient::new(node.clone(), policy()).with_wallet(Arc::new(wallet));

        let res = client.submit_and_confirm(call(), SubmissionMode::Wallet).await.unwrap();
        assert_eq!(res.status, SubmissionStatus::Canceled);
        assert_eq!(res.transaction_id, None);
        assert_eq!(res.state(), WorkflowState::Canceled);
        assert_eq!(node.total_calls(), 0);

        // A canceled result cannot be polled.
        assert!(matches!(client.confirm(res).await, Err(SubmitError::State(_))));
    }

    #[tokio::test]
    async fn wallet_mode_rejects_deploys() {
        let node = Arc::new(MockNodeClient::new());
        let (wallet, _approvals) = ChannelWallet::new(1);
        let client = SubmissionClient::new(node, policy()).with_wallet(Arc::new(wallet));
        let deploy = TransactionPayload::ContractDeploy(ContractDeploy {
            contract_name: "x".to_string(),
            code_body: "(ok true)".to_string(),
        });
        assert!(matches!(
            client.submit(deploy, SubmissionMode::Wallet).await,
            Err(SubmitError::UnsupportedInWallet)
        ));
    }
}
