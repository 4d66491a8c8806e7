//! Campaign workflow: build, submit, record, confirm.
//!
//! A campaign is recorded locally as soon as the node (or wallet) hands back a
//! transaction id. The on-chain campaign id is attached once the creating
//! transaction confirms with `(ok u<id>)`. Canceled and rejected submissions
//! leave the store untouched.
#![forbid(unsafe_code)]

use crate::campaign_store::{CampaignRecord, CampaignStore, CampaignStoreError, NewCampaign};
use bitfund_core::clarity::{secondary_id_from_result, ClarityValue};
use bitfund_core::node_client::NodeTxStatus;
use bitfund_core::{
    BaseUnits, BuildError, CampaignInput, ContributionInput, NodeClientError, SubmissionClient,
    SubmissionMode, SubmissionResult, SubmissionStatus, SubmitError, TransactionPayload, TxBuilder,
    TxId,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Submit(#[from] SubmitError),
    #[error("campaign store: {0}")]
    Store(#[from] CampaignStoreError),
    #[error("node: {0}")]
    Node(#[from] NodeClientError),
    #[error("unexpected contract result: {0}")]
    UnexpectedResult(String),
}

impl From<BuildError> for WorkflowError {
    fn from(e: BuildError) -> Self {
        WorkflowError::Submit(SubmitError::Validation(e))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCampaignInput {
    pub project_name: String,
    #[serde(default)]
    pub project_description: String,
    pub funding_goal: String,
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    pub mode: SubmissionMode,
    /// Poll for confirmation before returning.
    pub wait: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            mode: SubmissionMode::Direct,
            wait: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignOutcome {
    pub submission: SubmissionResult,
    /// Present once the submission produced a transaction id.
    pub campaign: Option<CampaignRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub tx_id: TxId,
    /// `None` while the node does not know the transaction.
    pub status: Option<NodeTxStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<CampaignRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub address: String,
    pub asset_id: String,
    pub balance: BaseUnits,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionReport {
    pub campaign_id: u128,
    pub contributor: String,
    pub amount: BaseUnits,
    pub display: String,
}

pub struct CampaignWorkflow {
    builder: TxBuilder,
    submission: SubmissionClient,
    store: CampaignStore,
    asset_id: String,
    clock: fn() -> u64,
}

impl CampaignWorkflow {
    pub fn new(
        builder: TxBuilder,
        submission: SubmissionClient,
        store: CampaignStore,
        asset_id: impl Into<String>,
    ) -> Self {
        Self {
            builder,
            submission,
            store,
            asset_id: asset_id.into(),
            clock: unix_now_secs,
        }
    }

    /// Replace the wall clock used for deadlines and record timestamps.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &CampaignStore {
        &self.store
    }

    pub async fn create_campaign(
        &self,
        input: NewCampaignInput,
        opts: SubmitOptions,
    ) -> Result<CampaignOutcome, WorkflowError> {
        let project_name = input.project_name.trim().to_string();
        if project_name.is_empty() {
            return Err(BuildError::MissingRequiredField("project_name").into());
        }
        let now = (self.clock)();
        let request = self.builder.campaign_request(
            &CampaignInput {
                funding_goal: input.funding_goal,
                deadline_secs: input.deadline_secs,
            },
            now,
        )?;
        let call = request.to_contract_call(&self.builder.config().campaigns_contract);
        // Deadline is present: campaign_request rejects inputs without one.
        let deadline_secs = input.deadline_secs.unwrap_or(now);

        let submitted = self
            .submission
            .submit(TransactionPayload::ContractCall(call), opts.mode)
            .await?;
        let Some(tx_id) = submitted.transaction_id.clone() else {
            info!(op = "create_campaign", status = ?submitted.status, "nothing submitted");
            return Ok(CampaignOutcome {
                submission: submitted,
                campaign: None,
            });
        };

        let mut campaign = Some(self.store.create(NewCampaign {
            tx_id: tx_id.to_string(),
            project_name,
            project_description: input.project_description.trim().to_string(),
            funding_goal: request.funding_goal,
            deadline_secs,
            created_at_secs: now,
        })?);
        self.store.flush()?;
        info!(op = "create_campaign", %tx_id, "campaign recorded");

        if !opts.wait {
            return Ok(CampaignOutcome {
                submission: submitted,
                campaign,
            });
        }

        let confirmed = self.submission.confirm(submitted).await?;
        match (confirmed.status, confirmed.secondary_id) {
            (SubmissionStatus::Confirmed, Some(id)) => {
                campaign = self.store.set_campaign_id(tx_id.as_str(), id)?;
                self.store.flush()?;
                info!(op = "create_campaign", %tx_id, campaign_id = id, "campaign confirmed");
            }
            (SubmissionStatus::Confirmed, None) => {
                warn!(op = "create_campaign", %tx_id, "confirmed without a campaign id");
            }
            (status, _) => {
                warn!(op = "create_campaign", %tx_id, ?status, "campaign not confirmed");
            }
        }
        Ok(CampaignOutcome {
            submission: confirmed,
            campaign,
        })
    }

    pub async fn contribute(
        &self,
        input: ContributionInput,
        opts: SubmitOptions,
    ) -> Result<SubmissionResult, WorkflowError> {
        let call = self.builder.contribution_call(&input)?;
        self.run(TransactionPayload::ContractCall(call), opts).await
    }

    /// Deploy a contract. Always signed locally.
    pub async fn deploy(
        &self,
        contract_name: &str,
        code_body: &str,
        wait: bool,
    ) -> Result<SubmissionResult, WorkflowError> {
        let deploy = self.builder.deploy(contract_name, code_body)?;
        self.run(
            TransactionPayload::ContractDeploy(deploy),
            SubmitOptions {
                mode: SubmissionMode::Direct,
                wait,
            },
        )
        .await
    }

    async fn run(
        &self,
        payload: TransactionPayload,
        opts: SubmitOptions,
    ) -> Result<SubmissionResult, WorkflowError> {
        let submitted = self.submission.submit(payload, opts.mode).await?;
        if !opts.wait || submitted.status != SubmissionStatus::Pending {
            return Ok(submitted);
        }
        Ok(self.submission.confirm(submitted).await?)
    }

    /// One status lookup. A confirmed campaign creation also fills in the
    /// stored campaign id.
    pub async fn refresh_status(&self, tx_id: &TxId) -> Result<StatusReport, WorkflowError> {
        let resp = self.submission.node().transaction_status(tx_id).await?;
        let mut campaign = self.store.get_by_tx_id(tx_id.as_str())?;

        let Some(resp) = resp else {
            return Ok(StatusReport {
                tx_id: tx_id.clone(),
                status: None,
                tx_status: None,
                function_result: None,
                secondary_id: None,
                campaign,
            });
        };

        let status = resp.status();
        let function_result = resp.function_result().map(str::to_string);
        let secondary_id = match status {
            NodeTxStatus::Success => function_result.as_deref().and_then(secondary_id_from_result),
            _ => None,
        };
        if let (Some(id), Some(rec)) = (secondary_id, campaign.as_ref()) {
            if rec.campaign_id != Some(id) {
                campaign = self.store.set_campaign_id(tx_id.as_str(), id)?;
                self.store.flush()?;
            }
        }
        Ok(StatusReport {
            tx_id: tx_id.clone(),
            status: Some(status),
            tx_status: Some(resp.tx_status),
            function_result,
            secondary_id,
            campaign,
        })
    }

    pub async fn balance(&self, address: &str) -> Result<BalanceReport, WorkflowError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(BuildError::MissingRequiredField("address").into());
        }
        let balance = self
            .submission
            .node()
            .token_balance(address, &self.asset_id)
            .await?;
        Ok(BalanceReport {
            address: address.to_string(),
            asset_id: self.asset_id.clone(),
            balance,
            display: balance.to_decimal_string(self.builder.config().decimals),
        })
    }

    /// Amount `contributor` has pledged to a campaign, read from contract
    /// state. No record reads as zero.
    pub async fn contribution(
        &self,
        campaign_id: &str,
        contributor: &str,
    ) -> Result<ContributionReport, WorkflowError> {
        let call = self.builder.contribution_lookup(campaign_id, contributor)?;
        let value = self
            .submission
            .node()
            .call_read_only(
                &call.contract,
                &call.function_name,
                &call.sender.to_string(),
                &call.function_args,
            )
            .await?;
        let amount = contribution_amount(&value)
            .ok_or_else(|| WorkflowError::UnexpectedResult(value.to_string()))?;
        let campaign_id = match call.function_args.first() {
            Some(ClarityValue::UInt(id)) => *id,
            _ => return Err(WorkflowError::UnexpectedResult("missing campaign id".to_string())),
        };
        info!(op = "contribution", campaign_id, contributor = %call.sender, %amount, "contribution read");
        Ok(ContributionReport {
            campaign_id,
            contributor: call.sender.to_string(),
            amount,
            display: amount.to_decimal_string(self.builder.config().decimals),
        })
    }

    pub fn list_campaigns(&self, active_only: bool) -> Result<Vec<CampaignRecord>, WorkflowError> {
        Ok(if active_only {
            self.store.list_active((self.clock)())?
        } else {
            self.store.list_all()?
        })
    }
}

/// Accepts `none`, a bare `uint`, or `{amount: uint}`, optionally wrapped in
/// `ok` and `some`.
fn contribution_amount(value: &ClarityValue) -> Option<BaseUnits> {
    match value {
        ClarityValue::ResponseOk(inner) | ClarityValue::OptionalSome(inner) => {
            contribution_amount(inner)
        }
        ClarityValue::OptionalNone => Some(BaseUnits::ZERO),
        ClarityValue::UInt(n) => Some(BaseUnits(*n)),
        ClarityValue::Tuple(_) => match value.tuple_field("amount") {
            Some(ClarityValue::UInt(n)) => Some(BaseUnits(*n)),
            _ => None,
        },
        _ => None,
    }
}

pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
