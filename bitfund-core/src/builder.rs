//! Transaction builder: user intent -> validated request -> typed contract call.
//!
//! Everything here is synchronous and pure. Validation failures are reported
//! before any node or wallet interaction can happen.
#![forbid(unsafe_code)]

use crate::amount::{parse_decimal, AmountError, BaseUnits, DEFAULT_DECIMALS, MAX_DECIMALS};
use crate::clarity::{validate_contract_name, ClarityError, ClarityValue, Principal};
use crate::post_condition::{AssetInfo, PostCondition, PostConditionMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Average block time assumed when converting a deadline into a block count.
pub const DEFAULT_BLOCK_INTERVAL_SECS: u64 = 600;

pub const CREATE_CAMPAIGN_FN: &str = "create-campaign";
pub const CONTRIBUTE_FN: &str = "contribute";
pub const GET_CONTRIBUTION_FN: &str = "get-contribution";

/// Fungible token name defined by the asset contract.
pub const DEFAULT_ASSET_NAME: &str = "sbtc";

/// Deployed contract identifier (`<address>.<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractId {
    pub address: String,
    pub name: String,
}

impl ContractId {
    pub fn principal(&self) -> Principal {
        Principal::Contract {
            address: self.address.clone(),
            name: self.name.clone(),
        }
    }
}

impl FromStr for ContractId {
    type Err = ClarityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Principal>()? {
            Principal::Contract { address, name } => Ok(Self { address, name }),
            Principal::Standard(_) => Err(ClarityError::InvalidPrincipal(
                s.to_string(),
                "expected <address>.<contract-name>",
            )),
        }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.address, self.name)
    }
}

impl Serialize for ContractId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContractId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A call to a public contract function with an ordered, typed argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract: ContractId,
    pub function_name: String,
    pub function_args: Vec<ClarityValue>,
    #[serde(default)]
    pub post_condition_mode: PostConditionMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_conditions: Vec<PostCondition>,
}

/// A read-only function evaluated by the node without a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyCall {
    pub contract: ContractId,
    pub function_name: String,
    pub function_args: Vec<ClarityValue>,
    /// Principal the call is evaluated as (`tx-sender`).
    pub sender: Principal,
}

/// Publish a new contract from source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDeploy {
    pub contract_name: String,
    pub code_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionPayload {
    ContractCall(ContractCall),
    ContractDeploy(ContractDeploy),
}

impl TransactionPayload {
    /// Short label for logs.
    pub fn describe(&self) -> String {
        match self {
            TransactionPayload::ContractCall(call) => {
                format!("{}::{}", call.contract, call.function_name)
            }
            TransactionPayload::ContractDeploy(deploy) => format!("deploy {}", deploy.contract_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("invalid {field}: {source}")]
    InvalidAmount {
        field: &'static str,
        #[source]
        source: AmountError,
    },
    #[error("deadline {deadline_secs} is not after current time {now_secs}")]
    InvalidDeadline { deadline_secs: u64, now_secs: u64 },
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),
    #[error("invalid campaign id: {0:?}")]
    InvalidCampaignId(String),
    #[error(transparent)]
    InvalidPrincipal(#[from] ClarityError),
    #[error("invalid builder config: {0}")]
    Config(String),
}

/// Raw contribution form values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionInput {
    pub campaign_id: String,
    pub amount: String,
}

/// Raw campaign form values. `deadline_secs` is a unix timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignInput {
    pub funding_goal: String,
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRequest {
    pub campaign_id: u64,
    pub amount: BaseUnits,
    /// Asset contract the contributed tokens move through.
    pub recipient: Principal,
    /// Token the post-condition pins the transfer to.
    pub asset: AssetInfo,
}

impl ContributionRequest {
    /// The call runs in deny mode: the origin may send exactly `amount` of
    /// the asset and nothing else.
    pub fn to_contract_call(&self, contract: &ContractId) -> Result<ContractCall, BuildError> {
        let amount = u64::try_from(self.amount.get()).map_err(|_| BuildError::InvalidAmount {
            field: "amount",
            source: AmountError::Overflow,
        })?;
        Ok(ContractCall {
            contract: contract.clone(),
            function_name: CONTRIBUTE_FN.to_string(),
            function_args: vec![
                ClarityValue::uint(self.campaign_id),
                ClarityValue::UInt(self.amount.get()),
                ClarityValue::principal(self.recipient.clone()),
            ],
            post_condition_mode: PostConditionMode::Deny,
            post_conditions: vec![PostCondition::origin_sends_exactly(self.asset.clone(), amount)],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCreationRequest {
    pub funding_goal: BaseUnits,
    pub duration_blocks: u64,
}

impl CampaignCreationRequest {
    /// Creating a campaign moves no assets, so deny mode with no conditions.
    pub fn to_contract_call(&self, contract: &ContractId) -> ContractCall {
        ContractCall {
            contract: contract.clone(),
            function_name: CREATE_CAMPAIGN_FN.to_string(),
            function_args: vec![
                ClarityValue::UInt(self.funding_goal.get()),
                ClarityValue::uint(self.duration_blocks),
            ],
            post_condition_mode: PostConditionMode::Deny,
            post_conditions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub decimals: u32,
    pub block_interval_secs: u64,
    pub campaigns_contract: ContractId,
    pub asset_contract: Principal,
    pub asset_name: String,
}

impl BuilderConfig {
    pub fn new(campaigns_contract: ContractId, asset_contract: Principal) -> Self {
        Self {
            decimals: DEFAULT_DECIMALS,
            block_interval_secs: DEFAULT_BLOCK_INTERVAL_SECS,
            campaigns_contract,
            asset_contract,
            asset_name: DEFAULT_ASSET_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TxBuilder {
    cfg: BuilderConfig,
    asset: AssetInfo,
}

impl TxBuilder {
    pub fn new(cfg: BuilderConfig) -> Result<Self, BuildError> {
        if cfg.block_interval_secs == 0 {
            return Err(BuildError::Config("block_interval_secs must be > 0".to_string()));
        }
        if cfg.decimals > MAX_DECIMALS {
            return Err(BuildError::Config(format!(
                "decimals must be <= {MAX_DECIMALS}"
            )));
        }
        let asset = AssetInfo::new(&cfg.asset_contract, &cfg.asset_name)
            .map_err(|e| BuildError::Config(e.to_string()))?;
        Ok(Self { cfg, asset })
    }

    pub fn asset(&self) -> &AssetInfo {
        &self.asset
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.cfg
    }

    /// Parse a user-entered amount in whole asset units.
    pub fn parse_amount(&self, field: &'static str, raw: &str) -> Result<BaseUnits, BuildError> {
        if raw.trim().is_empty() {
            return Err(BuildError::MissingRequiredField(field));
        }
        parse_decimal(raw, self.cfg.decimals).map_err(|source| BuildError::InvalidAmount { field, source })
    }

    /// Blocks between `now_secs` and `deadline_secs`, rounded up.
    pub fn duration_blocks(&self, deadline_secs: u64, now_secs: u64) -> Result<u64, BuildError> {
        if deadline_secs <= now_secs {
            return Err(BuildError::InvalidDeadline {
                deadline_secs,
                now_secs,
            });
        }
        Ok((deadline_secs - now_secs).div_ceil(self.cfg.block_interval_secs))
    }

    pub fn contribution_request(
        &self,
        input: &ContributionInput,
    ) -> Result<ContributionRequest, BuildError> {
        let campaign_id = parse_campaign_id(&input.campaign_id)?;
        let amount = self.parse_amount("amount", &input.amount)?;
        Ok(ContributionRequest {
            campaign_id,
            amount,
            recipient: self.cfg.asset_contract.clone(),
            asset: self.asset.clone(),
        })
    }

    /// `get-contribution(campaign-id, contributor)`, evaluated as the contributor.
    pub fn contribution_lookup(
        &self,
        campaign_id: &str,
        contributor: &str,
    ) -> Result<ReadOnlyCall, BuildError> {
        let campaign_id = parse_campaign_id(campaign_id)?;
        if contributor.trim().is_empty() {
            return Err(BuildError::MissingRequiredField("contributor"));
        }
        let contributor: Principal = contributor.parse()?;
        Ok(ReadOnlyCall {
            contract: self.cfg.campaigns_contract.clone(),
            function_name: GET_CONTRIBUTION_FN.to_string(),
            function_args: vec![
                ClarityValue::uint(campaign_id),
                ClarityValue::principal(contributor.clone()),
            ],
            sender: contributor,
        })
    }

    pub fn campaign_request(
        &self,
        input: &CampaignInput,
        now_secs: u64,
    ) -> Result<CampaignCreationRequest, BuildError> {
        let funding_goal = self.parse_amount("funding_goal", &input.funding_goal)?;
        let deadline_secs = input
            .deadline_secs
            .ok_or(BuildError::MissingRequiredField("deadline"))?;
        let duration_blocks = self.duration_blocks(deadline_secs, now_secs)?;
        Ok(CampaignCreationRequest {
            funding_goal,
            duration_blocks,
        })
    }

    pub fn contribution_call(&self, input: &ContributionInput) -> Result<ContractCall, BuildError> {
        self.contribution_request(input)?
            .to_contract_call(&self.cfg.campaigns_contract)
    }

    pub fn campaign_call(
        &self,
        input: &CampaignInput,
        now_secs: u64,
    ) -> Result<ContractCall, BuildError> {
        Ok(self
            .campaign_request(input, now_secs)?
            .to_contract_call(&self.cfg.campaigns_contract))
    }

    pub fn deploy(&self, contract_name: &str, code_body: &str) -> Result<ContractDeploy, BuildError> {
        let contract_name = contract_name.trim();
        if contract_name.is_empty() {
            return Err(BuildError::MissingRequiredField("contract_name"));
        }
        validate_contract_name(contract_name)
            .map_err(|r| ClarityError::InvalidPrincipal(contract_name.to_string(), r))?;
        if code_body.trim().is_empty() {
            return Err(BuildError::MissingRequiredField("code_body"));
        }
        Ok(ContractDeploy {
            contract_name: contract_name.to_string(),
            code_body: code_body.to_string(),
        })
    }
}

fn parse_campaign_id(raw: &str) -> Result<u64, BuildError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(BuildError::MissingRequiredField("campaign_id"));
    }
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| BuildError::InvalidCampaignId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYER: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";
    const NOW: u64 = 1_750_000_000;

    fn builder() -> TxBuilder {
        let campaigns: ContractId = format!("{DEPLOYER}.bitfund").parse().unwrap();
        let asset: Principal = format!("{DEPLOYER}.mock-sbtc").parse().unwrap();
        TxBuilder::new(BuilderConfig::new(campaigns, asset)).unwrap()
    }

    #[test]
    fn contribution_call_has_ordered_typed_args() {
        let call = builder()
            .contribution_call(&ContributionInput {
                campaign_id: "3".to_string(),
                amount: "1.5".to_string(),
            })
            .unwrap();
        assert_eq!(call.function_name, "contribute");
        assert_eq!(call.contract.to_string(), format!("{DEPLOYER}.bitfund"));
        assert_eq!(
            call.function_args,
            vec![
                ClarityValue::UInt(3),
                ClarityValue::UInt(150_000_000),
                ClarityValue::Principal(format!("{DEPLOYER}.mock-sbtc").parse().unwrap()),
            ]
        );
    }

    #[test]
    fn contribution_pins_exact_transfer_in_deny_mode() {
        let call = builder()
            .contribution_call(&ContributionInput {
                campaign_id: "3".to_string(),
                amount: "1.5".to_string(),
            })
            .unwrap();
        assert_eq!(call.post_condition_mode, PostConditionMode::Deny);
        assert_eq!(
            call.post_conditions,
            vec![PostCondition::origin_sends_exactly(
                format!("{DEPLOYER}.mock-sbtc::sbtc").parse().unwrap(),
                150_000_000
            )]
        );

        let campaign = builder()
            .campaign_call(
                &CampaignInput {
                    funding_goal: "2".to_string(),
                    deadline_secs: Some(NOW + 60),
                },
                NOW,
            )
            .unwrap();
        assert_eq!(campaign.post_condition_mode, PostConditionMode::Deny);
        assert!(campaign.post_conditions.is_empty());
    }

    #[test]
    fn contribution_beyond_u64_cannot_be_pinned() {
        let b = builder();
        let request = ContributionRequest {
            campaign_id: 1,
            amount: BaseUnits(u128::from(u64::MAX) + 1),
            recipient: b.config().asset_contract.clone(),
            asset: b.asset().clone(),
        };
        assert_eq!(
            request.to_contract_call(&b.config().campaigns_contract),
            Err(BuildError::InvalidAmount {
                field: "amount",
                source: AmountError::Overflow
            })
        );
    }

    #[test]
    fn contribution_lookup_args() {
        let call = builder().contribution_lookup(" 4 ", DEPLOYER).unwrap();
        assert_eq!(call.function_name, "get-contribution");
        assert_eq!(call.sender, Principal::Standard(DEPLOYER.to_string()));
        assert_eq!(
            call.function_args,
            vec![
                ClarityValue::UInt(4),
                ClarityValue::Principal(DEPLOYER.parse().unwrap())
            ]
        );

        let b = builder();
        assert_eq!(
            b.contribution_lookup("0", DEPLOYER),
            Err(BuildError::InvalidCampaignId("0".to_string()))
        );
        assert_eq!(
            b.contribution_lookup("1", " "),
            Err(BuildError::MissingRequiredField("contributor"))
        );
        assert!(matches!(
            b.contribution_lookup("1", "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGN"),
            Err(BuildError::InvalidPrincipal(ClarityError::InvalidAddress(..)))
        ));
    }

    #[test]
    fn asset_contract_must_be_a_contract() {
        let mut cfg = builder().config().clone();
        cfg.asset_contract = DEPLOYER.parse().unwrap();
        assert!(matches!(TxBuilder::new(cfg), Err(BuildError::Config(_))));
    }

    #[test]
    fn campaign_call_uses_block_duration() {
        let call = builder()
            .campaign_call(
                &CampaignInput {
                    funding_goal: "2".to_string(),
                    deadline_secs: Some(NOW + 3_600),
                },
                NOW,
            )
            .unwrap();
        assert_eq!(call.function_name, "create-campaign");
        assert_eq!(
            call.function_args,
            vec![ClarityValue::UInt(200_000_000), ClarityValue::UInt(6)]
        );
    }

    #[test]
    fn duration_rounds_up() {
        let b = builder();
        assert_eq!(b.duration_blocks(NOW + 1, NOW).unwrap(), 1);
        assert_eq!(b.duration_blocks(NOW + 600, NOW).unwrap(), 1);
        assert_eq!(b.duration_blocks(NOW + 601, NOW).unwrap(), 2);
        assert_eq!(b.duration_blocks(NOW + 3_600, NOW).unwrap(), 6);
    }

    #[test]
    fn past_or_present_deadline_is_rejected() {
        let b = builder();
        for deadline in [NOW, NOW - 1] {
            let err = b
                .campaign_request(
                    &CampaignInput {
                        funding_goal: "1".to_string(),
                        deadline_secs: Some(deadline),
                    },
                    NOW,
                )
                .unwrap_err();
            assert_eq!(
                err,
                BuildError::InvalidDeadline {
                    deadline_secs: deadline,
                    now_secs: NOW
                }
            );
        }
    }

    #[test]
    fn inexact_amount_is_invalid_amount() {
        let err = builder()
            .contribution_request(&ContributionInput {
                campaign_id: "1".to_string(),
                amount: "0.000000001".to_string(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::InvalidAmount {
                field: "amount",
                source: AmountError::SubUnitPrecision { decimals: 8 }
            }
        ));
    }

    #[test]
    fn missing_fields_and_bad_ids() {
        let b = builder();
        assert_eq!(
            b.contribution_request(&ContributionInput {
                campaign_id: " ".to_string(),
                amount: "1".to_string(),
            }),
            Err(BuildError::MissingRequiredField("campaign_id"))
        );
        assert_eq!(
            b.contribution_request(&ContributionInput {
                campaign_id: "1".to_string(),
                amount: String::new(),
            }),
            Err(BuildError::MissingRequiredField("amount"))
        );
        for bad in ["0", "-1", "x"] {
            assert_eq!(
                b.contribution_request(&ContributionInput {
                    campaign_id: bad.to_string(),
                    amount: "1".to_string(),
                }),
                Err(BuildError::InvalidCampaignId(bad.to_string()))
            );
        }
        assert_eq!(
            b.campaign_request(
                &CampaignInput {
                    funding_goal: "1".to_string(),
                    deadline_secs: None,
                },
                NOW
            ),
            Err(BuildError::MissingRequiredField("deadline"))
        );
    }

    #[test]
    fn deploy_requires_name_and_code() {
        let b = builder();
        assert_eq!(
            b.deploy("", "(define-data-var x uint u0)"),
            Err(BuildError::MissingRequiredField("contract_name"))
        );
        assert_eq!(
            b.deploy("bitfund", "  "),
            Err(BuildError::MissingRequiredField("code_body"))
        );
        let d = b.deploy(" bitfund ", "(define-data-var x uint u0)").unwrap();
        assert_eq!(d.contract_name, "bitfund");
        assert!(matches!(
            b.deploy("a.b", "(define-data-var x uint u0)"),
            Err(BuildError::InvalidPrincipal(_))
        ));
    }

    #[test]
    fn zero_block_interval_is_a_config_error() {
        let mut cfg = builder().config().clone();
        cfg.block_interval_secs = 0;
        assert!(matches!(TxBuilder::new(cfg), Err(BuildError::Config(_))));
    }

    #[test]
    fn payload_json_is_tagged() {
        let call = builder()
            .contribution_call(&ContributionInput {
                campaign_id: "7".to_string(),
                amount: "0.00000001".to_string(),
            })
            .unwrap();
        let v = serde_json::to_value(TransactionPayload::ContractCall(call)).unwrap();
        assert_eq!(v["type"], "contract_call");
        assert_eq!(v["function_name"], "contribute");
        assert_eq!(v["function_args"][1]["value"], "1");
        assert_eq!(v["post_condition_mode"], "deny");
        assert_eq!(v["post_conditions"][0]["amount"], "1");
    }
}
