#![forbid(unsafe_code)]

use bitfund_core::address::Network;
use bitfund_core::amount::{DEFAULT_DECIMALS, MAX_DECIMALS};
use bitfund_core::builder::{
    BuilderConfig, ContractId, DEFAULT_ASSET_NAME, DEFAULT_BLOCK_INTERVAL_SECS,
};
use bitfund_core::clarity::Principal;
use bitfund_core::confirmation::ConfirmationPolicy;
use bitfund_core::node_client::http_client::NodeRpcConfig;
use bitfund_core::signing::Secp256k1Signer;
use bitfund_core::submission::DEFAULT_FEE;
use serde::Deserialize;
use std::fmt;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct BitfundConfig {
    pub node: NodeRpcConfig,
    pub contract: ContractConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub confirmation: ConfirmationPolicy,
    #[serde(default)]
    pub units: UnitsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
    /// Deployer address of the campaigns contract.
    pub address: String,
    #[serde(default = "default_contract_name")]
    pub name: String,
    /// Fully qualified asset contract, e.g. `ST...mock-sbtc`.
    pub asset_contract: String,
    /// Token name declared by the asset contract's `define-fungible-token`.
    #[serde(default = "default_asset_name")]
    pub asset_name: String,
    /// Key in the node's fungible token balances; defaults to
    /// `<asset_contract>::<asset_name>`.
    #[serde(default)]
    pub asset_id: Option<String>,
}

fn default_contract_name() -> String {
    "bitfund".to_string()
}

fn default_asset_name() -> String {
    DEFAULT_ASSET_NAME.to_string()
}

impl ContractConfig {
    pub fn campaigns_contract(&self) -> Result<ContractId, String> {
        format!("{}.{}", self.address.trim(), self.name.trim())
            .parse::<ContractId>()
            .map_err(|e| format!("invalid [contract] address/name: {e}"))
    }

    pub fn asset_principal(&self) -> Result<Principal, String> {
        self.asset_contract
            .trim()
            .parse::<Principal>()
            .map_err(|e| format!("invalid contract.asset_contract: {e}"))
    }

    pub fn asset_id(&self) -> String {
        match self.asset_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("{}::{}", self.asset_contract.trim(), self.asset_name.trim()),
        }
    }
}

/// Direct-mode signing key. Normally supplied as `env:BITFUND_SENDER_KEY`:
/// 32 hex bytes, or 33 with a trailing `01` for a compressed public key.
#[derive(Clone, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub network: Network,
    /// Flat fee in micro-STX.
    #[serde(default = "default_fee")]
    pub fee: u64,
}

fn default_fee() -> u64 {
    DEFAULT_FEE
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            network: Network::default(),
            fee: default_fee(),
        }
    }
}

impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerConfig")
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("network", &self.network)
            .field("fee", &self.fee)
            .finish()
    }
}

impl SignerConfig {
    /// `Ok(None)` when no key is configured (wallet-only operation).
    pub fn load(&self) -> Result<Option<Secp256k1Signer>, String> {
        match self.private_key.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(secret) => Secp256k1Signer::from_secret_hex(secret, self.network)
                .map(Some)
                .map_err(|e| format!("invalid signer.private_key: {e}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitsConfig {
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    #[serde(default = "default_block_interval_secs")]
    pub block_interval_secs: u64,
}

fn default_decimals() -> u32 {
    DEFAULT_DECIMALS
}

fn default_block_interval_secs() -> u64 {
    DEFAULT_BLOCK_INTERVAL_SECS
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
            block_interval_secs: default_block_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_campaign_db_dir")]
    pub campaign_db_dir: String,
}

fn default_campaign_db_dir() -> String {
    "bitfund-db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            campaign_db_dir: default_campaign_db_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn resolve_env_refs(mut v: toml::Value) -> Result<toml::Value, String> {
    fn walk(v: &mut toml::Value) -> Result<(), String> {
        match v {
            toml::Value::String(s) => {
                if let Some(var) = s.strip_prefix("env:") {
                    let var = var.trim();
                    if var.is_empty() {
                        return Err("invalid env: reference (empty var name)".to_string());
                    }
                    let val = std::env::var(var)
                        .map_err(|_| format!("missing required environment variable: {var}"))?;
                    *s = val;
                }
            }
            toml::Value::Array(arr) => {
                for x in arr {
                    walk(x)?;
                }
            }
            toml::Value::Table(map) => {
                for (_, x) in map.iter_mut() {
                    walk(x)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    walk(&mut v)?;
    Ok(v)
}

pub fn load_config(path: &str) -> Result<BitfundConfig, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("failed to read config {path}: {e}"))?;
    parse_config(&raw).map_err(|e| format!("{path}: {e}"))
}

pub fn parse_config(raw: &str) -> Result<BitfundConfig, String> {
    let parsed: toml::Value =
        toml::from_str(raw).map_err(|e| format!("failed to parse config: {e}"))?;
    let resolved = resolve_env_refs(parsed)?;
    let cfg = resolved
        .try_into::<BitfundConfig>()
        .map_err(|e| format!("failed to decode config: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

impl BitfundConfig {
    /// Checks that hold in every node mode.
    pub fn validate(&self) -> Result<(), String> {
        self.contract.campaigns_contract()?;
        self.contract.asset_principal()?;
        if self.contract.asset_name.trim().is_empty() {
            return Err("contract.asset_name is empty".to_string());
        }
        if self.units.block_interval_secs == 0 {
            return Err("units.block_interval_secs must be > 0".to_string());
        }
        if self.units.decimals > MAX_DECIMALS {
            return Err(format!("units.decimals must be <= {MAX_DECIMALS}"));
        }
        self.confirmation.validate()?;
        if self.storage.campaign_db_dir.trim().is_empty() {
            return Err("storage.campaign_db_dir is empty".to_string());
        }
        match self.logging.format.as_str() {
            "json" | "plain" => Ok(()),
            other => Err(format!("logging.format must be json or plain, got {other:?}")),
        }
    }

    /// Additional checks before talking to a real node.
    pub fn validate_for_mode_http(&self) -> Result<(), String> {
        self.node
            .validate()
            .map_err(|e| format!("invalid [node] config: {e}"))?;
        if self.node.retry.max_attempts == 0 {
            return Err("node.retry.max_attempts must be >= 1".to_string());
        }
        Ok(())
    }

    pub fn builder_config(&self) -> Result<BuilderConfig, String> {
        let mut cfg = BuilderConfig::new(
            self.contract.campaigns_contract()?,
            self.contract.asset_principal()?,
        );
        cfg.decimals = self.units.decimals;
        cfg.block_interval_secs = self.units.block_interval_secs;
        cfg.asset_name = self.contract.asset_name.trim().to_string();
        Ok(cfg)
    }
}
