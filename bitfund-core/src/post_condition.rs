//! Post-conditions: asset movements a transaction is allowed to make.
//!
//! In `deny` mode the chain aborts the transaction if it moves any asset not
//! covered by a listed condition, so a contribution can never transfer more
//! than the amount the user entered.
#![forbid(unsafe_code)]

use crate::clarity::{write_address, write_name, ClarityError, Principal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const POST_CONDITION_FUNGIBLE: u8 = 0x01;

const PRINCIPAL_ORIGIN: u8 = 0x01;
const PRINCIPAL_STANDARD: u8 = 0x02;
const PRINCIPAL_CONTRACT: u8 = 0x03;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostConditionMode {
    Allow,
    #[default]
    Deny,
}

impl PostConditionMode {
    pub fn wire_byte(self) -> u8 {
        match self {
            PostConditionMode::Allow => 0x01,
            PostConditionMode::Deny => 0x02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FungibleConditionCode {
    Eq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

impl FungibleConditionCode {
    pub fn wire_byte(self) -> u8 {
        match self {
            FungibleConditionCode::Eq => 0x01,
            FungibleConditionCode::Gt => 0x02,
            FungibleConditionCode::GtEq => 0x03,
            FungibleConditionCode::Lt => 0x04,
            FungibleConditionCode::LtEq => 0x05,
        }
    }
}

/// Fungible token identifier `<address>.<contract>::<asset>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetInfo {
    pub address: String,
    pub contract_name: String,
    pub asset_name: String,
}

impl AssetInfo {
    /// Asset `asset_name` defined by `contract`. Fails for a standard principal.
    pub fn new(contract: &Principal, asset_name: &str) -> Result<Self, ClarityError> {
        match contract {
            Principal::Contract { address, name } if !asset_name.is_empty() => Ok(Self {
                address: address.clone(),
                contract_name: name.clone(),
                asset_name: asset_name.to_string(),
            }),
            Principal::Contract { .. } => Err(ClarityError::InvalidPrincipal(
                format!("{contract}::{asset_name}"),
                "asset name is empty",
            )),
            Principal::Standard(_) => Err(ClarityError::InvalidPrincipal(
                contract.to_string(),
                "asset must be defined by a contract",
            )),
        }
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<(), ClarityError> {
        write_address(out, &self.address)?;
        write_name(out, &self.contract_name)?;
        write_name(out, &self.asset_name)
    }
}

impl FromStr for AssetInfo {
    type Err = ClarityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (contract, asset) = s.split_once("::").ok_or_else(|| {
            ClarityError::InvalidPrincipal(s.to_string(), "expected <contract>::<asset>")
        })?;
        Self::new(&contract.parse()?, asset)
    }
}

impl fmt::Display for AssetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}::{}", self.address, self.contract_name, self.asset_name)
    }
}

impl Serialize for AssetInfo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetInfo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostCondition {
    Fungible {
        /// Sending principal; absent means the transaction origin.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        principal: Option<Principal>,
        asset: AssetInfo,
        condition: FungibleConditionCode,
        #[serde(with = "u64_string")]
        amount: u64,
    },
}

impl PostCondition {
    /// The origin sends exactly `amount` of `asset`.
    pub fn origin_sends_exactly(asset: AssetInfo, amount: u64) -> Self {
        PostCondition::Fungible {
            principal: None,
            asset,
            condition: FungibleConditionCode::Eq,
            amount,
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) -> Result<(), ClarityError> {
        match self {
            PostCondition::Fungible {
                principal,
                asset,
                condition,
                amount,
            } => {
                out.push(POST_CONDITION_FUNGIBLE);
                match principal {
                    None => out.push(PRINCIPAL_ORIGIN),
                    Some(Principal::Standard(address)) => {
                        out.push(PRINCIPAL_STANDARD);
                        write_address(out, address)?;
                    }
                    Some(Principal::Contract { address, name }) => {
                        out.push(PRINCIPAL_CONTRACT);
                        write_address(out, address)?;
                        write_name(out, name)?;
                    }
                }
                asset.write(out)?;
                out.push(condition.wire_byte());
                out.extend_from_slice(&amount.to_be_bytes());
            }
        }
        Ok(())
    }
}

mod u64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(v: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(v)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYER: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";

    fn sbtc() -> AssetInfo {
        format!("{DEPLOYER}.mock-sbtc::sbtc").parse().unwrap()
    }

    #[test]
    fn origin_fungible_condition_encoding() {
        let mut out = Vec::new();
        PostCondition::origin_sends_exactly(sbtc(), 500)
            .write(&mut out)
            .unwrap();
        assert_eq!(
            hex::encode(out),
            "01011a6d78de7b0625dfbfc16c3a8a5735f6dc3dc3f2ce096d6f636b2d7362746304736274630100000000000001f4"
        );
    }

    #[test]
    fn asset_identifier_parsing() {
        let asset = sbtc();
        assert_eq!(asset.contract_name, "mock-sbtc");
        assert_eq!(asset.to_string(), format!("{DEPLOYER}.mock-sbtc::sbtc"));
        assert!(DEPLOYER.parse::<AssetInfo>().is_err());
        assert!(format!("{DEPLOYER}::sbtc").parse::<AssetInfo>().is_err());
        assert!(format!("{DEPLOYER}.mock-sbtc::").parse::<AssetInfo>().is_err());
    }

    #[test]
    fn json_shape() {
        let pc = PostCondition::origin_sends_exactly(sbtc(), 150_000_000);
        let v = serde_json::to_value(&pc).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "type": "fungible",
                "asset": format!("{DEPLOYER}.mock-sbtc::sbtc"),
                "condition": "eq",
                "amount": "150000000",
            })
        );
        let back: PostCondition = serde_json::from_value(v).unwrap();
        assert_eq!(back, pc);
        assert_eq!(
            serde_json::to_value(PostConditionMode::default()).unwrap(),
            "deny"
        );
    }
}
