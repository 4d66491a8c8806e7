//! Typed contract-call arguments and result decoding.
//!
//! Arguments are built as [`ClarityValue`]s so the type tag (`uint`,
//! `principal`, ...) is fixed at construction. Results returned by the node
//! (`contract_call.function_result`) are decoded from either the textual
//! representation (`(ok u42)`) or the hex consensus encoding (`0x0701...`).
//! The same consensus encoding is produced for transaction arguments and
//! read-only calls.
#![forbid(unsafe_code)]

use crate::address::{AddressError, StacksAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const MAX_CONTRACT_NAME_LEN: usize = 128;

const TAG_INT: u8 = 0x00;
const TAG_UINT: u8 = 0x01;
const TAG_TRUE: u8 = 0x03;
const TAG_FALSE: u8 = 0x04;
const TAG_STANDARD_PRINCIPAL: u8 = 0x05;
const TAG_CONTRACT_PRINCIPAL: u8 = 0x06;
const TAG_OK: u8 = 0x07;
const TAG_ERR: u8 = 0x08;
const TAG_NONE: u8 = 0x09;
const TAG_SOME: u8 = 0x0a;
const TAG_TUPLE: u8 = 0x0c;
const TAG_STRING_ASCII: u8 = 0x0d;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClarityError {
    #[error("invalid principal {0:?}: {1}")]
    InvalidPrincipal(String, &'static str),
    #[error("invalid address {0:?}: {1}")]
    InvalidAddress(String, #[source] AddressError),
    #[error("invalid value representation at byte {offset}: {reason}")]
    InvalidRepr { offset: usize, reason: &'static str },
    #[error("invalid consensus encoding: {0}")]
    InvalidEncoding(String),
    #[error("unsupported consensus type prefix 0x{0:02x}")]
    UnsupportedType(u8),
}

/// Account (`ST...`) or contract (`ST....name`) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    Standard(String),
    Contract { address: String, name: String },
}

impl Principal {
    pub fn address(&self) -> &str {
        match self {
            Principal::Standard(address) | Principal::Contract { address, .. } => address,
        }
    }

    fn write_consensus(&self, out: &mut Vec<u8>) -> Result<(), ClarityError> {
        match self {
            Principal::Standard(address) => {
                out.push(TAG_STANDARD_PRINCIPAL);
                write_address(out, address)
            }
            Principal::Contract { address, name } => {
                out.push(TAG_CONTRACT_PRINCIPAL);
                write_address(out, address)?;
                write_name(out, name)
            }
        }
    }
}

impl FromStr for Principal {
    type Err = ClarityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('\'');
        match s.split_once('.') {
            Some((address, name)) => {
                validate_address(address)?;
                validate_contract_name(name)
                    .map_err(|r| ClarityError::InvalidPrincipal(s.into(), r))?;
                Ok(Principal::Contract {
                    address: address.to_string(),
                    name: name.to_string(),
                })
            }
            None => {
                validate_address(s)?;
                Ok(Principal::Standard(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Standard(address) => write!(f, "{address}"),
            Principal::Contract { address, name } => write!(f, "{address}.{name}"),
        }
    }
}

impl Serialize for Principal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn validate_address(address: &str) -> Result<StacksAddress, ClarityError> {
    address
        .parse()
        .map_err(|e| ClarityError::InvalidAddress(address.to_string(), e))
}

/// Append an account address as version byte + hash160.
pub(crate) fn write_address(out: &mut Vec<u8>, address: &str) -> Result<(), ClarityError> {
    let addr = validate_address(address)?;
    out.push(addr.version());
    out.extend_from_slice(addr.hash160());
    Ok(())
}

/// Append a name with its one-byte length prefix.
pub(crate) fn write_name(out: &mut Vec<u8>, name: &str) -> Result<(), ClarityError> {
    let len = u8::try_from(name.len())
        .map_err(|_| ClarityError::InvalidEncoding(format!("name {name:?} is too long")))?;
    out.push(len);
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

/// Append a four-byte big-endian length or count.
pub(crate) fn write_len(out: &mut Vec<u8>, len: usize) -> Result<(), ClarityError> {
    let len = u32::try_from(len)
        .map_err(|_| ClarityError::InvalidEncoding(format!("length {len} exceeds u32")))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

pub(crate) fn validate_contract_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() || name.len() > MAX_CONTRACT_NAME_LEN {
        return Err("contract name length out of range");
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err("contract name must start with a letter");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("contract name contains invalid characters");
    }
    Ok(())
}

/// A typed contract value.
///
/// Serializes to JSON as `{"type": "uint", "value": "42"}`; integers are
/// carried as strings so 128-bit values survive JSON consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ClarityValue {
    #[serde(rename = "uint", with = "u128_string")]
    UInt(u128),
    #[serde(with = "i128_string")]
    Int(i128),
    Bool(bool),
    Principal(Principal),
    StringAscii(String),
    #[serde(rename = "none")]
    OptionalNone,
    #[serde(rename = "some")]
    OptionalSome(Box<ClarityValue>),
    #[serde(rename = "ok")]
    ResponseOk(Box<ClarityValue>),
    #[serde(rename = "err")]
    ResponseErr(Box<ClarityValue>),
    Tuple(BTreeMap<String, ClarityValue>),
}

impl ClarityValue {
    pub fn uint(v: impl Into<u128>) -> Self {
        ClarityValue::UInt(v.into())
    }

    pub fn principal(p: Principal) -> Self {
        ClarityValue::Principal(p)
    }

    /// Short type tag (`uint`, `principal`, ...) used in logs and errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClarityValue::UInt(_) => "uint",
            ClarityValue::Int(_) => "int",
            ClarityValue::Bool(_) => "bool",
            ClarityValue::Principal(_) => "principal",
            ClarityValue::StringAscii(_) => "string-ascii",
            ClarityValue::OptionalNone | ClarityValue::OptionalSome(_) => "optional",
            ClarityValue::ResponseOk(_) | ClarityValue::ResponseErr(_) => "response",
            ClarityValue::Tuple(_) => "tuple",
        }
    }

    /// Field `name` of a tuple value.
    pub fn tuple_field(&self, name: &str) -> Option<&ClarityValue> {
        match self {
            ClarityValue::Tuple(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Binary consensus encoding.
    pub fn to_consensus_bytes(&self) -> Result<Vec<u8>, ClarityError> {
        let mut out = Vec::new();
        self.write_consensus(&mut out)?;
        Ok(out)
    }

    /// `0x`-prefixed hex of the consensus encoding, as the node's read-only
    /// endpoint expects arguments.
    pub fn to_hex(&self) -> Result<String, ClarityError> {
        Ok(format!("0x{}", hex::encode(self.to_consensus_bytes()?)))
    }

    pub(crate) fn write_consensus(&self, out: &mut Vec<u8>) -> Result<(), ClarityError> {
        match self {
            ClarityValue::Int(n) => {
                out.push(TAG_INT);
                out.extend_from_slice(&n.to_be_bytes());
            }
            ClarityValue::UInt(n) => {
                out.push(TAG_UINT);
                out.extend_from_slice(&n.to_be_bytes());
            }
            ClarityValue::Bool(true) => out.push(TAG_TRUE),
            ClarityValue::Bool(false) => out.push(TAG_FALSE),
            ClarityValue::Principal(p) => p.write_consensus(out)?,
            ClarityValue::StringAscii(s) => {
                if !s.is_ascii() {
                    return Err(ClarityError::InvalidEncoding(format!(
                        "string-ascii value {s:?} is not ascii"
                    )));
                }
                out.push(TAG_STRING_ASCII);
                write_len(out, s.len())?;
                out.extend_from_slice(s.as_bytes());
            }
            ClarityValue::OptionalNone => out.push(TAG_NONE),
            ClarityValue::OptionalSome(v) => {
                out.push(TAG_SOME);
                v.write_consensus(out)?;
            }
            ClarityValue::ResponseOk(v) => {
                out.push(TAG_OK);
                v.write_consensus(out)?;
            }
            ClarityValue::ResponseErr(v) => {
                out.push(TAG_ERR);
                v.write_consensus(out)?;
            }
            ClarityValue::Tuple(fields) => {
                out.push(TAG_TUPLE);
                write_len(out, fields.len())?;
                for (name, v) in fields {
                    write_name(out, name)?;
                    v.write_consensus(out)?;
                }
            }
        }
        Ok(())
    }

    /// `Some(n)` when the value is exactly `(ok u<n>)`.
    pub fn ok_uint(&self) -> Option<u128> {
        match self {
            ClarityValue::ResponseOk(inner) => match inner.as_ref() {
                ClarityValue::UInt(n) => Some(*n),
                _ => None,
            },
            _ => None,
        }
    }

    /// Decode a node-reported result: hex consensus bytes when prefixed with
    /// `0x`, otherwise the textual representation.
    pub fn decode_result(s: &str) -> Result<Self, ClarityError> {
        let s = s.trim();
        match s.strip_prefix("0x") {
            Some(hex_str) => {
                let bytes =
                    hex::decode(hex_str).map_err(|e| ClarityError::InvalidEncoding(e.to_string()))?;
                Self::from_consensus_bytes(&bytes)
            }
            None => Self::parse_repr(s),
        }
    }

    /// Parse the textual representation, e.g. `(ok (some u7))`.
    pub fn parse_repr(s: &str) -> Result<Self, ClarityError> {
        let mut p = ReprParser { src: s, pos: 0 };
        let v = p.value()?;
        p.skip_ws();
        if p.pos != s.len() {
            return Err(p.error("trailing input"));
        }
        Ok(v)
    }

    /// Decode the binary consensus encoding.
    pub fn from_consensus_bytes(bytes: &[u8]) -> Result<Self, ClarityError> {
        let mut rest = bytes;
        let v = decode_consensus(&mut rest, 0)?;
        if !rest.is_empty() {
            return Err(ClarityError::InvalidEncoding(format!(
                "{} trailing bytes",
                rest.len()
            )));
        }
        Ok(v)
    }
}

impl fmt::Display for ClarityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClarityValue::UInt(n) => write!(f, "u{n}"),
            ClarityValue::Int(n) => write!(f, "{n}"),
            ClarityValue::Bool(b) => write!(f, "{b}"),
            ClarityValue::Principal(p) => write!(f, "'{p}"),
            ClarityValue::StringAscii(s) => write!(f, "{s:?}"),
            ClarityValue::OptionalNone => write!(f, "none"),
            ClarityValue::OptionalSome(v) => write!(f, "(some {v})"),
            ClarityValue::ResponseOk(v) => write!(f, "(ok {v})"),
            ClarityValue::ResponseErr(v) => write!(f, "(err {v})"),
            ClarityValue::Tuple(fields) => {
                f.write_str("(tuple")?;
                for (name, v) in fields {
                    write!(f, " ({name} {v})")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Extract the on-chain assigned identifier from a confirmed call's result.
///
/// Only `(ok u<digits>)` that fits in a `u64` yields a value; anything else
/// (including undecodable input) is "not available".
pub fn secondary_id_from_result(function_result: &str) -> Option<u64> {
    ClarityValue::decode_result(function_result)
        .ok()?
        .ok_uint()
        .and_then(|n| u64::try_from(n).ok())
}

const MAX_NESTING: usize = 32;

struct ReprParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> ReprParser<'a> {
    fn error(&self, reason: &'static str) -> ClarityError {
        ClarityError::InvalidRepr {
            offset: self.pos,
            reason,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn token(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '(' || c == ')')
            .unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn value(&mut self) -> Result<ClarityValue, ClarityError> {
        self.value_at_depth(0)
    }

    fn value_at_depth(&mut self, depth: usize) -> Result<ClarityValue, ClarityError> {
        if depth > MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        self.skip_ws();
        let rest = self.rest();
        if rest.starts_with('(') {
            self.pos += 1;
            self.skip_ws();
            let keyword = self.token();
            if keyword == "tuple" {
                return self.tuple_body(depth);
            }
            let inner = Box::new(self.value_at_depth(depth + 1)?);
            self.skip_ws();
            if !self.rest().starts_with(')') {
                return Err(self.error("expected ')'"));
            }
            self.pos += 1;
            return match keyword {
                "ok" => Ok(ClarityValue::ResponseOk(inner)),
                "err" => Ok(ClarityValue::ResponseErr(inner)),
                "some" => Ok(ClarityValue::OptionalSome(inner)),
                _ => Err(self.error("unknown wrapper")),
            };
        }
        if rest.starts_with('"') {
            let body = &rest[1..];
            let end = body.find('"').ok_or_else(|| self.error("unterminated string"))?;
            self.pos += end + 2;
            return Ok(ClarityValue::StringAscii(body[..end].to_string()));
        }
        let start = self.pos;
        let tok = self.token();
        if tok.is_empty() {
            self.pos = start;
            return Err(self.error("expected a value"));
        }
        let parsed = match tok {
            "true" => Some(ClarityValue::Bool(true)),
            "false" => Some(ClarityValue::Bool(false)),
            "none" => Some(ClarityValue::OptionalNone),
            _ => {
                if let Some(p) = tok.strip_prefix('\'') {
                    p.parse().ok().map(ClarityValue::Principal)
                } else if let Some(digits) = tok.strip_prefix('u') {
                    digits
                        .bytes()
                        .all(|b| b.is_ascii_digit())
                        .then(|| digits.parse().ok())
                        .flatten()
                        .map(ClarityValue::UInt)
                } else {
                    tok.parse().ok().map(ClarityValue::Int)
                }
            }
        };
        parsed.ok_or_else(|| {
            self.pos = start;
            self.error("unrecognized literal")
        })
    }
}

impl ReprParser<'_> {
    /// Fields of `(tuple (name value) ...)` after the keyword.
    fn tuple_body(&mut self, depth: usize) -> Result<ClarityValue, ClarityError> {
        let mut fields = BTreeMap::new();
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.starts_with(')') {
                self.pos += 1;
                return Ok(ClarityValue::Tuple(fields));
            }
            if !rest.starts_with('(') {
                return Err(self.error("expected tuple field"));
            }
            self.pos += 1;
            self.skip_ws();
            let name = self.token();
            if name.is_empty() {
                return Err(self.error("expected field name"));
            }
            let v = self.value_at_depth(depth + 1)?;
            self.skip_ws();
            if !self.rest().starts_with(')') {
                return Err(self.error("expected ')'"));
            }
            self.pos += 1;
            fields.insert(name.to_string(), v);
        }
    }
}

fn take<'a>(rest: &mut &'a [u8], n: usize) -> Result<&'a [u8], ClarityError> {
    if rest.len() < n {
        return Err(ClarityError::InvalidEncoding("truncated input".to_string()));
    }
    let (head, tail) = rest.split_at(n);
    *rest = tail;
    Ok(head)
}

fn decode_consensus(rest: &mut &[u8], depth: usize) -> Result<ClarityValue, ClarityError> {
    if depth > MAX_NESTING {
        return Err(ClarityError::InvalidEncoding("nesting too deep".to_string()));
    }
    let prefix = take(rest, 1)?[0];
    let v = match prefix {
        TAG_INT => {
            let mut buf = [0u8; 16];
            buf.copy_from_slice(take(rest, 16)?);
            ClarityValue::Int(i128::from_be_bytes(buf))
        }
        TAG_UINT => {
            let mut buf = [0u8; 16];
            buf.copy_from_slice(take(rest, 16)?);
            ClarityValue::UInt(u128::from_be_bytes(buf))
        }
        TAG_TRUE => ClarityValue::Bool(true),
        TAG_FALSE => ClarityValue::Bool(false),
        TAG_STANDARD_PRINCIPAL => {
            ClarityValue::Principal(Principal::Standard(decode_address(rest)?))
        }
        TAG_CONTRACT_PRINCIPAL => {
            let address = decode_address(rest)?;
            let name = decode_name(rest)?;
            validate_contract_name(&name)
                .map_err(|r| ClarityError::InvalidPrincipal(format!("{address}.{name}"), r))?;
            ClarityValue::Principal(Principal::Contract { address, name })
        }
        TAG_OK => ClarityValue::ResponseOk(Box::new(decode_consensus(rest, depth + 1)?)),
        TAG_ERR => ClarityValue::ResponseErr(Box::new(decode_consensus(rest, depth + 1)?)),
        TAG_NONE => ClarityValue::OptionalNone,
        TAG_SOME => ClarityValue::OptionalSome(Box::new(decode_consensus(rest, depth + 1)?)),
        TAG_TUPLE => {
            let count = decode_len(rest)?;
            let mut fields = BTreeMap::new();
            for _ in 0..count {
                let name = decode_name(rest)?;
                let v = decode_consensus(rest, depth + 1)?;
                fields.insert(name, v);
            }
            ClarityValue::Tuple(fields)
        }
        TAG_STRING_ASCII => {
            let len = decode_len(rest)?;
            let raw = take(rest, len)?;
            let s = std::str::from_utf8(raw)
                .map_err(|e| ClarityError::InvalidEncoding(e.to_string()))?;
            ClarityValue::StringAscii(s.to_string())
        }
        other => return Err(ClarityError::UnsupportedType(other)),
    };
    Ok(v)
}

fn decode_len(rest: &mut &[u8]) -> Result<usize, ClarityError> {
    let mut len = [0u8; 4];
    len.copy_from_slice(take(rest, 4)?);
    usize::try_from(u32::from_be_bytes(len)).map_err(|e| ClarityError::InvalidEncoding(e.to_string()))
}

fn decode_address(rest: &mut &[u8]) -> Result<String, ClarityError> {
    let version = take(rest, 1)?[0];
    let mut hash = [0u8; 20];
    hash.copy_from_slice(take(rest, 20)?);
    StacksAddress::new(version, hash)
        .map(|a| a.to_string())
        .map_err(|e| ClarityError::InvalidEncoding(e.to_string()))
}

fn decode_name(rest: &mut &[u8]) -> Result<String, ClarityError> {
    let len = usize::from(take(rest, 1)?[0]);
    let raw = take(rest, len)?;
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| ClarityError::InvalidEncoding(e.to_string()))
}

mod u128_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(v: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(v)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

mod i128_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(v: &i128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(v)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i128, D::Error>
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

    #[test]
    fn principal_parsing() {
        let p: Principal = DEPLOYER.parse().unwrap();
        assert_eq!(p, Principal::Standard(DEPLOYER.to_string()));

        let c: Principal = format!("{DEPLOYER}.mock-sbtc").parse().unwrap();
        assert_eq!(c.address(), DEPLOYER);
        assert_eq!(c.to_string(), format!("{DEPLOYER}.mock-sbtc"));

        assert!("not-an-address".parse::<Principal>().is_err());
        assert!("SX1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM".parse::<Principal>().is_err());
        assert!(format!("{DEPLOYER}.9bad").parse::<Principal>().is_err());
        assert!(format!("{DEPLOYER}.").parse::<Principal>().is_err());
        // Valid alphabet, wrong checksum.
        assert!(matches!(
            "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGN".parse::<Principal>(),
            Err(ClarityError::InvalidAddress(_, AddressError::BadChecksum))
        ));
    }

    #[test]
    fn textual_repr_roundtrips_through_display() {
        let v = ClarityValue::ResponseOk(Box::new(ClarityValue::OptionalSome(Box::new(
            ClarityValue::UInt(7),
        ))));
        assert_eq!(v.to_string(), "(ok (some u7))");
        assert_eq!(ClarityValue::parse_repr("(ok (some u7))").unwrap(), v);
    }

    #[test]
    fn parses_node_results() {
        assert_eq!(
            ClarityValue::parse_repr("(ok u42)").unwrap().ok_uint(),
            Some(42)
        );
        assert_eq!(
            ClarityValue::parse_repr(" ( err  u100 ) ").unwrap(),
            ClarityValue::ResponseErr(Box::new(ClarityValue::UInt(100)))
        );
        assert_eq!(
            ClarityValue::parse_repr("(ok true)").unwrap(),
            ClarityValue::ResponseOk(Box::new(ClarityValue::Bool(true)))
        );
        assert_eq!(
            ClarityValue::parse_repr("-5").unwrap(),
            ClarityValue::Int(-5)
        );
        let p = ClarityValue::parse_repr(&format!("'{DEPLOYER}")).unwrap();
        assert_eq!(p.type_name(), "principal");
    }

    #[test]
    fn rejects_malformed_repr() {
        assert!(ClarityValue::parse_repr("(ok u42").is_err());
        assert!(ClarityValue::parse_repr("(maybe u1)").is_err());
        assert!(ClarityValue::parse_repr("u4x2").is_err());
        assert!(ClarityValue::parse_repr("(ok u1) extra").is_err());
        assert!(ClarityValue::parse_repr("").is_err());
    }

    #[test]
    fn decodes_consensus_hex() {
        // (ok u42)
        let hex_repr = format!("0x0701{}", hex::encode(42u128.to_be_bytes()));
        let v = ClarityValue::decode_result(&hex_repr).unwrap();
        assert_eq!(v.ok_uint(), Some(42));

        assert!(matches!(
            ClarityValue::decode_result("0x0701ff"),
            Err(ClarityError::InvalidEncoding(_))
        ));
        assert_eq!(
            ClarityValue::decode_result("0x0b"),
            Err(ClarityError::UnsupportedType(0x0b))
        );
    }

    #[test]
    fn consensus_encoding_of_call_args() {
        assert_eq!(
            ClarityValue::UInt(4).to_hex().unwrap(),
            "0x0100000000000000000000000000000004"
        );
        let sender = ClarityValue::principal(DEPLOYER.parse().unwrap());
        assert_eq!(
            sender.to_hex().unwrap(),
            "0x051a6d78de7b0625dfbfc16c3a8a5735f6dc3dc3f2ce"
        );
        let asset = ClarityValue::principal(format!("{DEPLOYER}.mock-sbtc").parse().unwrap());
        assert_eq!(
            asset.to_hex().unwrap(),
            "0x061a6d78de7b0625dfbfc16c3a8a5735f6dc3dc3f2ce096d6f636b2d73627463"
        );
        for v in [sender, asset] {
            let bytes = v.to_consensus_bytes().unwrap();
            assert_eq!(ClarityValue::from_consensus_bytes(&bytes).unwrap(), v);
        }
        assert!(ClarityValue::StringAscii("caf\u{e9}".to_string())
            .to_consensus_bytes()
            .is_err());
    }

    #[test]
    fn decodes_tuple_results() {
        // (some (tuple (amount u500)))
        let hex_repr = "0x0a0c0000000106616d6f756e7401000000000000000000000000000001f4";
        let v = ClarityValue::decode_result(hex_repr).unwrap();
        let ClarityValue::OptionalSome(inner) = &v else {
            panic!("expected some, got {v}");
        };
        assert_eq!(inner.tuple_field("amount"), Some(&ClarityValue::UInt(500)));
        assert_eq!(v.to_string(), "(some (tuple (amount u500)))");
        assert_eq!(ClarityValue::parse_repr(&v.to_string()).unwrap(), v);
        assert_eq!(v.to_hex().unwrap(), hex_repr);
        assert!(ClarityValue::parse_repr("(tuple (amount u1)").is_err());
        assert!(ClarityValue::parse_repr("(tuple amount)").is_err());
    }

    #[test]
    fn secondary_id_extraction() {
        assert_eq!(secondary_id_from_result("(ok u42)"), Some(42));
        assert_eq!(secondary_id_from_result("(ok u0)"), Some(0));
        assert_eq!(secondary_id_from_result("(err u1)"), None);
        assert_eq!(secondary_id_from_result("(ok true)"), None);
        assert_eq!(secondary_id_from_result("garbage"), None);
        assert_eq!(
            secondary_id_from_result("(ok u340282366920938463463374607431768211455)"),
            None
        );
    }

    #[test]
    fn json_shape_for_wallets() {
        let v = ClarityValue::uint(150_000_000u64);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json, serde_json::json!({"type": "uint", "value": "150000000"}));
        let back: ClarityValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);

        let p = ClarityValue::principal(format!("{DEPLOYER}.mock-sbtc").parse().unwrap());
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "principal");
        assert_eq!(json["value"], format!("{DEPLOYER}.mock-sbtc"));
    }
}
