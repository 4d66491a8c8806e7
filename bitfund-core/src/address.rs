//! Chain addresses: network parameters, hash160 and c32check encoding.
//!
//! An address is `S` + version character + c32(hash160 || checksum), where the
//! checksum is the first four bytes of `sha256(sha256(version || hash160))`.
#![forbid(unsafe_code)]

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub(crate) const C32_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address must start with 'S'")]
    MissingPrefix,
    #[error("invalid c32 character {0:?}")]
    InvalidCharacter(char),
    #[error("address version {0} out of range")]
    InvalidVersion(u8),
    #[error("decoded address has {0} bytes, expected 24")]
    BadLength(usize),
    #[error("address checksum mismatch")]
    BadChecksum,
}

/// Target chain. Selects the transaction version byte, chain id and address
/// versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    #[serde(alias = "devnet")]
    Testnet,
}

impl Network {
    pub fn transaction_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x80,
        }
    }

    pub fn chain_id(self) -> u32 {
        match self {
            Network::Mainnet => 0x0000_0001,
            Network::Testnet => 0x8000_0000,
        }
    }

    /// Version byte of single-signature (P2PKH) addresses.
    pub fn singlesig_version(self) -> u8 {
        match self {
            Network::Mainnet => 22,
            Network::Testnet => 26,
        }
    }

    pub fn multisig_version(self) -> u8 {
        match self {
            Network::Mainnet => 20,
            Network::Testnet => 21,
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" | "devnet" => Ok(Network::Testnet),
            other => Err(format!("unknown network {other:?}")),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        })
    }
}

/// `ripemd160(sha256(data))`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(sha));
    out
}

/// A decoded account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StacksAddress {
    version: u8,
    hash160: [u8; 20],
}

impl StacksAddress {
    pub fn new(version: u8, hash160: [u8; 20]) -> Result<Self, AddressError> {
        if usize::from(version) >= C32_ALPHABET.len() {
            return Err(AddressError::InvalidVersion(version));
        }
        Ok(Self { version, hash160 })
    }

    /// Single-signature address for a public key hash.
    pub fn singlesig(network: Network, hash160: [u8; 20]) -> Self {
        Self {
            version: network.singlesig_version(),
            hash160,
        }
    }

    /// Single-signature address owning `public_key` (SEC1, either form).
    pub fn p2pkh(network: Network, public_key: &[u8]) -> Self {
        Self::singlesig(network, hash160(public_key))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn hash160(&self) -> &[u8; 20] {
        &self.hash160
    }

    /// Network implied by the version byte, if it is a known one.
    pub fn network(&self) -> Option<Network> {
        [Network::Mainnet, Network::Testnet]
            .into_iter()
            .find(|n| n.singlesig_version() == self.version || n.multisig_version() == self.version)
    }

    fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let mut data = Vec::with_capacity(21);
        data.push(self.version);
        data.extend_from_slice(&self.hash160);
        let digest = Sha256::digest(Sha256::digest(&data));
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&digest[..CHECKSUM_LEN]);
        out
    }
}

impl fmt::Display for StacksAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(20 + CHECKSUM_LEN);
        payload.extend_from_slice(&self.hash160);
        payload.extend_from_slice(&self.checksum());
        let version = char::from(C32_ALPHABET[usize::from(self.version)]);
        write!(f, "S{version}{}", c32_encode(&payload))
    }
}

impl FromStr for StacksAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix('S').ok_or(AddressError::MissingPrefix)?;
        let mut chars = body.chars();
        let version_char = chars.next().ok_or(AddressError::BadLength(0))?;
        let version = c32_value(version_char)?;
        let payload = c32_decode(chars.as_str())?;
        if payload.len() != 20 + CHECKSUM_LEN {
            return Err(AddressError::BadLength(payload.len()));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[..20]);
        let addr = Self::new(version, hash)?;
        if payload[20..] != addr.checksum() {
            return Err(AddressError::BadChecksum);
        }
        Ok(addr)
    }
}

impl Serialize for StacksAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StacksAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn c32_value(c: char) -> Result<u8, AddressError> {
    C32_ALPHABET
        .iter()
        .position(|b| char::from(*b) == c)
        .and_then(|i| u8::try_from(i).ok())
        .ok_or(AddressError::InvalidCharacter(c))
}

/// Base-32 encode, most significant digit first. Leading zero bytes are kept
/// as leading `0` characters.
pub fn c32_encode(input: &[u8]) -> String {
    let mut out: Vec<u8> = Vec::with_capacity(input.len() * 8 / 5 + 1);
    let mut carry: u16 = 0;
    let mut carry_bits: u16 = 0;
    for byte in input.iter().rev() {
        let byte = u16::from(*byte);
        let take = 5 - carry_bits;
        let low = byte & ((1 << take) - 1);
        out.push(C32_ALPHABET[usize::from((low << carry_bits) + carry)]);
        carry_bits = 8 + carry_bits - 5;
        carry = byte >> (8 - carry_bits);
        if carry_bits >= 5 {
            out.push(C32_ALPHABET[usize::from(carry & 0x1f)]);
            carry_bits -= 5;
            carry >>= 5;
        }
    }
    if carry_bits > 0 {
        out.push(C32_ALPHABET[usize::from(carry)]);
    }
    while out.last() == Some(&C32_ALPHABET[0]) {
        out.pop();
    }
    out.extend(input.iter().take_while(|b| **b == 0).map(|_| C32_ALPHABET[0]));
    out.reverse();
    out.into_iter().map(char::from).collect()
}

/// Inverse of [`c32_encode`]. Only the canonical upper-case alphabet is
/// accepted.
pub fn c32_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8 + 1);
    let mut carry: u16 = 0;
    let mut carry_bits: u16 = 0;
    for c in input.chars().rev() {
        carry += u16::from(c32_value(c)?) << carry_bits;
        carry_bits += 5;
        if carry_bits >= 8 {
            out.push((carry & 0xff) as u8);
            carry_bits -= 8;
            carry >>= 8;
        }
    }
    if carry_bits > 0 {
        out.push((carry & 0xff) as u8);
    }
    while out.last() == Some(&0) {
        out.pop();
    }
    out.extend(input.chars().take_while(|c| *c == '0').map(|_| 0u8));
    out.reverse();
    Ok(out)
}
