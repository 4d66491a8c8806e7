#![forbid(unsafe_code)]

//! Local transaction signing for direct-signed submission.
//!
//! - Curve: secp256k1, recoverable ECDSA (RFC 6979, low-s) behind the
//!   [`TransactionSigner`] seam
//! - Sighash: `sha512/256(sha512/256(cleared tx) || auth || fee || nonce)`
//! - Wire bytes: consensus serialization from [`wire`]
//! - Sender: single-signature address of the signer's public key
//!
//! Key material only enters through [`Secp256k1Signer::from_secret_hex`] and is
//! never rendered by `Debug`.

pub mod wire;

use crate::address::{hash160, Network, StacksAddress};
use crate::builder::TransactionPayload;
use crate::clarity::ClarityError;
use crate::node_client::TxId;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha512_256};
use std::fmt;

const EMPTY_SIGNATURE: [u8; 65] = [0u8; 65];

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("transaction encoding failed: {0}")]
    Encode(#[from] ClarityError),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("signature verification failed")]
    BadSignature,
}

pub fn sha512_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha512_256::digest(data));
    out
}

/// Public key serialization the sender's address is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyEncoding {
    #[default]
    Compressed,
    Uncompressed,
}

impl KeyEncoding {
    pub fn wire_byte(self) -> u8 {
        match self {
            KeyEncoding::Compressed => 0x00,
            KeyEncoding::Uncompressed => 0x01,
        }
    }
}

/// Recovery id followed by `r` and `s`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature(pub [u8; 65]);

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({})", hex::encode(self.0))
    }
}

impl RecoverableSignature {
    /// Public key that produced this signature over `digest`.
    pub fn recover(&self, digest: &[u8; 32]) -> Result<VerifyingKey, SignerError> {
        let recovery_id = RecoveryId::from_byte(self.0[0]).ok_or(SignerError::BadSignature)?;
        let signature =
            Signature::from_slice(&self.0[1..]).map_err(|_| SignerError::BadSignature)?;
        VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
            .map_err(|_| SignerError::BadSignature)
    }
}

/// Transaction before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub network: Network,
    /// hash160 of the signer's public key.
    pub signer: [u8; 20],
    pub key_encoding: KeyEncoding,
    pub nonce: u64,
    /// Fee in micro-STX.
    pub fee: u64,
    pub payload: TransactionPayload,
}

impl UnsignedTransaction {
    /// Digest of the transaction with its spending condition cleared.
    pub fn initial_sighash(&self) -> Result<[u8; 32], SignerError> {
        Ok(sha512_256(&wire::encode(self, 0, 0, &EMPTY_SIGNATURE)?))
    }

    /// Digest the origin signs.
    pub fn presign_sighash(&self) -> Result<[u8; 32], SignerError> {
        let mut buf = Vec::with_capacity(32 + 1 + 8 + 8);
        buf.extend_from_slice(&self.initial_sighash()?);
        buf.push(wire::AUTH_STANDARD);
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        Ok(sha512_256(&buf))
    }

    pub fn sender(&self) -> StacksAddress {
        StacksAddress::singlesig(self.network, self.signer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub unsigned: UnsignedTransaction,
    pub signature: RecoverableSignature,
    bytes: Vec<u8>,
}

impl SignedTransaction {
    /// Serialized body for `POST /v2/transactions`.
    pub fn to_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Id the chain assigns: `sha512/256` of the wire bytes.
    pub fn tx_id(&self) -> TxId {
        TxId(format!("0x{}", hex::encode(sha512_256(&self.bytes))))
    }

    /// Recover the signing key and check it owns the sender address and that
    /// the wire bytes match the transaction fields.
    pub fn verify(&self) -> Result<(), SignerError> {
        let digest = self.unsigned.presign_sighash()?;
        let key = self.signature.recover(&digest)?;
        let compressed = matches!(self.unsigned.key_encoding, KeyEncoding::Compressed);
        let public_key = key.to_encoded_point(compressed);
        if hash160(public_key.as_bytes()) != self.unsigned.signer {
            return Err(SignerError::BadSignature);
        }
        let expected = wire::encode(
            &self.unsigned,
            self.unsigned.nonce,
            self.unsigned.fee,
            &self.signature.0,
        )?;
        if expected != self.bytes {
            return Err(SignerError::BadSignature);
        }
        Ok(())
    }
}

/// Anything able to produce signatures for a fixed sender.
pub trait TransactionSigner: Send + Sync {
    fn network(&self) -> Network;
    fn key_encoding(&self) -> KeyEncoding;
    /// SEC1 public key in [`Self::key_encoding`] form.
    fn public_key(&self) -> Vec<u8>;
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignerError>;

    fn address(&self) -> StacksAddress {
        StacksAddress::p2pkh(self.network(), &self.public_key())
    }

    fn prepare(&self, payload: TransactionPayload, nonce: u64, fee: u64) -> UnsignedTransaction {
        UnsignedTransaction {
            network: self.network(),
            signer: *self.address().hash160(),
            key_encoding: self.key_encoding(),
            nonce,
            fee,
            payload,
        }
    }

    fn sign(&self, unsigned: UnsignedTransaction) -> Result<SignedTransaction, SignerError> {
        if unsigned.signer != *self.address().hash160() {
            return Err(SignerError::InvalidKey(
                "transaction signer does not match this key".to_string(),
            ));
        }
        let signature = self.sign_digest(&unsigned.presign_sighash()?)?;
        let bytes = wire::encode(&unsigned, unsigned.nonce, unsigned.fee, &signature.0)?;
        Ok(SignedTransaction {
            unsigned,
            signature,
            bytes,
        })
    }
}

pub struct Secp256k1Signer {
    key: SigningKey,
    key_encoding: KeyEncoding,
    network: Network,
}

impl Secp256k1Signer {
    pub fn from_signing_key(key: SigningKey, network: Network) -> Self {
        Self {
            key,
            key_encoding: KeyEncoding::Compressed,
            network,
        }
    }

    /// Decode a hex secret. 33 bytes ending in `01` select the compressed
    /// public key; a bare 32-byte scalar selects the uncompressed one.
    pub fn from_secret_hex(secret: &str, network: Network) -> Result<Self, SignerError> {
        let raw = hex::decode(secret.trim())
            .map_err(|_| SignerError::InvalidKey("secret is not valid hex".to_string()))?;
        let (scalar, key_encoding) = match raw.as_slice() {
            [scalar @ .., 0x01] if scalar.len() == 32 => (scalar, KeyEncoding::Compressed),
            scalar if scalar.len() == 32 => (scalar, KeyEncoding::Uncompressed),
            other => {
                return Err(SignerError::InvalidKey(format!(
                    "expected 32 or 33 bytes, got {}",
                    other.len()
                )))
            }
        };
        let key = SigningKey::from_slice(scalar).map_err(|_| {
            SignerError::InvalidKey("secret is not a valid secp256k1 scalar".to_string())
        })?;
        Ok(Self {
            key,
            key_encoding,
            network,
        })
    }
}

impl fmt::Debug for Secp256k1Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secp256k1Signer")
            .field("address", &self.address().to_string())
            .field("network", &self.network)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl TransactionSigner for Secp256k1Signer {
    fn network(&self) -> Network {
        self.network
    }

    fn key_encoding(&self) -> KeyEncoding {
        self.key_encoding
    }

    fn public_key(&self) -> Vec<u8> {
        let compressed = matches!(self.key_encoding, KeyEncoding::Compressed);
        self.key
            .verifying_key()
            .to_encoded_point(compressed)
            .as_bytes()
            .to_vec()
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let mut out = [0u8; 65];
        out[0] = recovery_id.to_byte();
        out[1..].copy_from_slice(&signature.to_bytes());
        Ok(RecoverableSignature(out))
    }
}
