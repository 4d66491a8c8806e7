//! Consensus serialization of single-signature transactions.
//!
//! Layout: version, chain id, standard authorization (P2PKH spending
//! condition), anchor mode, post-condition mode, post-conditions, payload.
#![forbid(unsafe_code)]

use super::UnsignedTransaction;
use crate::builder::TransactionPayload;
use crate::clarity::{write_address, write_len, write_name, ClarityError};
use crate::post_condition::PostConditionMode;

pub const AUTH_STANDARD: u8 = 0x04;
const HASH_MODE_P2PKH: u8 = 0x00;
/// On-chain or microblock, miner's choice.
const ANCHOR_MODE_ANY: u8 = 0x03;
const PAYLOAD_SMART_CONTRACT: u8 = 0x01;
const PAYLOAD_CONTRACT_CALL: u8 = 0x02;

/// Serialize `tx` with the given spending-condition fields. The sighash is
/// computed over the same layout with nonce, fee and signature cleared.
pub fn encode(
    tx: &UnsignedTransaction,
    nonce: u64,
    fee: u64,
    signature: &[u8; 65],
) -> Result<Vec<u8>, ClarityError> {
    let mut out = Vec::with_capacity(256);
    out.push(tx.network.transaction_version());
    out.extend_from_slice(&tx.network.chain_id().to_be_bytes());

    out.push(AUTH_STANDARD);
    out.push(HASH_MODE_P2PKH);
    out.extend_from_slice(&tx.signer);
    out.extend_from_slice(&nonce.to_be_bytes());
    out.extend_from_slice(&fee.to_be_bytes());
    out.push(tx.key_encoding.wire_byte());
    out.extend_from_slice(signature);

    out.push(ANCHOR_MODE_ANY);
    match &tx.payload {
        TransactionPayload::ContractCall(call) => {
            out.push(call.post_condition_mode.wire_byte());
            write_len(&mut out, call.post_conditions.len())?;
            for pc in &call.post_conditions {
                pc.write(&mut out)?;
            }
            out.push(PAYLOAD_CONTRACT_CALL);
            write_address(&mut out, &call.contract.address)?;
            write_name(&mut out, &call.contract.name)?;
            write_name(&mut out, &call.function_name)?;
            write_len(&mut out, call.function_args.len())?;
            for arg in &call.function_args {
                arg.write_consensus(&mut out)?;
            }
        }
        TransactionPayload::ContractDeploy(deploy) => {
            out.push(PostConditionMode::Allow.wire_byte());
            write_len(&mut out, 0)?;
            out.push(PAYLOAD_SMART_CONTRACT);
            write_name(&mut out, &deploy.contract_name)?;
            write_len(&mut out, deploy.code_body.len())?;
            out.extend_from_slice(deploy.code_body.as_bytes());
        }
    }
    Ok(out)
}
