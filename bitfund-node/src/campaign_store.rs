#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]

use bitfund_core::BaseUnits;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use std::path::Path;

const TREE: &str = "bitfund-campaigns";
const KEY_SEQ: &[u8] = b"campaign:seq";
const PREFIX_REC: &str = "campaign:rec:";
const PREFIX_TX: &str = "campaign:tx:";

#[derive(Debug, thiserror::Error)]
pub enum CampaignStoreError {
    #[error("db error: {0}")]
    Db(#[from] sled::Error),
    #[error("serde error: {0}")]
    Serde(String),
    #[error("campaign already recorded for tx {0}")]
    DuplicateTxId(String),
    #[error("invalid campaign: {0}")]
    Invalid(String),
}

/// Locally recorded campaign. `campaign_id` is the on-chain id, known only
/// after the creating transaction is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: u64,
    pub tx_id: String,
    pub project_name: String,
    #[serde(default)]
    pub project_description: String,
    pub funding_goal: BaseUnits,
    pub deadline_secs: u64,
    pub created_at_secs: u64,
    #[serde(default)]
    pub campaign_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCampaign {
    pub tx_id: String,
    pub project_name: String,
    pub project_description: String,
    pub funding_goal: BaseUnits,
    pub deadline_secs: u64,
    pub created_at_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CampaignStore {
    tree: sled::Tree,
}

impl CampaignStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CampaignStoreError> {
        let db = sled::open(path)?;
        let tree = db.open_tree(TREE)?;
        Ok(Self { tree })
    }

    pub fn open_temporary() -> Result<Self, CampaignStoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree(TREE)?;
        Ok(Self { tree })
    }

    /// Record a submitted campaign. Each transaction id maps to one campaign.
    pub fn create(&self, new: NewCampaign) -> Result<CampaignRecord, CampaignStoreError> {
        if new.tx_id.trim().is_empty() {
            return Err(CampaignStoreError::Invalid("tx_id is empty".to_string()));
        }
        if new.project_name.trim().is_empty() {
            return Err(CampaignStoreError::Invalid(
                "project_name is empty".to_string(),
            ));
        }

        let tx_key = key_tx(&new.tx_id);
        // Index entry, sequence bump and record commit together. An index entry
        // whose record is missing is overwritten.
        let r: Result<CampaignRecord, TransactionError<CampaignStoreError>> =
            self.tree.transaction(|t: &TransactionalTree| {
                if let Some(existing) = t.get(&tx_key)? {
                    let recorded = match decode_id(&existing) {
                        Ok(id) => t.get(key_rec(id))?.is_some(),
                        Err(_) => false,
                    };
                    if recorded {
                        return Err(ConflictableTransactionError::Abort(
                            CampaignStoreError::DuplicateTxId(new.tx_id.clone()),
                        ));
                    }
                }

                let last = match t.get(KEY_SEQ)? {
                    Some(v) => decode_id(&v).map_err(ConflictableTransactionError::Abort)?,
                    None => 0,
                };
                let id = last.saturating_add(1);
                let rec = CampaignRecord {
                    id,
                    tx_id: new.tx_id.clone(),
                    project_name: new.project_name.clone(),
                    project_description: new.project_description.clone(),
                    funding_goal: new.funding_goal,
                    deadline_secs: new.deadline_secs,
                    created_at_secs: new.created_at_secs,
                    campaign_id: None,
                };
                let bytes = encode(&rec).map_err(ConflictableTransactionError::Abort)?;

                t.insert(KEY_SEQ, &id.to_be_bytes()[..])?;
                t.insert(tx_key.as_slice(), &id.to_be_bytes()[..])?;
                t.insert(key_rec(id), bytes)?;
                Ok(rec)
            });

        match r {
            Ok(rec) => Ok(rec),
            Err(TransactionError::Storage(e)) => Err(CampaignStoreError::Db(e)),
            Err(TransactionError::Abort(e)) => Err(e),
        }
    }

    pub fn get(&self, id: u64) -> Result<Option<CampaignRecord>, CampaignStoreError> {
        let Some(v) = self.tree.get(key_rec(id))? else {
            return Ok(None);
        };
        Ok(Some(decode(&v)?))
    }

    pub fn get_by_tx_id(&self, tx_id: &str) -> Result<Option<CampaignRecord>, CampaignStoreError> {
        let Some(v) = self.tree.get(key_tx(tx_id))? else {
            return Ok(None);
        };
        let id = decode_id(&v)?;
        self.get(id)
    }

    /// All campaigns, newest first.
    pub fn list_all(&self) -> Result<Vec<CampaignRecord>, CampaignStoreError> {
        let mut out = self.scan()?;
        out.sort_by(|a, b| (b.created_at_secs, b.id).cmp(&(a.created_at_secs, a.id)));
        Ok(out)
    }

    /// Campaigns whose deadline is after `now_secs`, soonest deadline first.
    pub fn list_active(&self, now_secs: u64) -> Result<Vec<CampaignRecord>, CampaignStoreError> {
        let mut out: Vec<CampaignRecord> = self
            .scan()?
            .into_iter()
            .filter(|c| c.deadline_secs > now_secs)
            .collect();
        out.sort_by(|a, b| (a.deadline_secs, a.id).cmp(&(b.deadline_secs, b.id)));
        Ok(out)
    }

    /// Attach the on-chain id to the campaign created by `tx_id`.
    ///
    /// Returns `None` when no campaign was recorded for that transaction.
    pub fn set_campaign_id(
        &self,
        tx_id: &str,
        campaign_id: u64,
    ) -> Result<Option<CampaignRecord>, CampaignStoreError> {
        let Some(mut rec) = self.get_by_tx_id(tx_id)? else {
            return Ok(None);
        };
        rec.campaign_id = Some(campaign_id);
        self.put(&rec)?;
        Ok(Some(rec))
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), CampaignStoreError> {
        self.tree.flush()?;
        Ok(())
    }

    fn put(&self, rec: &CampaignRecord) -> Result<(), CampaignStoreError> {
        self.tree.insert(key_rec(rec.id), encode(rec)?)?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<CampaignRecord>, CampaignStoreError> {
        let mut out = Vec::new();
        for r in self.tree.scan_prefix(PREFIX_REC.as_bytes()) {
            let (_, v) = r?;
            out.push(decode(&v)?);
        }
        Ok(out)
    }
}

fn key_rec(id: u64) -> Vec<u8> {
    // Zero-padded so key order matches id order.
    format!("{PREFIX_REC}{id:020}").into_bytes()
}

fn key_tx(tx_id: &str) -> Vec<u8> {
    format!("{PREFIX_TX}{tx_id}").into_bytes()
}

fn encode(rec: &CampaignRecord) -> Result<Vec<u8>, CampaignStoreError> {
    serde_json::to_vec(rec).map_err(|e| CampaignStoreError::Serde(e.to_string()))
}

fn decode(v: &[u8]) -> Result<CampaignRecord, CampaignStoreError> {
    serde_json::from_slice(v).map_err(|e| CampaignStoreError::Serde(e.to_string()))
}

fn decode_id(v: &[u8]) -> Result<u64, CampaignStoreError> {
    <[u8; 8]>::try_from(v)
        .map(u64::from_be_bytes)
        .map_err(|_| CampaignStoreError::Serde(format!("bad id length {}", v.len())))
}
