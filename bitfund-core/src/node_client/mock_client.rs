//! Scripted in-memory node client for tests and offline runs.
#![forbid(unsafe_code)]

use super::{
    AccountBalances, AccountInfo, NodeClient, NodeClientError, TxId, TxStatusResponse,
};
use crate::builder::{ContractId, ReadOnlyCall};
use crate::clarity::{ClarityValue, Principal};
use crate::signing::SignedTransaction;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One scripted answer to `transaction_status`.
#[derive(Debug)]
pub enum MockStatus {
    NotFound,
    Status(TxStatusResponse),
    Error(NodeClientError),
}

impl MockStatus {
    pub fn pending() -> Self {
        Self::with_status("pending", None)
    }

    pub fn success(function_result: &str) -> Self {
        Self::with_status("success", Some(function_result))
    }

    pub fn with_status(tx_status: &str, function_result: Option<&str>) -> Self {
        MockStatus::Status(TxStatusResponse {
            tx_status: tx_status.to_string(),
            contract_call: function_result.map(|r| super::ContractCallInfo {
                function_result: Some(r.to_string()),
            }),
            tx_result: None,
        })
    }
}

/// Answers are consumed in order. An empty broadcast script accepts with the
/// transaction's own id; an empty status script answers "not found"; an empty
/// read-only script answers `none`.
///
/// Account nonces start at zero and advance past every accepted broadcast.
#[derive(Debug, Default)]
pub struct MockNodeClient {
    broadcasts: Mutex<VecDeque<Result<TxId, NodeClientError>>>,
    statuses: Mutex<VecDeque<MockStatus>>,
    read_only: Mutex<VecDeque<Result<ClarityValue, NodeClientError>>>,
    balances: Mutex<BTreeMap<String, AccountBalances>>,
    nonces: Mutex<BTreeMap<String, u64>>,
    broadcasted: Mutex<Vec<SignedTransaction>>,
    read_only_calls: Mutex<Vec<ReadOnlyCall>>,
    broadcast_calls: AtomicU32,
    status_calls: AtomicU32,
    balance_calls: AtomicU32,
    account_calls: AtomicU32,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_broadcast(&self, result: Result<TxId, NodeClientError>) -> &Self {
        lock(&self.broadcasts).push_back(result);
        self
    }

    pub fn push_status(&self, status: MockStatus) -> &Self {
        lock(&self.statuses).push_back(status);
        self
    }

    pub fn push_read_only(&self, result: Result<ClarityValue, NodeClientError>) -> &Self {
        lock(&self.read_only).push_back(result);
        self
    }

    pub fn set_balances(&self, address: &str, balances: AccountBalances) -> &Self {
        lock(&self.balances).insert(address.to_string(), balances);
        self
    }

    pub fn set_nonce(&self, address: &str, nonce: u64) -> &Self {
        lock(&self.nonces).insert(address.to_string(), nonce);
        self
    }

    pub fn broadcast_calls(&self) -> u32 {
        self.broadcast_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn account_calls(&self) -> u32 {
        self.account_calls.load(Ordering::SeqCst)
    }

    /// Every request the client has served, of any kind.
    pub fn total_calls(&self) -> u32 {
        let read_only = u32::try_from(lock(&self.read_only_calls).len()).unwrap_or(u32::MAX);
        self.broadcast_calls()
            + self.status_calls()
            + self.balance_calls.load(Ordering::SeqCst)
            + self.account_calls()
            + read_only
    }

    pub fn broadcasted(&self) -> Vec<SignedTransaction> {
        lock(&self.broadcasted).clone()
    }

    pub fn read_only_calls(&self) -> Vec<ReadOnlyCall> {
        lock(&self.read_only_calls).clone()
    }
}

#[async_trait]
impl NodeClient for MockNodeClient {
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TxId, NodeClientError> {
        self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.broadcasted).push(tx.clone());
        let result = lock(&self.broadcasts)
            .pop_front()
            .unwrap_or_else(|| Ok(tx.tx_id()));
        if result.is_ok() {
            let sender = tx.unsigned.sender().to_string();
            let mut nonces = lock(&self.nonces);
            let next = nonces.entry(sender).or_insert(0);
            *next = (*next).max(tx.unsigned.nonce.saturating_add(1));
        }
        result
    }

    async fn transaction_status(
        &self,
        _tx_id: &TxId,
    ) -> Result<Option<TxStatusResponse>, NodeClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.statuses).pop_front() {
            None | Some(MockStatus::NotFound) => Ok(None),
            Some(MockStatus::Status(s)) => Ok(Some(s)),
            Some(MockStatus::Error(e)) => Err(e),
        }
    }

    async fn balances(&self, address: &str) -> Result<AccountBalances, NodeClientError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.balances)
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn account(&self, address: &str) -> Result<AccountInfo, NodeClientError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AccountInfo {
            nonce: lock(&self.nonces).get(address).copied().unwrap_or(0),
            balance: "0x0".to_string(),
        })
    }

    async fn call_read_only(
        &self,
        contract: &ContractId,
        function_name: &str,
        sender: &str,
        args: &[ClarityValue],
    ) -> Result<ClarityValue, NodeClientError> {
        let sender = sender
            .parse::<Principal>()
            .map_err(|e| NodeClientError::InvalidRequest(e.to_string()))?;
        lock(&self.read_only_calls).push(ReadOnlyCall {
            contract: contract.clone(),
            function_name: function_name.to_string(),
            function_args: args.to_vec(),
            sender,
        });
        lock(&self.read_only)
            .pop_front()
            .unwrap_or(Ok(ClarityValue::OptionalNone))
    }
}
