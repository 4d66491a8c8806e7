//! Confirmation polling.
//!
//! After submission the node is polled until it reports a terminal status or
//! the attempt/time budget runs out. Running out of budget yields `Unknown`,
//! which is distinct from an observed failure.
#![forbid(unsafe_code)]

use crate::clarity::secondary_id_from_result;
use crate::node_client::{NodeClient, NodeClientError, NodeTxStatus, TxId};
use serde::{Deserialize, Serialize};
use std::cmp;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPolicy {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Overall budget measured from the start of polling, initial delay included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_initial_delay_ms() -> u64 {
    15_000
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    20
}

fn default_timeout_ms() -> u64 {
    600_000
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ConfirmationPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("confirmation.max_attempts must be > 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("confirmation.timeout_ms must be > 0".to_string());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err("confirmation.base_delay_ms must be <= max_delay_ms".to_string());
        }
        Ok(())
    }

    /// Delay after the given 1-based attempt: `base * 2^(attempt-1)`, capped.
    pub fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1);
        let mult = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        cmp::min(self.base_delay_ms.saturating_mul(mult), self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Confirmed {
        /// Identifier assigned on-chain, decoded from `(ok u<n>)`.
        secondary_id: Option<u64>,
        function_result: Option<String>,
    },
    Failed {
        tx_status: String,
        function_result: Option<String>,
    },
    Unknown {
        attempts: u32,
        reason: String,
    },
}

impl ConfirmationOutcome {
    fn unknown(attempts: u32, reason: impl Into<String>) -> Self {
        ConfirmationOutcome::Unknown {
            attempts,
            reason: reason.into(),
        }
    }
}

/// Poll `tx_id` under `policy` until a terminal outcome.
pub async fn await_confirmation<C>(
    client: &C,
    tx_id: &TxId,
    policy: &ConfirmationPolicy,
) -> ConfirmationOutcome
where
    C: NodeClient + ?Sized,
{
    let deadline = Instant::now() + Duration::from_millis(policy.timeout_ms);
    let attempts = cmp::max(1, policy.max_attempts);

    sleep_within(policy.initial_delay_ms, deadline).await;

    for attempt in 1..=attempts {
        if Instant::now() >= deadline {
            return timed_out(tx_id, attempt - 1);
        }
        debug!(op = "tx_status", %tx_id, attempt, attempts, "polling transaction");

        let resp = match tokio::time::timeout_at(deadline, client.transaction_status(tx_id)).await {
            Err(_) => return timed_out(tx_id, attempt),
            Ok(resp) => resp,
        };

        match resp {
            Ok(Some(status)) => match status.status() {
                NodeTxStatus::Success => {
                    let function_result = status.function_result().map(str::to_string);
                    let secondary_id = function_result.as_deref().and_then(secondary_id_from_result);
                    info!(%tx_id, attempt, secondary_id, "transaction confirmed");
                    return ConfirmationOutcome::Confirmed {
                        secondary_id,
                        function_result,
                    };
                }
                NodeTxStatus::Failed => {
                    warn!(%tx_id, attempt, tx_status = %status.tx_status, "transaction failed");
                    return ConfirmationOutcome::Failed {
                        function_result: status.function_result().map(str::to_string),
                        tx_status: status.tx_status,
                    };
                }
                NodeTxStatus::Pending => {
                    debug!(%tx_id, attempt, "transaction pending");
                }
            },
            Ok(None) => debug!(%tx_id, attempt, "transaction not yet known"),
            Err(e) if e.is_transient() => {
                warn!(%tx_id, attempt, error = %e, "transient status error; will retry");
            }
            Err(e) => return fail_closed(tx_id, attempt, &e),
        }

        if attempt < attempts {
            let delay_ms = policy.backoff_delay_ms(attempt);
            debug!(%tx_id, attempt, delay_ms, "backing off");
            sleep_within(delay_ms, deadline).await;
        }
    }

    warn!(%tx_id, attempts, "confirmation attempts exhausted");
    ConfirmationOutcome::unknown(attempts, format!("no terminal status after {attempts} attempts"))
}

async fn sleep_within(delay_ms: u64, deadline: Instant) {
    let wake = cmp::min(Instant::now() + Duration::from_millis(delay_ms), deadline);
    tokio::time::sleep_until(wake).await;
}

fn timed_out(tx_id: &TxId, attempts: u32) -> ConfirmationOutcome {
    warn!(%tx_id, attempts, "confirmation timed out");
    ConfirmationOutcome::unknown(attempts, "confirmation timeout elapsed")
}

fn fail_closed(tx_id: &TxId, attempt: u32, e: &NodeClientError) -> ConfirmationOutcome {
    warn!(%tx_id, attempt, error = %e, "unexpected status response; giving up");
    ConfirmationOutcome::unknown(attempt, format!("unexpected status response: {e}"))
}
