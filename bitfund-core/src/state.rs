//! Submission workflow state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Built -> Submitting -> Submitted -> Polling -> Confirmed
//!               |                        |
//!               +--> Canceled            +--> Failed
//!               +--> BroadcastFailed     +--> Unknown
//! ```
//!
//! Transitions are **monotonic**: nothing re-enters `Submitting`, and terminal
//! states (Canceled, BroadcastFailed, Confirmed, Failed, Unknown) accept no
//! further transition.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Built,
    Submitting,
    Submitted,
    Polling,
    Canceled,
    BroadcastFailed,
    Confirmed,
    Failed,
    Unknown,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Canceled | Self::BroadcastFailed | Self::Confirmed | Self::Failed | Self::Unknown
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Canceled => "canceled",
            Self::BroadcastFailed => "broadcast_failed",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Built, Submitting)
                | (Submitting, Submitted | Canceled | BroadcastFailed)
                | (Submitted, Polling)
                | (Polling, Confirmed | Failed | Unknown)
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Cannot leave a terminal state.
    TerminalState {
        from: WorkflowState,
        to: WorkflowState,
    },
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TerminalState { from, to } => {
                write!(f, "cannot transition from terminal state {from} to {to}")
            }
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid transition from {from} to {to}")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Current state plus the path taken to reach it. Serializes as the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WorkflowTracker {
    history: Vec<WorkflowState>,
}

impl Default for WorkflowTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowTracker {
    pub fn new() -> Self {
        Self {
            history: vec![WorkflowState::Built],
        }
    }

    /// Rebuild a tracker from a recorded path, checking every step. A leading
    /// `Built` is optional.
    pub fn replay(path: &[WorkflowState]) -> Result<Self, TransitionError> {
        let mut tracker = Self::new();
        let steps = match path.split_first() {
            Some((WorkflowState::Built, rest)) => rest,
            _ => path,
        };
        for step in steps {
            tracker.advance(*step)?;
        }
        Ok(tracker)
    }

    pub fn state(&self) -> WorkflowState {
        self.history
            .last()
            .copied()
            .unwrap_or(WorkflowState::Built)
    }

    pub fn history(&self) -> &[WorkflowState] {
        &self.history
    }

    pub fn advance(&mut self, next: WorkflowState) -> Result<(), TransitionError> {
        let from = self.state();
        if from.is_terminal() {
            return Err(TransitionError::TerminalState { from, to: next });
        }
        if !from.can_transition_to(next) {
            return Err(TransitionError::InvalidTransition { from, to: next });
        }
        self.history.push(next);
        Ok(())
    }
}
