//! State machine error types.

use thiserror::Error;
use warden_core::SystemState;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MachineError {
    /// The edge is not in the transition table.
    #[error("Transition {from} -> {to} not allowed: {reason}")]
    NotEligible {
        from: SystemState,
        to: SystemState,
        reason: String,
    },

    #[error("Already in state {0}")]
    IdenticalState(SystemState),

    /// Lifecycle step refused by the risk engine.
    #[error("Blocked by risk engine: {0}")]
    RiskBlocked(String),

    /// Caller's view of the current state is out of date.
    #[error("Stale source state: expected {expected}, current is {actual}")]
    StaleSource {
        expected: SystemState,
        actual: SystemState,
    },
}

pub type MachineResult<T> = Result<T, MachineError>;
