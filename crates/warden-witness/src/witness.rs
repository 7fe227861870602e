//! Witness capability trait and the execution boundary.
//!
//! A witness observes a `MarketWindow` and may emit one claim. It has no
//! handle to orders, positions, the state machine or the risk engine.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::error;
use warden_core::{Claim, MarketWindow, Tier};

use crate::error::{WitnessError, WitnessResult};

/// A signal source that proposes claims.
///
/// `generate_claim` runs on a blocking thread and must not panic in normal
/// operation; a panic is isolated by the orchestrator and counts as no claim.
pub trait Witness: Send + Sync {
    fn strategy_id(&self) -> &str;

    /// Fixed for the lifetime of the witness.
    fn tier(&self) -> Tier;

    fn is_active(&self) -> bool;

    fn mute(&self);

    fn activate(&self);

    fn generate_claim(&self, window: &MarketWindow) -> WitnessResult<Option<Claim>>;
}

/// Local active/muted flag shared by the witness implementations.
#[derive(Debug)]
pub struct ActivityFlag(AtomicBool);

impl Default for ActivityFlag {
    fn default() -> Self {
        Self(AtomicBool::new(true))
    }
}

impl ActivityFlag {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::SeqCst);
    }
}

// ============================================================================
// ExecutionBoundary
// ============================================================================

/// Execution-layer operations a witness must never perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossLayerOp {
    SubmitOrder,
    CancelOrder,
    ModifyPosition,
    TransitionState,
    OverrideRisk,
}

impl CrossLayerOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitOrder => "submit_order",
            Self::CancelOrder => "cancel_order",
            Self::ModifyPosition => "modify_position",
            Self::TransitionState => "transition_state",
            Self::OverrideRisk => "override_risk",
        }
    }
}

impl fmt::Display for CrossLayerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only path from the witness layer toward execution. It always refuses.
pub struct ExecutionBoundary;

impl ExecutionBoundary {
    /// Refuse `op` for `witness` with an `ArchitectureViolation`.
    pub fn deny<T>(witness: &str, op: CrossLayerOp) -> WitnessResult<T> {
        error!(witness, operation = %op, "ARCHITECTURE VIOLATION: witness reached for execution");
        Err(WitnessError::ArchitectureViolation {
            witness: witness.to_string(),
            operation: op.to_string(),
        })
    }
}
