//! Operational states and the static transition table.
//!
//! The table is a closed set: any `(from, to)` pair not listed in
//! [`is_valid_transition`] is illegal. `RiskLocked` is the only state
//! reachable from everywhere.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemState {
    /// Process started, components not yet wired.
    SystemInit,
    /// Idle; the only state that accepts claims.
    Observing,
    /// A claim was admitted; waiting for the trade to start.
    Eligible,
    /// Positions may be opened.
    ActiveTrading,
    /// Trade cycle finished; quiet period before observing again.
    Cooldown,
    /// Emergency lock. Only recovery leaves it.
    RiskLocked,
    /// Post-lock recovery; returns to observing when complete.
    Recovery,
}

impl SystemState {
    /// All states, in lifecycle order.
    pub const ALL: [SystemState; 7] = [
        SystemState::SystemInit,
        SystemState::Observing,
        SystemState::Eligible,
        SystemState::ActiveTrading,
        SystemState::Cooldown,
        SystemState::RiskLocked,
        SystemState::Recovery,
    ];

    /// Stable identifier used in logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemInit => "SYSTEM_INIT",
            Self::Observing => "OBSERVING",
            Self::Eligible => "ELIGIBLE",
            Self::ActiveTrading => "ACTIVE_TRADING",
            Self::Cooldown => "COOLDOWN",
            Self::RiskLocked => "RISK_LOCKED",
            Self::Recovery => "RECOVERY",
        }
    }

    /// Trading is allowed only while eligible or actively trading.
    pub fn is_trading_allowed(&self) -> bool {
        matches!(self, Self::Eligible | Self::ActiveTrading)
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::RiskLocked)
    }

    /// Whether claims may be submitted in this state.
    pub fn accepts_claims(&self) -> bool {
        matches!(self, Self::Observing)
    }

    /// Numeric code for gauge export.
    pub fn code(&self) -> i64 {
        match self {
            Self::SystemInit => 0,
            Self::Observing => 1,
            Self::Eligible => 2,
            Self::ActiveTrading => 3,
            Self::Cooldown => 4,
            Self::RiskLocked => 5,
            Self::Recovery => 6,
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownState(s.to_string()))
    }
}

/// Check whether an edge exists in the transition table.
///
/// Self-transitions are never valid.
pub fn is_valid_transition(from: SystemState, to: SystemState) -> bool {
    use SystemState::*;

    if from == to {
        return false;
    }

    matches!(
        (from, to),
        (SystemInit, Observing)
            | (Observing, Eligible)
            | (Eligible, ActiveTrading)
            | (Eligible, Observing)
            | (ActiveTrading, Cooldown)
            | (Cooldown, Observing)
            | (Recovery, Observing)
            | (RiskLocked, Recovery)
            | (_, RiskLocked)
    )
}

/// Advertised next states from a given state.
pub fn valid_next_states(from: SystemState) -> Vec<SystemState> {
    SystemState::ALL
        .iter()
        .copied()
        .filter(|to| is_valid_transition(from, *to))
        .collect()
}

/// A recorded transition attempt.
///
/// Failed attempts are recorded too, with `success = false` and the error text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SystemState,
    pub to: SystemState,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

impl Transition {
    pub fn succeeded(from: SystemState, to: SystemState, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            timestamp: Utc::now(),
            success: true,
            error: None,
        }
    }

    pub fn failed(
        from: SystemState,
        to: SystemState,
        reason: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            timestamp: Utc::now(),
            success: false,
            error: Some(error.into()),
        }
    }
}
