//! Regime ownership for the current trading cycle.

use chrono::{DateTime, Utc};
use tracing::debug;
use warden_core::{SystemState, TradeRegime};

/// Holds the regime attached while `ELIGIBLE` / `ACTIVE_TRADING`.
#[derive(Debug, Default)]
pub struct RegimeManager {
    current: Option<TradeRegime>,
    attached_at: Option<DateTime<Utc>>,
}

impl RegimeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, regime: TradeRegime) {
        debug!(regime = %regime, "Regime attached");
        self.current = Some(regime);
        self.attached_at = Some(Utc::now());
    }

    pub fn clear(&mut self) -> Option<TradeRegime> {
        self.attached_at = None;
        let previous = self.current.take();
        if let Some(regime) = &previous {
            debug!(regime = %regime, "Regime cleared");
        }
        previous
    }

    pub fn current(&self) -> Option<&TradeRegime> {
        self.current.as_ref()
    }

    pub fn attached_at(&self) -> Option<DateTime<Utc>> {
        self.attached_at
    }

    /// Drop the regime when the cycle leaves the trading states.
    pub fn on_state(&mut self, state: SystemState) {
        if !matches!(state, SystemState::Eligible | SystemState::ActiveTrading) {
            self.clear();
        }
    }
}
