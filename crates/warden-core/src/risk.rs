//! Risk vocabulary shared by the checkers, the engine and the claim path.

use crate::error::{CoreError, Result};
use crate::witness::WitnessHealth;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Risk severity, ascending. Aggregation takes the maximum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[default]
    Normal = 0,
    Warning = 1,
    Cooldown = 2,
    RiskLocked = 3,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Cooldown => "COOLDOWN",
            Self::RiskLocked => "RISK_LOCKED",
        }
    }

    /// Trading is permitted below `Cooldown`.
    pub fn permits_trading(&self) -> bool {
        *self < Self::Cooldown
    }

    pub fn code(&self) -> i64 {
        *self as i64
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of a rule firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub event_id: String,
    pub event_type: String,
    pub level: RiskLevel,
    pub description: String,
    pub value: Decimal,
    pub threshold: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl RiskEvent {
    pub fn new(
        event_type: impl Into<String>,
        level: RiskLevel,
        description: impl Into<String>,
        value: Decimal,
        threshold: Decimal,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            level,
            description: description.into(),
            value,
            threshold,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of one checker, or of the whole chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheckResult {
    pub approved: bool,
    pub level: RiskLevel,
    pub reason: String,
    pub events: Vec<RiskEvent>,
    /// Name of the checker that produced this result (or that dominated the
    /// aggregate).
    #[serde(default)]
    pub checker: Option<String>,
}

impl RiskCheckResult {
    /// Result at `level`; `approved` is derived from the level.
    pub fn at_level(level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            approved: level.permits_trading(),
            level,
            reason: reason.into(),
            events: Vec::new(),
            checker: None,
        }
    }

    pub fn normal() -> Self {
        Self::at_level(RiskLevel::Normal, "ok")
    }

    pub fn with_event(mut self, event: RiskEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_checker(mut self, checker: impl Into<String>) -> Self {
        self.checker = Some(checker.into());
        self
    }
}

/// Point-in-time snapshot of the metrics a risk evaluation reads.
///
/// Validated at construction; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskContext {
    equity: Decimal,
    initial_equity: Decimal,
    drawdown: Decimal,
    daily_pnl: Decimal,
    consecutive_losses: u32,
    requested_position: Decimal,
    recent_slippages_bps: Vec<Decimal>,
    recent_fill_rates: Vec<Decimal>,
    recent_latencies_ms: Vec<u64>,
    witness_health: BTreeMap<String, WitnessHealth>,
}

impl RiskContext {
    /// Create a context from account equity.
    ///
    /// Drawdown defaults to `max(0, (initial - equity) / initial)`.
    pub fn new(equity: Decimal, initial_equity: Decimal) -> Result<Self> {
        if initial_equity <= Decimal::ZERO {
            return Err(CoreError::InvalidRiskContext(format!(
                "initial_equity must be positive, got {initial_equity}"
            )));
        }
        if equity < Decimal::ZERO {
            return Err(CoreError::InvalidRiskContext(format!(
                "equity must be non-negative, got {equity}"
            )));
        }
        let drawdown = ((initial_equity - equity) / initial_equity).max(Decimal::ZERO);

        Ok(Self {
            equity,
            initial_equity,
            drawdown,
            daily_pnl: Decimal::ZERO,
            consecutive_losses: 0,
            requested_position: Decimal::ZERO,
            recent_slippages_bps: Vec::new(),
            recent_fill_rates: Vec::new(),
            recent_latencies_ms: Vec::new(),
            witness_health: BTreeMap::new(),
        })
    }

    /// Override the derived drawdown (e.g. with a peak-to-trough figure).
    pub fn with_drawdown(mut self, drawdown: Decimal) -> Result<Self> {
        if drawdown < Decimal::ZERO || drawdown > Decimal::ONE {
            return Err(CoreError::InvalidRiskContext(format!(
                "drawdown {drawdown} outside [0, 1]"
            )));
        }
        self.drawdown = drawdown;
        Ok(self)
    }

    pub fn with_daily_pnl(mut self, daily_pnl: Decimal) -> Self {
        self.daily_pnl = daily_pnl;
        self
    }

    pub fn with_consecutive_losses(mut self, losses: u32) -> Self {
        self.consecutive_losses = losses;
        self
    }

    /// Requested position as a fraction of equity.
    pub fn with_requested_position(mut self, position: Decimal) -> Result<Self> {
        if position < Decimal::ZERO {
            return Err(CoreError::InvalidRiskContext(format!(
                "requested_position must be non-negative, got {position}"
            )));
        }
        self.requested_position = position;
        Ok(self)
    }

    pub fn with_slippages_bps(mut self, samples: Vec<Decimal>) -> Self {
        self.recent_slippages_bps = samples;
        self
    }

    pub fn with_fill_rates(mut self, samples: Vec<Decimal>) -> Result<Self> {
        if let Some(bad) = samples
            .iter()
            .find(|r| **r < Decimal::ZERO || **r > Decimal::ONE)
        {
            return Err(CoreError::InvalidRiskContext(format!(
                "fill rate {bad} outside [0, 1]"
            )));
        }
        self.recent_fill_rates = samples;
        Ok(self)
    }

    pub fn with_latencies_ms(mut self, samples: Vec<u64>) -> Self {
        self.recent_latencies_ms = samples;
        self
    }

    pub fn with_witness_health(mut self, health: impl IntoIterator<Item = WitnessHealth>) -> Self {
        self.witness_health = health
            .into_iter()
            .map(|h| (h.witness_id.clone(), h))
            .collect();
        self
    }

    pub fn equity(&self) -> Decimal {
        self.equity
    }

    pub fn initial_equity(&self) -> Decimal {
        self.initial_equity
    }

    pub fn drawdown(&self) -> Decimal {
        self.drawdown
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    /// Daily loss as a positive fraction of initial equity (zero on a
    /// profitable day).
    pub fn daily_loss_ratio(&self) -> Decimal {
        (-self.daily_pnl / self.initial_equity).max(Decimal::ZERO)
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn requested_position(&self) -> Decimal {
        self.requested_position
    }

    pub fn recent_slippages_bps(&self) -> &[Decimal] {
        &self.recent_slippages_bps
    }

    pub fn recent_fill_rates(&self) -> &[Decimal] {
        &self.recent_fill_rates
    }

    pub fn recent_latencies_ms(&self) -> &[u64] {
        &self.recent_latencies_ms
    }

    pub fn witness_health(&self) -> &BTreeMap<String, WitnessHealth> {
        &self.witness_health
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(samples: &[Decimal]) -> Option<Decimal> {
    if samples.is_empty() {
        return None;
    }
    let total: Decimal = samples.iter().copied().sum();
    Some(total / Decimal::from(samples.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_level_ordering() {
        assert!(RiskLevel::Normal < RiskLevel::Warning);
        assert!(RiskLevel::Warning < RiskLevel::Cooldown);
        assert!(RiskLevel::Cooldown < RiskLevel::RiskLocked);
        assert_eq!(
            [RiskLevel::Warning, RiskLevel::RiskLocked, RiskLevel::Normal]
                .into_iter()
                .max(),
            Some(RiskLevel::RiskLocked)
        );
    }

    #[test]
    fn test_approved_derived_from_level() {
        assert!(RiskCheckResult::at_level(RiskLevel::Warning, "w").approved);
        assert!(!RiskCheckResult::at_level(RiskLevel::Cooldown, "c").approved);
        assert!(!RiskCheckResult::at_level(RiskLevel::RiskLocked, "l").approved);
    }

    #[test]
    fn test_drawdown_derived() {
        let ctx = RiskContext::new(dec!(75000), dec!(100000)).unwrap();
        assert_eq!(ctx.drawdown(), dec!(0.25));

        let ctx = RiskContext::new(dec!(110000), dec!(100000)).unwrap();
        assert_eq!(ctx.drawdown(), dec!(0));
    }

    #[test]
    fn test_daily_loss_ratio() {
        let ctx = RiskContext::new(dec!(100000), dec!(100000))
            .unwrap()
            .with_daily_pnl(dec!(-5000));
        assert_eq!(ctx.daily_loss_ratio(), dec!(0.05));

        let ctx = ctx.with_daily_pnl(dec!(2000));
        assert_eq!(ctx.daily_loss_ratio(), dec!(0));
    }

    #[test]
    fn test_malformed_context_rejected() {
        assert!(RiskContext::new(dec!(100), dec!(0)).is_err());
        assert!(RiskContext::new(dec!(-1), dec!(100)).is_err());
        let ctx = RiskContext::new(dec!(100), dec!(100)).unwrap();
        assert!(ctx.clone().with_drawdown(dec!(1.5)).is_err());
        assert!(ctx.clone().with_requested_position(dec!(-0.1)).is_err());
        assert!(ctx.with_fill_rates(vec![dec!(0.9), dec!(1.1)]).is_err());
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[dec!(10), dec!(20)]), Some(dec!(15)));
    }

    #[test]
    fn test_event_ids_unique() {
        let a = RiskEvent::new("t", RiskLevel::Warning, "d", dec!(1), dec!(1));
        let b = RiskEvent::new("t", RiskLevel::Warning, "d", dec!(1), dec!(1));
        assert_ne!(a.event_id, b.event_id);
    }
}
