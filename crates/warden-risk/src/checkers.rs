//! Risk checkers.
//!
//! Each checker is an independent, stateless rule over a `RiskContext`.
//! Checkers never fail on normal risk conditions; malformed input is rejected
//! earlier, when the context is built.
//!
//! # Default chain
//! - `account`: drawdown, daily loss, consecutive losses
//! - `execution`: slippage, fill rate, latency
//! - `regime`: active witness count and weighted win rate (advisory)
//! - `position`: requested position size
//! - `strategy_decay`: share of grade-D witnesses (advisory)

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;
use warden_core::{mean, Grade, RiskCheckResult, RiskContext, RiskEvent, RiskLevel};

/// A single rule in the checker chain.
pub trait RiskChecker: Send + Sync {
    /// Unique name within a chain.
    fn name(&self) -> &str;

    /// Evaluate the context. Must be pure.
    fn check(&self, context: &RiskContext) -> RiskCheckResult;
}

/// Accumulates rule firings inside one checker.
struct Findings {
    level: RiskLevel,
    reasons: Vec<String>,
    events: Vec<RiskEvent>,
}

impl Findings {
    fn new() -> Self {
        Self {
            level: RiskLevel::Normal,
            reasons: Vec::new(),
            events: Vec::new(),
        }
    }

    fn raise(
        &mut self,
        level: RiskLevel,
        event_type: &str,
        description: String,
        value: Decimal,
        threshold: Decimal,
    ) {
        self.level = self.level.max(level);
        self.events
            .push(RiskEvent::new(event_type, level, description.clone(), value, threshold));
        self.reasons.push(description);
    }

    fn finish(self, checker: &str) -> RiskCheckResult {
        let reason = if self.reasons.is_empty() {
            "ok".to_string()
        } else {
            self.reasons.join("; ")
        };
        trace!(checker, level = %self.level, %reason, "checker evaluated");

        let mut result = RiskCheckResult::at_level(self.level, reason).with_checker(checker);
        result.events = self.events;
        result
    }
}

// ============================================================================
// Account risk
// ============================================================================

/// Account risk thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRiskConfig {
    /// Drawdown at which the engine locks.
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: Decimal,
    /// Fraction of `max_drawdown` at which a warning fires.
    #[serde(default = "default_drawdown_warning_fraction")]
    pub drawdown_warning_fraction: Decimal,
    /// Daily loss (fraction of initial equity) that forces a cooldown.
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
    /// Consecutive losing trades that force a cooldown.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
}

fn default_max_drawdown() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

fn default_drawdown_warning_fraction() -> Decimal {
    Decimal::new(8, 1) // 0.8
}

fn default_max_daily_loss() -> Decimal {
    Decimal::new(3, 2) // 0.03
}

fn default_max_consecutive_losses() -> u32 {
    3
}

impl Default for AccountRiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown: default_max_drawdown(),
            drawdown_warning_fraction: default_drawdown_warning_fraction(),
            max_daily_loss: default_max_daily_loss(),
            max_consecutive_losses: default_max_consecutive_losses(),
        }
    }
}

/// Drawdown, daily loss and losing-streak checks.
pub struct AccountRiskChecker {
    config: AccountRiskConfig,
}

impl AccountRiskChecker {
    pub const NAME: &'static str = "account";

    pub fn new(config: AccountRiskConfig) -> Self {
        Self { config }
    }
}

impl RiskChecker for AccountRiskChecker {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self, context: &RiskContext) -> RiskCheckResult {
        let mut findings = Findings::new();
        let drawdown = context.drawdown();
        let warn_at = self.config.max_drawdown * self.config.drawdown_warning_fraction;

        if drawdown >= self.config.max_drawdown {
            findings.raise(
                RiskLevel::RiskLocked,
                "max_drawdown",
                format!(
                    "drawdown {drawdown} reached limit {}",
                    self.config.max_drawdown
                ),
                drawdown,
                self.config.max_drawdown,
            );
        } else if drawdown >= warn_at {
            findings.raise(
                RiskLevel::Warning,
                "drawdown_warning",
                format!("drawdown {drawdown} approaching limit {}", self.config.max_drawdown),
                drawdown,
                warn_at,
            );
        }

        let daily_loss = context.daily_loss_ratio();
        if daily_loss >= self.config.max_daily_loss {
            findings.raise(
                RiskLevel::Cooldown,
                "daily_loss",
                format!(
                    "daily loss {daily_loss} reached limit {}",
                    self.config.max_daily_loss
                ),
                daily_loss,
                self.config.max_daily_loss,
            );
        }

        let losses = context.consecutive_losses();
        if losses >= self.config.max_consecutive_losses {
            findings.raise(
                RiskLevel::Cooldown,
                "consecutive_losses",
                format!(
                    "{losses} consecutive losses (limit {})",
                    self.config.max_consecutive_losses
                ),
                Decimal::from(losses),
                Decimal::from(self.config.max_consecutive_losses),
            );
        }

        findings.finish(Self::NAME)
    }
}

// ============================================================================
// Execution risk
// ============================================================================

/// Execution quality thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRiskConfig {
    /// Mean slippage (bps) that raises a warning.
    #[serde(default = "default_slippage_warning_bps")]
    pub slippage_warning_bps: Decimal,
    /// Mean slippage (bps) that forces a cooldown.
    #[serde(default = "default_slippage_severe_bps")]
    pub slippage_severe_bps: Decimal,
    /// Mean fill rate below which a warning fires.
    #[serde(default = "default_min_fill_rate")]
    pub min_fill_rate: Decimal,
    /// Mean latency (ms) above which a warning fires.
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
}

fn default_slippage_warning_bps() -> Decimal {
    Decimal::from(20)
}

fn default_slippage_severe_bps() -> Decimal {
    Decimal::from(50)
}

fn default_min_fill_rate() -> Decimal {
    Decimal::new(8, 1) // 0.8
}

fn default_max_latency_ms() -> u64 {
    500
}

impl Default for ExecutionRiskConfig {
    fn default() -> Self {
        Self {
            slippage_warning_bps: default_slippage_warning_bps(),
            slippage_severe_bps: default_slippage_severe_bps(),
            min_fill_rate: default_min_fill_rate(),
            max_latency_ms: default_max_latency_ms(),
        }
    }
}

/// Slippage, fill rate and latency checks. Empty sample windows are no
/// evidence and pass.
pub struct ExecutionRiskChecker {
    config: ExecutionRiskConfig,
}

impl ExecutionRiskChecker {
    pub const NAME: &'static str = "execution";

    pub fn new(config: ExecutionRiskConfig) -> Self {
        Self { config }
    }
}

impl RiskChecker for ExecutionRiskChecker {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self, context: &RiskContext) -> RiskCheckResult {
        let mut findings = Findings::new();

        if let Some(slippage) = mean(context.recent_slippages_bps()) {
            if slippage >= self.config.slippage_severe_bps {
                findings.raise(
                    RiskLevel::Cooldown,
                    "slippage_severe",
                    format!("mean slippage {slippage}bps is severe"),
                    slippage,
                    self.config.slippage_severe_bps,
                );
            } else if slippage >= self.config.slippage_warning_bps {
                findings.raise(
                    RiskLevel::Warning,
                    "slippage_warning",
                    format!("mean slippage {slippage}bps is elevated"),
                    slippage,
                    self.config.slippage_warning_bps,
                );
            }
        }

        if let Some(fill_rate) = mean(context.recent_fill_rates()) {
            if fill_rate < self.config.min_fill_rate {
                findings.raise(
                    RiskLevel::Warning,
                    "fill_rate_low",
                    format!("mean fill rate {fill_rate} below {}", self.config.min_fill_rate),
                    fill_rate,
                    self.config.min_fill_rate,
                );
            }
        }

        let latencies: Vec<Decimal> = context
            .recent_latencies_ms()
            .iter()
            .map(|ms| Decimal::from(*ms))
            .collect();
        if let Some(latency) = mean(&latencies) {
            let limit = Decimal::from(self.config.max_latency_ms);
            if latency > limit {
                findings.raise(
                    RiskLevel::Warning,
                    "latency_high",
                    format!("mean latency {latency}ms above {limit}ms"),
                    latency,
                    limit,
                );
            }
        }

        findings.finish(Self::NAME)
    }
}

// ============================================================================
// Regime / strategy-health risk
// ============================================================================

/// Witness health thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeRiskConfig {
    /// Minimum number of active witnesses.
    #[serde(default = "default_min_active_witnesses")]
    pub min_active_witnesses: usize,
    /// Floor for the weight-weighted win rate of active witnesses.
    #[serde(default = "default_min_weighted_win_rate")]
    pub min_weighted_win_rate: Decimal,
}

fn default_min_active_witnesses() -> usize {
    2
}

fn default_min_weighted_win_rate() -> Decimal {
    Decimal::new(45, 2) // 0.45
}

impl Default for RegimeRiskConfig {
    fn default() -> Self {
        Self {
            min_active_witnesses: default_min_active_witnesses(),
            min_weighted_win_rate: default_min_weighted_win_rate(),
        }
    }
}

/// Strategy-health checks. Advisory: never escalates past `Warning`.
pub struct RegimeRiskChecker {
    config: RegimeRiskConfig,
}

impl RegimeRiskChecker {
    pub const NAME: &'static str = "regime";

    pub fn new(config: RegimeRiskConfig) -> Self {
        Self { config }
    }
}

impl RiskChecker for RegimeRiskChecker {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self, context: &RiskContext) -> RiskCheckResult {
        let health = context.witness_health();
        if health.is_empty() {
            return RiskCheckResult::at_level(RiskLevel::Normal, "no witness health data")
                .with_checker(Self::NAME);
        }

        let mut findings = Findings::new();
        let active: Vec<_> = health.values().filter(|h| h.is_active()).collect();

        if active.len() < self.config.min_active_witnesses {
            findings.raise(
                RiskLevel::Warning,
                "insufficient_active_witnesses",
                format!(
                    "{} active witnesses (minimum {})",
                    active.len(),
                    self.config.min_active_witnesses
                ),
                Decimal::from(active.len()),
                Decimal::from(self.config.min_active_witnesses),
            );
        }

        let total_weight: Decimal = active.iter().map(|h| h.weight).sum();
        if !total_weight.is_zero() {
            let weighted: Decimal = active.iter().map(|h| h.weight * h.win_rate).sum();
            let win_rate = weighted / total_weight;
            if win_rate < self.config.min_weighted_win_rate {
                findings.raise(
                    RiskLevel::Warning,
                    "weighted_win_rate_low",
                    format!(
                        "weighted win rate {} below {}",
                        win_rate.round_dp(4),
                        self.config.min_weighted_win_rate
                    ),
                    win_rate,
                    self.config.min_weighted_win_rate,
                );
            }
        }

        findings.finish(Self::NAME)
    }
}

// ============================================================================
// Position risk
// ============================================================================

/// Position size thresholds, as fractions of equity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRiskConfig {
    #[serde(default = "default_max_position")]
    pub max_position: Decimal,
    #[serde(default = "default_position_warning_fraction")]
    pub warning_fraction: Decimal,
}

fn default_max_position() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_position_warning_fraction() -> Decimal {
    Decimal::new(8, 1) // 0.8
}

impl Default for PositionRiskConfig {
    fn default() -> Self {
        Self {
            max_position: default_max_position(),
            warning_fraction: default_position_warning_fraction(),
        }
    }
}

/// Requested position size check.
pub struct PositionRiskChecker {
    config: PositionRiskConfig,
}

impl PositionRiskChecker {
    pub const NAME: &'static str = "position";

    pub fn new(config: PositionRiskConfig) -> Self {
        Self { config }
    }
}

impl RiskChecker for PositionRiskChecker {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self, context: &RiskContext) -> RiskCheckResult {
        let mut findings = Findings::new();
        let requested = context.requested_position();
        let warn_at = self.config.max_position * self.config.warning_fraction;

        if requested > self.config.max_position {
            findings.raise(
                RiskLevel::Cooldown,
                "position_over_limit",
                format!(
                    "requested position {requested} exceeds {}",
                    self.config.max_position
                ),
                requested,
                self.config.max_position,
            );
        } else if requested >= warn_at && !requested.is_zero() {
            findings.raise(
                RiskLevel::Warning,
                "position_near_limit",
                format!(
                    "requested position {requested} near limit {}",
                    self.config.max_position
                ),
                requested,
                warn_at,
            );
        }

        findings.finish(Self::NAME)
    }
}

// ============================================================================
// Strategy decay
// ============================================================================

/// Grade-D share thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDecayConfig {
    /// Witnesses with fewer samples are not graded yet.
    #[serde(default = "default_decay_min_samples")]
    pub min_samples: u32,
    /// Share of graded active witnesses at grade D that raises a warning.
    #[serde(default = "default_max_decayed_share")]
    pub max_decayed_share: Decimal,
}

fn default_decay_min_samples() -> u32 {
    10
}

fn default_max_decayed_share() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

impl Default for StrategyDecayConfig {
    fn default() -> Self {
        Self {
            min_samples: default_decay_min_samples(),
            max_decayed_share: default_max_decayed_share(),
        }
    }
}

/// Flags a witness pool dominated by grade-D performers. Advisory.
pub struct StrategyDecayChecker {
    config: StrategyDecayConfig,
}

impl StrategyDecayChecker {
    pub const NAME: &'static str = "strategy_decay";

    pub fn new(config: StrategyDecayConfig) -> Self {
        Self { config }
    }
}

impl RiskChecker for StrategyDecayChecker {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self, context: &RiskContext) -> RiskCheckResult {
        let graded: Vec<_> = context
            .witness_health()
            .values()
            .filter(|h| h.is_active() && h.sample_count >= self.config.min_samples)
            .collect();
        if graded.is_empty() {
            return RiskCheckResult::normal().with_checker(Self::NAME);
        }

        let mut findings = Findings::new();
        let decayed = graded.iter().filter(|h| h.grade == Grade::D).count();
        let share = Decimal::from(decayed) / Decimal::from(graded.len());
        if share >= self.config.max_decayed_share {
            findings.raise(
                RiskLevel::Warning,
                "strategy_decay",
                format!("{decayed} of {} graded witnesses at grade D", graded.len()),
                share,
                self.config.max_decayed_share,
            );
        }

        findings.finish(Self::NAME)
    }
}

// ============================================================================
// Chain assembly
// ============================================================================

/// Thresholds for the default chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskCheckersConfig {
    #[serde(default)]
    pub account: AccountRiskConfig,
    #[serde(default)]
    pub execution: ExecutionRiskConfig,
    #[serde(default)]
    pub regime: RegimeRiskConfig,
    #[serde(default)]
    pub position: PositionRiskConfig,
    #[serde(default)]
    pub strategy_decay: StrategyDecayConfig,
}

impl RiskCheckersConfig {
    /// Validate threshold relationships.
    pub fn validate(&self) -> Result<(), String> {
        let unit = |v: Decimal| v > Decimal::ZERO && v <= Decimal::ONE;

        if !unit(self.account.max_drawdown) {
            return Err(format!(
                "account.max_drawdown ({}) must be in (0, 1]",
                self.account.max_drawdown
            ));
        }
        if !unit(self.account.drawdown_warning_fraction) {
            return Err(format!(
                "account.drawdown_warning_fraction ({}) must be in (0, 1]",
                self.account.drawdown_warning_fraction
            ));
        }
        if !unit(self.account.max_daily_loss) {
            return Err(format!(
                "account.max_daily_loss ({}) must be in (0, 1]",
                self.account.max_daily_loss
            ));
        }
        if self.execution.slippage_warning_bps > self.execution.slippage_severe_bps {
            return Err(format!(
                "execution.slippage_warning_bps ({}) must not exceed slippage_severe_bps ({})",
                self.execution.slippage_warning_bps, self.execution.slippage_severe_bps
            ));
        }
        if !unit(self.position.max_position) {
            return Err(format!(
                "position.max_position ({}) must be in (0, 1]",
                self.position.max_position
            ));
        }
        Ok(())
    }
}

/// Build the five-checker default chain.
pub fn default_chain(config: &RiskCheckersConfig) -> Vec<Arc<dyn RiskChecker>> {
    vec![
        Arc::new(AccountRiskChecker::new(config.account.clone())),
        Arc::new(ExecutionRiskChecker::new(config.execution.clone())),
        Arc::new(RegimeRiskChecker::new(config.regime.clone())),
        Arc::new(PositionRiskChecker::new(config.position.clone())),
        Arc::new(StrategyDecayChecker::new(config.strategy_decay.clone())),
    ]
}
