//! Built-in witnesses.
//!
//! - `MomentumWitness` (TIER_1): close-to-close return over a lookback
//! - `VolumeConfirmWitness` (TIER_2): volume spike on the latest bar
//! - `VolatilityVetoWitness` (TIER_3): latest bar range too wide to trade

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;
use warden_core::{Claim, ClaimBuilder, ClaimType, Direction, MarketWindow, Tier, TradeRegime};

use crate::error::{WitnessError, WitnessResult};
use crate::witness::{ActivityFlag, Witness};

const SYMBOL_CONSTRAINT: &str = "symbol";

fn default_validity_secs() -> i64 {
    300
}

fn default_true() -> bool {
    true
}

/// Claims are stamped with the time of the bar they describe.
fn stamped(builder: ClaimBuilder, window: &MarketWindow) -> ClaimBuilder {
    match window.latest() {
        Some(bar) => builder.timestamp(bar.timestamp),
        None => builder,
    }
}

// ============================================================================
// Momentum
// ============================================================================

/// Momentum witness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_momentum_id")]
    pub id: String,
    /// Bars between the base close and the latest close.
    #[serde(default = "default_momentum_lookback")]
    pub lookback: usize,
    /// Absolute return needed to emit a claim.
    #[serde(default = "default_momentum_threshold")]
    pub threshold: Decimal,
    #[serde(default = "default_momentum_max_confidence")]
    pub max_confidence: Decimal,
    #[serde(default = "default_validity_secs")]
    pub validity_secs: i64,
}

fn default_momentum_id() -> String {
    "momentum".to_string()
}

fn default_momentum_lookback() -> usize {
    5
}

fn default_momentum_threshold() -> Decimal {
    Decimal::new(5, 3) // 0.005 = 0.5%
}

fn default_momentum_max_confidence() -> Decimal {
    Decimal::new(95, 2)
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            id: default_momentum_id(),
            lookback: default_momentum_lookback(),
            threshold: default_momentum_threshold(),
            max_confidence: default_momentum_max_confidence(),
            validity_secs: default_validity_secs(),
        }
    }
}

/// Emits `MARKET_ELIGIBLE` in the direction of a strong enough move.
///
/// Confidence starts at 0.5 at the threshold and grows linearly, reaching
/// 1.0 at twice the threshold before the `max_confidence` cap.
pub struct MomentumWitness {
    config: MomentumConfig,
    active: ActivityFlag,
}

impl MomentumWitness {
    pub fn new(config: MomentumConfig) -> WitnessResult<Self> {
        if config.lookback == 0 || config.threshold <= Decimal::ZERO {
            return Err(WitnessError::ConfigError(format!(
                "momentum witness {} needs lookback > 0 and threshold > 0",
                config.id
            )));
        }
        Ok(Self {
            config,
            active: ActivityFlag::default(),
        })
    }
}

impl Witness for MomentumWitness {
    fn strategy_id(&self) -> &str {
        &self.config.id
    }

    fn tier(&self) -> Tier {
        Tier::Tier1
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn mute(&self) {
        self.active.set(false);
    }

    fn activate(&self) {
        self.active.set(true);
    }

    fn generate_claim(&self, window: &MarketWindow) -> WitnessResult<Option<Claim>> {
        let Some(ret) = window.return_over(self.config.lookback) else {
            return Ok(None);
        };
        let magnitude = ret.abs();
        trace!(witness = %self.config.id, %ret, "momentum evaluated");
        if magnitude < self.config.threshold {
            return Ok(None);
        }

        let excess = (magnitude - self.config.threshold) / self.config.threshold;
        let confidence = (Decimal::new(5, 1) + excess * Decimal::new(5, 1))
            .min(self.config.max_confidence)
            .min(Decimal::ONE);
        let direction = if ret.is_sign_positive() {
            Direction::Long
        } else {
            Direction::Short
        };

        let builder = Claim::builder(self.config.id.clone(), ClaimType::MarketEligible);
        let claim = stamped(builder, window)
            .confidence(confidence)
            .validity_secs(self.config.validity_secs)
            .direction(direction)
            .regime(&TradeRegime::Trending)
            .constraint(SYMBOL_CONSTRAINT, window.symbol())
            .build()?;
        Ok(Some(claim))
    }
}

// ============================================================================
// Volume confirmation
// ============================================================================

/// Volume confirmation witness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfirmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_volume_id")]
    pub id: String,
    /// Bars averaged for the baseline volume.
    #[serde(default = "default_volume_lookback")]
    pub lookback: usize,
    /// Latest volume / baseline needed to call a spike.
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: Decimal,
    #[serde(default = "default_volume_max_confidence")]
    pub max_confidence: Decimal,
    #[serde(default = "default_validity_secs")]
    pub validity_secs: i64,
}

fn default_volume_id() -> String {
    "volume_confirm".to_string()
}

fn default_volume_lookback() -> usize {
    20
}

fn default_spike_ratio() -> Decimal {
    Decimal::from(2)
}

fn default_volume_max_confidence() -> Decimal {
    Decimal::new(9, 1)
}

impl Default for VolumeConfirmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            id: default_volume_id(),
            lookback: default_volume_lookback(),
            spike_ratio: default_spike_ratio(),
            max_confidence: default_volume_max_confidence(),
            validity_secs: default_validity_secs(),
        }
    }
}

/// Emits `REGIME_MATCHED` when the latest bar trades on a volume spike.
/// Direction follows the latest bar's body; a flat bar confirms nothing.
pub struct VolumeConfirmWitness {
    config: VolumeConfirmConfig,
    active: ActivityFlag,
}

impl VolumeConfirmWitness {
    pub fn new(config: VolumeConfirmConfig) -> WitnessResult<Self> {
        if config.lookback == 0 || config.spike_ratio <= Decimal::ONE {
            return Err(WitnessError::ConfigError(format!(
                "volume witness {} needs lookback > 0 and spike_ratio > 1",
                config.id
            )));
        }
        Ok(Self {
            config,
            active: ActivityFlag::default(),
        })
    }
}

impl Witness for VolumeConfirmWitness {
    fn strategy_id(&self) -> &str {
        &self.config.id
    }

    fn tier(&self) -> Tier {
        Tier::Tier2
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn mute(&self) {
        self.active.set(false);
    }

    fn activate(&self) {
        self.active.set(true);
    }

    fn generate_claim(&self, window: &MarketWindow) -> WitnessResult<Option<Claim>> {
        let (Some(latest), Some(baseline)) = (
            window.latest(),
            window.mean_prior_volume(self.config.lookback),
        ) else {
            return Ok(None);
        };
        if baseline.is_zero() {
            return Ok(None);
        }

        let ratio = latest.volume / baseline;
        if ratio < self.config.spike_ratio {
            return Ok(None);
        }

        let direction = match latest.close.cmp(&latest.open) {
            std::cmp::Ordering::Greater => Direction::Long,
            std::cmp::Ordering::Less => Direction::Short,
            std::cmp::Ordering::Equal => return Ok(None),
        };

        // 0.5 at the spike ratio, +0.25 per additional multiple of it.
        let excess = (ratio - self.config.spike_ratio) / self.config.spike_ratio;
        let confidence = (Decimal::new(5, 1) + excess * Decimal::new(25, 2))
            .min(self.config.max_confidence)
            .min(Decimal::ONE);

        let builder = Claim::builder(self.config.id.clone(), ClaimType::RegimeMatched);
        let claim = stamped(builder, window)
            .confidence(confidence)
            .validity_secs(self.config.validity_secs)
            .direction(direction)
            .regime(&TradeRegime::VolatilityExpansion)
            .constraint(SYMBOL_CONSTRAINT, window.symbol())
            .build()?;
        Ok(Some(claim))
    }
}

// ============================================================================
// Volatility veto
// ============================================================================

/// Volatility veto witness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityVetoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_veto_id")]
    pub id: String,
    /// (high - low) / close above which trading is vetoed.
    #[serde(default = "default_max_range_ratio")]
    pub max_range_ratio: Decimal,
    #[serde(default = "default_veto_confidence")]
    pub confidence: Decimal,
    #[serde(default = "default_veto_validity_secs")]
    pub validity_secs: i64,
}

fn default_veto_id() -> String {
    "volatility_veto".to_string()
}

fn default_max_range_ratio() -> Decimal {
    Decimal::new(3, 2) // 3%
}

fn default_veto_confidence() -> Decimal {
    Decimal::new(9, 1)
}

fn default_veto_validity_secs() -> i64 {
    120
}

impl Default for VolatilityVetoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            id: default_veto_id(),
            max_range_ratio: default_max_range_ratio(),
            confidence: default_veto_confidence(),
            validity_secs: default_veto_validity_secs(),
        }
    }
}

/// Emits `EXECUTION_VETO` when the latest bar's range is too wide.
pub struct VolatilityVetoWitness {
    config: VolatilityVetoConfig,
    active: ActivityFlag,
}

impl VolatilityVetoWitness {
    pub fn new(config: VolatilityVetoConfig) -> WitnessResult<Self> {
        if config.max_range_ratio <= Decimal::ZERO {
            return Err(WitnessError::ConfigError(format!(
                "veto witness {} needs max_range_ratio > 0",
                config.id
            )));
        }
        Ok(Self {
            config,
            active: ActivityFlag::default(),
        })
    }
}

impl Witness for VolatilityVetoWitness {
    fn strategy_id(&self) -> &str {
        &self.config.id
    }

    fn tier(&self) -> Tier {
        Tier::Tier3
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn mute(&self) {
        self.active.set(false);
    }

    fn activate(&self) {
        self.active.set(true);
    }

    fn generate_claim(&self, window: &MarketWindow) -> WitnessResult<Option<Claim>> {
        let Some(range) = window.latest().and_then(|b| b.range_ratio()) else {
            return Ok(None);
        };
        if range <= self.config.max_range_ratio {
            return Ok(None);
        }

        let builder = Claim::builder(self.config.id.clone(), ClaimType::ExecutionVeto);
        let claim = stamped(builder, window)
            .confidence(self.config.confidence)
            .validity_secs(self.config.validity_secs)
            .constraint("range_ratio", range.round_dp(6).to_string())
            .constraint(SYMBOL_CONSTRAINT, window.symbol())
            .build()?;
        Ok(Some(claim))
    }
}
