//! Application configuration.

use crate::error::{AppError, AppResult};
use crate::feed::FeedConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use warden_machine::ClaimPolicyConfig;
use warden_registry::HealthTrackingConfig;
use warden_risk::{RecoveryConfig, RiskCheckersConfig};
use warden_witness::{ArbitrationConfig, WitnessSetConfig};

/// Paper trading parameters for the replay loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Starting account equity.
    #[serde(default = "default_initial_equity")]
    pub initial_equity: Decimal,
    /// Position requested per trade, as a fraction of equity.
    #[serde(default = "default_position_size")]
    pub position_size: Decimal,
    /// Cycles a position is held before it is closed.
    #[serde(default = "default_hold_cycles")]
    pub hold_cycles: u64,
    /// Cycles spent in COOLDOWN after a trade.
    #[serde(default = "default_cooldown_cycles")]
    pub cooldown_cycles: u64,
}

fn default_initial_equity() -> Decimal {
    Decimal::from(100_000)
}

fn default_position_size() -> Decimal {
    Decimal::new(5, 2) // 5%
}

fn default_hold_cycles() -> u64 {
    5
}

fn default_cooldown_cycles() -> u64 {
    3
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            initial_equity: default_initial_equity(),
            position_size: default_position_size(),
            hold_cycles: default_hold_cycles(),
            cooldown_cycles: default_cooldown_cycles(),
        }
    }
}

/// Top-level configuration, one TOML section per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub risk: RiskCheckersConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub claims: ClaimPolicyConfig,
    #[serde(default)]
    pub arbitration: ArbitrationConfig,
    #[serde(default)]
    pub witnesses: WitnessSetConfig,
    #[serde(default)]
    pub registry: HealthTrackingConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub trading: TradingConfig,
}

impl AppConfig {
    /// Load from a specific file and validate.
    pub fn from_file(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            return Err(AppError::Config(format!("Config file not found: {path}")));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate().map_err(AppError::Config)?;
        Ok(config)
    }

    /// Check ranges across every section.
    pub fn validate(&self) -> Result<(), String> {
        self.risk.validate()?;
        self.recovery.validate()?;
        self.arbitration.validate()?;
        self.witnesses.validate()?;
        self.feed.validate()?;

        let floor = self.claims.confidence_floor;
        if floor < Decimal::ZERO || floor > Decimal::ONE {
            return Err(format!(
                "claims.confidence_floor ({floor}) must be within [0, 1]"
            ));
        }
        if self.registry.window_size == 0 {
            return Err("registry.window_size must be positive".to_string());
        }
        if self.trading.initial_equity <= Decimal::ZERO {
            return Err(format!(
                "trading.initial_equity ({}) must be positive",
                self.trading.initial_equity
            ));
        }
        if self.trading.position_size <= Decimal::ZERO || self.trading.position_size > Decimal::ONE
        {
            return Err(format!(
                "trading.position_size ({}) must be within (0, 1]",
                self.trading.position_size
            ));
        }
        if self.trading.hold_cycles == 0 {
            return Err("trading.hold_cycles must be positive".to_string());
        }
        Ok(())
    }
}
