//! Claims: a witness's typed, time-bounded opinion.
//!
//! A `Claim` is frozen once built. Confidence and validity window are
//! validated by [`ClaimBuilder::build`] and never change afterwards.

use crate::error::{CoreError, Result};
use crate::regime::TradeRegime;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Constraint key carrying the regime tag.
pub const REGIME_CONSTRAINT: &str = "regime";

/// Closed whitelist of claim kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
    MarketEligible,
    MarketNotEligible,
    RegimeMatched,
    RegimeConflict,
    ExecutionVeto,
}

impl ClaimType {
    pub const ALL: [ClaimType; 5] = [
        ClaimType::MarketEligible,
        ClaimType::MarketNotEligible,
        ClaimType::RegimeMatched,
        ClaimType::RegimeConflict,
        ClaimType::ExecutionVeto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketEligible => "MARKET_ELIGIBLE",
            Self::MarketNotEligible => "MARKET_NOT_ELIGIBLE",
            Self::RegimeMatched => "REGIME_MATCHED",
            Self::RegimeConflict => "REGIME_CONFLICT",
            Self::ExecutionVeto => "EXECUTION_VETO",
        }
    }

    /// Claims that argue for trading.
    pub fn is_affirmative(&self) -> bool {
        matches!(self, Self::MarketEligible | Self::RegimeMatched)
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownClaimType(s.to_string()))
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(CoreError::InvalidClaim(format!("unknown direction: {other}"))),
        }
    }
}

/// A frozen trading opinion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claim {
    strategy_id: String,
    claim_type: ClaimType,
    confidence: Decimal,
    validity_window_secs: i64,
    direction: Option<Direction>,
    constraints: BTreeMap<String, String>,
    timestamp: DateTime<Utc>,
}

impl Claim {
    /// Start building a claim for a witness.
    pub fn builder(strategy_id: impl Into<String>, claim_type: ClaimType) -> ClaimBuilder {
        ClaimBuilder::new(strategy_id, claim_type)
    }

    pub fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    pub fn claim_type(&self) -> ClaimType {
        self.claim_type
    }

    pub fn confidence(&self) -> Decimal {
        self.confidence
    }

    pub fn validity_window_secs(&self) -> i64 {
        self.validity_window_secs
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn constraints(&self) -> &BTreeMap<String, String> {
        &self.constraints
    }

    pub fn constraint(&self, key: &str) -> Option<&str> {
        self.constraints.get(key).map(String::as_str)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Instant after which the claim is expired. Saturates at the latest
    /// representable instant for windows beyond chrono's range.
    pub fn expires_at(&self) -> DateTime<Utc> {
        Duration::try_seconds(self.validity_window_secs)
            .and_then(|window| self.timestamp.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Expired when `now > timestamp + validity_window`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Regime declared in the claim's constraints, if any.
    pub fn regime(&self) -> Option<TradeRegime> {
        self.constraint(REGIME_CONSTRAINT).map(TradeRegime::from_tag)
    }

    pub fn is_veto(&self) -> bool {
        self.claim_type == ClaimType::ExecutionVeto
    }
}

/// Wire form used when claims arrive as JSON. Converting into a `Claim`
/// re-runs every construction check.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClaim {
    pub strategy_id: String,
    pub claim_type: String,
    pub confidence: Decimal,
    pub validity_window: i64,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub constraints: BTreeMap<String, String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<RawClaim> for Claim {
    type Error = CoreError;

    fn try_from(raw: RawClaim) -> Result<Self> {
        let claim_type = raw.claim_type.parse::<ClaimType>()?;
        let mut builder = Claim::builder(raw.strategy_id, claim_type)
            .confidence(raw.confidence)
            .validity_secs(raw.validity_window);
        if let Some(direction) = raw.direction {
            builder = builder.direction(direction);
        }
        if let Some(ts) = raw.timestamp {
            builder = builder.timestamp(ts);
        }
        for (k, v) in raw.constraints {
            builder = builder.constraint(k, v);
        }
        builder.build()
    }
}

/// Builder for [`Claim`].
#[derive(Debug, Clone)]
pub struct ClaimBuilder {
    strategy_id: String,
    claim_type: ClaimType,
    confidence: Decimal,
    validity_window_secs: i64,
    direction: Option<Direction>,
    constraints: BTreeMap<String, String>,
    timestamp: Option<DateTime<Utc>>,
}

impl ClaimBuilder {
    fn new(strategy_id: impl Into<String>, claim_type: ClaimType) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            claim_type,
            confidence: Decimal::ZERO,
            validity_window_secs: 0,
            direction: None,
            constraints: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn validity_secs(mut self, secs: i64) -> Self {
        self.validity_window_secs = secs;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn regime(self, regime: &TradeRegime) -> Self {
        self.constraint(REGIME_CONSTRAINT, regime.tag())
    }

    pub fn constraint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    /// Override the creation time (defaults to now).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validate and freeze the claim.
    pub fn build(self) -> Result<Claim> {
        if self.strategy_id.is_empty() {
            return Err(CoreError::InvalidClaim(
                "strategy_id must not be empty".to_string(),
            ));
        }
        if self.confidence < Decimal::ZERO || self.confidence > Decimal::ONE {
            return Err(CoreError::InvalidClaim(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if self.validity_window_secs <= 0 {
            return Err(CoreError::InvalidClaim(format!(
                "validity_window must be positive, got {}",
                self.validity_window_secs
            )));
        }
        if self.claim_type == ClaimType::ExecutionVeto && self.direction.is_some() {
            return Err(CoreError::InvalidClaim(
                "EXECUTION_VETO claims carry no direction".to_string(),
            ));
        }

        Ok(Claim {
            strategy_id: self.strategy_id,
            claim_type: self.claim_type,
            confidence: self.confidence,
            validity_window_secs: self.validity_window_secs,
            direction: self.direction,
            constraints: self.constraints,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        })
    }
}
