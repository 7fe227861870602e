//! Witness metadata: tier, status, grade and health snapshot.

use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authority class of a witness. Fixed at registration.
///
/// Ordered by authority, not severity: `Tier1` outranks `Tier2` in
/// dominant-claim tie-breaks. `Tier3` never votes on direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Core, directional.
    #[serde(rename = "TIER_1")]
    Tier1,
    /// Auxiliary, confirmatory.
    #[serde(rename = "TIER_2")]
    Tier2,
    /// Veto-only.
    #[serde(rename = "TIER_3")]
    Tier3,
}

impl Tier {
    pub fn has_veto_power(&self) -> bool {
        matches!(self, Self::Tier3)
    }

    pub fn is_core(&self) -> bool {
        matches!(self, Self::Tier1)
    }

    /// Whether claims from this tier may carry a direction.
    pub fn is_directional(&self) -> bool {
        !self.has_veto_power()
    }

    /// Rank used for tie-breaks (lower is stronger).
    pub fn authority_rank(&self) -> u8 {
        match self {
            Self::Tier1 => 1,
            Self::Tier2 => 2,
            Self::Tier3 => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tier1 => write!(f, "TIER_1"),
            Self::Tier2 => write!(f, "TIER_2"),
            Self::Tier3 => write!(f, "TIER_3"),
        }
    }
}

/// Whether a witness participates in generation and resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WitnessStatus {
    Active,
    Muted,
}

impl fmt::Display for WitnessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Muted => write!(f, "MUTED"),
        }
    }
}

/// Letter grade of a witness's recent performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    /// Grade a win rate.
    ///
    /// A ≥ 0.60, B ≥ 0.52, C ≥ 0.45, otherwise D.
    pub fn from_win_rate(win_rate: Decimal) -> Self {
        if win_rate >= Decimal::new(60, 2) {
            Self::A
        } else if win_rate >= Decimal::new(52, 2) {
            Self::B
        } else if win_rate >= Decimal::new(45, 2) {
            Self::C
        } else {
            Self::D
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        };
        f.write_str(s)
    }
}

/// Lower bound of a witness weight.
pub const MIN_WEIGHT: Decimal = Decimal::from_parts(1, 0, 0, false, 1);
/// Upper bound of a witness weight.
pub const MAX_WEIGHT: Decimal = Decimal::from_parts(9, 0, 0, false, 1);

/// Health snapshot of a single witness.
///
/// Owned by the health-tracking collaborator; everything else reads copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessHealth {
    pub witness_id: String,
    pub tier: Tier,
    pub status: WitnessStatus,
    pub grade: Grade,
    /// Fraction of winning outcomes, 0.0-1.0.
    pub win_rate: Decimal,
    pub sample_count: u32,
    /// Arbitration weight, clamped to [0.1, 0.9].
    pub weight: Decimal,
}

impl WitnessHealth {
    /// Create a health record. The weight is clamped into range and the
    /// grade derived from the win rate.
    pub fn new(
        witness_id: impl Into<String>,
        tier: Tier,
        win_rate: Decimal,
        sample_count: u32,
        weight: Decimal,
    ) -> Result<Self> {
        let witness_id = witness_id.into();
        if witness_id.is_empty() {
            return Err(CoreError::InvalidWitnessHealth(
                "witness_id must not be empty".to_string(),
            ));
        }
        if win_rate < Decimal::ZERO || win_rate > Decimal::ONE {
            return Err(CoreError::InvalidWitnessHealth(format!(
                "win_rate {win_rate} outside [0, 1]"
            )));
        }

        Ok(Self {
            witness_id,
            tier,
            status: WitnessStatus::Active,
            grade: Grade::from_win_rate(win_rate),
            win_rate,
            sample_count,
            weight: clamp_weight(weight),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == WitnessStatus::Active
    }

    pub fn with_status(mut self, status: WitnessStatus) -> Self {
        self.status = status;
        self
    }
}

/// Clamp a weight into `[MIN_WEIGHT, MAX_WEIGHT]`.
pub fn clamp_weight(weight: Decimal) -> Decimal {
    weight.max(MIN_WEIGHT).min(MAX_WEIGHT)
}
