//! Claim arbitration.
//!
//! Resolves one batch of claims, already filtered to active registered
//! witnesses, in strict order: veto, empty, TIER_1 directional conflict,
//! dominant claim. Only affirmative claims with a direction can dominate.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use warden_core::{Claim, Direction, Tier, WitnessHealth};

/// How a batch was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Vetoed,
    NoConflict,
    RegimeUnclear,
    DominantSelected,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vetoed => "VETOED",
            Self::NoConflict => "NO_CONFLICT",
            Self::RegimeUnclear => "REGIME_UNCLEAR",
            Self::DominantSelected => "DOMINANT_SELECTED",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of aggregating one batch of claims.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub resolution: Resolution,
    pub dominant_claim: Option<Claim>,
    pub direction: Option<Direction>,
    pub is_tradeable: bool,
    pub reason: String,
    /// Claims that took part after filtering.
    pub considered: usize,
    /// Witness ids whose claims were dropped (muted or unknown).
    pub excluded: Vec<String>,
    /// Witness ids that vetoed, when vetoed.
    pub vetoed_by: Vec<String>,
}

impl AggregationResult {
    fn blocked(resolution: Resolution, reason: impl Into<String>) -> Self {
        Self {
            resolution,
            dominant_claim: None,
            direction: None,
            is_tradeable: false,
            reason: reason.into(),
            considered: 0,
            excluded: Vec::new(),
            vetoed_by: Vec::new(),
        }
    }
}

/// A claim paired with its author's registry entry.
#[derive(Debug, Clone)]
pub struct RankedClaim {
    pub claim: Claim,
    pub health: WitnessHealth,
}

/// Resolve a filtered batch.
pub fn resolve(entries: &[RankedClaim]) -> AggregationResult {
    let vetoed_by: Vec<String> = entries
        .iter()
        .filter(|e| e.health.tier.has_veto_power() && e.claim.is_veto())
        .map(|e| e.health.witness_id.clone())
        .collect();
    if !vetoed_by.is_empty() {
        let mut result = AggregationResult::blocked(
            Resolution::Vetoed,
            format!("vetoed by {}", vetoed_by.join(", ")),
        );
        result.considered = entries.len();
        result.vetoed_by = vetoed_by;
        return result;
    }

    if entries.is_empty() {
        return AggregationResult::blocked(Resolution::NoConflict, "no claims");
    }

    let core_directions: Vec<Direction> = entries
        .iter()
        .filter(|e| e.health.tier == Tier::Tier1)
        .filter_map(|e| e.claim.direction())
        .collect();
    let has_long = core_directions.contains(&Direction::Long);
    let has_short = core_directions.contains(&Direction::Short);
    if has_long && has_short {
        let mut result = AggregationResult::blocked(
            Resolution::RegimeUnclear,
            "TIER_1 witnesses disagree on direction",
        );
        result.considered = entries.len();
        return result;
    }

    let dominant = entries
        .iter()
        .filter(|e| e.health.tier.is_directional())
        .filter(|e| e.claim.claim_type().is_affirmative() && e.claim.direction().is_some())
        .max_by(|a, b| rank(a, b));

    let Some(dominant) = dominant else {
        let mut result = AggregationResult::blocked(
            Resolution::NoConflict,
            "no affirmative directional claims",
        );
        result.considered = entries.len();
        return result;
    };

    let claim = dominant.claim.clone();
    AggregationResult {
        resolution: Resolution::DominantSelected,
        direction: claim.direction(),
        is_tradeable: true,
        reason: format!(
            "{} {} at {}",
            claim.strategy_id(),
            claim.claim_type(),
            claim.confidence()
        ),
        dominant_claim: Some(claim),
        considered: entries.len(),
        excluded: Vec::new(),
        vetoed_by: Vec::new(),
    }
}

/// Confidence, then TIER_1 over TIER_2, then weight, then the lower id.
fn rank(a: &RankedClaim, b: &RankedClaim) -> Ordering {
    a.claim
        .confidence()
        .cmp(&b.claim.confidence())
        .then_with(|| b.health.tier.authority_rank().cmp(&a.health.tier.authority_rank()))
        .then_with(|| a.health.weight.cmp(&b.health.weight))
        .then_with(|| b.health.witness_id.cmp(&a.health.witness_id))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rust_decimal::Decimal;
    use warden_core::ClaimType;

    pub fn claim(id: &str, kind: ClaimType, confidence: Decimal, dir: Option<Direction>) -> Claim {
        let mut builder = Claim::builder(id, kind)
            .confidence(confidence)
            .validity_secs(60);
        if let Some(d) = dir {
            builder = builder.direction(d);
        }
        builder.build().unwrap()
    }

    pub fn health(id: &str, tier: Tier, weight: Decimal) -> WitnessHealth {
        WitnessHealth::new(id, tier, Decimal::new(55, 2), 0, weight).unwrap()
    }

    pub fn ranked(
        id: &str,
        tier: Tier,
        kind: ClaimType,
        confidence: Decimal,
        dir: Option<Direction>,
    ) -> RankedClaim {
        RankedClaim {
            claim: claim(id, kind, confidence, dir),
            health: health(id, tier, Decimal::new(5, 1)),
        }
    }
}
