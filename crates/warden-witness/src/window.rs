//! High trading window detection.
//!
//! Advisory signal: several independent witnesses agree on one direction and
//! none disagree.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use warden_core::{Claim, Direction};

/// High trading window thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Distinct agreeing witnesses needed.
    #[serde(default = "default_min_witnesses")]
    pub min_witnesses: usize,
    /// Confidence bonus per agreeing witness beyond the minimum.
    #[serde(default = "default_count_bonus")]
    pub count_bonus: Decimal,
    /// Weight used for witnesses without a registry entry.
    #[serde(default = "default_weight")]
    pub default_weight: Decimal,
}

fn default_min_witnesses() -> usize {
    2
}

fn default_count_bonus() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_weight() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            min_witnesses: default_min_witnesses(),
            count_bonus: default_count_bonus(),
            default_weight: default_weight(),
        }
    }
}

/// Result of a high trading window check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSignal {
    pub active: bool,
    pub direction: Option<Direction>,
    pub confidence: Decimal,
    pub supporting_witnesses: Vec<String>,
}

impl WindowSignal {
    fn inactive() -> Self {
        Self {
            active: false,
            direction: None,
            confidence: Decimal::ZERO,
            supporting_witnesses: Vec::new(),
        }
    }
}

/// Evaluate directional `claims`, each paired with its author's weight.
///
/// A witness counts once, with its most confident claim.
pub fn evaluate_window(claims: &[(Claim, Decimal)], config: &WindowConfig) -> WindowSignal {
    let mut best: BTreeMap<&str, (&Claim, Decimal)> = BTreeMap::new();
    for (claim, weight) in claims {
        if claim.is_veto() || claim.direction().is_none() {
            continue;
        }
        let entry = best
            .entry(claim.strategy_id())
            .or_insert((claim, *weight));
        if claim.confidence() > entry.0.confidence() {
            *entry = (claim, *weight);
        }
    }

    let mut longs = Vec::new();
    let mut shorts = Vec::new();
    for (id, (claim, weight)) in &best {
        match claim.direction() {
            Some(Direction::Long) => longs.push((*id, *claim, *weight)),
            Some(Direction::Short) => shorts.push((*id, *claim, *weight)),
            None => {}
        }
    }

    let (direction, agreeing) = match (longs.is_empty(), shorts.is_empty()) {
        (false, true) => (Direction::Long, longs),
        (true, false) => (Direction::Short, shorts),
        _ => return WindowSignal::inactive(),
    };

    let n = agreeing.len();
    if n < config.min_witnesses.max(1) {
        return WindowSignal::inactive();
    }

    let total_weight: Decimal = agreeing.iter().map(|(_, _, w)| *w).sum();
    if total_weight.is_zero() {
        return WindowSignal::inactive();
    }
    let weighted: Decimal = agreeing
        .iter()
        .map(|(_, c, w)| c.confidence() * *w)
        .sum();
    let mean = weighted / total_weight;
    let extra = Decimal::from(n - config.min_witnesses.max(1));
    let confidence = (mean * (Decimal::ONE + config.count_bonus * extra)).min(Decimal::ONE);

    WindowSignal {
        active: true,
        direction: Some(direction),
        confidence,
        supporting_witnesses: agreeing.iter().map(|(id, _, _)| id.to_string()).collect(),
    }
}
