//! In-memory witness registry.
//!
//! Holds one `WitnessHealth` per witness, keyed by id. A witness's tier is
//! fixed at first registration. Outcome recording keeps a rolling window per
//! witness and re-derives win rate, grade and sample count from it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warden_core::{clamp_weight, Grade, WitnessHealth, WitnessStatus};

use crate::error::{RegistryError, RegistryResult};

/// Read interface over witness metadata.
///
/// The regime-risk checker and the orchestrator consume this; neither writes.
pub trait WitnessHealthProvider: Send + Sync {
    fn get(&self, witness_id: &str) -> Option<WitnessHealth>;

    fn list_active(&self) -> Vec<WitnessHealth>;
}

/// Rolling outcome tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthTrackingConfig {
    /// Number of recent outcomes kept per witness.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Mute a witness automatically when it falls to grade D.
    #[serde(default)]
    pub auto_mute: bool,

    /// Minimum samples before auto-mute can trigger.
    #[serde(default = "default_min_samples")]
    pub min_samples_to_mute: u32,
}

fn default_window_size() -> usize {
    50
}

fn default_min_samples() -> u32 {
    20
}

impl Default for HealthTrackingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            auto_mute: false,
            min_samples_to_mute: default_min_samples(),
        }
    }
}

/// Registry entry with change tracking.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub health: WitnessHealth,
    pub last_update: DateTime<Utc>,
    pub version: u64,
    outcomes: VecDeque<bool>,
}

impl RegistryEntry {
    fn new(health: WitnessHealth) -> Self {
        Self {
            health,
            last_update: Utc::now(),
            version: 1,
            outcomes: VecDeque::new(),
        }
    }

    fn touch(&mut self) {
        self.last_update = Utc::now();
        self.version += 1;
    }
}

/// DashMap-backed witness registry.
pub struct WitnessRegistry {
    entries: DashMap<String, RegistryEntry>,
    config: HealthTrackingConfig,
}

impl Default for WitnessRegistry {
    fn default() -> Self {
        Self::new(HealthTrackingConfig::default())
    }
}

impl WitnessRegistry {
    pub fn new(config: HealthTrackingConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Register or refresh a witness.
    ///
    /// Re-registering with a different tier is rejected: tiers never change.
    pub fn upsert(&self, health: WitnessHealth) -> RegistryResult<()> {
        if let Some(mut existing) = self.entries.get_mut(&health.witness_id) {
            if existing.health.tier != health.tier {
                return Err(RegistryError::TierChange {
                    witness_id: health.witness_id.clone(),
                    existing: existing.health.tier,
                    requested: health.tier,
                });
            }
            existing.health = health;
            existing.touch();
            return Ok(());
        }

        info!(
            witness_id = %health.witness_id,
            tier = %health.tier,
            weight = %health.weight,
            "Witness registered"
        );
        self.entries
            .insert(health.witness_id.clone(), RegistryEntry::new(health));
        Ok(())
    }

    pub fn entry(&self, witness_id: &str) -> Option<RegistryEntry> {
        self.entries.get(witness_id).map(|e| e.clone())
    }

    pub fn mute(&self, witness_id: &str) -> RegistryResult<()> {
        self.set_status(witness_id, WitnessStatus::Muted)
    }

    pub fn activate(&self, witness_id: &str) -> RegistryResult<()> {
        self.set_status(witness_id, WitnessStatus::Active)
    }

    fn set_status(&self, witness_id: &str, status: WitnessStatus) -> RegistryResult<()> {
        let mut entry = self
            .entries
            .get_mut(witness_id)
            .ok_or_else(|| RegistryError::WitnessNotFound(witness_id.to_string()))?;
        if entry.health.status != status {
            info!(witness_id, %status, "Witness status changed");
            entry.health.status = status;
            entry.touch();
        }
        Ok(())
    }

    /// Set a witness's arbitration weight (clamped to [0.1, 0.9]).
    pub fn set_weight(&self, witness_id: &str, weight: Decimal) -> RegistryResult<Decimal> {
        let mut entry = self
            .entries
            .get_mut(witness_id)
            .ok_or_else(|| RegistryError::WitnessNotFound(witness_id.to_string()))?;
        let clamped = clamp_weight(weight);
        entry.health.weight = clamped;
        entry.touch();
        Ok(clamped)
    }

    /// Record a trade outcome attributed to a witness.
    ///
    /// Returns the witness's grade after the update.
    pub fn record_outcome(&self, witness_id: &str, is_win: bool) -> RegistryResult<Grade> {
        let mut entry = self
            .entries
            .get_mut(witness_id)
            .ok_or_else(|| RegistryError::WitnessNotFound(witness_id.to_string()))?;

        entry.outcomes.push_back(is_win);
        while entry.outcomes.len() > self.config.window_size.max(1) {
            entry.outcomes.pop_front();
        }

        let samples = entry.outcomes.len();
        let wins = entry.outcomes.iter().filter(|w| **w).count();
        let win_rate = Decimal::from(wins) / Decimal::from(samples);

        entry.health.win_rate = win_rate;
        entry.health.sample_count = samples as u32;
        entry.health.grade = Grade::from_win_rate(win_rate);
        entry.touch();

        let grade = entry.health.grade;
        if self.config.auto_mute
            && grade == Grade::D
            && entry.health.sample_count >= self.config.min_samples_to_mute
            && entry.health.status == WitnessStatus::Active
        {
            warn!(
                witness_id,
                win_rate = %win_rate,
                samples,
                "Witness auto-muted on grade D"
            );
            entry.health.status = WitnessStatus::Muted;
        }

        Ok(grade)
    }

    pub fn list_all(&self) -> Vec<WitnessHealth> {
        let mut all: Vec<_> = self.entries.iter().map(|e| e.health.clone()).collect();
        all.sort_by(|a, b| a.witness_id.cmp(&b.witness_id));
        all
    }

    pub fn remove(&self, witness_id: &str) -> Option<WitnessHealth> {
        self.entries.remove(witness_id).map(|(_, e)| e.health)
    }

    pub fn contains(&self, witness_id: &str) -> bool {
        self.entries.contains_key(witness_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WitnessHealthProvider for WitnessRegistry {
    fn get(&self, witness_id: &str) -> Option<WitnessHealth> {
        self.entries.get(witness_id).map(|e| e.health.clone())
    }

    fn list_active(&self) -> Vec<WitnessHealth> {
        self.list_all()
            .into_iter()
            .filter(WitnessHealth::is_active)
            .collect()
    }
}
