//! Unlock path and degraded mode.
//!
//! A locked engine can be released two ways: `request_unlock`, gated on lock
//! age and a calm re-evaluation, or `manual_unlock`, an operator override that
//! skips the age gate. Both leave the system in degraded mode with a reduced
//! position limit. Degraded mode ends only through `complete_recovery`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warden_core::{RiskContext, RiskLevel};

use crate::engine::RiskControlEngine;
use crate::error::{RiskError, RiskResult};

// ============================================================================
// RecoveryConfig
// ============================================================================

/// Recovery gating configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Minimum time a lock must be held before `request_unlock` can succeed.
    #[serde(default = "default_min_lock_duration_secs")]
    pub min_lock_duration_secs: i64,
    /// Position multiplier while degraded.
    #[serde(default = "default_degraded_position_ratio")]
    pub degraded_position_ratio: Decimal,
    /// Time degraded mode must last before `complete_recovery` can succeed.
    #[serde(default = "default_healthy_period_secs")]
    pub healthy_period_secs: i64,
}

/// Upper bound for the recovery periods (one year).
const MAX_PERIOD_SECS: i64 = 365 * 24 * 3600;

fn default_min_lock_duration_secs() -> i64 {
    4 * 3600
}

fn default_degraded_position_ratio() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_healthy_period_secs() -> i64 {
    24 * 3600
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            min_lock_duration_secs: default_min_lock_duration_secs(),
            degraded_position_ratio: default_degraded_position_ratio(),
            healthy_period_secs: default_healthy_period_secs(),
        }
    }
}

impl RecoveryConfig {
    pub fn min_lock_duration(&self) -> Duration {
        Duration::try_seconds(self.min_lock_duration_secs).unwrap_or(Duration::MAX)
    }

    pub fn healthy_period(&self) -> Duration {
        Duration::try_seconds(self.healthy_period_secs).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0..=MAX_PERIOD_SECS).contains(&self.min_lock_duration_secs) {
            return Err(format!(
                "recovery.min_lock_duration_secs must be in 0..={MAX_PERIOD_SECS}"
            ));
        }
        if !(0..=MAX_PERIOD_SECS).contains(&self.healthy_period_secs) {
            return Err(format!(
                "recovery.healthy_period_secs must be in 0..={MAX_PERIOD_SECS}"
            ));
        }
        if self.degraded_position_ratio <= Decimal::ZERO
            || self.degraded_position_ratio > Decimal::ONE
        {
            return Err(format!(
                "recovery.degraded_position_ratio ({}) must be in (0, 1]",
                self.degraded_position_ratio
            ));
        }
        Ok(())
    }
}

// ============================================================================
// UnlockRecord
// ============================================================================

/// Audit entry for an engine unlock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnlockRecord {
    pub actor: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub manual: bool,
}

#[derive(Debug)]
struct RecoveryState {
    degraded_since: Option<DateTime<Utc>>,
    position_limit_ratio: Decimal,
    unlock_log: Vec<UnlockRecord>,
}

// ============================================================================
// RecoveryManager
// ============================================================================

/// Governs unlocks of a shared `RiskControlEngine` and the degraded mode that
/// follows them.
pub struct RecoveryManager {
    engine: Arc<RiskControlEngine>,
    config: RecoveryConfig,
    state: Mutex<RecoveryState>,
}

impl RecoveryManager {
    pub fn new(engine: Arc<RiskControlEngine>, config: RecoveryConfig) -> Self {
        Self {
            engine,
            config,
            state: Mutex::new(RecoveryState {
                degraded_since: None,
                position_limit_ratio: Decimal::ONE,
                unlock_log: Vec::new(),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<RiskControlEngine> {
        &self.engine
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Automatic unlock attempt. Returns false, leaving the lock in place,
    /// when the engine is not locked, the lock is too young, or `context`
    /// still evaluates to `RISK_LOCKED`.
    pub fn request_unlock(&self, context: &RiskContext) -> bool {
        self.request_unlock_at(context, Utc::now())
    }

    pub fn request_unlock_at(&self, context: &RiskContext, now: DateTime<Utc>) -> bool {
        let Some(locked_at) = self.engine.locked_at() else {
            info!("Unlock requested but engine is not locked");
            return false;
        };

        let held = now - locked_at;
        if held < self.config.min_lock_duration() {
            info!(
                held_secs = held.num_seconds(),
                required_secs = self.config.min_lock_duration_secs,
                "Unlock denied: lock held too briefly"
            );
            return false;
        }

        let reevaluated = self.engine.evaluate(context);
        if reevaluated.level == RiskLevel::RiskLocked {
            info!(reason = %reevaluated.reason, "Unlock denied: conditions still at RISK_LOCKED");
            return false;
        }

        self.unlock(
            UnlockRecord {
                actor: "system".to_string(),
                reason: format!("automatic unlock after {}s", held.num_seconds()),
                timestamp: now,
                manual: false,
            },
            now,
        );
        true
    }

    /// Operator override. Skips the lock-age gate; always audited.
    pub fn manual_unlock(&self, actor: &str, reason: &str) -> RiskResult<()> {
        self.manual_unlock_at(actor, reason, Utc::now())
    }

    pub fn manual_unlock_at(&self, actor: &str, reason: &str, now: DateTime<Utc>) -> RiskResult<()> {
        if actor.trim().is_empty() {
            return Err(RiskError::RecoveryRefused(
                "manual unlock requires an actor".to_string(),
            ));
        }
        if !self.engine.is_locked() {
            return Err(RiskError::RecoveryRefused(
                "engine is not locked".to_string(),
            ));
        }

        warn!(actor, reason, "MANUAL UNLOCK");
        self.unlock(
            UnlockRecord {
                actor: actor.to_string(),
                reason: reason.to_string(),
                timestamp: now,
                manual: true,
            },
            now,
        );
        Ok(())
    }

    fn unlock(&self, record: UnlockRecord, now: DateTime<Utc>) {
        self.engine.reset_to_normal();

        let mut state = self.state.lock();
        state.degraded_since = Some(now);
        state.position_limit_ratio = self.config.degraded_position_ratio;
        info!(
            actor = %record.actor,
            manual = record.manual,
            position_limit_ratio = %state.position_limit_ratio,
            "Engine unlocked, entering degraded mode"
        );
        state.unlock_log.push(record);
    }

    /// Leave degraded mode. Requires `healthy_period` in degraded mode and a
    /// `NORMAL` evaluation of `context`.
    pub fn complete_recovery(&self, context: &RiskContext) -> bool {
        self.complete_recovery_at(context, Utc::now())
    }

    pub fn complete_recovery_at(&self, context: &RiskContext, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        let Some(since) = state.degraded_since else {
            return false;
        };

        if now - since < self.config.healthy_period() {
            info!(
                degraded_secs = (now - since).num_seconds(),
                required_secs = self.config.healthy_period_secs,
                "Recovery denied: healthy period not elapsed"
            );
            return false;
        }

        if self.engine.is_locked() {
            info!("Recovery denied: engine locked again");
            return false;
        }

        let result = self.engine.evaluate(context);
        if result.level != RiskLevel::Normal {
            info!(level = %result.level, reason = %result.reason, "Recovery denied: not NORMAL");
            return false;
        }

        state.degraded_since = None;
        state.position_limit_ratio = Decimal::ONE;
        info!("Recovery complete, full position limit restored");
        true
    }

    pub fn is_degraded(&self) -> bool {
        self.state.lock().degraded_since.is_some()
    }

    pub fn degraded_since(&self) -> Option<DateTime<Utc>> {
        self.state.lock().degraded_since
    }

    pub fn position_limit_ratio(&self) -> Decimal {
        self.state.lock().position_limit_ratio
    }

    /// Scale a requested position by the current limit ratio.
    pub fn adjusted_position(&self, requested: Decimal) -> Decimal {
        requested * self.position_limit_ratio()
    }

    pub fn unlock_log(&self) -> Vec<UnlockRecord> {
        self.state.lock().unlock_log.clone()
    }
}
