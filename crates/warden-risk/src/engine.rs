//! Risk control engine.
//!
//! Runs the checker chain against a `RiskContext` and holds the engine's
//! sticky state: a lock that only an explicit reset clears, and a forced
//! cooldown that only `clear_cooldown` or a reset clears.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use warden_core::{RiskCheckResult, RiskContext, RiskLevel};

use crate::checkers::{default_chain, RiskChecker, RiskCheckersConfig};
use crate::error::{RiskError, RiskResult};

// ============================================================================
// EngineState
// ============================================================================

#[derive(Debug, Default)]
struct EngineState {
    level: RiskLevel,
    forced_cooldown: Option<String>,
    lock_reason: Option<String>,
    locked_at: Option<DateTime<Utc>>,
    last_evaluated_at: Option<DateTime<Utc>>,
}

impl EngineState {
    fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub level: RiskLevel,
    pub locked: bool,
    pub cooldown: bool,
    pub lock_reason: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub cooldown_reason: Option<String>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub checkers: Vec<String>,
}

// ============================================================================
// RiskControlEngine
// ============================================================================

/// Ordered checker chain plus sticky lock/cooldown state.
///
/// Thread-safe: share via `Arc<RiskControlEngine>`. All state transitions
/// happen under one mutex, so concurrent evaluations that both reach
/// `RISK_LOCKED` lock exactly once.
pub struct RiskControlEngine {
    checkers: RwLock<Vec<Arc<dyn RiskChecker>>>,
    state: Mutex<EngineState>,
}

impl Default for RiskControlEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskControlEngine {
    /// Engine with an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checkers: RwLock::new(Vec::new()),
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Engine with the five default checkers.
    #[must_use]
    pub fn with_default_chain(config: &RiskCheckersConfig) -> Self {
        let engine = Self::new();
        *engine.checkers.write() = default_chain(config);
        engine
    }

    /// Validate `config` and build the default chain from it.
    pub fn from_config(config: &RiskCheckersConfig) -> RiskResult<Self> {
        config.validate().map_err(RiskError::ConfigError)?;
        Ok(Self::with_default_chain(config))
    }

    /// Append a checker. Names must be unique.
    pub fn add_checker(&self, checker: Arc<dyn RiskChecker>) -> RiskResult<()> {
        let mut checkers = self.checkers.write();
        if checkers.iter().any(|c| c.name() == checker.name()) {
            return Err(RiskError::DuplicateChecker(checker.name().to_string()));
        }
        debug!(checker = checker.name(), "Risk checker added");
        checkers.push(checker);
        Ok(())
    }

    /// Remove a checker by name. Returns whether it was present.
    pub fn remove_checker(&self, name: &str) -> bool {
        let mut checkers = self.checkers.write();
        let before = checkers.len();
        checkers.retain(|c| c.name() != name);
        let removed = checkers.len() != before;
        if removed {
            debug!(checker = name, "Risk checker removed");
        }
        removed
    }

    pub fn checker_names(&self) -> Vec<String> {
        self.checkers
            .read()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Run the chain without touching engine state.
    ///
    /// The aggregate level is the maximum over all checkers. The reason comes
    /// from the highest-level checker, ties broken by checker name. Events
    /// from every checker are concatenated.
    pub fn evaluate(&self, context: &RiskContext) -> RiskCheckResult {
        let results: Vec<RiskCheckResult> = self
            .checkers
            .read()
            .iter()
            .map(|c| {
                let mut result = c.check(context);
                if result.checker.is_none() {
                    result.checker = Some(c.name().to_string());
                }
                result
            })
            .collect();
        aggregate(results)
    }

    /// Evaluate the chain and apply the result to engine state.
    ///
    /// While locked the chain is not consulted and every call is denied.
    pub fn check_permission(&self, context: &RiskContext) -> RiskCheckResult {
        self.check_permission_at(context, Utc::now())
    }

    pub fn check_permission_at(&self, context: &RiskContext, now: DateTime<Utc>) -> RiskCheckResult {
        if let Some(result) = self.locked_result() {
            return result;
        }

        let mut result = self.evaluate(context);

        let mut state = self.state.lock();
        state.last_evaluated_at = Some(now);

        // Another caller may have locked while the chain ran.
        if state.is_locked() {
            return locked_result(&state);
        }

        if result.level == RiskLevel::RiskLocked {
            state.level = RiskLevel::RiskLocked;
            state.lock_reason = Some(result.reason.clone());
            state.locked_at = Some(now);
            error!(reason = %result.reason, checker = ?result.checker, "RISK LOCK ENGAGED");
            return result;
        }

        if let Some(reason) = &state.forced_cooldown {
            if result.level < RiskLevel::Cooldown {
                result = RiskCheckResult {
                    approved: false,
                    level: RiskLevel::Cooldown,
                    reason: format!("forced cooldown: {reason}"),
                    events: result.events,
                    checker: None,
                };
            }
        }

        if state.level != result.level {
            info!(from = %state.level, to = %result.level, "Risk level changed");
        }
        state.level = result.level;
        result
    }

    /// Lock immediately, bypassing the checkers. No-op if already locked.
    pub fn force_lock(&self, reason: impl Into<String>) {
        self.force_lock_at(reason, Utc::now());
    }

    pub fn force_lock_at(&self, reason: impl Into<String>, now: DateTime<Utc>) {
        let reason = reason.into();
        let mut state = self.state.lock();
        if state.is_locked() {
            warn!(new_reason = %reason, "Engine already locked, ignoring force_lock");
            return;
        }
        state.level = RiskLevel::RiskLocked;
        state.lock_reason = Some(reason.clone());
        state.locked_at = Some(now);
        error!(reason = %reason, "RISK LOCK FORCED");
    }

    /// Enter a sticky cooldown. Ignored while locked.
    pub fn force_cooldown(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.lock();
        if state.is_locked() {
            warn!(reason = %reason, "Engine locked, ignoring force_cooldown");
            return;
        }
        warn!(reason = %reason, "Cooldown forced");
        state.level = state.level.max(RiskLevel::Cooldown);
        state.forced_cooldown = Some(reason);
    }

    /// Clear a forced cooldown. Does not unlock.
    pub fn clear_cooldown(&self) {
        let mut state = self.state.lock();
        if state.forced_cooldown.take().is_some() {
            info!("Forced cooldown cleared");
            if state.level == RiskLevel::Cooldown {
                state.level = RiskLevel::Normal;
            }
        }
    }

    /// Clear lock and cooldown unconditionally.
    pub fn reset_to_normal(&self) {
        let mut state = self.state.lock();
        warn!(
            previous_level = %state.level,
            previous_reason = ?state.lock_reason,
            "Risk engine reset to NORMAL"
        );
        state.level = RiskLevel::Normal;
        state.forced_cooldown = None;
        state.lock_reason = None;
        state.locked_at = None;
    }

    pub fn current_level(&self) -> RiskLevel {
        self.state.lock().level
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().is_locked()
    }

    pub fn is_cooldown(&self) -> bool {
        let state = self.state.lock();
        !state.is_locked() && (state.forced_cooldown.is_some() || state.level == RiskLevel::Cooldown)
    }

    pub fn lock_reason(&self) -> Option<String> {
        self.state.lock().lock_reason.clone()
    }

    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().locked_at
    }

    pub fn status(&self) -> EngineStatus {
        let checkers = self.checker_names();
        let state = self.state.lock();
        EngineStatus {
            level: state.level,
            locked: state.is_locked(),
            cooldown: !state.is_locked()
                && (state.forced_cooldown.is_some() || state.level == RiskLevel::Cooldown),
            lock_reason: state.lock_reason.clone(),
            locked_at: state.locked_at,
            cooldown_reason: state.forced_cooldown.clone(),
            last_evaluated_at: state.last_evaluated_at,
            checkers,
        }
    }

    fn locked_result(&self) -> Option<RiskCheckResult> {
        let state = self.state.lock();
        state.is_locked().then(|| locked_result(&state))
    }
}

fn locked_result(state: &EngineState) -> RiskCheckResult {
    let reason = state.lock_reason.as_deref().unwrap_or("unspecified");
    RiskCheckResult::at_level(RiskLevel::RiskLocked, format!("engine locked: {reason}"))
}

fn aggregate(results: Vec<RiskCheckResult>) -> RiskCheckResult {
    let level = results
        .iter()
        .map(|r| r.level)
        .max()
        .unwrap_or(RiskLevel::Normal);

    let dominant = results
        .iter()
        .filter(|r| r.level == level)
        .min_by(|a, b| a.checker.cmp(&b.checker));

    let (reason, checker) = match dominant {
        Some(r) if level > RiskLevel::Normal => (r.reason.clone(), r.checker.clone()),
        _ => ("all checks passed".to_string(), None),
    };

    let mut events: Vec<_> = results.into_iter().flat_map(|r| r.events).collect();
    events.sort_by(|a, b| b.level.cmp(&a.level));

    RiskCheckResult {
        approved: level.permits_trading(),
        level,
        reason,
        events,
        checker,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::{
        AccountRiskChecker, AccountRiskConfig, ExecutionRiskChecker, ExecutionRiskConfig,
    };
    use rust_decimal_macros::dec;

    fn engine() -> RiskControlEngine {
        RiskControlEngine::with_default_chain(&RiskCheckersConfig::default())
    }

    fn healthy() -> RiskContext {
        RiskContext::new(dec!(100000), dec!(100000)).unwrap()
    }

    fn crashing() -> RiskContext {
        RiskContext::new(dec!(75000), dec!(100000))
            .unwrap()
            .with_daily_pnl(dec!(-5000))
    }

    /// Always reports the configured level.
    struct Fixed {
        name: &'static str,
        level: RiskLevel,
    }

    impl RiskChecker for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn check(&self, _: &RiskContext) -> RiskCheckResult {
            RiskCheckResult::at_level(self.level, format!("{} says {}", self.name, self.level))
        }
    }

    #[test]
    fn test_healthy_context_approved() {
        let engine = engine();
        let result = engine.check_permission(&healthy());
        assert!(result.approved);
        assert_eq!(result.level, RiskLevel::Normal);
        assert_eq!(result.reason, "all checks passed");
        assert!(!engine.is_locked());
    }

    #[test]
    fn test_drawdown_scenario_locks() {
        let engine = engine();
        let result = engine.check_permission(&crashing());

        assert!(!result.approved);
        assert_eq!(result.level, RiskLevel::RiskLocked);
        assert_eq!(result.checker.as_deref(), Some("account"));
        assert!(result.events.iter().any(|e| e.event_type == "max_drawdown"));
        assert!(result.events.iter().any(|e| e.event_type == "daily_loss"));
        assert!(engine.is_locked());
        assert!(engine.locked_at().is_some());
        assert!(engine.lock_reason().unwrap().contains("drawdown"));
    }

    #[test]
    fn test_lock_is_sticky() {
        let engine = engine();
        engine.check_permission(&crashing());

        for _ in 0..3 {
            let result = engine.check_permission(&healthy());
            assert!(!result.approved);
            assert_eq!(result.level, RiskLevel::RiskLocked);
        }
        assert!(engine.is_locked());

        engine.reset_to_normal();
        assert!(!engine.is_locked());
        assert!(engine.check_permission(&healthy()).approved);
    }

    #[test]
    fn test_first_lock_reason_kept() {
        let engine = engine();
        let at = Utc::now();
        engine.force_lock_at("operator halt", at);
        engine.force_lock("second");
        engine.check_permission(&crashing());
        assert_eq!(engine.lock_reason().as_deref(), Some("operator halt"));
        assert_eq!(engine.locked_at(), Some(at));
    }

    #[test]
    fn test_check_permission_idempotent() {
        let engine = engine();
        let context = healthy().with_slippages_bps(vec![dec!(30)]);
        let a = engine.check_permission(&context);
        let b = engine.check_permission(&context);
        assert_eq!(a.level, b.level);
        assert_eq!(a.approved, b.approved);
        assert_eq!(a.reason, b.reason);
        assert_eq!(a.level, RiskLevel::Warning);
    }

    #[test]
    fn test_order_independent() {
        let forward = RiskControlEngine::new();
        forward
            .add_checker(Arc::new(Fixed { name: "alpha", level: RiskLevel::Cooldown }))
            .unwrap();
        forward
            .add_checker(Arc::new(Fixed { name: "beta", level: RiskLevel::Cooldown }))
            .unwrap();
        forward
            .add_checker(Arc::new(Fixed { name: "gamma", level: RiskLevel::Warning }))
            .unwrap();

        let reverse = RiskControlEngine::new();
        reverse
            .add_checker(Arc::new(Fixed { name: "gamma", level: RiskLevel::Warning }))
            .unwrap();
        reverse
            .add_checker(Arc::new(Fixed { name: "beta", level: RiskLevel::Cooldown }))
            .unwrap();
        reverse
            .add_checker(Arc::new(Fixed { name: "alpha", level: RiskLevel::Cooldown }))
            .unwrap();

        let a = forward.evaluate(&healthy());
        let b = reverse.evaluate(&healthy());
        assert_eq!(a.level, b.level);
        assert_eq!(a.reason, b.reason);
        assert_eq!(a.checker.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_duplicate_checker_rejected() {
        let engine = RiskControlEngine::new();
        engine
            .add_checker(Arc::new(AccountRiskChecker::new(AccountRiskConfig::default())))
            .unwrap();
        let err = engine
            .add_checker(Arc::new(AccountRiskChecker::new(AccountRiskConfig::default())))
            .unwrap_err();
        assert!(matches!(err, RiskError::DuplicateChecker(name) if name == "account"));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = RiskCheckersConfig::default();
        assert!(RiskControlEngine::from_config(&config).is_ok());
        config.position.max_position = dec!(2);
        assert!(matches!(
            RiskControlEngine::from_config(&config),
            Err(RiskError::ConfigError(_))
        ));
    }

    #[test]
    fn test_remove_checker() {
        let engine = engine();
        assert!(engine.remove_checker("account"));
        assert!(!engine.remove_checker("account"));
        assert_eq!(engine.checker_names().len(), 4);

        // Without the account checker nothing inspects drawdown.
        let result = engine.check_permission(&crashing());
        assert_eq!(result.level, RiskLevel::Normal);
        assert!(!engine.is_locked());
    }

    #[test]
    fn test_evaluate_has_no_side_effects() {
        let engine = engine();
        let result = engine.evaluate(&crashing());
        assert_eq!(result.level, RiskLevel::RiskLocked);
        assert!(!engine.is_locked());
        assert_eq!(engine.current_level(), RiskLevel::Normal);
    }

    #[test]
    fn test_forced_cooldown_sticky() {
        let engine = engine();
        engine.force_cooldown("venue maintenance");
        assert!(engine.is_cooldown());

        let result = engine.check_permission(&healthy());
        assert!(!result.approved);
        assert_eq!(result.level, RiskLevel::Cooldown);
        assert!(result.reason.contains("venue maintenance"));

        engine.clear_cooldown();
        assert!(!engine.is_cooldown());
        assert!(engine.check_permission(&healthy()).approved);
    }

    #[test]
    fn test_checker_cooldown_not_sticky() {
        let engine = RiskControlEngine::new();
        engine
            .add_checker(Arc::new(ExecutionRiskChecker::new(ExecutionRiskConfig::default())))
            .unwrap();

        let bad = healthy().with_slippages_bps(vec![dec!(80)]);
        assert_eq!(engine.check_permission(&bad).level, RiskLevel::Cooldown);
        assert!(engine.is_cooldown());
        assert_eq!(engine.check_permission(&healthy()).level, RiskLevel::Normal);
        assert!(!engine.is_cooldown());
    }

    #[test]
    fn test_status_snapshot() {
        let engine = engine();
        engine.force_lock("halt");
        let status = engine.status();
        assert!(status.locked);
        assert!(!status.cooldown);
        assert_eq!(status.level, RiskLevel::RiskLocked);
        assert_eq!(status.lock_reason.as_deref(), Some("halt"));
        assert_eq!(status.checkers.len(), 5);
    }

    #[test]
    fn test_concurrent_lock_once() {
        let engine = Arc::new(engine());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.check_permission(&crashing()))
            })
            .collect();
        for handle in handles {
            let result = handle.join().unwrap();
            assert_eq!(result.level, RiskLevel::RiskLocked);
        }
        assert!(engine.is_locked());
    }
}
