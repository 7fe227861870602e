//! Claim processing: the only path from `OBSERVING` to `ELIGIBLE`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_core::{Claim, ClaimType, RiskCheckResult, RiskContext, SystemState};
use warden_risk::RiskControlEngine;
use warden_telemetry::Metrics;

use crate::machine::StateMachine;
use crate::regime_manager::RegimeManager;

/// Claim acceptance policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimPolicyConfig {
    /// Claims below this confidence are rejected by policy.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: Decimal,
}

fn default_confidence_floor() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

impl Default for ClaimPolicyConfig {
    fn default() -> Self {
        Self {
            confidence_floor: default_confidence_floor(),
        }
    }
}

/// Why a claim failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// State, expiry or confidence policy.
    Policy,
    /// Risk engine denied permission.
    Risk,
}

/// Outcome of one claim submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimResult {
    pub success: bool,
    pub state_changed: bool,
    pub new_state: Option<SystemState>,
    pub reason: String,
    pub risk_result: Option<RiskCheckResult>,
    pub rejection: Option<Rejection>,
}

impl ClaimResult {
    fn policy(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            state_changed: false,
            new_state: None,
            reason: reason.into(),
            risk_result: None,
            rejection: Some(Rejection::Policy),
        }
    }

    fn risk(result: RiskCheckResult) -> Self {
        Self {
            success: false,
            state_changed: false,
            new_state: None,
            reason: result.reason.clone(),
            risk_result: Some(result),
            rejection: Some(Rejection::Risk),
        }
    }

    fn no_change(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            state_changed: false,
            new_state: None,
            reason: reason.into(),
            risk_result: None,
            rejection: None,
        }
    }

    fn accepted(new_state: SystemState, result: RiskCheckResult) -> Self {
        Self {
            success: true,
            state_changed: true,
            new_state: Some(new_state),
            reason: "claim accepted".to_string(),
            risk_result: Some(result),
            rejection: None,
        }
    }

    /// Label for the claims counter.
    pub fn outcome(&self) -> &'static str {
        match (self.success, self.state_changed, self.rejection) {
            (true, true, _) => "accepted",
            (true, false, _) => "no_change",
            (false, _, Some(Rejection::Risk)) => "risk",
            (false, _, _) => "policy",
        }
    }
}

/// Applies policy and risk gating to claims.
pub struct ClaimProcessor {
    engine: Arc<RiskControlEngine>,
    config: ClaimPolicyConfig,
}

impl ClaimProcessor {
    pub fn new(engine: Arc<RiskControlEngine>, config: ClaimPolicyConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &ClaimPolicyConfig {
        &self.config
    }

    pub fn process_claim(
        &self,
        machine: &mut StateMachine,
        regimes: &mut RegimeManager,
        claim: &Claim,
        context: &RiskContext,
    ) -> ClaimResult {
        self.process_claim_at(machine, regimes, claim, context, Utc::now())
    }

    /// Evaluate `claim` at `now`.
    ///
    /// Checks run in order: state, expiry, confidence, claim type, risk.
    /// Only an approved affirmative claim moves the machine to `ELIGIBLE`.
    pub fn process_claim_at(
        &self,
        machine: &mut StateMachine,
        regimes: &mut RegimeManager,
        claim: &Claim,
        context: &RiskContext,
        now: DateTime<Utc>,
    ) -> ClaimResult {
        let result = self.evaluate(machine, regimes, claim, context, now);
        Metrics::claim_outcome(result.outcome());
        debug!(
            strategy_id = claim.strategy_id(),
            claim_type = %claim.claim_type(),
            outcome = result.outcome(),
            reason = %result.reason,
            "Claim processed"
        );
        result
    }

    fn evaluate(
        &self,
        machine: &mut StateMachine,
        regimes: &mut RegimeManager,
        claim: &Claim,
        context: &RiskContext,
        now: DateTime<Utc>,
    ) -> ClaimResult {
        if !machine.current().accepts_claims() {
            return ClaimResult::policy("current state does not accept claims");
        }
        if claim.is_expired_at(now) {
            return ClaimResult::policy("claim expired");
        }
        if claim.confidence() < self.config.confidence_floor {
            return ClaimResult::policy("confidence below threshold");
        }
        match claim.claim_type() {
            ClaimType::MarketNotEligible => {
                return ClaimResult::no_change("market not eligible for trading");
            }
            ClaimType::RegimeConflict | ClaimType::ExecutionVeto => {
                return ClaimResult::no_change(format!(
                    "{} does not open a trade window",
                    claim.claim_type()
                ));
            }
            ClaimType::MarketEligible | ClaimType::RegimeMatched => {}
        }

        let risk = self.engine.check_permission_at(context, now);
        Metrics::risk_level(risk.level.code());
        Metrics::risk_locked(self.engine.is_locked());
        for event in &risk.events {
            Metrics::risk_event(&event.event_type, event.level.as_str());
        }
        if !risk.approved {
            warn!(level = %risk.level, reason = %risk.reason, "Claim denied by risk engine");
            return ClaimResult::risk(risk);
        }

        let reason = format!("claim {} from {}", claim.claim_type(), claim.strategy_id());
        match machine.execute(SystemState::Observing, SystemState::Eligible, &reason) {
            Ok(_) => {
                if let Some(regime) = claim.regime() {
                    regimes.attach(regime);
                }
                info!(
                    strategy_id = claim.strategy_id(),
                    regime = ?regimes.current(),
                    "Market eligible"
                );
                ClaimResult::accepted(SystemState::Eligible, risk)
            }
            Err(e) => ClaimResult::policy(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use warden_core::{Direction, TradeRegime};
    use warden_risk::RiskCheckersConfig;

    struct Fixture {
        processor: ClaimProcessor,
        engine: Arc<RiskControlEngine>,
        machine: StateMachine,
        regimes: RegimeManager,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(RiskControlEngine::with_default_chain(
            &RiskCheckersConfig::default(),
        ));
        let mut machine = StateMachine::new();
        machine.initialize_complete().unwrap();
        Fixture {
            processor: ClaimProcessor::new(Arc::clone(&engine), ClaimPolicyConfig::default()),
            engine,
            machine,
            regimes: RegimeManager::new(),
        }
    }

    fn healthy() -> RiskContext {
        RiskContext::new(dec!(100000), dec!(100000)).unwrap()
    }

    fn eligible_claim(confidence: Decimal) -> Claim {
        Claim::builder("momentum", ClaimType::MarketEligible)
            .confidence(confidence)
            .validity_secs(60)
            .direction(Direction::Long)
            .regime(&TradeRegime::Trending)
            .build()
            .unwrap()
    }

    fn process(f: &mut Fixture, claim: &Claim, context: &RiskContext) -> ClaimResult {
        f.processor
            .process_claim(&mut f.machine, &mut f.regimes, claim, context)
    }

    #[test]
    fn test_accepted_claim_moves_to_eligible() {
        let mut f = fixture();
        let result = process(&mut f, &eligible_claim(dec!(0.8)), &healthy());

        assert!(result.success);
        assert!(result.state_changed);
        assert_eq!(result.new_state, Some(SystemState::Eligible));
        assert!(result.rejection.is_none());
        assert_eq!(f.machine.current(), SystemState::Eligible);
        assert_eq!(f.regimes.current(), Some(&TradeRegime::Trending));
        assert_eq!(result.outcome(), "accepted");
    }

    #[test]
    fn test_wrong_state_rejected() {
        let mut f = fixture();
        process(&mut f, &eligible_claim(dec!(0.8)), &healthy());

        let result = process(&mut f, &eligible_claim(dec!(0.8)), &healthy());
        assert!(!result.success);
        assert_eq!(result.reason, "current state does not accept claims");
        assert_eq!(result.rejection, Some(Rejection::Policy));
    }

    #[test]
    fn test_expired_claim_rejected() {
        let mut f = fixture();
        let claim = eligible_claim(dec!(0.8));
        let later = claim.timestamp() + Duration::seconds(61);
        let result =
            f.processor
                .process_claim_at(&mut f.machine, &mut f.regimes, &claim, &healthy(), later);
        assert_eq!(result.reason, "claim expired");
        assert_eq!(f.machine.current(), SystemState::Observing);
    }

    #[test]
    fn test_low_confidence_rejected() {
        let mut f = fixture();
        let result = process(&mut f, &eligible_claim(dec!(0.49)), &healthy());
        assert_eq!(result.reason, "confidence below threshold");
        assert_eq!(result.rejection, Some(Rejection::Policy));
        assert_eq!(result.outcome(), "policy");
    }

    #[test]
    fn test_market_not_eligible_no_change() {
        let mut f = fixture();
        let claim = Claim::builder("momentum", ClaimType::MarketNotEligible)
            .confidence(dec!(0.9))
            .validity_secs(60)
            .build()
            .unwrap();
        let result = process(&mut f, &claim, &healthy());
        assert!(result.success);
        assert!(!result.state_changed);
        assert_eq!(result.reason, "market not eligible for trading");
        assert_eq!(f.machine.current(), SystemState::Observing);
        assert_eq!(f.machine.history().len(), 1);
    }

    #[test]
    fn test_veto_and_conflict_claims_no_change() {
        let mut f = fixture();
        let veto = Claim::builder("vol_guard", ClaimType::ExecutionVeto)
            .confidence(dec!(0.9))
            .validity_secs(60)
            .build()
            .unwrap();
        let conflict = Claim::builder("momentum", ClaimType::RegimeConflict)
            .confidence(dec!(0.9))
            .validity_secs(60)
            .direction(Direction::Short)
            .build()
            .unwrap();

        for claim in [veto, conflict] {
            let result = process(&mut f, &claim, &healthy());
            assert!(result.success);
            assert!(!result.state_changed);
            assert!(result.new_state.is_none());
            assert!(result.reason.contains("does not open a trade window"));
            assert_eq!(result.outcome(), "no_change");
        }
        assert_eq!(f.machine.current(), SystemState::Observing);
        assert_eq!(f.machine.history().len(), 1);
        assert!(f.regimes.current().is_none());
    }

    #[test]
    fn test_huge_validity_window_accepted() {
        let mut f = fixture();
        let claim = Claim::builder("momentum", ClaimType::MarketEligible)
            .confidence(dec!(0.8))
            .validity_secs(i64::MAX)
            .direction(Direction::Long)
            .build()
            .unwrap();
        let result = process(&mut f, &claim, &healthy());
        assert!(result.success);
        assert_eq!(f.machine.current(), SystemState::Eligible);
    }

    #[test]
    fn test_risk_denied_no_transition() {
        let mut f = fixture();
        let context = RiskContext::new(dec!(75000), dec!(100000))
            .unwrap()
            .with_daily_pnl(dec!(-5000));
        let result = process(&mut f, &eligible_claim(dec!(0.8)), &context);

        assert!(!result.success);
        assert_eq!(result.rejection, Some(Rejection::Risk));
        let risk = result.risk_result.unwrap();
        assert!(!risk.approved);
        assert_eq!(risk.level, warden_core::RiskLevel::RiskLocked);
        assert!(f.engine.is_locked());
        assert_eq!(f.machine.current(), SystemState::Observing);
        assert!(f.regimes.current().is_none());
    }

    #[test]
    fn test_warning_still_approved() {
        let mut f = fixture();
        let context = healthy().with_slippages_bps(vec![dec!(25)]);
        let result = process(&mut f, &eligible_claim(dec!(0.8)), &context);
        assert!(result.success);
        assert_eq!(
            result.risk_result.unwrap().level,
            warden_core::RiskLevel::Warning
        );
    }
}
