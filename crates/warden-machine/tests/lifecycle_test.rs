//! Integration tests for the trading lifecycle.
//!
//! Drives the service through full cycles against a real risk engine and
//! recovery manager.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use warden_core::{
    Claim, ClaimType, Direction, RiskContext, RiskLevel, SystemState, TradeRegime,
};
use warden_machine::{ClaimPolicyConfig, MachineError, Rejection, StateMachine, StateMachineService};
use warden_risk::{RecoveryConfig, RecoveryManager, RiskCheckersConfig, RiskControlEngine};

fn engine() -> Arc<RiskControlEngine> {
    Arc::new(RiskControlEngine::with_default_chain(
        &RiskCheckersConfig::default(),
    ))
}

fn healthy() -> RiskContext {
    RiskContext::new(dec!(100000), dec!(100000)).unwrap()
}

fn eligible_claim() -> Claim {
    Claim::builder("momentum", ClaimType::MarketEligible)
        .confidence(dec!(0.8))
        .validity_secs(300)
        .direction(Direction::Long)
        .regime(&TradeRegime::VolatilityExpansion)
        .build()
        .unwrap()
}

/// Path from a fresh machine to each state.
fn machine_in(target: SystemState) -> StateMachine {
    use SystemState::*;

    let path: &[SystemState] = match target {
        SystemInit => &[],
        Observing => &[Observing],
        Eligible => &[Observing, Eligible],
        ActiveTrading => &[Observing, Eligible, ActiveTrading],
        Cooldown => &[Observing, Eligible, ActiveTrading, Cooldown],
        RiskLocked => &[Observing, RiskLocked],
        Recovery => &[Observing, RiskLocked, Recovery],
    };

    let mut machine = StateMachine::new();
    for to in path {
        let from = machine.current();
        machine.execute(from, *to, "setup").unwrap();
    }
    assert_eq!(machine.current(), target);
    machine
}

#[test]
fn test_full_cycle() {
    let service = StateMachineService::new(engine(), ClaimPolicyConfig::default());
    assert_eq!(service.current_state(), SystemState::SystemInit);

    service.initialize().unwrap();
    assert_eq!(service.state_history().len(), 1);

    let result = service.submit_claim(&eligible_claim(), &healthy());
    assert!(result.success);
    assert_eq!(result.new_state, Some(SystemState::Eligible));
    assert_eq!(service.state_history().len(), 2);
    assert_eq!(
        service.current_regime(),
        Some(TradeRegime::VolatilityExpansion)
    );
    assert!(service.is_trading_allowed());

    service.start_trading("momentum long").unwrap();
    assert_eq!(service.current_state(), SystemState::ActiveTrading);
    assert_eq!(service.state_history().len(), 3);

    service.complete_trading("position closed").unwrap();
    assert_eq!(service.current_state(), SystemState::Cooldown);
    assert!(service.current_regime().is_none());
    assert!(!service.is_trading_allowed());
    assert_eq!(service.state_history().len(), 4);

    service.complete_cooldown().unwrap();
    assert_eq!(service.current_state(), SystemState::Observing);
    assert_eq!(service.state_history().len(), 5);
    assert!(service.state_history().iter().all(|t| t.success));
}

#[test]
fn test_every_state_can_enter_risk_lock() {
    for state in SystemState::ALL {
        let mut machine = machine_in(state);
        let result = machine.execute(state, SystemState::RiskLocked, "halt");
        if state == SystemState::RiskLocked {
            assert_eq!(
                result.unwrap_err(),
                MachineError::IdenticalState(SystemState::RiskLocked)
            );
        } else {
            assert!(result.is_ok(), "{state} -> RISK_LOCKED");
            assert!(machine.is_locked());
        }
    }
}

#[test]
fn test_only_observing_reaches_eligible() {
    for state in SystemState::ALL {
        let mut machine = machine_in(state);
        let result = machine.execute(state, SystemState::Eligible, "claim");
        if state == SystemState::Observing {
            assert!(result.is_ok());
        } else {
            assert!(result.is_err(), "{state} -> ELIGIBLE must fail");
            assert_eq!(machine.current(), state);
            assert!(!machine.history().last().unwrap().success);
        }
    }
}

#[test]
fn test_history_is_append_only() {
    let mut machine = machine_in(SystemState::Eligible);
    let before = machine.history().to_vec();

    let _ = machine.execute(SystemState::Eligible, SystemState::Recovery, "bad");
    machine
        .execute(SystemState::Eligible, SystemState::ActiveTrading, "go")
        .unwrap();

    let after = machine.history();
    assert_eq!(after.len(), before.len() + 2);
    assert_eq!(&after[..before.len()], &before[..]);
}

#[test]
fn test_drawdown_lock_then_recovery() {
    let engine = engine();
    let recovery = RecoveryManager::new(Arc::clone(&engine), RecoveryConfig::default());
    let service = StateMachineService::new(Arc::clone(&engine), ClaimPolicyConfig::default());
    service.initialize().unwrap();

    let crashing = RiskContext::new(dec!(75000), dec!(100000))
        .unwrap()
        .with_daily_pnl(dec!(-5000));
    let result = service.submit_claim(&eligible_claim(), &crashing);
    assert!(!result.success);
    assert_eq!(result.rejection, Some(Rejection::Risk));
    assert_eq!(result.risk_result.as_ref().unwrap().level, RiskLevel::RiskLocked);
    assert!(engine.is_locked());

    // The machine follows the engine into the lock.
    service
        .enter_risk_lock(&engine.lock_reason().unwrap())
        .unwrap();
    assert!(service.is_locked());

    // Healthy claims are denied while locked.
    assert!(!service.submit_claim(&eligible_claim(), &healthy()).success);
    assert!(matches!(
        service.start_recovery("lock reviewed"),
        Err(MachineError::RiskBlocked(_))
    ));

    let later = engine.locked_at().unwrap() + Duration::hours(5);
    assert!(recovery.request_unlock_at(&healthy(), later));
    assert!(recovery.is_degraded());
    assert_eq!(recovery.adjusted_position(dec!(0.04)), dec!(0.02));

    service.start_recovery("lock reviewed").unwrap();
    service.complete_recovery().unwrap();
    assert_eq!(service.current_state(), SystemState::Observing);

    let accepted = service.submit_claim(&eligible_claim(), &healthy());
    assert!(accepted.success);
    assert_eq!(service.current_state(), SystemState::Eligible);
}

#[test]
fn test_manual_unlock_enters_degraded_mode() {
    let engine = engine();
    let recovery = RecoveryManager::new(Arc::clone(&engine), RecoveryConfig::default());
    let service = StateMachineService::new(Arc::clone(&engine), ClaimPolicyConfig::default());
    service.initialize().unwrap();
    service.enter_risk_lock("operator halt").unwrap();

    recovery.manual_unlock("ops-oncall", "false alarm").unwrap();
    assert!(recovery.is_degraded());
    assert_eq!(recovery.position_limit_ratio(), dec!(0.5));
    assert_eq!(recovery.adjusted_position(dec!(0.04)), dec!(0.02));

    service.start_recovery("lock reviewed").unwrap();
    service.complete_recovery().unwrap();

    // Time alone does not leave degraded mode.
    let now = Utc::now();
    assert!(recovery.is_degraded());
    assert!(recovery.complete_recovery_at(&healthy(), now + Duration::hours(25)));
    assert!(!recovery.is_degraded());
}

#[test]
fn test_concurrent_claims_single_transition() {
    let service = Arc::new(StateMachineService::new(
        engine(),
        ClaimPolicyConfig::default(),
    ));
    service.initialize().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.submit_claim(&eligible_claim(), &healthy()))
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.state_changed)
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(service.current_state(), SystemState::Eligible);
}
