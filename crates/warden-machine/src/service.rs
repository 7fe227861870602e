//! Service facade over the state machine, regime manager and claim processor.
//!
//! One mutex guards the machine and the regime manager together, so claim
//! processing and lifecycle steps are serialized per service instance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{error, info};
use warden_core::{Claim, RiskContext, SystemState, TradeRegime, Transition};
use warden_risk::RiskControlEngine;

use crate::error::{MachineError, MachineResult};
use crate::machine::StateMachine;
use crate::processor::{ClaimPolicyConfig, ClaimProcessor, ClaimResult};
use crate::regime_manager::RegimeManager;

#[derive(Debug, Default)]
struct Inner {
    machine: StateMachine,
    regimes: RegimeManager,
}

impl Inner {
    /// Run `from -> to` and keep the regime in step.
    fn step(&mut self, from: SystemState, to: SystemState, reason: &str) -> MachineResult<Transition> {
        let transition = self.machine.execute(from, to, reason)?;
        self.regimes.on_state(to);
        Ok(transition)
    }
}

/// Thread-safe entry point for the trading lifecycle.
pub struct StateMachineService {
    inner: Mutex<Inner>,
    processor: ClaimProcessor,
    engine: Arc<RiskControlEngine>,
}

impl StateMachineService {
    pub fn new(engine: Arc<RiskControlEngine>, config: ClaimPolicyConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            processor: ClaimProcessor::new(Arc::clone(&engine), config),
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<RiskControlEngine> {
        &self.engine
    }

    /// `SYSTEM_INIT -> OBSERVING`.
    pub fn initialize(&self) -> MachineResult<Transition> {
        let mut inner = self.inner.lock();
        let transition = inner.machine.initialize_complete()?;
        inner.regimes.on_state(SystemState::Observing);
        Ok(transition)
    }

    pub fn submit_claim(&self, claim: &Claim, context: &RiskContext) -> ClaimResult {
        self.submit_claim_at(claim, context, Utc::now())
    }

    pub fn submit_claim_at(
        &self,
        claim: &Claim,
        context: &RiskContext,
        now: DateTime<Utc>,
    ) -> ClaimResult {
        let mut inner = self.inner.lock();
        let Inner { machine, regimes } = &mut *inner;
        self.processor
            .process_claim_at(machine, regimes, claim, context, now)
    }

    /// `ELIGIBLE -> ACTIVE_TRADING`. Refused while the engine is locked or
    /// cooling down.
    pub fn start_trading(&self, reason: &str) -> MachineResult<Transition> {
        let mut inner = self.inner.lock();
        if self.engine.is_locked() {
            return Err(MachineError::RiskBlocked(
                "risk engine is locked".to_string(),
            ));
        }
        if self.engine.is_cooldown() {
            return Err(MachineError::RiskBlocked(
                "risk engine is in cooldown".to_string(),
            ));
        }
        inner.step(SystemState::Eligible, SystemState::ActiveTrading, reason)
    }

    /// `ACTIVE_TRADING -> COOLDOWN`.
    pub fn complete_trading(&self, reason: &str) -> MachineResult<Transition> {
        self.inner
            .lock()
            .step(SystemState::ActiveTrading, SystemState::Cooldown, reason)
    }

    /// `COOLDOWN -> OBSERVING`.
    pub fn complete_cooldown(&self) -> MachineResult<Transition> {
        self.inner.lock().step(
            SystemState::Cooldown,
            SystemState::Observing,
            "cooldown complete",
        )
    }

    /// `ELIGIBLE -> OBSERVING`.
    pub fn cancel_eligible(&self, reason: &str) -> MachineResult<Transition> {
        self.inner
            .lock()
            .step(SystemState::Eligible, SystemState::Observing, reason)
    }

    /// Any state -> `RISK_LOCKED`, force-locking the engine too.
    pub fn enter_risk_lock(&self, reason: &str) -> MachineResult<Transition> {
        let mut inner = self.inner.lock();
        self.engine.force_lock(reason);
        error!(reason, "Entering RISK_LOCKED");
        let from = inner.machine.current();
        inner.step(from, SystemState::RiskLocked, reason)
    }

    /// `RISK_LOCKED -> RECOVERY`. Refused while the engine is still locked.
    pub fn start_recovery(&self, reason: &str) -> MachineResult<Transition> {
        let mut inner = self.inner.lock();
        if self.engine.is_locked() {
            return Err(MachineError::RiskBlocked(
                "risk engine still locked".to_string(),
            ));
        }
        inner.step(SystemState::RiskLocked, SystemState::Recovery, reason)
    }

    /// `RECOVERY -> OBSERVING`.
    pub fn complete_recovery(&self) -> MachineResult<Transition> {
        let transition = self
            .inner
            .lock()
            .step(
                SystemState::Recovery,
                SystemState::Observing,
                "recovery complete",
            )?;
        info!("Back to OBSERVING after recovery");
        Ok(transition)
    }

    pub fn current_state(&self) -> SystemState {
        self.inner.lock().machine.current()
    }

    pub fn current_regime(&self) -> Option<TradeRegime> {
        self.inner.lock().regimes.current().cloned()
    }

    pub fn is_trading_allowed(&self) -> bool {
        self.inner.lock().machine.is_trading_allowed()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().machine.is_locked()
    }

    pub fn can_transition(&self, to: SystemState) -> (bool, String) {
        self.inner.lock().machine.can_transition(to)
    }

    /// Every recorded transition attempt, oldest first.
    pub fn state_history(&self) -> Vec<Transition> {
        self.inner.lock().machine.history().to_vec()
    }
}
