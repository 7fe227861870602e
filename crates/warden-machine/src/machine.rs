//! History-owning lifecycle state machine.
//!
//! Holds exactly one current `SystemState` and an append-only log of every
//! transition attempt, successful or not.

use tracing::{info, warn};
use warden_core::{is_valid_transition, valid_next_states, SystemState, Transition};
use warden_telemetry::Metrics;

use crate::error::{MachineError, MachineResult};

/// Lifecycle state machine. Starts in `SYSTEM_INIT`.
#[derive(Debug)]
pub struct StateMachine {
    current: SystemState,
    history: Vec<Transition>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: SystemState::SystemInit,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> SystemState {
        self.current
    }

    /// Whether `to` is reachable from the current state, with a reason.
    pub fn can_transition(&self, to: SystemState) -> (bool, String) {
        if to == self.current {
            return (false, "identical state".to_string());
        }
        if is_valid_transition(self.current, to) {
            return (true, "ok".to_string());
        }
        (false, rejection_reason(self.current, to))
    }

    /// Attempt `from -> to`.
    ///
    /// `from` must equal the current state. The attempt is recorded in the
    /// history whatever the outcome.
    pub fn execute(
        &mut self,
        from: SystemState,
        to: SystemState,
        reason: &str,
    ) -> MachineResult<Transition> {
        let check = if from != self.current {
            Err(MachineError::StaleSource {
                expected: from,
                actual: self.current,
            })
        } else if from == to {
            Err(MachineError::IdenticalState(to))
        } else if !is_valid_transition(from, to) {
            Err(MachineError::NotEligible {
                from,
                to,
                reason: rejection_reason(from, to),
            })
        } else {
            Ok(())
        };

        Metrics::state_transition(from.as_str(), to.as_str(), check.is_ok());

        if let Err(e) = check {
            warn!(%from, %to, reason, error = %e, "State transition rejected");
            self.history
                .push(Transition::failed(from, to, reason, e.to_string()));
            return Err(e);
        }

        let transition = Transition::succeeded(from, to, reason);
        self.history.push(transition.clone());
        self.current = to;
        Metrics::state_set(to.as_str());
        info!(%from, %to, reason, "State transition");
        Ok(transition)
    }

    /// Leave `SYSTEM_INIT`. The only way out of the initial state.
    pub fn initialize_complete(&mut self) -> MachineResult<Transition> {
        self.execute(
            SystemState::SystemInit,
            SystemState::Observing,
            "initialization complete",
        )
    }

    pub fn is_trading_allowed(&self) -> bool {
        self.current.is_trading_allowed()
    }

    pub fn is_locked(&self) -> bool {
        self.current.is_locked()
    }

    /// Every recorded attempt, oldest first.
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn successful_transitions(&self) -> Vec<&Transition> {
        self.history.iter().filter(|t| t.success).collect()
    }
}

fn rejection_reason(from: SystemState, to: SystemState) -> String {
    let next: Vec<&str> = valid_next_states(from).iter().map(|s| s.as_str()).collect();
    format!(
        "no edge from {from} to {to} (valid: {})",
        next.join(", ")
    )
}
