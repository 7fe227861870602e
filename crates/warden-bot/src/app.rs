//! Main application orchestration.
//!
//! One cycle per market window:
//! - OBSERVING: run witnesses, arbitrate, submit the dominant claim
//! - ELIGIBLE / ACTIVE_TRADING: open, hold and close a paper position
//! - COOLDOWN: wait out the configured cycles
//! - RISK_LOCKED / RECOVERY: attempt unlock and walk back to OBSERVING
//!
//! After every cycle an engine lock is mirrored into the state machine.

use crate::account::PaperAccount;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::feed::ReplayFeed;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};
use warden_core::{Direction, MarketBar, MarketWindow, RiskContext, SystemState, WitnessHealth};
use warden_machine::{MachineError, StateMachineService};
use warden_registry::{WitnessHealthProvider, WitnessRegistry};
use warden_risk::{RecoveryManager, RiskControlEngine};
use warden_telemetry::Metrics;
use warden_witness::{Orchestrator, Resolution};

/// Neutral starting statistics for a newly registered witness (0.5).
const INITIAL_WIN_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);
const INITIAL_WEIGHT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Counters reported when the replay ends.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub cycles: u64,
    pub claims_submitted: u64,
    pub claims_accepted: u64,
    pub vetoes: u64,
    pub trades: u64,
    pub wins: u64,
    pub risk_locks: u64,
    pub final_state: SystemState,
    pub final_equity: Decimal,
}

/// A claim accepted into ELIGIBLE, waiting for the trade to open.
#[derive(Debug, Clone)]
struct PendingEntry {
    witness_id: String,
    direction: Direction,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    registry: Arc<WitnessRegistry>,
    orchestrator: Orchestrator,
    engine: Arc<RiskControlEngine>,
    recovery: RecoveryManager,
    service: StateMachineService,
    account: PaperAccount,
    pending: Option<PendingEntry>,
    cycle: u64,
    // Cycle at which the current state was entered.
    phase_started: u64,
    summary: RunSummary,
}

impl Application {
    /// Wire every component from `config`.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate().map_err(AppError::Config)?;

        let registry = Arc::new(WitnessRegistry::new(config.registry.clone()));
        let orchestrator = Orchestrator::new(
            Arc::clone(&registry) as Arc<dyn WitnessHealthProvider>,
            config.arbitration.clone(),
        );
        for witness in config.witnesses.build()? {
            registry.upsert(WitnessHealth::new(
                witness.strategy_id(),
                witness.tier(),
                INITIAL_WIN_RATE,
                0,
                INITIAL_WEIGHT,
            )?)?;
            orchestrator.register(witness)?;
        }
        info!(witnesses = ?orchestrator.witness_ids(), "Witnesses registered");

        let engine = Arc::new(RiskControlEngine::from_config(&config.risk)?);
        info!(checkers = ?engine.checker_names(), "Risk engine ready");
        let recovery = RecoveryManager::new(Arc::clone(&engine), config.recovery.clone());
        let service = StateMachineService::new(Arc::clone(&engine), config.claims.clone());
        let account = PaperAccount::new(config.trading.initial_equity);

        let summary = RunSummary {
            cycles: 0,
            claims_submitted: 0,
            claims_accepted: 0,
            vetoes: 0,
            trades: 0,
            wins: 0,
            risk_locks: 0,
            final_state: SystemState::SystemInit,
            final_equity: account.equity(),
        };

        Ok(Self {
            config,
            registry,
            orchestrator,
            engine,
            recovery,
            service,
            account,
            pending: None,
            cycle: 0,
            phase_started: 0,
            summary,
        })
    }

    pub fn service(&self) -> &StateMachineService {
        &self.service
    }

    pub fn engine(&self) -> &Arc<RiskControlEngine> {
        &self.engine
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    pub fn registry(&self) -> &Arc<WitnessRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn account(&self) -> &PaperAccount {
        &self.account
    }

    /// Replay the configured feed file to the end or until Ctrl-C.
    pub async fn run(mut self) -> AppResult<RunSummary> {
        let mut feed = ReplayFeed::open(&self.config.feed).await?;
        self.run_feed(&mut feed).await
    }

    /// Drive the decision loop from `feed`.
    pub async fn run_feed<R>(&mut self, feed: &mut ReplayFeed<R>) -> AppResult<RunSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        if self.service.current_state() == SystemState::SystemInit {
            self.service.initialize()?;
            self.enter_phase();
        }

        let pause = Duration::from_millis(self.config.feed.cycle_interval_ms);
        info!("Entering decision loop");

        loop {
            let next = tokio::select! {
                next = feed.next_window() => next?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    None
                }
            };
            let Some(window) = next else {
                break;
            };

            self.step(window).await?;

            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        self.summary.final_state = self.service.current_state();
        self.summary.final_equity = self.account.equity();
        info!(
            cycles = self.summary.cycles,
            claims_submitted = self.summary.claims_submitted,
            claims_accepted = self.summary.claims_accepted,
            vetoes = self.summary.vetoes,
            trades = self.summary.trades,
            wins = self.summary.wins,
            risk_locks = self.summary.risk_locks,
            final_state = %self.summary.final_state,
            final_equity = %self.summary.final_equity,
            skipped_bars = feed.skipped(),
            "Replay finished"
        );
        Ok(self.summary.clone())
    }

    /// Run one decision cycle on `window`.
    pub async fn step(&mut self, window: Arc<MarketWindow>) -> AppResult<()> {
        let Some(bar) = window.latest().cloned() else {
            return Ok(());
        };
        self.cycle += 1;
        self.summary.cycles += 1;
        self.account.roll_day(bar.timestamp);

        match self.service.current_state() {
            SystemState::SystemInit => {
                self.service.initialize()?;
                self.enter_phase();
            }
            SystemState::Observing => self.observe(window, &bar).await?,
            SystemState::Eligible => self.open_position(&bar)?,
            SystemState::ActiveTrading => self.manage_position(&bar)?,
            SystemState::Cooldown => {
                if self.cycles_in_phase() >= self.config.trading.cooldown_cycles {
                    self.service.complete_cooldown()?;
                    self.enter_phase();
                }
            }
            SystemState::RiskLocked => self.attempt_recovery(&bar)?,
            SystemState::Recovery => {
                self.service.complete_recovery()?;
                self.enter_phase();
            }
        }

        if self.recovery.is_degraded() && !self.engine.is_locked() {
            let context = self.risk_context(&bar, Decimal::ZERO)?;
            self.recovery.complete_recovery_at(&context, bar.timestamp);
        }
        Metrics::degraded(self.recovery.is_degraded());

        self.sync_risk_lock(&bar)
    }

    // ========================================================================
    // Phases
    // ========================================================================

    async fn observe(&mut self, window: Arc<MarketWindow>, bar: &MarketBar) -> AppResult<()> {
        let claims = self.orchestrator.run_witnesses(window).await?;
        let signal = self.orchestrator.check_high_trading_window(&claims);
        let result = self.orchestrator.aggregate_claims(&claims);

        if result.resolution == Resolution::Vetoed {
            self.summary.vetoes += 1;
        }

        let candidate = result
            .dominant_claim
            .as_ref()
            .filter(|_| result.is_tradeable)
            .and_then(|claim| claim.direction().map(|d| (claim, d)));
        let Some((claim, direction)) = candidate else {
            debug!(
                claims = claims.len(),
                resolution = %result.resolution,
                reason = %result.reason,
                high_window = signal.active,
                "No tradeable claim"
            );
            return Ok(());
        };

        let requested = self
            .recovery
            .adjusted_position(self.config.trading.position_size);
        let context = self.risk_context(bar, requested)?;

        self.summary.claims_submitted += 1;
        let outcome = self.service.submit_claim_at(claim, &context, bar.timestamp);
        if !outcome.state_changed {
            debug!(
                witness = claim.strategy_id(),
                outcome = outcome.outcome(),
                reason = %outcome.reason,
                "Claim not accepted"
            );
            return Ok(());
        }

        self.summary.claims_accepted += 1;
        self.pending = Some(PendingEntry {
            witness_id: claim.strategy_id().to_string(),
            direction,
        });
        self.enter_phase();
        self.open_position(bar)
    }

    /// `ELIGIBLE -> ACTIVE_TRADING`, opening the pending entry.
    fn open_position(&mut self, bar: &MarketBar) -> AppResult<()> {
        let Some(entry) = self.pending.take() else {
            self.service.cancel_eligible("no pending entry")?;
            self.enter_phase();
            return Ok(());
        };

        let reason = format!("{} entry from {}", entry.direction, entry.witness_id);
        match self.service.start_trading(&reason) {
            Ok(_) => {
                let fraction = self
                    .recovery
                    .adjusted_position(self.config.trading.position_size);
                if let Some(trade) = self.account.open(
                    &entry.witness_id,
                    entry.direction,
                    bar.close,
                    fraction,
                    bar.timestamp,
                ) {
                    info!(
                        witness = %trade.witness_id,
                        direction = %trade.direction,
                        entry_price = %trade.entry_price,
                        notional = %trade.notional,
                        "Position opened"
                    );
                }
                self.summary.trades += 1;
                self.enter_phase();
                Ok(())
            }
            Err(MachineError::RiskBlocked(reason)) => {
                warn!(reason = %reason, "Trading start blocked, back to OBSERVING");
                self.service.cancel_eligible(&reason)?;
                self.enter_phase();
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Re-check risk on the open position and close it when the hold period
    /// ends or the engine no longer approves.
    fn manage_position(&mut self, bar: &MarketBar) -> AppResult<()> {
        let requested = self
            .recovery
            .adjusted_position(self.config.trading.position_size);
        let context = self.risk_context(bar, requested)?;
        let risk = self.engine.check_permission_at(&context, bar.timestamp);
        Metrics::risk_level(risk.level.code());
        Metrics::risk_locked(self.engine.is_locked());
        for event in &risk.events {
            Metrics::risk_event(&event.event_type, event.level.as_str());
        }

        let held = self.cycles_in_phase();
        if risk.approved && held < self.config.trading.hold_cycles {
            return Ok(());
        }

        let reason = if risk.approved {
            format!("held {held} cycles")
        } else {
            format!("risk {}: {}", risk.level, risk.reason)
        };
        self.close_position(bar, &reason)?;

        if self.engine.is_locked() {
            // sync_risk_lock moves the machine.
            return Ok(());
        }
        self.service.complete_trading(&reason)?;
        self.enter_phase();
        Ok(())
    }

    fn close_position(&mut self, bar: &MarketBar, reason: &str) -> AppResult<()> {
        let Some(closed) = self.account.close(bar.close) else {
            return Ok(());
        };
        let grade = self
            .registry
            .record_outcome(&closed.witness_id, closed.is_win)?;
        if closed.is_win {
            self.summary.wins += 1;
        }
        info!(
            witness = %closed.witness_id,
            pnl = %closed.pnl,
            win = closed.is_win,
            grade = %grade,
            equity = %self.account.equity(),
            reason,
            "Position closed"
        );
        Ok(())
    }

    /// `RISK_LOCKED -> RECOVERY` once the engine is unlocked, automatically
    /// or by an operator.
    fn attempt_recovery(&mut self, bar: &MarketBar) -> AppResult<()> {
        if self.engine.is_locked() {
            let context = self.risk_context(bar, Decimal::ZERO)?;
            if !self.recovery.request_unlock_at(&context, bar.timestamp) {
                return Ok(());
            }
        }
        self.service.start_recovery("risk engine unlocked")?;
        self.enter_phase();
        Ok(())
    }

    /// Mirror an engine lock into the state machine, flattening first.
    fn sync_risk_lock(&mut self, bar: &MarketBar) -> AppResult<()> {
        if !self.engine.is_locked() || self.service.is_locked() {
            return Ok(());
        }
        let reason = self
            .engine
            .lock_reason()
            .unwrap_or_else(|| "risk engine locked".to_string());
        self.close_position(bar, &reason)?;
        self.pending = None;
        self.service.enter_risk_lock(&reason)?;
        self.summary.risk_locks += 1;
        self.enter_phase();
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn risk_context(&self, bar: &MarketBar, requested: Decimal) -> AppResult<RiskContext> {
        Ok(self
            .account
            .risk_context(bar.close, requested, self.registry.list_all())?)
    }

    fn enter_phase(&mut self) {
        self.phase_started = self.cycle;
    }

    fn cycles_in_phase(&self) -> u64 {
        self.cycle - self.phase_started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registers_enabled_witnesses() {
        let app = Application::new(AppConfig::default()).unwrap();
        assert_eq!(
            app.orchestrator().witness_ids(),
            vec!["momentum", "volatility_veto", "volume_confirm"]
        );
        assert_eq!(app.registry().len(), 3);
        assert_eq!(app.service().current_state(), SystemState::SystemInit);
        assert_eq!(app.engine().checker_names().len(), 5);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.trading.hold_cycles = 0;
        assert!(matches!(
            Application::new(config),
            Err(AppError::Config(_))
        ));
    }
}
