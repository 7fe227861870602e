//! Witness orchestrator.
//!
//! Runs every runnable witness concurrently on the blocking pool, isolates
//! their failures, and arbitrates the resulting claims against the registry.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use warden_core::{Claim, MarketWindow};
use warden_registry::WitnessHealthProvider;
use warden_telemetry::Metrics;

use crate::arbitration::{resolve, AggregationResult, RankedClaim};
use crate::config::ArbitrationConfig;
use crate::error::{WitnessError, WitnessResult};
use crate::window::{evaluate_window, WindowSignal};
use crate::witness::Witness;

type RunOutcome = std::thread::Result<WitnessResult<Option<Claim>>>;

/// Coordinates witnesses and arbitrates their claims.
pub struct Orchestrator {
    witnesses: RwLock<BTreeMap<String, Arc<dyn Witness>>>,
    registry: Arc<dyn WitnessHealthProvider>,
    config: ArbitrationConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<dyn WitnessHealthProvider>, config: ArbitrationConfig) -> Self {
        Self {
            witnesses: RwLock::new(BTreeMap::new()),
            registry,
            config,
        }
    }

    /// Register a witness. Ids are unique; a registry entry, if present, must
    /// carry the same tier.
    pub fn register(&self, witness: Arc<dyn Witness>) -> WitnessResult<()> {
        let id = witness.strategy_id().to_string();
        let mut witnesses = self.witnesses.write();
        if witnesses.contains_key(&id) {
            return Err(WitnessError::DuplicateWitness(id));
        }
        if let Some(health) = self.registry.get(&id) {
            if health.tier != witness.tier() {
                return Err(WitnessError::TierMismatch {
                    witness: id,
                    declared: witness.tier(),
                    registered: health.tier,
                });
            }
        }
        info!(witness = %id, tier = %witness.tier(), "Witness registered");
        witnesses.insert(id, witness);
        Ok(())
    }

    pub fn unregister(&self, witness_id: &str) -> bool {
        self.witnesses.write().remove(witness_id).is_some()
    }

    pub fn witness(&self, witness_id: &str) -> Option<Arc<dyn Witness>> {
        self.witnesses.read().get(witness_id).cloned()
    }

    pub fn witness_ids(&self) -> Vec<String> {
        self.witnesses.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.witnesses.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.witnesses.read().is_empty()
    }

    /// Witnesses active both locally and in the registry.
    fn runnable(&self) -> Vec<Arc<dyn Witness>> {
        self.witnesses
            .read()
            .values()
            .filter(|w| w.is_active())
            .filter(|w| {
                self.registry
                    .get(w.strategy_id())
                    .is_some_and(|h| h.is_active())
            })
            .cloned()
            .collect()
    }

    // ========================================================================
    // Generation
    // ========================================================================

    /// Run all runnable witnesses against `window`, one blocking task each.
    ///
    /// Errors and panics count as no claim. A claim whose `strategy_id`
    /// differs from its witness is discarded. An architecture violation
    /// fails the whole batch.
    pub async fn run_witnesses(&self, window: Arc<MarketWindow>) -> WitnessResult<Vec<Claim>> {
        let started = Instant::now();
        let mut set = JoinSet::new();
        for witness in self.runnable() {
            let window = Arc::clone(&window);
            set.spawn_blocking(move || {
                let id = witness.strategy_id().to_string();
                let outcome: RunOutcome =
                    std::panic::catch_unwind(AssertUnwindSafe(|| witness.generate_claim(&window)));
                (id, outcome)
            });
        }

        let mut claims = Vec::new();
        let mut violation = None;
        while let Some(joined) = set.join_next().await {
            let (id, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Witness task did not complete");
                    Metrics::witness_failure("unknown", "join");
                    continue;
                }
            };

            match outcome {
                Ok(Ok(Some(claim))) if claim.strategy_id() == id => claims.push(claim),
                Ok(Ok(Some(claim))) => {
                    warn!(
                        witness = %id,
                        claimed = claim.strategy_id(),
                        "Claim discarded: strategy_id does not match witness"
                    );
                    Metrics::witness_failure(&id, "mismatch");
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) if e.is_architecture_violation() => {
                    error!(witness = %id, error = %e, "Witness crossed the execution boundary");
                    Metrics::witness_failure(&id, "violation");
                    violation.get_or_insert(e);
                }
                Ok(Err(e)) => {
                    warn!(witness = %id, error = %e, "Witness failed");
                    Metrics::witness_failure(&id, "error");
                }
                Err(payload) => {
                    warn!(witness = %id, panic = %panic_message(&payload), "Witness panicked");
                    Metrics::witness_failure(&id, "panic");
                }
            }
        }

        Metrics::witness_batch_duration(started.elapsed().as_secs_f64() * 1000.0);

        if let Some(e) = violation {
            return Err(e);
        }
        claims.sort_by(|a, b| a.strategy_id().cmp(b.strategy_id()));
        debug!(count = claims.len(), symbol = window.symbol(), "Witness batch complete");
        Ok(claims)
    }

    // ========================================================================
    // Arbitration
    // ========================================================================

    /// Drop claims from muted or unknown witnesses, then resolve.
    pub fn aggregate_claims(&self, claims: &[Claim]) -> AggregationResult {
        let mut entries = Vec::with_capacity(claims.len());
        let mut excluded = Vec::new();
        for claim in claims {
            match self.registry.get(claim.strategy_id()) {
                Some(health) if health.is_active() => entries.push(RankedClaim {
                    claim: claim.clone(),
                    health,
                }),
                _ => excluded.push(claim.strategy_id().to_string()),
            }
        }
        excluded.sort();
        excluded.dedup();

        let mut result = resolve(&entries);
        result.excluded = excluded;

        Metrics::arbitration(result.resolution.as_str());
        debug!(
            resolution = %result.resolution,
            tradeable = result.is_tradeable,
            direction = ?result.direction,
            excluded = ?result.excluded,
            reason = %result.reason,
            "Claims aggregated"
        );
        result
    }

    /// Advisory agreement check, weighting by registry weight.
    pub fn check_high_trading_window(&self, claims: &[Claim]) -> WindowSignal {
        let weighted: Vec<(Claim, Decimal)> = claims
            .iter()
            .filter_map(|claim| match self.registry.get(claim.strategy_id()) {
                Some(health) if !health.is_active() => None,
                Some(health) => Some((claim.clone(), health.weight)),
                None => Some((claim.clone(), self.config.window.default_weight)),
            })
            .collect();

        let signal = evaluate_window(&weighted, &self.config.window);
        Metrics::high_window(signal.active, signal.confidence.to_f64().unwrap_or(0.0));
        if signal.active {
            info!(
                direction = ?signal.direction,
                confidence = %signal.confidence,
                supporting = ?signal.supporting_witnesses,
                "High trading window"
            );
        }
        signal
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
