//! Prometheus metrics for warden.
//!
//! Covers:
//! - State machine transitions and the current state
//! - Risk engine level, lock and events
//! - Claim processing outcomes
//! - Witness arbitration, witness failures and the high trading window
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! is a duplicate metric name, a startup bug that should crash immediately.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, Histogram, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

const STATES: [&str; 7] = [
    "SYSTEM_INIT",
    "OBSERVING",
    "ELIGIBLE",
    "ACTIVE_TRADING",
    "COOLDOWN",
    "RISK_LOCKED",
    "RECOVERY",
];

// ============================================================================
// State machine
// ============================================================================

/// Transition attempts. Labels: from, to, success.
pub static STATE_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "warden_state_transitions_total",
        "State transition attempts",
        &["from", "to", "success"]
    )
    .unwrap()
});

/// Current system state (1 = current, 0 = otherwise).
pub static SYSTEM_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "warden_system_state",
        "Current system state (1=current)",
        &["state"]
    )
    .unwrap()
});

// ============================================================================
// Risk
// ============================================================================

/// Current aggregate risk level (0=NORMAL .. 3=RISK_LOCKED).
pub static RISK_LEVEL: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("warden_risk_level", "Current aggregate risk level").unwrap()
});

/// Risk engine lock state (1 = locked).
pub static RISK_LOCKED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("warden_risk_locked", "Risk engine lock state (1=locked)").unwrap()
});

/// Degraded mode after an unlock (1 = degraded).
pub static DEGRADED_MODE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("warden_degraded_mode", "Degraded mode (1=degraded)").unwrap()
});

/// Risk events emitted by checkers. Labels: event_type, level.
pub static RISK_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "warden_risk_events_total",
        "Risk events emitted by checkers",
        &["event_type", "level"]
    )
    .unwrap()
});

// ============================================================================
// Claims and arbitration
// ============================================================================

/// Claim submissions. Labels: outcome (accepted/no_change/policy/risk).
pub static CLAIMS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "warden_claims_total",
        "Claim submissions by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Arbitration results. Labels: resolution.
pub static ARBITRATION_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "warden_arbitration_total",
        "Claim aggregation results by resolution",
        &["resolution"]
    )
    .unwrap()
});

/// Witness runs that produced no usable claim. Labels: witness, kind.
pub static WITNESS_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "warden_witness_failures_total",
        "Witness runs that failed or were discarded",
        &["witness", "kind"]
    )
    .unwrap()
});

/// Wall time of a full witness batch in milliseconds.
pub static WITNESS_BATCH_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "warden_witness_batch_ms",
        "Witness batch duration in milliseconds",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0]
    )
    .unwrap()
});

/// High trading window active (1 = active).
pub static HIGH_WINDOW_ACTIVE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "warden_high_window_active",
        "High trading window state (1=active)"
    )
    .unwrap()
});

/// Confidence of the last high trading window evaluation.
pub static HIGH_WINDOW_CONFIDENCE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "warden_high_window_confidence",
        "Confidence of the last high trading window evaluation"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a transition attempt.
    pub fn state_transition(from: &str, to: &str, success: bool) {
        STATE_TRANSITIONS_TOTAL
            .with_label_values(&[from, to, if success { "true" } else { "false" }])
            .inc();
    }

    /// Set the current state. Only the active state is 1.
    pub fn state_set(state: &str) {
        for s in &STATES {
            SYSTEM_STATE.with_label_values(&[s]).set(0.0);
        }
        SYSTEM_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn risk_level(code: i64) {
        RISK_LEVEL.set(code);
    }

    pub fn risk_locked(locked: bool) {
        RISK_LOCKED.set(if locked { 1.0 } else { 0.0 });
    }

    pub fn degraded(degraded: bool) {
        DEGRADED_MODE.set(if degraded { 1.0 } else { 0.0 });
    }

    pub fn risk_event(event_type: &str, level: &str) {
        RISK_EVENTS_TOTAL
            .with_label_values(&[event_type, level])
            .inc();
    }

    pub fn claim_outcome(outcome: &str) {
        CLAIMS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn arbitration(resolution: &str) {
        ARBITRATION_TOTAL.with_label_values(&[resolution]).inc();
    }

    /// Record a witness run that yielded no claim (error, panic, mismatch).
    pub fn witness_failure(witness: &str, kind: &str) {
        WITNESS_FAILURES_TOTAL
            .with_label_values(&[witness, kind])
            .inc();
    }

    pub fn witness_batch_duration(ms: f64) {
        WITNESS_BATCH_MS.observe(ms);
    }

    pub fn high_window(active: bool, confidence: f64) {
        HIGH_WINDOW_ACTIVE.set(if active { 1.0 } else { 0.0 });
        HIGH_WINDOW_CONFIDENCE.set(confidence);
    }

    /// Render every registered metric in the text exposition format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_set_is_one_hot() {
        Metrics::state_set("OBSERVING");
        Metrics::state_set("ELIGIBLE");
        assert_eq!(SYSTEM_STATE.with_label_values(&["ELIGIBLE"]).get(), 1.0);
        assert_eq!(SYSTEM_STATE.with_label_values(&["OBSERVING"]).get(), 0.0);
    }

    #[test]
    fn test_counters_increment() {
        let before = CLAIMS_TOTAL.with_label_values(&["policy"]).get();
        Metrics::claim_outcome("policy");
        assert_eq!(CLAIMS_TOTAL.with_label_values(&["policy"]).get(), before + 1.0);
    }

    #[test]
    fn test_gather_text_contains_metrics() {
        Metrics::risk_level(2);
        Metrics::state_transition("OBSERVING", "ELIGIBLE", true);
        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("warden_risk_level"));
        assert!(text.contains("warden_state_transitions_total"));
    }
}
