//! Prometheus metrics and structured logging for warden.
//!
//! - Prometheus metrics for state transitions, risk levels, claims and
//!   witness arbitration
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
