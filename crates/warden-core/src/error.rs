//! Error types for warden-core.

use thiserror::Error;

/// Core error types.
///
/// Raised only for malformed input at construction time. Normal policy and
/// risk outcomes are carried on result objects, never through this type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("Unknown claim type: {0}")]
    UnknownClaimType(String),

    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    #[error("Invalid risk context: {0}")]
    InvalidRiskContext(String),

    #[error("Invalid market window: {0}")]
    InvalidMarketWindow(String),

    #[error("Invalid witness health: {0}")]
    InvalidWitnessHealth(String),

    #[error("Unknown system state: {0}")]
    UnknownState(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
