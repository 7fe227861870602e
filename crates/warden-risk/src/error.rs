//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskError {
    #[error("Duplicate checker: {0}")]
    DuplicateChecker(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Recovery refused: {0}")]
    RecoveryRefused(String),
}

pub type RiskResult<T> = Result<T, RiskError>;
