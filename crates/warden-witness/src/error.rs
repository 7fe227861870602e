//! Witness error types.

use thiserror::Error;
use warden_core::{CoreError, Tier};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WitnessError {
    /// A witness reached for an execution-layer capability. Structural fault.
    #[error("Architecture violation: witness {witness} attempted {operation}")]
    ArchitectureViolation { witness: String, operation: String },

    #[error("Duplicate witness: {0}")]
    DuplicateWitness(String),

    #[error("Witness {witness} declares {declared} but is registered as {registered}")]
    TierMismatch {
        witness: String,
        declared: Tier,
        registered: Tier,
    },

    /// Ordinary failure while producing a claim.
    #[error("Claim generation failed in {witness}: {message}")]
    Generation { witness: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl WitnessError {
    pub fn generation(witness: &str, message: impl Into<String>) -> Self {
        Self::Generation {
            witness: witness.to_string(),
            message: message.into(),
        }
    }

    pub fn is_architecture_violation(&self) -> bool {
        matches!(self, Self::ArchitectureViolation { .. })
    }
}

pub type WitnessResult<T> = Result<T, WitnessError>;
