//! Registry error types.

use warden_core::Tier;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Witness not found: {0}")]
    WitnessNotFound(String),

    #[error("Witness {witness_id} already registered as {existing}, cannot re-register as {requested}")]
    TierChange {
        witness_id: String,
        existing: Tier,
        requested: Tier,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;
