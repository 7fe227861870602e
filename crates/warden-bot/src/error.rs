//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Core error: {0}")]
    Core(#[from] warden_core::CoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] warden_registry::RegistryError),

    #[error("Risk error: {0}")]
    Risk(#[from] warden_risk::RiskError),

    #[error("State machine error: {0}")]
    Machine(#[from] warden_machine::MachineError),

    #[error("Witness error: {0}")]
    Witness(#[from] warden_witness::WitnessError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] warden_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
