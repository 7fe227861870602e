//! Witness layer for the trading permission gate.
//!
//! Witnesses observe market data and propose claims. The orchestrator runs
//! them in isolation and arbitrates their claims; it never touches execution.

pub mod arbitration;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod window;
pub mod witness;
pub mod witnesses;

pub use arbitration::{resolve, AggregationResult, RankedClaim, Resolution};
pub use config::{ArbitrationConfig, WitnessSetConfig};
pub use error::{WitnessError, WitnessResult};
pub use orchestrator::Orchestrator;
pub use window::{evaluate_window, WindowConfig, WindowSignal};
pub use witness::{ActivityFlag, CrossLayerOp, ExecutionBoundary, Witness};
pub use witnesses::{
    MomentumConfig, MomentumWitness, VolatilityVetoConfig, VolatilityVetoWitness,
    VolumeConfirmConfig, VolumeConfirmWitness,
};
