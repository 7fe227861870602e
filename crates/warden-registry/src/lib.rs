//! Witness metadata registry for the arbitration layer.
//!
//! Provides the narrow read interface the core consumes
//! (`WitnessHealthProvider`) and an in-memory implementation that also
//! tracks rolling win/loss outcomes per witness.

pub mod error;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{HealthTrackingConfig, RegistryEntry, WitnessHealthProvider, WitnessRegistry};
