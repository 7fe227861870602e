//! Core domain types for the warden trading permission gate.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `SystemState`, `Transition`: lifecycle states and the static transition table
//! - `Claim`, `ClaimType`, `Direction`: witness opinions
//! - `TradeRegime`: market condition tags
//! - `RiskLevel`, `RiskContext`, `RiskEvent`, `RiskCheckResult`: risk vocabulary
//! - `Tier`, `WitnessHealth`: witness metadata
//! - `MarketBar`, `MarketWindow`: read-only market observations

pub mod claim;
pub mod error;
pub mod market;
pub mod regime;
pub mod risk;
pub mod state;
pub mod witness;

pub use claim::{Claim, ClaimBuilder, ClaimType, Direction, RawClaim, REGIME_CONSTRAINT};
pub use error::{CoreError, Result};
pub use market::{MarketBar, MarketWindow, DEFAULT_WINDOW_CAPACITY};
pub use regime::TradeRegime;
pub use risk::{mean, RiskCheckResult, RiskContext, RiskEvent, RiskLevel};
pub use state::{is_valid_transition, valid_next_states, SystemState, Transition};
pub use witness::{clamp_weight, Grade, Tier, WitnessHealth, WitnessStatus, MAX_WEIGHT, MIN_WEIGHT};
