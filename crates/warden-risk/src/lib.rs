//! Risk control for the warden permission gate.
//!
//! - `checkers`: five pure rules over a `RiskContext`
//!   (account, execution, regime, position, strategy decay)
//! - `engine`: runs the chain, aggregates by maximum level and holds the
//!   sticky lock / forced cooldown
//! - `recovery`: unlock gating and the degraded mode that follows an unlock

pub mod checkers;
pub mod engine;
pub mod error;
pub mod recovery;

pub use checkers::{
    default_chain, AccountRiskChecker, AccountRiskConfig, ExecutionRiskChecker,
    ExecutionRiskConfig, PositionRiskChecker, PositionRiskConfig, RegimeRiskChecker,
    RegimeRiskConfig, RiskChecker, RiskCheckersConfig, StrategyDecayChecker, StrategyDecayConfig,
};
pub use engine::{EngineStatus, RiskControlEngine};
pub use error::{RiskError, RiskResult};
pub use recovery::{RecoveryConfig, RecoveryManager, UnlockRecord};
