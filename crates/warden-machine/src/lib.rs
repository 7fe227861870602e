//! Trading lifecycle for the warden permission gate.
//!
//! - `machine`: the history-owning state machine
//! - `regime_manager`: regime tag for the current trading cycle
//! - `processor`: claim policy and risk gating (`OBSERVING -> ELIGIBLE`)
//! - `service`: thread-safe facade tying them to a shared risk engine

pub mod error;
pub mod machine;
pub mod processor;
pub mod regime_manager;
pub mod service;

pub use error::{MachineError, MachineResult};
pub use machine::StateMachine;
pub use processor::{ClaimPolicyConfig, ClaimProcessor, ClaimResult, Rejection};
pub use regime_manager::RegimeManager;
pub use service::StateMachineService;
