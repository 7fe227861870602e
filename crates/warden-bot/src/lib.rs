//! Trading permission gate runtime.
//!
//! Wires the witness layer, risk engine and state machine into a replay loop:
//! - Market windows from a JSON-lines feed
//! - Witness claims arbitrated by the orchestrator
//! - Dominant claims gated by the risk engine and state machine
//! - Paper positions booked against a simulated account

pub mod account;
pub mod app;
pub mod config;
pub mod error;
pub mod feed;

pub use account::{ClosedTrade, OpenTrade, PaperAccount};
pub use app::{Application, RunSummary};
pub use config::{AppConfig, TradingConfig};
pub use error::{AppError, AppResult};
pub use feed::{FeedConfig, ReplayFeed};
