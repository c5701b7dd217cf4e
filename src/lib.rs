//! Options pressure-field decision engine with online adaptive learning.
//!
//! Turns an options-chain snapshot into dealer-hedging pressure, elasticity
//! and movement energy, fuses that with other directional views into one
//! decision, and learns from realized trade outcomes.

mod errors;
mod prelude;

pub mod engine;
pub mod types;

pub use engine::checkpoint::CheckpointManager;
pub use engine::config::EngineConfig;
pub use engine::infra::{init_logging, LogConfig};
pub use engine::learning::{LearningOrchestrator, TradeClose};
pub use engine::orchestrator::{
    BackgroundSchedule, BackgroundServices, BarReport, DecisionEngine, ReplayEvent, StrategyChoice,
};
pub use errors::{CheckpointError, ConfigError, Error};
pub use prelude::Result;
pub use types::*;
