//! Options pressure-field decision engine.
//!
//! ```text
//! ChainSnapshot
//!   │
//!   ▼
//! pressure ──► elasticity ──► regime ──► composer (hedge + external + lookahead views)
//!                                           │            ▲
//!                                           ▼            │ gates, calibration,
//!                                    ComposerDecision    │ lookahead, strategy
//!                                           │            │
//!                             (execution) ──┴─► learning ┘ ◄── TradeClose
//!                                                  │
//!                                             checkpoint
//! ```
//!
//! Modules:
//! - `pressure`: dealer positioning and directional gamma/vanna/charm pressure
//! - `elasticity`: stiffness and movement energy
//! - `regime`: multi-axis regime labels and per-symbol stability
//! - `composer`: agents and consensus fusion
//! - `learning`: bandit, adaptive thresholds, calibrator, lookahead predictor
//! - `checkpoint`: versioned persistence of learned state
//! - `orchestrator`: per-bar cycle and background services
//! - `config` / `infra`: configuration and logging

pub mod checkpoint;
pub mod composer;
pub mod config;
pub mod elasticity;
pub mod infra;
pub mod learning;
pub mod orchestrator;
pub mod pressure;
pub mod regime;

#[cfg(test)]
mod tests;

pub use checkpoint::CheckpointManager;
pub use composer::Composer;
pub use config::EngineConfig;
pub use learning::{LearningOrchestrator, TradeClose};
pub use orchestrator::{BackgroundServices, BarReport, DecisionEngine, StrategyChoice};
