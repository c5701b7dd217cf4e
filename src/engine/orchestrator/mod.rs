//! Bar-cycle driver and the background services around it.
//!
//! [`DecisionEngine`] is synchronous and owned by the caller's loop;
//! [`BackgroundServices`] runs retraining and checkpointing on the tokio
//! runtime and performs the final flush on shutdown.

mod background;
mod cycle;
mod replay;

pub use background::{BackgroundSchedule, BackgroundServices};
pub use cycle::{feature_frame, BarReport, DecisionEngine, StrategyChoice};
pub use replay::ReplayEvent;
