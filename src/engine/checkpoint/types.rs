//! Checkpoint data types for persisting learned state across sessions.
//!
//! Each section captures the minimum state needed to warm-start one
//! learning component and carries its own save timestamp. Rebuildable state
//! (the lookahead training set, recent Brier window, per-symbol regime
//! memory) is not persisted.

use serde::{Deserialize, Serialize};

use crate::engine::learning::{FeatureFrame, LookaheadModel, PressureSnapshot};

/// Schema version written by this build.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Complete checkpoint document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointBundle {
    pub metadata: CheckpointMetadata,
    pub bandit: BanditCheckpoint,
    pub thresholds: ThresholdCheckpoint,
    pub calibration: CalibrationCheckpoint,
    pub lookahead: LookaheadCheckpoint,
}

/// Checkpoint metadata for versioning and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Schema version for compatibility checks
    pub version: u32,
    /// When the bundle was assembled (ms since epoch)
    pub timestamp_ms: u64,
    /// How long the session ran before this checkpoint (seconds)
    pub session_duration_s: f64,
    #[serde(default)]
    pub trades_processed: u64,
}

/// One Beta arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditArmCheckpoint {
    pub symbol: String,
    pub strategy_id: String,
    pub alpha: f64,
    pub beta: f64,
    #[serde(default)]
    pub trials: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BanditCheckpoint {
    #[serde(default)]
    pub saved_at_ms: u64,
    #[serde(default)]
    pub arms: Vec<BanditArmCheckpoint>,
    #[serde(default)]
    pub total_updates: u64,
}

/// One named Kalman threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalmanCheckpoint {
    pub name: String,
    pub estimate: f64,
    /// Error covariance P
    pub variance: f64,
    /// Q at save time (informational; configuration wins on restore)
    pub process_noise: f64,
    /// R at save time (informational; configuration wins on restore)
    pub measurement_noise: f64,
    #[serde(default)]
    pub updates: u64,
    #[serde(default)]
    pub last_measurement: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCheckpoint {
    #[serde(default)]
    pub saved_at_ms: u64,
    #[serde(default)]
    pub filters: Vec<KalmanCheckpoint>,
    /// Recent closes used for separating cuts: (entry snapshot, won)
    #[serde(default)]
    pub window: Vec<(PressureSnapshot, bool)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCheckpoint {
    #[serde(default)]
    pub saved_at_ms: u64,
    #[serde(default)]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
    /// Welford running mean per feature
    #[serde(default)]
    pub scaler_mean: Vec<f64>,
    /// Welford M2 per feature
    #[serde(default)]
    pub scaler_m2: Vec<f64>,
    #[serde(default)]
    pub scaler_count: u64,
    #[serde(default)]
    pub scaler_frozen: bool,
    #[serde(default)]
    pub sample_count: u64,
    #[serde(default)]
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolHistoryCheckpoint {
    pub symbol: String,
    pub frames: Vec<FeatureFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookaheadCheckpoint {
    #[serde(default)]
    pub saved_at_ms: u64,
    /// Last published model, if any
    #[serde(default)]
    pub model: Option<LookaheadModel>,
    #[serde(default)]
    pub histories: Vec<SymbolHistoryCheckpoint>,
}
