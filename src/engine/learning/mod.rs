//! Online learning from realized trade outcomes.
//!
//! ```text
//!                        ┌──────────────────────────────┐
//!  after_trade_closed ──►│ LearningOrchestrator         │
//!                        │  Mutex<StrategyBandit>       │──► select_strategy
//!                        │  Mutex<AdaptiveThresholds>   │──► thresholds / confidence_gate
//!                        │  Mutex<ConfidenceCalibrator> │──► calibrate
//!                        │  Mutex<LookaheadPredictor>   │──► add_snapshot / predict
//!                        │  watch<LookaheadModel>       │◄── TrainerWorker
//!                        └──────────────────────────────┘
//!                                     │ to_checkpoint / restore
//!                                     ▼
//!                              CheckpointManager
//! ```
//!
//! Every component sits behind its own lock. A checkpoint reads each one under
//! its lock in turn, so sections are internally consistent but may be a few
//! updates apart from each other.

mod adaptive_threshold;
mod calibrator;
mod lookahead;
mod outcome;
mod strategy_bandit;
mod trainer;

pub use adaptive_threshold::{
    separating_cut, AdaptiveThresholds, ScalarKalman, ThresholdKind, ThresholdSnapshot,
};
pub use calibrator::{CalibrationSummary, ConfidenceCalibrator};
pub use lookahead::{
    sequence_inputs, train, FeatureFrame, LookaheadModel, LookaheadPrediction, LookaheadPredictor,
    TrainingMetrics, TrainingPair, FRAME_DIM, MODEL_INPUT_DIM,
};
pub use outcome::{bandit_reward, PressureSnapshot, SignalVector, TradeClose, SIGNAL_DIM};
pub use strategy_bandit::{BanditSummary, BetaArm, StrategyBandit, StrategySelection};
pub use trainer::{run_training_job, ModelPublisher, TrainerWorker, TrainingJob, TrainingOutcome};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::engine::checkpoint::{
    CheckpointBundle, CheckpointManager, CheckpointMetadata, CHECKPOINT_VERSION,
};
use crate::engine::config::LearningConfig;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// What a trade close changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeUpdate {
    pub reward: f64,
    pub won: bool,
    pub thresholds_updated: Vec<ThresholdKind>,
    pub calibrator_ready: bool,
}

/// Whether startup restored a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Warm,
    Cold,
}

/// Aggregate learning state for logging.
#[derive(Debug, Clone, Serialize)]
pub struct LearningSummary {
    pub trades_processed: u64,
    pub bandit: BanditSummary,
    pub thresholds: ThresholdSnapshot,
    pub calibration: CalibrationSummary,
    pub lookahead_pairs: usize,
    pub lookahead_metrics: Option<TrainingMetrics>,
}

/// Owns every learning component. Shared as `Arc<LearningOrchestrator>`.
pub struct LearningOrchestrator {
    config: LearningConfig,
    bandit: Mutex<StrategyBandit>,
    thresholds: Mutex<AdaptiveThresholds>,
    calibrator: Mutex<ConfidenceCalibrator>,
    lookahead: Mutex<LookaheadPredictor>,
    model_tx: Arc<ModelPublisher>,
    started_at: Instant,
    trades_processed: AtomicU64,
}

impl LearningOrchestrator {
    pub fn new(config: LearningConfig) -> Self {
        let (model_tx, _) = watch::channel(None);
        Self {
            bandit: Mutex::new(StrategyBandit::new(config.bandit.clone())),
            thresholds: Mutex::new(AdaptiveThresholds::new(config.thresholds.clone())),
            calibrator: Mutex::new(ConfidenceCalibrator::new(config.calibrator.clone())),
            lookahead: Mutex::new(LookaheadPredictor::new(config.lookahead.clone())),
            model_tx: Arc::new(model_tx),
            started_at: Instant::now(),
            trades_processed: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    // === Decision path ===

    /// Choose a strategy: the deterministic pick, or an ε-Thompson override.
    pub fn select_strategy(
        &self,
        symbol: &str,
        deterministic: &str,
        candidates: &[String],
    ) -> StrategySelection {
        lock(&self.bandit).select(symbol, deterministic, candidates)
    }

    /// Calibrated win probability; `None` until the calibrator is ready.
    pub fn calibrate(&self, signal: &SignalVector) -> Option<f64> {
        lock(&self.calibrator).predict(signal)
    }

    pub fn thresholds(&self) -> ThresholdSnapshot {
        lock(&self.thresholds).snapshot()
    }

    /// Learned per-agent confidence gate, once it has been measured.
    pub fn confidence_gate(&self) -> Option<f64> {
        let snapshot = self.thresholds();
        snapshot
            .confidence_gate_learned
            .then_some(snapshot.confidence_gate)
    }

    /// Append one bar of sequence features for `symbol`.
    pub fn add_snapshot(&self, symbol: &str, frame: FeatureFrame) -> bool {
        lock(&self.lookahead).add_snapshot(symbol, frame)
    }

    /// Predict near-term drift with the latest published model.
    pub fn predict(&self, symbol: &str, now: DateTime<Utc>) -> Option<LookaheadPrediction> {
        let model = self.lookahead_model();
        lock(&self.lookahead).predict(symbol, model.as_deref(), now)
    }

    // === Feedback path ===

    /// Apply a closed trade to every learner. Synchronous and not idempotent:
    /// delivering the same close twice counts it twice.
    pub fn after_trade_closed(&self, close: &TradeClose) -> TradeUpdate {
        let won = close.is_win();
        let reward = lock(&self.bandit).update(
            &close.symbol,
            &close.strategy_id,
            close.realized_pnl,
            close.capital_risked,
        );
        let thresholds_updated =
            lock(&self.thresholds).record_trade(&close.pressure_snapshot_at_entry, won);
        let calibrator_ready = {
            let mut cal = lock(&self.calibrator);
            cal.update(&close.pressure_snapshot_at_entry.signal, won);
            cal.is_ready()
        };
        let trades = self.trades_processed.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            symbol = %close.symbol,
            strategy = %close.strategy_id,
            pnl = close.realized_pnl,
            reward = %format!("{:.3}", reward),
            won = won,
            raw_confidence = %format!("{:.3}", close.raw_confidence_at_entry),
            iv_rank = ?close.iv_rank,
            thresholds_updated = thresholds_updated.len(),
            calibrator_ready = calibrator_ready,
            trades = trades,
            "Trade close applied"
        );

        TradeUpdate {
            reward,
            won,
            thresholds_updated,
            calibrator_ready,
        }
    }

    // === Lookahead training plumbing ===

    /// Snapshot copy of the training set for the background worker.
    pub fn training_job(&self) -> TrainingJob {
        TrainingJob {
            pairs: lock(&self.lookahead).training_pairs(),
            requested_at: Utc::now(),
        }
    }

    /// Sender the training worker publishes through.
    pub fn model_publisher(&self) -> Arc<ModelPublisher> {
        Arc::clone(&self.model_tx)
    }

    pub fn subscribe_models(&self) -> watch::Receiver<Option<Arc<LookaheadModel>>> {
        self.model_tx.subscribe()
    }

    pub fn lookahead_model(&self) -> Option<Arc<LookaheadModel>> {
        self.model_tx.borrow().clone()
    }

    // === Persistence ===

    pub fn trades_processed(&self) -> u64 {
        self.trades_processed.load(Ordering::Relaxed)
    }

    /// Assemble a checkpoint, reading each component under its own lock.
    pub fn to_checkpoint(&self) -> CheckpointBundle {
        let bandit = lock(&self.bandit).to_checkpoint(now_ms());
        let thresholds = lock(&self.thresholds).to_checkpoint(now_ms());
        let calibration = lock(&self.calibrator).to_checkpoint(now_ms());
        let model = self.lookahead_model().map(|m| (*m).clone());
        let lookahead = lock(&self.lookahead).to_checkpoint(now_ms(), model);

        CheckpointBundle {
            metadata: CheckpointMetadata {
                version: CHECKPOINT_VERSION,
                timestamp_ms: now_ms(),
                session_duration_s: self.started_at.elapsed().as_secs_f64(),
                trades_processed: self.trades_processed(),
            },
            bandit,
            thresholds,
            calibration,
            lookahead,
        }
    }

    /// Load every section from a bundle.
    pub fn restore(&self, bundle: &CheckpointBundle) {
        lock(&self.bandit).restore_from_checkpoint(&bundle.bandit);
        lock(&self.thresholds).restore_from_checkpoint(&bundle.thresholds);
        if !lock(&self.calibrator).restore_from_checkpoint(&bundle.calibration) {
            warn!("Calibration section unusable, calibrator starts cold");
        }
        if let Some(model) = lock(&self.lookahead).restore_from_checkpoint(&bundle.lookahead) {
            self.model_tx.send_replace(Some(Arc::new(model)));
        }
        self.trades_processed
            .store(bundle.metadata.trades_processed, Ordering::Relaxed);
    }

    /// Restore the latest checkpoint, or start cold when it is missing,
    /// corrupt, or from another schema version.
    pub fn restore_or_cold_start(&self, manager: &CheckpointManager) -> StartMode {
        match manager.load_latest() {
            Ok(Some(bundle)) => {
                self.restore(&bundle);
                info!(
                    trades = bundle.metadata.trades_processed,
                    saved_at_ms = bundle.metadata.timestamp_ms,
                    "Learning state restored from checkpoint"
                );
                StartMode::Warm
            }
            Ok(None) => {
                info!(
                    dir = %manager.base_dir().display(),
                    "No checkpoint found, cold start"
                );
                StartMode::Cold
            }
            Err(e) => {
                warn!(error = %e, "Checkpoint unusable, cold start");
                StartMode::Cold
            }
        }
    }

    /// Save a checkpoint and prune old backups.
    pub fn save_checkpoint(&self, manager: &CheckpointManager) -> crate::prelude::Result<()> {
        manager.save(&self.to_checkpoint())?;
        manager.cleanup_old(self.config.checkpoint.keep_days)?;
        Ok(())
    }

    pub fn summary(&self) -> LearningSummary {
        LearningSummary {
            trades_processed: self.trades_processed(),
            bandit: lock(&self.bandit).summary(),
            thresholds: self.thresholds(),
            calibration: lock(&self.calibrator).summary(),
            lookahead_pairs: lock(&self.lookahead).pair_count(),
            lookahead_metrics: self.lookahead_model().map(|m| m.metrics.clone()),
        }
    }
}

impl std::fmt::Debug for LearningOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningOrchestrator")
            .field("trades_processed", &self.trades_processed())
            .field("has_lookahead_model", &self.model_tx.borrow().is_some())
            .finish()
    }
}
