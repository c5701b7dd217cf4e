//! Online-learning configuration: bandit, thresholds, calibrator, lookahead, checkpoint.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{check_positive, check_range};
use crate::errors::Error;
use crate::prelude::Result;

/// Thompson-sampling strategy bandit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BanditConfig {
    /// Probability ε of overriding the deterministic choice with a Thompson draw
    pub exploration_rate: f64,
    pub prior_alpha: f64,
    pub prior_beta: f64,
    /// Fixed RNG seed; entropy-seeded when absent
    pub random_seed: Option<u64>,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.20,
            prior_alpha: 1.0,
            prior_beta: 1.0,
            random_seed: None,
        }
    }
}

impl BanditConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("learning.bandit.exploration_rate", self.exploration_rate, 0.0, 1.0)?;
        check_positive("learning.bandit.prior_alpha", self.prior_alpha)?;
        check_positive("learning.bandit.prior_beta", self.prior_beta)?;
        Ok(())
    }
}

/// Starting values for each adaptive threshold.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdInitials {
    pub elasticity_low: f64,
    pub energy_explosion: f64,
    pub confidence_gate: f64,
    pub acceleration_gate: f64,
}

impl Default for ThresholdInitials {
    fn default() -> Self {
        Self {
            elasticity_low: 0.8,
            energy_explosion: 2.0,
            confidence_gate: 0.6,
            acceleration_gate: 0.5,
        }
    }
}

/// Kalman threshold estimator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Process noise Q added to the variance on each predict step
    pub process_noise: f64,
    /// Measurement noise R of a separating-cut observation
    pub measurement_noise: f64,
    /// Starting error covariance
    pub initial_variance: f64,
    /// Floor on the error covariance and the gain denominator
    pub min_variance: f64,
    /// Closed trades considered when computing a separating cut (N)
    pub window: usize,
    /// Minimum closed trades in the window before measuring
    pub min_trades: usize,
    pub initial: ThresholdInitials,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            process_noise: 1e-3,
            measurement_noise: 5e-2,
            initial_variance: 1.0,
            min_variance: 1e-6,
            window: 50,
            min_trades: 10,
            initial: ThresholdInitials::default(),
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<()> {
        check_positive("learning.thresholds.process_noise", self.process_noise)?;
        check_positive("learning.thresholds.measurement_noise", self.measurement_noise)?;
        check_positive("learning.thresholds.initial_variance", self.initial_variance)?;
        check_positive("learning.thresholds.min_variance", self.min_variance)?;
        if self.window < 2 {
            return Err(Error::invalid_config(
                "learning.thresholds.window",
                self.window,
                "must be at least 2",
            ));
        }
        if self.min_trades < 2 || self.min_trades > self.window {
            return Err(Error::invalid_config(
                "learning.thresholds.min_trades",
                self.min_trades,
                "must be in [2, window]",
            ));
        }
        let init = &self.initial;
        for (field, value) in [
            ("learning.thresholds.initial.elasticity_low", init.elasticity_low),
            ("learning.thresholds.initial.energy_explosion", init.energy_explosion),
            ("learning.thresholds.initial.confidence_gate", init.confidence_gate),
            ("learning.thresholds.initial.acceleration_gate", init.acceleration_gate),
        ] {
            if !value.is_finite() {
                return Err(Error::invalid_config(field, value, "must be finite"));
            }
        }
        Ok(())
    }
}

/// Online logistic confidence calibrator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibratorConfig {
    pub learning_rate: f64,
    pub l2: f64,
    /// Samples before the model reports ready
    pub minimum_samples: u64,
    /// Recent predictions kept for the Brier score
    pub brier_window: usize,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            l2: 1e-3,
            minimum_samples: 50,
            brier_window: 100,
        }
    }
}

impl CalibratorConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("learning.calibrator.learning_rate", self.learning_rate, 1e-9, 10.0)?;
        check_range("learning.calibrator.l2", self.l2, 0.0, 1.0)?;
        if self.brier_window == 0 {
            return Err(Error::invalid_config(
                "learning.calibrator.brier_window",
                self.brier_window,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Sequence lookahead predictor and its background trainer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LookaheadConfig {
    /// Rolling buffer length L per symbol
    pub sequence_length: usize,
    /// Bars between a sequence's end and its realized-change label
    pub horizon_bars: usize,
    /// Cap on stored training pairs per process (oldest evicted)
    pub max_training_pairs: usize,
    /// Pairs required before a retrain is attempted
    pub min_training_pairs: usize,
    pub retrain_interval_secs: u64,
    /// Time budget for a single training run; overruns are discarded
    pub training_budget_secs: u64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    /// Fraction of the newest pairs held out for MAE / directional accuracy
    pub holdout_fraction: f64,
}

impl Default for LookaheadConfig {
    fn default() -> Self {
        Self {
            sequence_length: 20,
            horizon_bars: 5,
            max_training_pairs: 5_000,
            min_training_pairs: 50,
            retrain_interval_secs: 600,
            training_budget_secs: 30,
            epochs: 60,
            learning_rate: 0.02,
            l2: 1e-3,
            holdout_fraction: 0.2,
        }
    }
}

impl LookaheadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sequence_length < 2 {
            return Err(Error::invalid_config(
                "learning.lookahead.sequence_length",
                self.sequence_length,
                "must be at least 2",
            ));
        }
        if self.horizon_bars == 0 {
            return Err(Error::invalid_config(
                "learning.lookahead.horizon_bars",
                self.horizon_bars,
                "must be positive",
            ));
        }
        if self.min_training_pairs < 4 || self.min_training_pairs > self.max_training_pairs {
            return Err(Error::invalid_config(
                "learning.lookahead.min_training_pairs",
                self.min_training_pairs,
                "must be in [4, max_training_pairs]",
            ));
        }
        if self.retrain_interval_secs == 0 || self.training_budget_secs == 0 {
            return Err(Error::invalid_config(
                "learning.lookahead.retrain_interval_secs",
                self.retrain_interval_secs,
                "interval and budget must be positive",
            ));
        }
        if self.epochs == 0 {
            return Err(Error::invalid_config(
                "learning.lookahead.epochs",
                self.epochs,
                "must be positive",
            ));
        }
        check_range("learning.lookahead.learning_rate", self.learning_rate, 1e-9, 10.0)?;
        check_range("learning.lookahead.l2", self.l2, 0.0, 1.0)?;
        check_range("learning.lookahead.holdout_fraction", self.holdout_fraction, 0.0, 0.5)?;
        Ok(())
    }
}

/// Checkpoint persistence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub dir: PathBuf,
    pub interval_secs: u64,
    /// Timestamped backups older than this are removed
    pub keep_days: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/checkpoints"),
            interval_secs: 900,
            keep_days: 7,
        }
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(Error::invalid_config(
                "learning.checkpoint.interval_secs",
                self.interval_secs,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// All learning-component settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LearningConfig {
    pub bandit: BanditConfig,
    pub thresholds: ThresholdConfig,
    pub calibrator: CalibratorConfig,
    pub lookahead: LookaheadConfig,
    pub checkpoint: CheckpointConfig,
}

impl LearningConfig {
    pub fn validate(&self) -> Result<()> {
        self.bandit.validate()?;
        self.thresholds.validate()?;
        self.calibrator.validate()?;
        self.lookahead.validate()?;
        self.checkpoint.validate()?;
        Ok(())
    }
}
