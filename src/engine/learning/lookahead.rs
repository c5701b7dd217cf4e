//! Lookahead predictor: near-term drift from recent pressure-field history.
//!
//! ```text
//! add_snapshot ──► per-symbol history (L + H frames)
//!                     │ full window
//!                     ▼
//!         TrainingPair(sequence[0..L] → % change after H bars)  ──► bounded set
//!                                                                  │ background
//!                                                                  ▼
//!                                   train() ──► LookaheadModel (published)
//! ```
//!
//! The model is a ridge-regularized linear map over summary features of the
//! sequence (last frame, mean, end-to-start slope, price momentum).

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::checkpoint::{LookaheadCheckpoint, SymbolHistoryCheckpoint};
use crate::engine::config::LookaheadConfig;
use crate::types::direction_sign;

/// Per-bar features stored in the sequence buffer.
pub const FRAME_DIM: usize = 6;
/// Model input width derived from one sequence.
pub const MODEL_INPUT_DIM: usize = 3 * FRAME_DIM + 1;

/// One bar of sequence input.
///
/// Feature layout: `[dealer_sign, tanh(net_energy), tanh(ln asymmetry),
/// acceleration_likelihood, tanh(ln elasticity), jump_score]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    pub spot: f64,
    pub features: [f64; FRAME_DIM],
}

impl FeatureFrame {
    pub fn new(spot: f64, features: [f64; FRAME_DIM]) -> Self {
        Self { spot, features }
    }

    fn is_valid(&self) -> bool {
        self.spot.is_finite() && self.spot > 0.0 && self.features.iter().all(|v| v.is_finite())
    }
}

/// Sequence summary paired with its realized percent change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPair {
    pub inputs: Vec<f64>,
    pub target_pct: f64,
}

/// Holdout quality of a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Mean absolute error in percent
    pub mae: f64,
    pub directional_accuracy: f64,
    /// Pairs used for fitting
    pub sample_count: usize,
    pub holdout_count: usize,
    pub trained_at: DateTime<Utc>,
}

/// Trained linear model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookaheadModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub input_mean: Vec<f64>,
    pub input_std: Vec<f64>,
    pub metrics: TrainingMetrics,
}

impl LookaheadModel {
    fn is_usable(&self) -> bool {
        self.weights.len() == MODEL_INPUT_DIM
            && self.input_mean.len() == MODEL_INPUT_DIM
            && self.input_std.len() == MODEL_INPUT_DIM
            && self.bias.is_finite()
            && self.weights.iter().all(|w| w.is_finite())
    }

    pub fn predict_pct(&self, inputs: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(inputs)
            .zip(self.input_mean.iter().zip(&self.input_std))
            .map(|((w, x), (m, s))| w * (x - m) / s)
            .sum::<f64>()
            + self.bias
    }

    /// Confidence for a predicted change: directional edge on the holdout
    /// times the prediction's size relative to the holdout MAE.
    pub fn confidence(&self, predicted_pct: f64) -> f64 {
        let edge = ((self.metrics.directional_accuracy - 0.5) * 2.0).clamp(0.0, 1.0);
        let strength = (predicted_pct.abs() / self.metrics.mae.max(1e-6)).tanh();
        let c = edge * strength;
        if c.is_finite() {
            c.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Latest prediction for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookaheadPrediction {
    pub predicted_change_pct: f64,
    pub direction: i8,
    pub confidence: f64,
    pub made_at: DateTime<Utc>,
}

/// Summary features for a sequence of frames.
pub fn sequence_inputs(frames: &[FeatureFrame]) -> Vec<f64> {
    let mut inputs = Vec::with_capacity(MODEL_INPUT_DIM);
    let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
        return vec![0.0; MODEL_INPUT_DIM];
    };
    inputs.extend_from_slice(&last.features);
    let n = frames.len() as f64;
    for i in 0..FRAME_DIM {
        inputs.push(frames.iter().map(|f| f.features[i]).sum::<f64>() / n);
    }
    for i in 0..FRAME_DIM {
        inputs.push(last.features[i] - first.features[i]);
    }
    inputs.push((last.spot / first.spot - 1.0) * 100.0);
    inputs
}

/// Fit a model on `pairs`. Returns `None` below `min_training_pairs` or when
/// the fit diverges.
///
/// The newest `holdout_fraction` of pairs is held out for metrics; with no
/// holdout the metrics are in-sample.
pub fn train(
    pairs: &[TrainingPair],
    config: &LookaheadConfig,
    now: DateTime<Utc>,
) -> Option<LookaheadModel> {
    let pairs: Vec<&TrainingPair> = pairs
        .iter()
        .filter(|p| p.inputs.len() == MODEL_INPUT_DIM && p.target_pct.is_finite())
        .collect();
    if pairs.len() < config.min_training_pairs {
        return None;
    }

    let holdout = ((pairs.len() as f64) * config.holdout_fraction).floor() as usize;
    let (fit, eval) = pairs.split_at(pairs.len() - holdout);
    let eval = if eval.is_empty() { fit } else { eval };

    let n = fit.len() as f64;
    let mut mean = vec![0.0; MODEL_INPUT_DIM];
    for p in fit {
        for (m, x) in mean.iter_mut().zip(&p.inputs) {
            *m += x / n;
        }
    }
    let mut std = vec![0.0; MODEL_INPUT_DIM];
    for p in fit {
        for ((s, x), m) in std.iter_mut().zip(&p.inputs).zip(&mean) {
            *s += (x - m).powi(2) / n;
        }
    }
    for s in std.iter_mut() {
        *s = if *s > 1e-12 { s.sqrt() } else { 1.0 };
    }

    let mut model = LookaheadModel {
        weights: vec![0.0; MODEL_INPUT_DIM],
        bias: fit.iter().map(|p| p.target_pct).sum::<f64>() / n,
        input_mean: mean,
        input_std: std,
        metrics: TrainingMetrics {
            mae: 0.0,
            directional_accuracy: 0.5,
            sample_count: fit.len(),
            holdout_count: holdout,
            trained_at: now,
        },
    };

    let lr = config.learning_rate;
    let mut z = vec![0.0; MODEL_INPUT_DIM];
    for _ in 0..config.epochs {
        for p in fit {
            for i in 0..MODEL_INPUT_DIM {
                z[i] = (p.inputs[i] - model.input_mean[i]) / model.input_std[i];
            }
            let pred = model.weights.iter().zip(&z).map(|(w, x)| w * x).sum::<f64>() + model.bias;
            let err = pred - p.target_pct;
            for (w, x) in model.weights.iter_mut().zip(&z) {
                *w -= lr * (err * x + config.l2 * *w);
            }
            model.bias -= lr * err;
        }
        if !model.is_usable() {
            return None;
        }
    }

    let mut abs_err = 0.0;
    let mut hits = 0usize;
    let mut directional = 0usize;
    for p in eval {
        let pred = model.predict_pct(&p.inputs);
        abs_err += (pred - p.target_pct).abs();
        let actual = direction_sign(p.target_pct);
        if actual != 0 {
            directional += 1;
            if direction_sign(pred) == actual {
                hits += 1;
            }
        }
    }
    model.metrics.mae = abs_err / eval.len() as f64;
    model.metrics.directional_accuracy = if directional > 0 {
        hits as f64 / directional as f64
    } else {
        0.5
    };
    Some(model)
}

/// Per-symbol buffers and the bounded training set.
#[derive(Debug, Clone)]
pub struct LookaheadPredictor {
    config: LookaheadConfig,
    history: HashMap<String, VecDeque<FeatureFrame>>,
    pairs: VecDeque<TrainingPair>,
    last_prediction: HashMap<String, LookaheadPrediction>,
}

impl LookaheadPredictor {
    pub fn new(config: LookaheadConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
            pairs: VecDeque::new(),
            last_prediction: HashMap::new(),
        }
    }

    fn history_len(&self) -> usize {
        self.config.sequence_length + self.config.horizon_bars
    }

    /// Append one bar. Returns true when a new training pair was produced.
    /// Invalid frames are dropped.
    pub fn add_snapshot(&mut self, symbol: &str, frame: FeatureFrame) -> bool {
        if !frame.is_valid() {
            return false;
        }
        let cap = self.history_len();
        let l = self.config.sequence_length;
        let history = self.history.entry(symbol.to_string()).or_default();
        if history.len() == cap {
            history.pop_front();
        }
        history.push_back(frame);
        if history.len() < cap {
            return false;
        }

        let window: Vec<FeatureFrame> = history.iter().copied().collect();
        let anchor = window[l - 1].spot;
        let realized = window[cap - 1].spot;
        let pair = TrainingPair {
            inputs: sequence_inputs(&window[..l]),
            target_pct: (realized / anchor - 1.0) * 100.0,
        };
        if self.pairs.len() == self.config.max_training_pairs {
            self.pairs.pop_front();
        }
        self.pairs.push_back(pair);
        true
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Copy of the training set for the background worker.
    pub fn training_pairs(&self) -> Vec<TrainingPair> {
        self.pairs.iter().cloned().collect()
    }

    /// Predict from the symbol's most recent `L` frames with the given model.
    pub fn predict(
        &mut self,
        symbol: &str,
        model: Option<&LookaheadModel>,
        now: DateTime<Utc>,
    ) -> Option<LookaheadPrediction> {
        let model = model.filter(|m| m.is_usable())?;
        let history = self.history.get(symbol)?;
        let l = self.config.sequence_length;
        if history.len() < l {
            return None;
        }
        let recent: Vec<FeatureFrame> = history.iter().skip(history.len() - l).copied().collect();
        let pct = model.predict_pct(&sequence_inputs(&recent));
        if !pct.is_finite() {
            return None;
        }
        let prediction = LookaheadPrediction {
            predicted_change_pct: pct,
            direction: direction_sign(pct),
            confidence: model.confidence(pct),
            made_at: now,
        };
        self.last_prediction.insert(symbol.to_string(), prediction.clone());
        Some(prediction)
    }

    pub fn last_prediction(&self, symbol: &str) -> Option<&LookaheadPrediction> {
        self.last_prediction.get(symbol)
    }

    pub fn to_checkpoint(&self, saved_at_ms: u64, model: Option<LookaheadModel>) -> LookaheadCheckpoint {
        let mut histories: Vec<SymbolHistoryCheckpoint> = self
            .history
            .iter()
            .map(|(symbol, frames)| SymbolHistoryCheckpoint {
                symbol: symbol.clone(),
                frames: frames.iter().copied().collect(),
            })
            .collect();
        histories.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        LookaheadCheckpoint {
            saved_at_ms,
            model,
            histories,
        }
    }

    /// Restore buffers; returns the checkpointed model when it is usable.
    pub fn restore_from_checkpoint(&mut self, cp: &LookaheadCheckpoint) -> Option<LookaheadModel> {
        let cap = self.history_len();
        self.history.clear();
        for h in &cp.histories {
            let valid: Vec<FeatureFrame> = h.frames.iter().copied().filter(FeatureFrame::is_valid).collect();
            let skip = valid.len().saturating_sub(cap);
            self.history
                .insert(h.symbol.clone(), valid.into_iter().skip(skip).collect());
        }
        cp.model.clone().filter(LookaheadModel::is_usable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn small_config() -> LookaheadConfig {
        LookaheadConfig {
            sequence_length: 4,
            horizon_bars: 2,
            max_training_pairs: 10,
            min_training_pairs: 4,
            ..Default::default()
        }
    }

    fn frame(spot: f64, x: f64) -> FeatureFrame {
        FeatureFrame::new(spot, [x, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    #[test]
    fn test_pairs_use_realized_change_after_horizon() {
        let mut p = LookaheadPredictor::new(small_config());
        let spots = [100.0, 101.0, 102.0, 103.0, 104.0, 110.0, 111.0];
        let emitted: Vec<bool> = spots.iter().map(|s| p.add_snapshot("SPY", frame(*s, 0.0))).collect();
        assert_eq!(emitted, vec![false, false, false, false, false, true, true]);

        let pairs = p.training_pairs();
        // Anchor is the 4th frame (103), realized is 2 bars later (110)
        assert!((pairs[0].target_pct - (110.0 / 103.0 - 1.0) * 100.0).abs() < 1e-9);
        assert!((pairs[1].target_pct - (111.0 / 104.0 - 1.0) * 100.0).abs() < 1e-9);
        assert_eq!(pairs[0].inputs.len(), MODEL_INPUT_DIM);
    }

    #[test]
    fn test_training_set_is_bounded() {
        let mut p = LookaheadPredictor::new(small_config());
        for i in 0..50 {
            p.add_snapshot("SPY", frame(100.0 + i as f64, 0.0));
        }
        assert_eq!(p.pair_count(), 10);
        assert!(!p.add_snapshot("SPY", frame(f64::NAN, 0.0)));
        assert!(!p.add_snapshot("SPY", frame(-1.0, 0.0)));
    }

    #[test]
    fn test_train_recovers_linear_signal() {
        let mut rng = StdRng::seed_from_u64(3);
        let pairs: Vec<TrainingPair> = (0..400)
            .map(|_| {
                let inputs: Vec<f64> = (0..MODEL_INPUT_DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
                let target_pct = 0.8 * inputs[0] - 0.5 * inputs[3];
                TrainingPair { inputs, target_pct }
            })
            .collect();
        let config = LookaheadConfig {
            min_training_pairs: 50,
            ..Default::default()
        };
        let model = train(&pairs, &config, Utc::now()).unwrap();
        assert_eq!(model.metrics.holdout_count, 80);
        assert!(model.metrics.directional_accuracy > 0.9, "{:?}", model.metrics);
        assert!(model.metrics.mae < 0.1, "{:?}", model.metrics);
    }

    #[test]
    fn test_train_requires_minimum_pairs() {
        let pairs = vec![
            TrainingPair {
                inputs: vec![0.0; MODEL_INPUT_DIM],
                target_pct: 1.0,
            };
            3
        ];
        assert!(train(&pairs, &small_config(), Utc::now()).is_none());
    }

    #[test]
    fn test_predict_needs_model_and_full_buffer() {
        let mut p = LookaheadPredictor::new(small_config());
        let model = LookaheadModel {
            weights: {
                let mut w = vec![0.0; MODEL_INPUT_DIM];
                w[0] = 1.0;
                w
            },
            bias: 0.0,
            input_mean: vec![0.0; MODEL_INPUT_DIM],
            input_std: vec![1.0; MODEL_INPUT_DIM],
            metrics: TrainingMetrics {
                mae: 0.5,
                directional_accuracy: 0.8,
                sample_count: 100,
                holdout_count: 20,
                trained_at: Utc::now(),
            },
        };
        p.add_snapshot("SPY", frame(100.0, 1.0));
        assert!(p.predict("SPY", Some(&model), Utc::now()).is_none());
        for _ in 0..3 {
            p.add_snapshot("SPY", frame(100.0, 1.0));
        }
        assert!(p.predict("SPY", None, Utc::now()).is_none());

        let pred = p.predict("SPY", Some(&model), Utc::now()).unwrap();
        assert_eq!(pred.direction, 1);
        assert!((pred.predicted_change_pct - 1.0).abs() < 1e-12);
        assert!((pred.confidence - 0.6 * 2.0f64.tanh()).abs() < 1e-12);
        assert_eq!(p.last_prediction("SPY"), Some(&pred));
    }

    #[test]
    fn test_checkpoint_restores_buffers() {
        let mut p = LookaheadPredictor::new(small_config());
        for i in 0..5 {
            p.add_snapshot("QQQ", frame(300.0 + i as f64, 0.1));
        }
        let cp = p.to_checkpoint(42, None);
        let mut restored = LookaheadPredictor::new(small_config());
        assert!(restored.restore_from_checkpoint(&cp).is_none());
        assert!(restored.add_snapshot("QQQ", frame(306.0, 0.1)));
    }
}
