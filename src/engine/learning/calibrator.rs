//! Online logistic confidence calibrator.
//!
//! Maps the composer's raw signal vector to P(trade wins). One SGD step per
//! closed trade on the log-loss with L2 shrinkage. Features are standardized
//! with Welford running statistics until the model becomes ready; from then
//! on the scaler is frozen so a label only ever moves the output along its
//! gradient.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::info;

use crate::engine::checkpoint::CalibrationCheckpoint;
use crate::engine::config::CalibratorConfig;

use super::outcome::{SignalVector, SIGNAL_DIM};

/// Per-feature Welford statistics.
#[derive(Debug, Clone, PartialEq)]
struct FeatureScaler {
    mean: [f64; SIGNAL_DIM],
    m2: [f64; SIGNAL_DIM],
    count: u64,
    frozen: bool,
}

impl FeatureScaler {
    fn new() -> Self {
        Self {
            mean: [0.0; SIGNAL_DIM],
            m2: [0.0; SIGNAL_DIM],
            count: 0,
            frozen: false,
        }
    }

    fn observe(&mut self, x: &[f64; SIGNAL_DIM]) {
        if self.frozen {
            return;
        }
        self.count += 1;
        let n = self.count as f64;
        for i in 0..SIGNAL_DIM {
            let delta = x[i] - self.mean[i];
            self.mean[i] += delta / n;
            self.m2[i] += delta * (x[i] - self.mean[i]);
        }
    }

    fn std(&self, i: usize) -> f64 {
        if self.count < 2 {
            return 1.0;
        }
        let var = self.m2[i] / (self.count - 1) as f64;
        if var > 1e-12 {
            var.sqrt()
        } else {
            1.0
        }
    }

    fn transform(&self, x: &[f64; SIGNAL_DIM]) -> [f64; SIGNAL_DIM] {
        let mut z = [0.0; SIGNAL_DIM];
        for i in 0..SIGNAL_DIM {
            z[i] = (x[i] - self.mean[i]) / self.std(i);
        }
        z
    }
}

/// Calibrated probabilities stay this far inside (0, 1).
const PROBABILITY_MARGIN: f64 = 1e-12;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Calibration quality for logging.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationSummary {
    pub samples: u64,
    pub ready: bool,
    /// Mean squared error of pre-update predictions over the recent window
    pub brier_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ConfidenceCalibrator {
    config: CalibratorConfig,
    weights: [f64; SIGNAL_DIM],
    bias: f64,
    scaler: FeatureScaler,
    samples: u64,
    ready: bool,
    /// (pre-update prediction, label)
    recent: VecDeque<(f64, bool)>,
}

impl ConfidenceCalibrator {
    pub fn new(config: CalibratorConfig) -> Self {
        Self {
            recent: VecDeque::with_capacity(config.brier_window),
            config,
            weights: [0.0; SIGNAL_DIM],
            bias: 0.0,
            scaler: FeatureScaler::new(),
            samples: 0,
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    fn raw_probability(&self, signal: &SignalVector) -> f64 {
        let z = self.scaler.transform(&signal.0);
        let logit = self
            .weights
            .iter()
            .zip(z.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        sigmoid(logit)
    }

    /// Calibrated win probability, or `None` while the model is not ready.
    pub fn predict(&self, signal: &SignalVector) -> Option<f64> {
        if !self.ready {
            return None;
        }
        let p = self.raw_probability(signal);
        p.is_finite()
            .then(|| p.clamp(PROBABILITY_MARGIN, 1.0 - PROBABILITY_MARGIN))
    }

    /// One SGD step on a closed trade. Non-finite signals are skipped.
    pub fn update(&mut self, signal: &SignalVector, won: bool) {
        if signal.0.iter().any(|v| !v.is_finite()) {
            return;
        }
        self.scaler.observe(&signal.0);

        let p = self.raw_probability(signal);
        if self.recent.len() == self.config.brier_window {
            self.recent.pop_front();
        }
        self.recent.push_back((p, won));

        let y = if won { 1.0 } else { 0.0 };
        let grad = p - y;
        let z = self.scaler.transform(&signal.0);
        let lr = self.config.learning_rate;
        for (w, x) in self.weights.iter_mut().zip(z.iter()) {
            *w -= lr * (grad * x + self.config.l2 * *w);
        }
        self.bias -= lr * grad;
        self.samples += 1;

        if !self.ready && self.samples >= self.config.minimum_samples {
            self.ready = true;
            self.scaler.frozen = true;
            info!(
                samples = self.samples,
                brier = ?self.brier_score(),
                "Confidence calibrator ready"
            );
        }
    }

    /// Brier score over the recent window.
    pub fn brier_score(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        let sum: f64 = self
            .recent
            .iter()
            .map(|(p, won)| {
                let y = if *won { 1.0 } else { 0.0 };
                (p - y).powi(2)
            })
            .sum();
        Some(sum / self.recent.len() as f64)
    }

    pub fn summary(&self) -> CalibrationSummary {
        CalibrationSummary {
            samples: self.samples,
            ready: self.ready,
            brier_score: self.brier_score(),
        }
    }

    pub fn to_checkpoint(&self, saved_at_ms: u64) -> CalibrationCheckpoint {
        CalibrationCheckpoint {
            saved_at_ms,
            weights: self.weights.to_vec(),
            bias: self.bias,
            scaler_mean: self.scaler.mean.to_vec(),
            scaler_m2: self.scaler.m2.to_vec(),
            scaler_count: self.scaler.count,
            scaler_frozen: self.scaler.frozen,
            sample_count: self.samples,
            ready: self.ready,
        }
    }

    /// Restore from checkpoint. A dimension mismatch leaves the model cold.
    pub fn restore_from_checkpoint(&mut self, cp: &CalibrationCheckpoint) -> bool {
        let dims_ok = cp.weights.len() == SIGNAL_DIM
            && cp.scaler_mean.len() == SIGNAL_DIM
            && cp.scaler_m2.len() == SIGNAL_DIM;
        let finite = cp.bias.is_finite()
            && cp
                .weights
                .iter()
                .chain(cp.scaler_mean.iter())
                .chain(cp.scaler_m2.iter())
                .all(|v| v.is_finite());
        if !dims_ok || !finite {
            return false;
        }
        self.weights.copy_from_slice(&cp.weights);
        self.bias = cp.bias;
        self.scaler.mean.copy_from_slice(&cp.scaler_mean);
        self.scaler.m2.copy_from_slice(&cp.scaler_m2);
        self.scaler.count = cp.scaler_count;
        self.scaler.frozen = cp.scaler_frozen;
        self.samples = cp.sample_count;
        self.ready = cp.ready;
        self.recent.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn signal(score: f64) -> SignalVector {
        let mut s = SignalVector::zeros();
        s.0[0] = score;
        s.0[1] = score.abs();
        s.0[2] = score * 0.8;
        s
    }

    fn warmed(minimum_samples: u64) -> ConfidenceCalibrator {
        let mut cal = ConfidenceCalibrator::new(CalibratorConfig {
            minimum_samples,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..minimum_samples {
            let score: f64 = rng.gen_range(-1.0..1.0);
            let won = rng.gen::<f64>() < 0.5 + 0.4 * score;
            cal.update(&signal(score), won);
        }
        cal
    }

    #[test]
    fn test_pass_through_until_ready() {
        let mut cal = ConfidenceCalibrator::new(CalibratorConfig {
            minimum_samples: 5,
            ..Default::default()
        });
        for i in 0..4 {
            cal.update(&signal(0.1 * i as f64), i % 2 == 0);
            assert_eq!(cal.predict(&signal(0.5)), None);
        }
        cal.update(&signal(0.3), true);
        assert!(cal.is_ready());
        let p = cal.predict(&signal(0.5)).unwrap();
        assert!(p > 0.0 && p < 1.0);
    }

    #[test]
    fn test_extreme_logit_stays_inside_unit_interval() {
        let mut cal = warmed(50);
        cal.weights = [0.0; SIGNAL_DIM];
        cal.weights[0] = 500.0;
        let high = cal.predict(&signal(1.0)).unwrap();
        let low = cal.predict(&signal(-1.0)).unwrap();
        assert!(high < 1.0 && high > 0.5, "high {high}");
        assert!(low > 0.0 && low < 0.5, "low {low}");
    }

    #[test]
    fn test_positive_label_raises_probability() {
        let mut cal = warmed(50);
        let s = signal(0.4);
        let before = cal.predict(&s).unwrap();
        cal.update(&s, true);
        let after = cal.predict(&s).unwrap();
        assert!(after > before, "{after} <= {before}");
    }

    #[test]
    fn test_negative_label_lowers_probability() {
        let mut cal = warmed(50);
        let s = signal(-0.2);
        let before = cal.predict(&s).unwrap();
        cal.update(&s, false);
        let after = cal.predict(&s).unwrap();
        assert!(after < before, "{after} >= {before}");
    }

    #[test]
    fn test_learns_monotone_relationship() {
        let cal = warmed(400);
        let hi = cal.predict(&signal(0.8)).unwrap();
        let lo = cal.predict(&signal(-0.8)).unwrap();
        assert!(hi > lo);
        let brier = cal.summary().brier_score.unwrap();
        assert!(brier < 0.25, "brier {brier}");
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let cal = warmed(60);
        let cp = cal.to_checkpoint(10);
        let mut restored = ConfidenceCalibrator::new(CalibratorConfig::default());
        assert!(restored.restore_from_checkpoint(&cp));
        assert_eq!(restored.predict(&signal(0.3)), cal.predict(&signal(0.3)));

        let mut bad = cp.clone();
        bad.weights.pop();
        let mut cold = ConfidenceCalibrator::new(CalibratorConfig::default());
        assert!(!cold.restore_from_checkpoint(&bad));
        assert!(!cold.is_ready());
    }
}
