//! Kalman-tracked decision thresholds.
//!
//! Each named threshold is an independent scalar Kalman filter. The
//! measurement is the cut point that best separates winning from losing
//! trades on that threshold's feature over the last N closes.
//!
//! ```text
//! predict:  P ← P + Q
//! update:   K = P / max(P + R, P_min)      (P floored at P_min first)
//!           x ← x + K·(z − x)
//!           P ← max((1 − K)·P, P_min)
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::checkpoint::{KalmanCheckpoint, ThresholdCheckpoint};
use crate::engine::config::ThresholdConfig;

use super::outcome::PressureSnapshot;

/// One-dimensional Kalman filter over a slowly drifting level.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarKalman {
    estimate: f64,
    variance: f64,
    process_noise: f64,
    measurement_noise: f64,
    min_variance: f64,
    updates: u64,
    last_measurement: Option<f64>,
}

impl ScalarKalman {
    pub fn new(initial: f64, config: &ThresholdConfig) -> Self {
        Self {
            estimate: initial,
            variance: config.initial_variance,
            process_noise: config.process_noise,
            measurement_noise: config.measurement_noise,
            min_variance: config.min_variance,
            updates: 0,
            last_measurement: None,
        }
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn last_measurement(&self) -> Option<f64> {
        self.last_measurement
    }

    pub fn predict(&mut self) {
        self.variance += self.process_noise;
    }

    /// Predict then fold in a measurement. Non-finite measurements are ignored.
    pub fn update(&mut self, measurement: f64) {
        if !measurement.is_finite() {
            return;
        }
        self.predict();
        let p = self.variance.max(self.min_variance);
        let gain = p / (p + self.measurement_noise).max(self.min_variance);
        self.estimate += gain * (measurement - self.estimate);
        self.variance = ((1.0 - gain) * p).max(self.min_variance);
        self.updates += 1;
        self.last_measurement = Some(measurement);
    }

    fn to_checkpoint(&self, name: &str) -> KalmanCheckpoint {
        KalmanCheckpoint {
            name: name.to_string(),
            estimate: self.estimate,
            variance: self.variance,
            process_noise: self.process_noise,
            measurement_noise: self.measurement_noise,
            updates: self.updates,
            last_measurement: self.last_measurement,
        }
    }

    /// Restore learned level and covariance; noise terms stay as configured.
    fn restore(&mut self, cp: &KalmanCheckpoint) {
        if cp.estimate.is_finite() && cp.variance.is_finite() && cp.variance > 0.0 {
            self.estimate = cp.estimate;
            self.variance = cp.variance.max(self.min_variance);
            self.updates = cp.updates;
            self.last_measurement = cp.last_measurement;
        }
    }
}

/// The adaptive thresholds the decision path consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    /// Average elasticity below which the market counts as loose
    ElasticityLow,
    /// Movement energy above which a move is expected to run
    EnergyExplosion,
    /// Per-agent confidence needed to count toward alignment
    ConfidenceGate,
    /// Acceleration likelihood that boosts the hedge view
    AccelerationGate,
}

impl ThresholdKind {
    pub const ALL: [ThresholdKind; 4] = [
        ThresholdKind::ElasticityLow,
        ThresholdKind::EnergyExplosion,
        ThresholdKind::ConfidenceGate,
        ThresholdKind::AccelerationGate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ThresholdKind::ElasticityLow => "elasticity_low",
            ThresholdKind::EnergyExplosion => "energy_explosion",
            ThresholdKind::ConfidenceGate => "confidence_gate",
            ThresholdKind::AccelerationGate => "acceleration_gate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Feature this threshold is learned on.
    pub fn feature(&self, snapshot: &PressureSnapshot) -> f64 {
        match self {
            ThresholdKind::ElasticityLow => snapshot.elasticity,
            ThresholdKind::EnergyExplosion => snapshot.max_energy,
            ThresholdKind::ConfidenceGate => snapshot.aligned_confidence,
            ThresholdKind::AccelerationGate => snapshot.acceleration_likelihood,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Current threshold estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSnapshot {
    pub elasticity_low: f64,
    pub energy_explosion: f64,
    pub confidence_gate: f64,
    pub acceleration_gate: f64,
    /// Whether the confidence gate has received at least one measurement
    pub confidence_gate_learned: bool,
}

impl ThresholdSnapshot {
    pub fn get(&self, kind: ThresholdKind) -> f64 {
        match kind {
            ThresholdKind::ElasticityLow => self.elasticity_low,
            ThresholdKind::EnergyExplosion => self.energy_explosion,
            ThresholdKind::ConfidenceGate => self.confidence_gate,
            ThresholdKind::AccelerationGate => self.acceleration_gate,
        }
    }

    /// Initial values straight from configuration.
    pub fn from_config(config: &ThresholdConfig) -> Self {
        Self {
            elasticity_low: config.initial.elasticity_low,
            energy_explosion: config.initial.energy_explosion,
            confidence_gate: config.initial.confidence_gate,
            acceleration_gate: config.initial.acceleration_gate,
            confidence_gate_learned: false,
        }
    }
}

/// Cut point that best separates wins from losses on one feature.
///
/// Candidates are midpoints between consecutive distinct sorted values; the
/// cut maximizing correctly classified trades (wins on either side) is
/// returned. `None` unless both outcomes are present and there are at least
/// `min_count` finite samples.
pub fn separating_cut(samples: &[(f64, bool)], min_count: usize) -> Option<f64> {
    let mut sorted: Vec<(f64, bool)> = samples.iter().copied().filter(|(v, _)| v.is_finite()).collect();
    if sorted.len() < min_count.max(2) {
        return None;
    }
    let total_wins = sorted.iter().filter(|(_, w)| *w).count();
    let total_losses = sorted.len() - total_wins;
    if total_wins == 0 || total_losses == 0 {
        return None;
    }
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut best_cut = None;
    let mut best_correct = 0usize;
    let mut wins_below = 0usize;
    let mut losses_below = 0usize;

    for i in 0..sorted.len() - 1 {
        if sorted[i].1 {
            wins_below += 1;
        } else {
            losses_below += 1;
        }
        if sorted[i].0 == sorted[i + 1].0 {
            continue;
        }
        let wins_above = total_wins - wins_below;
        let losses_above = total_losses - losses_below;
        // Winners above the cut, or winners below it
        let correct = (wins_above + losses_below).max(wins_below + losses_above);
        if correct > best_correct {
            best_correct = correct;
            best_cut = Some(0.5 * (sorted[i].0 + sorted[i + 1].0));
        }
    }
    best_cut
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct WindowSample {
    snapshot: PressureSnapshot,
    won: bool,
}

/// All adaptive thresholds plus the window of recent closes.
#[derive(Debug, Clone)]
pub struct AdaptiveThresholds {
    config: ThresholdConfig,
    filters: [ScalarKalman; 4],
    window: VecDeque<WindowSample>,
}

impl AdaptiveThresholds {
    pub fn new(config: ThresholdConfig) -> Self {
        let init = &config.initial;
        let filters = [
            ScalarKalman::new(init.elasticity_low, &config),
            ScalarKalman::new(init.energy_explosion, &config),
            ScalarKalman::new(init.confidence_gate, &config),
            ScalarKalman::new(init.acceleration_gate, &config),
        ];
        Self {
            window: VecDeque::with_capacity(config.window),
            config,
            filters,
        }
    }

    pub fn filter(&self, kind: ThresholdKind) -> &ScalarKalman {
        &self.filters[kind.index()]
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Record a closed trade and update every threshold that can be measured.
    /// Returns the thresholds that received a measurement.
    ///
    /// Snapshots with a non-finite field are not admitted to the window.
    pub fn record_trade(&mut self, snapshot: &PressureSnapshot, won: bool) -> Vec<ThresholdKind> {
        if !snapshot.is_finite() {
            warn!(?snapshot, "Non-finite entry snapshot, skipped for threshold learning");
            return Vec::new();
        }
        if self.window.len() == self.config.window {
            self.window.pop_front();
        }
        self.window.push_back(WindowSample {
            snapshot: *snapshot,
            won,
        });

        let mut updated = Vec::new();
        for kind in ThresholdKind::ALL {
            let samples: Vec<(f64, bool)> = self
                .window
                .iter()
                .map(|s| (kind.feature(&s.snapshot), s.won))
                .collect();
            if let Some(cut) = separating_cut(&samples, self.config.min_trades) {
                let filter = &mut self.filters[kind.index()];
                filter.update(cut);
                debug!(
                    threshold = kind.name(),
                    measurement = cut,
                    estimate = filter.estimate(),
                    variance = filter.variance(),
                    "Threshold updated"
                );
                updated.push(kind);
            }
        }
        updated
    }

    pub fn snapshot(&self) -> ThresholdSnapshot {
        ThresholdSnapshot {
            elasticity_low: self.filter(ThresholdKind::ElasticityLow).estimate(),
            energy_explosion: self.filter(ThresholdKind::EnergyExplosion).estimate(),
            confidence_gate: self.filter(ThresholdKind::ConfidenceGate).estimate(),
            acceleration_gate: self.filter(ThresholdKind::AccelerationGate).estimate(),
            confidence_gate_learned: self.filter(ThresholdKind::ConfidenceGate).updates() > 0,
        }
    }

    pub fn to_checkpoint(&self, saved_at_ms: u64) -> ThresholdCheckpoint {
        ThresholdCheckpoint {
            saved_at_ms,
            filters: ThresholdKind::ALL
                .iter()
                .map(|k| self.filter(*k).to_checkpoint(k.name()))
                .collect(),
            window: self
                .window
                .iter()
                .map(|s| (s.snapshot, s.won))
                .collect(),
        }
    }

    pub fn restore_from_checkpoint(&mut self, checkpoint: &ThresholdCheckpoint) {
        for cp in &checkpoint.filters {
            if let Some(kind) = ThresholdKind::from_name(&cp.name) {
                self.filters[kind.index()].restore(cp);
            }
        }
        self.window.clear();
        let skip = checkpoint.window.len().saturating_sub(self.config.window);
        for (snapshot, won) in checkpoint.window.iter().skip(skip) {
            self.window.push_back(WindowSample {
                snapshot: *snapshot,
                won: *won,
            });
        }
    }
}
