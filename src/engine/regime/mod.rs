//! Multi-dimensional regime classification.
//!
//! Labels each bar along gamma, vanna, charm and jump-risk axes, infers the
//! shape of the price potential, and keeps a per-symbol EMA of how often the
//! label repeats. The hedge agent uses that stability to damp its confidence
//! while the regime is in transition.

mod labels;

pub use labels::{
    CharmRegime, GammaRegime, JumpRisk, PotentialShape, RegimeClassification, VannaRegime,
};

use std::collections::HashMap;

use tracing::debug;

use crate::engine::config::RegimeConfig;
use crate::engine::elasticity::MovementEnergyState;
use crate::engine::pressure::PressureField;

/// Persistence memory for one symbol.
#[derive(Debug, Clone)]
struct StabilityMemory {
    last_label: String,
    stability: f64,
}

/// Stateful classifier; one instance serves every symbol.
#[derive(Debug)]
pub struct RegimeClassifier {
    config: RegimeConfig,
    memory: HashMap<String, StabilityMemory>,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            memory: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Current stability for a symbol (1.0 before the first labelled bar).
    pub fn stability(&self, symbol: &str) -> f64 {
        self.memory.get(symbol).map_or(1.0, |m| m.stability)
    }

    /// Classify one bar and update the symbol's stability memory.
    ///
    /// Insufficient-data bars do not touch the memory.
    pub fn classify(
        &mut self,
        symbol: &str,
        field: &PressureField,
        energy: &MovementEnergyState,
        vol_index: Option<f64>,
    ) -> RegimeClassification {
        if field.is_insufficient() {
            return RegimeClassification::insufficient(self.stability(symbol));
        }

        let cfg = &self.config;
        let positioning = &field.positioning;
        let gamma_mag = finite_abs(positioning.net_gamma);
        let vanna_mag = finite_abs(positioning.net_vanna) * field.vanna_absorber;
        let charm_mag = finite_abs(positioning.net_charm);
        let short_gamma = positioning.is_short_gamma();

        let gamma = if gamma_mag >= cfg.gamma_threshold {
            if short_gamma {
                GammaRegime::Expansion
            } else {
                GammaRegime::Compression
            }
        } else {
            GammaRegime::Neutral
        };
        let vanna = if vanna_mag >= cfg.vanna_threshold {
            VannaRegime::VolDriven
        } else {
            VannaRegime::Stable
        };
        let charm = if charm_mag >= cfg.charm_threshold {
            CharmRegime::DecayDominant
        } else {
            CharmRegime::Neutral
        };

        let jump_score = jump_score(
            field.vol_of_vol,
            vol_index,
            energy.acceleration_likelihood,
            short_gamma,
            cfg,
        );
        let jump_risk = if jump_score >= cfg.jump_high_threshold {
            JumpRisk::High
        } else if jump_score >= cfg.jump_elevated_threshold {
            JumpRisk::Elevated
        } else {
            JumpRisk::Low
        };

        let potential_shape = potential_shape(gamma_mag, vanna_mag, cfg);

        // Labels far from their thresholds are more trustworthy
        let clarity = ((gamma_mag / cfg.gamma_threshold - 1.0).abs()).min(1.0);
        let regime_confidence = (positioning.confidence * (0.5 + 0.5 * clarity)).clamp(0.0, 1.0);

        let mut classification = RegimeClassification {
            gamma,
            vanna,
            charm,
            jump_risk,
            jump_score,
            potential_shape,
            regime_confidence,
            regime_stability: 1.0,
            insufficient_data: false,
        };
        classification.regime_stability = self.update_stability(symbol, &classification);

        debug!(
            symbol = %symbol,
            regime = %classification.label(),
            jump_score = %format!("{:.3}", jump_score),
            stability = %format!("{:.3}", classification.regime_stability),
            "Regime classified"
        );

        classification
    }

    fn update_stability(&mut self, symbol: &str, classification: &RegimeClassification) -> f64 {
        let label = classification.label();
        let alpha = self.config.stability_alpha;
        match self.memory.get_mut(symbol) {
            Some(mem) => {
                let persisted = if mem.last_label == label { 1.0 } else { 0.0 };
                mem.stability = alpha * persisted + (1.0 - alpha) * mem.stability;
                mem.last_label = label;
                mem.stability
            }
            None => {
                self.memory.insert(
                    symbol.to_string(),
                    StabilityMemory {
                        last_label: label,
                        stability: 1.0,
                    },
                );
                1.0
            }
        }
    }
}

fn finite_abs(x: f64) -> f64 {
    if x.is_finite() {
        x.abs()
    } else {
        0.0
    }
}

/// Jump-risk score in [0, 1].
///
/// ```text
/// raw = w_vov·min(vov, 1) + w_vix·min(vix/ref, 2)/2 + w_acc·acceleration
/// score = clamp(raw × [short-gamma amplifier], 0, 1)
/// ```
fn jump_score(
    vol_of_vol: f64,
    vol_index: Option<f64>,
    acceleration: f64,
    short_gamma: bool,
    cfg: &RegimeConfig,
) -> f64 {
    let vov_term = if vol_of_vol.is_finite() {
        vol_of_vol.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let vix_term = vol_index
        .filter(|v| v.is_finite() && *v > 0.0)
        .map_or(0.0, |v| (v / cfg.vol_index_reference).min(2.0) / 2.0);
    let acc_term = if acceleration.is_finite() {
        acceleration.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let mut raw = cfg.jump_vov_weight * vov_term
        + cfg.jump_vol_index_weight * vix_term
        + cfg.jump_acceleration_weight * acc_term;
    if short_gamma {
        raw *= cfg.jump_short_gamma_amplifier;
    }
    raw.clamp(0.0, 1.0)
}

fn potential_shape(gamma_mag: f64, vanna_mag: f64, cfg: &RegimeConfig) -> PotentialShape {
    if gamma_mag >= cfg.gamma_extreme_threshold {
        PotentialShape::Quartic
    } else if gamma_mag < cfg.gamma_threshold && vanna_mag < cfg.vanna_threshold {
        PotentialShape::Quadratic
    } else if gamma_mag < cfg.gamma_threshold {
        PotentialShape::Cubic
    } else {
        PotentialShape::DoubleWell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pressure::{DealerPositioning, FieldRegime};

    fn field(net_gamma: f64, dealer_sign: f64, net_vanna: f64, vov: f64) -> PressureField {
        let mut f = PressureField::insufficient(vov);
        f.regime = FieldRegime::Neutral;
        f.positioning = DealerPositioning {
            net_gamma,
            net_vanna,
            net_charm: 0.1,
            dealer_sign,
            confidence: 1.0,
            strike_center: 100.0,
        };
        f.gamma_pressure_up = 1.0;
        f.gamma_pressure_down = 1.0;
        f
    }

    #[test]
    fn test_gamma_labels() {
        let mut c = RegimeClassifier::new(RegimeConfig::default());
        let e = MovementEnergyState::zero();
        assert_eq!(c.classify("X", &field(10.0, 0.6, 0.0, 0.1), &e, None).gamma, GammaRegime::Compression);
        assert_eq!(c.classify("X", &field(-10.0, -0.6, 0.0, 0.1), &e, None).gamma, GammaRegime::Expansion);
        assert_eq!(c.classify("X", &field(1.0, 0.6, 0.0, 0.1), &e, None).gamma, GammaRegime::Neutral);
    }

    #[test]
    fn test_potential_shapes() {
        let cfg = RegimeConfig::default();
        assert_eq!(potential_shape(1.0, 0.5, &cfg), PotentialShape::Quadratic);
        assert_eq!(potential_shape(1.0, 5.0, &cfg), PotentialShape::Cubic);
        assert_eq!(potential_shape(10.0, 0.5, &cfg), PotentialShape::DoubleWell);
        assert_eq!(potential_shape(30.0, 50.0, &cfg), PotentialShape::Quartic);
    }

    #[test]
    fn test_jump_risk_amplified_by_short_gamma() {
        let cfg = RegimeConfig::default();
        let long = jump_score(0.8, Some(30.0), 0.5, false, &cfg);
        let short = jump_score(0.8, Some(30.0), 0.5, true, &cfg);
        assert!(short > long);
        assert!((0.0..=1.0).contains(&short));
        assert_eq!(jump_score(f64::NAN, None, f64::NAN, true, &cfg), 0.0);
        assert_eq!(jump_score(5.0, Some(500.0), 1.0, true, &cfg), 1.0);
    }

    #[test]
    fn test_stability_drops_on_transition() {
        let mut c = RegimeClassifier::new(RegimeConfig::default());
        let e = MovementEnergyState::zero();
        let calm = field(10.0, 0.6, 0.0, 0.1);
        let flipped = field(-10.0, -0.6, 0.0, 0.1);

        for _ in 0..5 {
            c.classify("SPY", &calm, &e, None);
        }
        assert!((c.stability("SPY") - 1.0).abs() < 1e-12);

        let after = c.classify("SPY", &flipped, &e, None).regime_stability;
        assert!((after - 0.8).abs() < 1e-12);
        // Other symbols are independent
        assert_eq!(c.stability("QQQ"), 1.0);
    }

    #[test]
    fn test_insufficient_data() {
        let mut c = RegimeClassifier::new(RegimeConfig::default());
        let r = c.classify("SPY", &PressureField::insufficient(0.0), &MovementEnergyState::zero(), Some(40.0));
        assert!(r.insufficient_data);
        assert_eq!(r.regime_confidence, 0.0);
        assert_eq!(r.jump_risk, JumpRisk::Low);
        assert_eq!(r.vanna, VannaRegime::Stable);
    }
}
