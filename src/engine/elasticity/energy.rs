//! Movement energy: pressure divided by stiffness.

use serde::{Deserialize, Serialize};

use crate::engine::config::ElasticityConfig;
use crate::engine::pressure::PressureField;

use super::stiffness::ElasticityState;

/// Which way the energy imbalance points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionalBias {
    Bullish,
    Bearish,
    Neutral,
}

impl DirectionalBias {
    /// +1 bullish, -1 bearish, 0 neutral.
    pub fn sign(&self) -> i8 {
        match self {
            DirectionalBias::Bullish => 1,
            DirectionalBias::Bearish => -1,
            DirectionalBias::Neutral => 0,
        }
    }

    /// Classify an asymmetry ratio (up / down energy).
    ///
    /// Low ratio means the downside is the heavier side to push through, so
    /// price is more likely to travel up.
    pub fn from_asymmetry(asymmetry: f64, bullish_below: f64, bearish_above: f64) -> Self {
        if !asymmetry.is_finite() {
            DirectionalBias::Neutral
        } else if asymmetry < bullish_below {
            DirectionalBias::Bullish
        } else if asymmetry > bearish_above {
            DirectionalBias::Bearish
        } else {
            DirectionalBias::Neutral
        }
    }
}

/// Energy breakdown for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEnergyState {
    pub movement_energy_up: f64,
    pub movement_energy_down: f64,
    /// up − down
    pub net_energy: f64,
    /// up / max(down, ε)
    pub energy_asymmetry: f64,
    pub directional_bias: DirectionalBias,
    /// Probability-like score in [0, 1] that the move accelerates
    pub acceleration_likelihood: f64,
}

impl MovementEnergyState {
    pub fn zero() -> Self {
        Self {
            movement_energy_up: 0.0,
            movement_energy_down: 0.0,
            net_energy: 0.0,
            energy_asymmetry: 0.0,
            directional_bias: DirectionalBias::Neutral,
            acceleration_likelihood: 0.0,
        }
    }

    pub fn max_energy(&self) -> f64 {
        self.movement_energy_up.max(self.movement_energy_down)
    }
}

/// Raw energy numbers: `(up, down, net, asymmetry)`.
///
/// Energies divide by the elasticities as given; those are strictly positive
/// already. `epsilon` floors only the asymmetry denominator.
pub fn movement_energy(
    pressure_up: f64,
    pressure_down: f64,
    elasticity_up: f64,
    elasticity_down: f64,
    epsilon: f64,
) -> (f64, f64, f64, f64) {
    let eps = if epsilon.is_finite() && epsilon > 0.0 { epsilon } else { f64::MIN_POSITIVE };
    let up = pressure_up.max(0.0) / elasticity_up.max(f64::MIN_POSITIVE);
    let down = pressure_down.max(0.0) / elasticity_down.max(f64::MIN_POSITIVE);
    (up, down, up - down, up / down.max(eps))
}

/// Combine pressure and elasticity into an energy state.
pub fn compute_energy(
    field: &PressureField,
    elasticity: &ElasticityState,
    config: &ElasticityConfig,
) -> MovementEnergyState {
    if field.is_insufficient() {
        return MovementEnergyState::zero();
    }

    let eps = config.energy_epsilon;
    let (up, down, net, asymmetry) = movement_energy(
        field.total_pressure_up(),
        field.total_pressure_down(),
        elasticity.elasticity_up,
        elasticity.elasticity_down,
        eps,
    );

    let both_flat = up <= eps && down <= eps;
    let directional_bias = if both_flat {
        DirectionalBias::Neutral
    } else {
        DirectionalBias::from_asymmetry(
            asymmetry,
            config.bullish_asymmetry_threshold,
            config.bearish_asymmetry_threshold,
        )
    };

    let acceleration_likelihood = acceleration_likelihood(
        up,
        down,
        elasticity.average(),
        field.positioning.is_short_gamma(),
        config,
    );

    MovementEnergyState {
        movement_energy_up: up,
        movement_energy_down: down,
        net_energy: net,
        energy_asymmetry: asymmetry,
        directional_bias,
        acceleration_likelihood,
    }
}

/// Score how likely the next move is to accelerate.
///
/// ```text
/// softness  = 1 / (1 + avg_elasticity)
/// imbalance = tanh(|ln(up / down)|)
/// presence  = 1 − exp(−max(up, down))
/// p         = (0.4·softness + 0.6·imbalance) · presence · [short-gamma amplifier]
/// ```
fn acceleration_likelihood(
    up: f64,
    down: f64,
    avg_elasticity: f64,
    short_gamma: bool,
    config: &ElasticityConfig,
) -> f64 {
    let eps = config.energy_epsilon.max(f64::MIN_POSITIVE);
    let softness = 1.0 / (1.0 + avg_elasticity.max(0.0));
    let imbalance = if up <= eps && down <= eps {
        0.0
    } else {
        (up.max(eps) / down.max(eps)).ln().abs().tanh()
    };
    let presence = 1.0 - (-up.max(down)).exp();

    let mut p = (0.4 * softness + 0.6 * imbalance) * presence;
    if short_gamma {
        p *= config.short_gamma_amplifier;
    }
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worked_example_is_bullish() {
        let (up, down, net, asym) = movement_energy(50.0, 150.0, 80.0, 50.0, 1e-9);
        assert!((down - 3.0).abs() < 1e-12);
        assert!((up - 0.625).abs() < 1e-12);
        assert!((net + 2.375).abs() < 1e-12);
        assert!((asym - 0.625 / 3.0).abs() < 1e-12);
        assert!((asym - 0.208).abs() < 1e-3);
        assert_eq!(DirectionalBias::from_asymmetry(asym, 0.5, 2.0), DirectionalBias::Bullish);
    }

    #[test]
    fn test_bias_thresholds() {
        assert_eq!(DirectionalBias::from_asymmetry(1.0, 0.5, 2.0), DirectionalBias::Neutral);
        assert_eq!(DirectionalBias::from_asymmetry(2.5, 0.5, 2.0), DirectionalBias::Bearish);
        assert_eq!(DirectionalBias::from_asymmetry(f64::NAN, 0.5, 2.0), DirectionalBias::Neutral);
        assert_eq!(DirectionalBias::Bearish.sign(), -1);
    }

    #[test]
    fn test_zero_elasticity_is_floored() {
        let (up, down, _, _) = movement_energy(1.0, 0.0, 0.0, 0.0, 1e-9);
        assert!(up.is_finite());
        assert_eq!(down, 0.0);
    }

    #[test]
    fn test_tiny_elasticity_divides_exactly() {
        // Three short-gamma reciprocal factors at the clamp give base × 1e-18
        let e_up = 2.0e-18;
        let e_down = 5.39e-12;
        let (up, down, net, asym) = movement_energy(1.5, 3.66, e_up, e_down, 1e-9);
        assert!((up - 1.5 / e_up).abs() <= 1e-9 * up);
        assert!((down - 3.66 / e_down).abs() <= 1e-9 * down);
        assert!((net - (up - down)).abs() <= 1e-9 * net.abs());
        assert!((asym - up / down).abs() <= 1e-9 * asym);
    }

    #[test]
    fn test_acceleration_likelihood_bounds() {
        let config = ElasticityConfig::default();
        assert_eq!(acceleration_likelihood(0.0, 0.0, 1.0, false, &config), 0.0);
        let calm = acceleration_likelihood(1.0, 1.0, 1.0, false, &config);
        let lopsided = acceleration_likelihood(10.0, 0.1, 1.0, false, &config);
        let amplified = acceleration_likelihood(10.0, 0.1, 1.0, true, &config);
        assert!(calm < lopsided);
        assert!(lopsided <= amplified);
        assert!((0.0..=1.0).contains(&amplified));
    }
}
