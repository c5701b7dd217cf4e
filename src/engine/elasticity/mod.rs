//! Elasticity (resistance to movement) and movement energy.
//!
//! ```text
//! PressureField ──► stiffness ──► ElasticityState (up / down, > 0)
//!        │                              │
//!        └──────────► energy ◄──────────┘
//!                       │
//!                       ▼
//!               MovementEnergyState (up / down / asymmetry / bias)
//! ```

mod energy;
mod stiffness;

pub use energy::{movement_energy, DirectionalBias, MovementEnergyState};
pub use stiffness::{stiffness_factor, ElasticityComponents, ElasticityState, MAX_FACTOR, MIN_FACTOR};

use tracing::trace;

use crate::engine::config::ElasticityConfig;
use crate::engine::pressure::PressureField;

/// Turns a pressure field into stiffness and energy.
#[derive(Debug, Clone)]
pub struct ElasticityCalculator {
    config: ElasticityConfig,
}

impl ElasticityCalculator {
    pub fn new(config: ElasticityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ElasticityConfig {
        &self.config
    }

    /// Compute elasticity and energy for one bar. Never fails.
    pub fn compute(&self, field: &PressureField) -> (ElasticityState, MovementEnergyState) {
        let elasticity = stiffness::compute_elasticity(field, &self.config);
        let energy = energy::compute_energy(field, &elasticity, &self.config);
        trace!(
            elasticity = elasticity.elasticity,
            energy_up = energy.movement_energy_up,
            energy_down = energy.movement_energy_down,
            asymmetry = energy.energy_asymmetry,
            bias = ?energy.directional_bias,
            "Elasticity computed"
        );
        (elasticity, energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pressure::{DealerPositioning, FieldRegime};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_field(rng: &mut StdRng) -> PressureField {
        // Log-uniform magnitudes across many decades
        let mag = |rng: &mut StdRng| 10f64.powf(rng.gen_range(-12.0..12.0));
        let mut f = PressureField::insufficient(rng.gen_range(0.0..3.0));
        f.regime = FieldRegime::Neutral;
        f.positioning = DealerPositioning {
            net_gamma: mag(rng) * if rng.gen_bool(0.5) { 1.0 } else { -1.0 },
            net_vanna: mag(rng),
            net_charm: mag(rng),
            dealer_sign: rng.gen_range(-1.0..=1.0),
            confidence: rng.gen_range(0.0..=1.0),
            strike_center: 100.0,
        };
        f.gamma_pressure_up = mag(rng);
        f.gamma_pressure_down = mag(rng);
        f.vanna_pressure_up = mag(rng);
        f.vanna_pressure_down = mag(rng);
        f.charm_pressure_up = mag(rng);
        f.charm_pressure_down = mag(rng);
        f.oi_concentration = rng.gen_range(0.0..=1.0);
        f.avg_spread_ratio = rng.gen_range(0.0..2.0);
        f
    }

    #[test]
    fn test_elasticity_positive_for_random_fields() {
        let calc = ElasticityCalculator::new(ElasticityConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            let field = random_field(&mut rng);
            let (e, energy) = calc.compute(&field);
            assert!(e.elasticity > 0.0 && e.elasticity.is_finite());
            assert!(e.elasticity_up > 0.0 && e.elasticity_up.is_finite());
            assert!(e.elasticity_down > 0.0 && e.elasticity_down.is_finite());
            assert!((0.0..=1.0).contains(&energy.acceleration_likelihood));
        }
    }

    #[test]
    fn test_energy_consistent_with_elasticity() {
        let calc = ElasticityCalculator::new(ElasticityConfig::default());
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let field = random_field(&mut rng);
            let (e, energy) = calc.compute(&field);
            let up = field.total_pressure_up() / e.elasticity_up;
            let down = field.total_pressure_down() / e.elasticity_down;
            assert!((energy.movement_energy_up - up).abs() <= 1e-9 * up.abs().max(1.0));
            assert!((energy.movement_energy_down - down).abs() <= 1e-9 * down.abs().max(1.0));
            let net = energy.movement_energy_up - energy.movement_energy_down;
            assert!((energy.net_energy - net).abs() <= 1e-9 * net.abs().max(1.0));
            let asym = energy.movement_energy_up
                / energy.movement_energy_down.max(calc.config().energy_epsilon);
            assert!((energy.energy_asymmetry - asym).abs() <= 1e-9 * asym.abs().max(1.0));
        }
    }

    #[test]
    fn test_insufficient_field_zero_energy() {
        let calc = ElasticityCalculator::new(ElasticityConfig::default());
        let (e, energy) = calc.compute(&PressureField::insufficient(0.0));
        assert_eq!(e.elasticity, calc.config().base);
        assert_eq!(energy, MovementEnergyState::zero());
    }
}
