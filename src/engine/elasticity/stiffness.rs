//! Multiplicative elasticity (price stiffness).
//!
//! ```text
//! elasticity     = base × gamma × vanna × charm × oi_density × liquidity_friction
//! factor(x)      = 1 + |x|·scale           (stabilizing)
//!                = 1 / (1 + |x|·scale)     (destabilizing: dealers short gamma)
//! elasticity_dir = elasticity × (1 + pressure_dir·scale)
//! ```
//!
//! Factors are never subtracted and each is clamped to
//! [`MIN_FACTOR`, `MAX_FACTOR`], so the product stays strictly positive and
//! finite for any finite input.

use serde::{Deserialize, Serialize};

use crate::engine::config::ElasticityConfig;
use crate::engine::pressure::PressureField;

/// Smallest value any single factor may take.
pub const MIN_FACTOR: f64 = 1e-6;
/// Largest value any single factor may take.
pub const MAX_FACTOR: f64 = 1e6;

/// Multiplicative components of the elasticity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticityComponents {
    pub gamma: f64,
    pub vanna: f64,
    pub charm: f64,
    pub oi_density: f64,
    pub liquidity_friction: f64,
}

impl ElasticityComponents {
    /// All factors neutral (Greek-free).
    pub fn neutral() -> Self {
        Self {
            gamma: 1.0,
            vanna: 1.0,
            charm: 1.0,
            oi_density: 1.0,
            liquidity_friction: 1.0,
        }
    }

    pub fn product(&self) -> f64 {
        self.gamma * self.vanna * self.charm * self.oi_density * self.liquidity_friction
    }
}

/// Stiffness estimate for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticityState {
    pub elasticity: f64,
    pub elasticity_up: f64,
    pub elasticity_down: f64,
    /// elasticity_up / elasticity_down
    pub asymmetry_ratio: f64,
    pub components: ElasticityComponents,
    /// True when the field had no data and the base value was used
    pub is_fallback: bool,
}

impl ElasticityState {
    pub fn average(&self) -> f64 {
        0.5 * (self.elasticity_up + self.elasticity_down)
    }
}

/// `1 + |x|·scale`, or its reciprocal when destabilizing. Non-finite `x` counts as 0.
pub fn stiffness_factor(x: f64, scale: f64, destabilizing: bool) -> f64 {
    let x = if x.is_finite() { x.abs() } else { 0.0 };
    let scale = if scale.is_finite() { scale.abs() } else { 0.0 };
    let raw = (1.0 + x * scale).clamp(1.0, MAX_FACTOR);
    let factor = if destabilizing { 1.0 / raw } else { raw };
    factor.clamp(MIN_FACTOR, MAX_FACTOR)
}

fn positive(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x
    } else if x == f64::INFINITY {
        f64::MAX
    } else {
        f64::MIN_POSITIVE
    }
}

/// Compute elasticity from a pressure field.
pub fn compute_elasticity(field: &PressureField, config: &ElasticityConfig) -> ElasticityState {
    let base = positive(config.base);

    if field.is_insufficient() {
        return ElasticityState {
            elasticity: base,
            elasticity_up: base,
            elasticity_down: base,
            asymmetry_ratio: 1.0,
            components: ElasticityComponents::neutral(),
            is_fallback: true,
        };
    }

    let short_gamma = field.positioning.is_short_gamma();
    let components = ElasticityComponents {
        gamma: stiffness_factor(field.positioning.net_gamma, config.gamma_scale, short_gamma),
        vanna: stiffness_factor(field.vanna_magnitude(), config.vanna_scale, short_gamma),
        charm: stiffness_factor(field.charm_magnitude(), config.charm_scale, short_gamma),
        oi_density: stiffness_factor(field.oi_concentration, config.oi_density_scale, false),
        liquidity_friction: stiffness_factor(
            field.avg_spread_ratio,
            config.liquidity_friction_scale,
            false,
        ),
    };

    let elasticity = positive(base * components.product());
    let elasticity_up = positive(
        elasticity * stiffness_factor(field.total_pressure_up(), config.directional_scale, false),
    );
    let elasticity_down = positive(
        elasticity * stiffness_factor(field.total_pressure_down(), config.directional_scale, false),
    );

    ElasticityState {
        elasticity,
        elasticity_up,
        elasticity_down,
        asymmetry_ratio: elasticity_up / elasticity_down,
        components,
        is_fallback: false,
    }
}
