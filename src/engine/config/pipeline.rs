//! Per-bar pipeline configuration: pressure, elasticity, regime, composer, cycle.

use serde::{Deserialize, Serialize};

use super::{check_non_negative, check_positive, check_range};
use crate::prelude::Result;

/// Pressure field constructor settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PressureConfig {
    /// Decay λ applied to relative strike distance: weight = exp(-λ·|K-S|/S)
    pub distance_decay: f64,
    /// Contract multiplier (shares per contract)
    pub contract_multiplier: f64,
    /// Exposures are reported in units of this many dollars (1e6 = millions)
    pub exposure_unit: f64,
    /// Percentile (0-1) of per-strike weighted OI a local maximum must reach to pin
    pub pin_percentile: f64,
    /// Vol-of-vol above which the vanna shock absorber engages
    pub vanna_shock_vov_threshold: f64,
    /// Absorber slope per unit of vol-of-vol excess
    pub vanna_shock_sensitivity: f64,
    /// Floor ε for days-to-expiry in the charm scaling 1/√max(dte, ε)
    pub min_days_to_expiry: f64,
    /// |dealer_sign| below this labels the field neutral
    pub neutral_dealer_band: f64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            distance_decay: 20.0,
            contract_multiplier: 100.0,
            exposure_unit: 1e6,
            pin_percentile: 0.8,
            vanna_shock_vov_threshold: 0.5,
            vanna_shock_sensitivity: 1.0,
            min_days_to_expiry: 0.05,
            neutral_dealer_band: 0.1,
        }
    }
}

impl PressureConfig {
    pub fn validate(&self) -> Result<()> {
        check_non_negative("pressure.distance_decay", self.distance_decay)?;
        check_positive("pressure.contract_multiplier", self.contract_multiplier)?;
        check_positive("pressure.exposure_unit", self.exposure_unit)?;
        check_range("pressure.pin_percentile", self.pin_percentile, 0.0, 1.0)?;
        check_non_negative("pressure.vanna_shock_vov_threshold", self.vanna_shock_vov_threshold)?;
        check_non_negative("pressure.vanna_shock_sensitivity", self.vanna_shock_sensitivity)?;
        check_positive("pressure.min_days_to_expiry", self.min_days_to_expiry)?;
        check_range("pressure.neutral_dealer_band", self.neutral_dealer_band, 0.0, 1.0)?;
        Ok(())
    }
}

/// Elasticity and movement-energy settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ElasticityConfig {
    /// Greek-free base stiffness; also the degraded-mode fallback
    pub base: f64,
    pub gamma_scale: f64,
    pub vanna_scale: f64,
    pub charm_scale: f64,
    pub oi_density_scale: f64,
    pub liquidity_friction_scale: f64,
    /// Scale of the directional split elasticity × (1 + pressure_dir·scale)
    pub directional_scale: f64,
    /// ε in energy_asymmetry = up / max(down, ε)
    pub energy_epsilon: f64,
    /// Asymmetry below this is a bullish bias
    pub bullish_asymmetry_threshold: f64,
    /// Asymmetry above this is a bearish bias
    pub bearish_asymmetry_threshold: f64,
    /// Multiplier on acceleration likelihood when dealers are short gamma
    pub short_gamma_amplifier: f64,
}

impl Default for ElasticityConfig {
    fn default() -> Self {
        Self {
            base: 1.0,
            gamma_scale: 0.05,
            vanna_scale: 0.05,
            charm_scale: 0.05,
            oi_density_scale: 1.0,
            liquidity_friction_scale: 1.0,
            directional_scale: 0.05,
            energy_epsilon: 1e-9,
            bullish_asymmetry_threshold: 0.5,
            bearish_asymmetry_threshold: 2.0,
            short_gamma_amplifier: 1.5,
        }
    }
}

impl ElasticityConfig {
    pub fn validate(&self) -> Result<()> {
        check_positive("elasticity.base", self.base)?;
        check_non_negative("elasticity.gamma_scale", self.gamma_scale)?;
        check_non_negative("elasticity.vanna_scale", self.vanna_scale)?;
        check_non_negative("elasticity.charm_scale", self.charm_scale)?;
        check_non_negative("elasticity.oi_density_scale", self.oi_density_scale)?;
        check_non_negative("elasticity.liquidity_friction_scale", self.liquidity_friction_scale)?;
        check_non_negative("elasticity.directional_scale", self.directional_scale)?;
        check_positive("elasticity.energy_epsilon", self.energy_epsilon)?;
        check_positive("elasticity.bullish_asymmetry_threshold", self.bullish_asymmetry_threshold)?;
        check_positive("elasticity.bearish_asymmetry_threshold", self.bearish_asymmetry_threshold)?;
        if self.bullish_asymmetry_threshold >= self.bearish_asymmetry_threshold {
            return Err(crate::errors::Error::invalid_config(
                "elasticity.bullish_asymmetry_threshold",
                self.bullish_asymmetry_threshold,
                "must be below bearish_asymmetry_threshold",
            ));
        }
        check_range("elasticity.short_gamma_amplifier", self.short_gamma_amplifier, 1.0, 10.0)?;
        Ok(())
    }
}

/// Regime classifier settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// |net dealer gamma| (exposure units) for compression/expansion
    pub gamma_threshold: f64,
    /// |net dealer gamma| for a quartic potential
    pub gamma_extreme_threshold: f64,
    /// |net dealer vanna| for a vol-driven regime
    pub vanna_threshold: f64,
    /// |net dealer charm| for a decay-dominant regime
    pub charm_threshold: f64,
    pub jump_vov_weight: f64,
    pub jump_vol_index_weight: f64,
    pub jump_acceleration_weight: f64,
    /// Vol index level treated as "normal" (score contribution 1.0)
    pub vol_index_reference: f64,
    pub jump_short_gamma_amplifier: f64,
    pub jump_elevated_threshold: f64,
    pub jump_high_threshold: f64,
    /// EMA factor for label persistence
    pub stability_alpha: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            gamma_threshold: 5.0,
            gamma_extreme_threshold: 25.0,
            vanna_threshold: 2.0,
            charm_threshold: 1.0,
            jump_vov_weight: 0.4,
            jump_vol_index_weight: 0.3,
            jump_acceleration_weight: 0.3,
            vol_index_reference: 20.0,
            jump_short_gamma_amplifier: 1.25,
            jump_elevated_threshold: 0.4,
            jump_high_threshold: 0.7,
            stability_alpha: 0.2,
        }
    }
}

impl RegimeConfig {
    pub fn validate(&self) -> Result<()> {
        check_positive("regime.gamma_threshold", self.gamma_threshold)?;
        check_positive("regime.gamma_extreme_threshold", self.gamma_extreme_threshold)?;
        if self.gamma_extreme_threshold < self.gamma_threshold {
            return Err(crate::errors::Error::invalid_config(
                "regime.gamma_extreme_threshold",
                self.gamma_extreme_threshold,
                "must be at least gamma_threshold",
            ));
        }
        check_positive("regime.vanna_threshold", self.vanna_threshold)?;
        check_positive("regime.charm_threshold", self.charm_threshold)?;
        check_non_negative("regime.jump_vov_weight", self.jump_vov_weight)?;
        check_non_negative("regime.jump_vol_index_weight", self.jump_vol_index_weight)?;
        check_non_negative("regime.jump_acceleration_weight", self.jump_acceleration_weight)?;
        check_positive("regime.vol_index_reference", self.vol_index_reference)?;
        check_range("regime.jump_short_gamma_amplifier", self.jump_short_gamma_amplifier, 1.0, 10.0)?;
        check_range("regime.jump_elevated_threshold", self.jump_elevated_threshold, 0.0, 1.0)?;
        check_range("regime.jump_high_threshold", self.jump_high_threshold, 0.0, 1.0)?;
        if self.jump_elevated_threshold > self.jump_high_threshold {
            return Err(crate::errors::Error::invalid_config(
                "regime.jump_elevated_threshold",
                self.jump_elevated_threshold,
                "must not exceed jump_high_threshold",
            ));
        }
        check_range("regime.stability_alpha", self.stability_alpha, 0.0, 1.0)?;
        Ok(())
    }
}

/// Static per-agent weights. The lookahead weight is deliberately not tuned.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentWeights {
    pub hedge: f64,
    pub liquidity: f64,
    pub sentiment: f64,
    pub lookahead: f64,
}

impl Default for AgentWeights {
    fn default() -> Self {
        Self {
            hedge: 1.0,
            liquidity: 0.8,
            sentiment: 0.6,
            lookahead: 0.3,
        }
    }
}

/// Multi-agent composer settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// |score| must exceed this for a non-neutral direction
    pub direction_threshold: f64,
    /// Agents that must agree with the decision at or above `alignment_confidence`
    pub min_aligned_agents: usize,
    /// Confidence gate for an aligned agent (replaced by the learned gate once trained)
    pub alignment_confidence: f64,
    /// Winning weighted score must exceed losing by this fraction
    pub winning_margin: f64,
    /// Bounds applied to the learned confidence gate
    pub learned_gate_bounds: (f64, f64),
    pub weights: AgentWeights,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            direction_threshold: 0.15,
            min_aligned_agents: 2,
            alignment_confidence: 0.6,
            winning_margin: 0.2,
            learned_gate_bounds: (0.5, 0.85),
            weights: AgentWeights::default(),
        }
    }
}

impl ComposerConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("composer.direction_threshold", self.direction_threshold, 0.0, 1.0)?;
        if self.min_aligned_agents == 0 {
            return Err(crate::errors::Error::invalid_config(
                "composer.min_aligned_agents",
                self.min_aligned_agents,
                "must be at least 1",
            ));
        }
        check_range("composer.alignment_confidence", self.alignment_confidence, 0.0, 1.0)?;
        check_non_negative("composer.winning_margin", self.winning_margin)?;
        let (lo, hi) = self.learned_gate_bounds;
        check_range("composer.learned_gate_bounds.0", lo, 0.0, 1.0)?;
        check_range("composer.learned_gate_bounds.1", hi, lo, 1.0)?;
        check_non_negative("composer.weights.hedge", self.weights.hedge)?;
        check_non_negative("composer.weights.liquidity", self.weights.liquidity)?;
        check_non_negative("composer.weights.sentiment", self.weights.sentiment)?;
        check_non_negative("composer.weights.lookahead", self.weights.lookahead)?;
        Ok(())
    }
}

/// Decision-cycle cadence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Seconds between bars for one symbol
    pub bar_interval_secs: u64,
    /// Lookahead predictions below this confidence are not offered as views
    pub lookahead_min_confidence: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            bar_interval_secs: 60,
            lookahead_min_confidence: 0.05,
        }
    }
}

impl CycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bar_interval_secs == 0 {
            return Err(crate::errors::Error::invalid_config(
                "cycle.bar_interval_secs",
                self.bar_interval_secs,
                "must be positive",
            ));
        }
        check_range("cycle.lookahead_min_confidence", self.lookahead_min_confidence, 0.0, 1.0)?;
        Ok(())
    }
}
