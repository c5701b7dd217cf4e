//! Dealer positioning inferred from open interest.
//!
//! Dealers are assumed to be net short whatever retail buys, so the
//! call/put imbalance of OI-weighted exposure tells us which side of gamma
//! the hedgers sit on:
//!
//! ```text
//! dealer_sign = (Σ_calls w·|GEX| − Σ_puts w·|GEX|) / (Σ_calls w·|GEX| + Σ_puts w·|GEX|)
//! ```
//!
//! Positive sign = dealers long gamma (hedging dampens moves),
//! negative = short gamma (hedging amplifies moves).

use serde::{Deserialize, Serialize};

use crate::types::{ChainSnapshot, OptionContract, OptionType};

use super::PressureConfig;

/// Per-contract dollar exposures, already distance-weighted and in exposure units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ContractExposure {
    pub strike: f64,
    pub option_type: OptionType,
    /// exp(-λ·|K−S|/S)
    pub weight: f64,
    /// Weighted open interest
    pub weighted_oi: f64,
    /// Dollar gamma per 1% move
    pub gamma: f64,
    /// Dollar delta change per vol point
    pub vanna: f64,
    /// Dollar delta decay per day, scaled by 1/√max(dte, ε)
    pub charm: f64,
}

/// Distance weight for a strike.
pub(crate) fn distance_weight(strike: f64, spot: f64, decay: f64) -> f64 {
    (-decay * (strike - spot).abs() / spot).exp()
}

/// Time scaling that accelerates charm into expiry.
pub(crate) fn charm_time_scale(days_to_expiry: f64, min_days: f64) -> f64 {
    1.0 / days_to_expiry.max(min_days).sqrt()
}

/// Compute weighted exposures for every contract with valid open interest.
pub(crate) fn contract_exposures(
    snapshot: &ChainSnapshot,
    config: &PressureConfig,
) -> Vec<ContractExposure> {
    if !snapshot.has_valid_spot() {
        return Vec::new();
    }
    snapshot
        .contracts
        .iter()
        .filter(|c| c.has_valid_open_interest())
        .map(|c| exposure(c, snapshot, config))
        .collect()
}

fn exposure(c: &OptionContract, snapshot: &ChainSnapshot, config: &PressureConfig) -> ContractExposure {
    let spot = snapshot.spot;
    let weight = distance_weight(c.strike, spot, config.distance_decay);
    let notional = c.open_interest * config.contract_multiplier / config.exposure_unit;
    let dte = c.days_to_expiry(snapshot.timestamp);

    ContractExposure {
        strike: c.strike,
        option_type: c.option_type,
        weight,
        weighted_oi: weight * c.open_interest,
        gamma: weight * notional * c.gamma * spot * spot * 0.01,
        vanna: weight * notional * c.vanna * spot * 0.01,
        charm: weight * notional * c.charm * spot * charm_time_scale(dte, config.min_days_to_expiry),
    }
}

/// Inferred dealer book for one bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealerPositioning {
    /// Net dealer gamma exposure (calls − puts), exposure units
    pub net_gamma: f64,
    /// Net dealer vanna exposure (calls − puts)
    pub net_vanna: f64,
    /// Net dealer charm exposure (calls − puts)
    pub net_charm: f64,
    /// Normalized gamma imbalance in [-1, 1]
    pub dealer_sign: f64,
    /// Fraction of contracts with valid open interest, in [0, 1]
    pub confidence: f64,
    /// Open-interest-weighted strike center
    pub strike_center: f64,
}

impl DealerPositioning {
    /// Whether hedging flows amplify moves.
    pub fn is_short_gamma(&self) -> bool {
        self.dealer_sign < 0.0
    }

    /// Degenerate positioning for bars without usable data.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Estimate dealer positioning from precomputed exposures.
pub(crate) fn estimate_positioning(
    snapshot: &ChainSnapshot,
    exposures: &[ContractExposure],
) -> DealerPositioning {
    let total = snapshot.contracts.len();
    if total == 0 || exposures.is_empty() {
        return DealerPositioning::empty();
    }

    let mut call_gamma = 0.0;
    let mut put_gamma = 0.0;
    let mut net_vanna = 0.0;
    let mut net_charm = 0.0;

    for e in exposures {
        match e.option_type {
            OptionType::Call => {
                call_gamma += e.gamma.abs();
                net_vanna += e.vanna;
                net_charm += e.charm;
            }
            OptionType::Put => {
                put_gamma += e.gamma.abs();
                net_vanna -= e.vanna;
                net_charm -= e.charm;
            }
        }
    }

    let gross = call_gamma + put_gamma;
    let dealer_sign = if gross > 0.0 {
        ((call_gamma - put_gamma) / gross).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    // Strike center uses raw OI so it reflects where positioning actually sits
    let (oi_sum, oi_strike_sum) = snapshot
        .contracts
        .iter()
        .filter(|c| c.has_valid_open_interest())
        .fold((0.0, 0.0), |(oi, ks), c| (oi + c.open_interest, ks + c.open_interest * c.strike));
    let strike_center = if oi_sum > 0.0 { oi_strike_sum / oi_sum } else { 0.0 };

    DealerPositioning {
        net_gamma: call_gamma - put_gamma,
        net_vanna,
        net_charm,
        dealer_sign,
        confidence: exposures.len() as f64 / total as f64,
        strike_center,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_weight_decays() {
        assert!((distance_weight(100.0, 100.0, 20.0) - 1.0).abs() < 1e-12);
        let near = distance_weight(101.0, 100.0, 20.0);
        let far = distance_weight(110.0, 100.0, 20.0);
        assert!(near > far);
        assert!((far - (-2.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_charm_time_scale_floors() {
        assert!((charm_time_scale(4.0, 0.05) - 0.5).abs() < 1e-12);
        assert!((charm_time_scale(0.0, 0.04) - 5.0).abs() < 1e-12);
        assert!(charm_time_scale(0.5, 0.05) > charm_time_scale(30.0, 0.05));
    }
}
