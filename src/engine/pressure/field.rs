//! Directional pressure field.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::ChainSnapshot;

use super::dealer::{contract_exposures, estimate_positioning, ContractExposure, DealerPositioning};
use super::PressureConfig;

/// Lowest multiplier the vanna shock absorber can apply.
pub const VANNA_ABSORBER_FLOOR: f64 = 0.3;

/// Price interval of locally concentrated open interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinZone {
    pub center: f64,
    pub lower: f64,
    pub upper: f64,
    /// Share of total weighted OI at this strike, in [0, 1]
    pub strength: f64,
}

impl PinZone {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower && price <= self.upper
    }
}

/// Coarse label of the dealer book behind a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRegime {
    LongGamma,
    ShortGamma,
    Neutral,
    InsufficientData,
}

/// Directional gamma/vanna/charm pressure for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureField {
    pub positioning: DealerPositioning,
    pub gamma_pressure_up: f64,
    pub gamma_pressure_down: f64,
    pub vanna_pressure_up: f64,
    pub vanna_pressure_down: f64,
    pub charm_pressure_up: f64,
    pub charm_pressure_down: f64,
    pub pin_zones: Vec<PinZone>,
    pub regime: FieldRegime,
    /// Multiplier applied to vanna, in [0.3, 1.0]
    pub vanna_absorber: f64,
    /// Vol-of-vol used for the absorber
    pub vol_of_vol: f64,
    /// Weighted OI / raw OI in [0, 1]; how tightly OI clusters around spot
    pub oi_concentration: f64,
    /// OI-weighted relative bid/ask spread of the chain
    pub avg_spread_ratio: f64,
}

impl PressureField {
    /// All-zero field for degraded input.
    pub fn insufficient(vol_of_vol: f64) -> Self {
        Self {
            positioning: DealerPositioning::empty(),
            gamma_pressure_up: 0.0,
            gamma_pressure_down: 0.0,
            vanna_pressure_up: 0.0,
            vanna_pressure_down: 0.0,
            charm_pressure_up: 0.0,
            charm_pressure_down: 0.0,
            pin_zones: Vec::new(),
            regime: FieldRegime::InsufficientData,
            vanna_absorber: 1.0,
            vol_of_vol,
            oi_concentration: 0.0,
            avg_spread_ratio: 0.0,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        self.regime == FieldRegime::InsufficientData
    }

    pub fn total_pressure_up(&self) -> f64 {
        self.gamma_pressure_up + self.vanna_pressure_up + self.charm_pressure_up
    }

    pub fn total_pressure_down(&self) -> f64 {
        self.gamma_pressure_down + self.vanna_pressure_down + self.charm_pressure_down
    }

    pub fn gamma_magnitude(&self) -> f64 {
        self.gamma_pressure_up + self.gamma_pressure_down
    }

    pub fn vanna_magnitude(&self) -> f64 {
        self.vanna_pressure_up + self.vanna_pressure_down
    }

    pub fn charm_magnitude(&self) -> f64 {
        self.charm_pressure_up + self.charm_pressure_down
    }

    /// Pin zone containing `price`, if any.
    pub fn pin_at(&self, price: f64) -> Option<&PinZone> {
        self.pin_zones.iter().find(|z| z.contains(price))
    }
}

/// Vanna dampening multiplier.
///
/// 1.0 up to the vol-of-vol threshold, then linear decay with the excess,
/// never below [`VANNA_ABSORBER_FLOOR`].
pub fn vanna_shock_absorber(vol_of_vol: f64, threshold: f64, sensitivity: f64) -> f64 {
    if !vol_of_vol.is_finite() || vol_of_vol <= threshold {
        return 1.0;
    }
    (1.0 - (vol_of_vol - threshold) * sensitivity).clamp(VANNA_ABSORBER_FLOOR, 1.0)
}

/// Builds a [`PressureField`] from a chain snapshot.
#[derive(Debug, Clone)]
pub struct PressureFieldBuilder {
    config: PressureConfig,
}

impl PressureFieldBuilder {
    pub fn new(config: PressureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PressureConfig {
        &self.config
    }

    /// Construct the field. Never fails: degraded input yields an all-zero field
    /// with zero confidence.
    pub fn build(&self, snapshot: &ChainSnapshot) -> PressureField {
        let vol_of_vol = snapshot.effective_vol_of_vol();
        let exposures = contract_exposures(snapshot, &self.config);
        if exposures.is_empty() {
            debug!(
                symbol = %snapshot.symbol,
                contracts = snapshot.contracts.len(),
                spot = snapshot.spot,
                "No valid contracts, emitting insufficient-data field"
            );
            return PressureField::insufficient(vol_of_vol);
        }

        let positioning = estimate_positioning(snapshot, &exposures);
        let absorber = vanna_shock_absorber(
            vol_of_vol,
            self.config.vanna_shock_vov_threshold,
            self.config.vanna_shock_sensitivity,
        );

        let spot = snapshot.spot;
        let mut field = PressureField {
            positioning,
            gamma_pressure_up: 0.0,
            gamma_pressure_down: 0.0,
            vanna_pressure_up: 0.0,
            vanna_pressure_down: 0.0,
            charm_pressure_up: 0.0,
            charm_pressure_down: 0.0,
            pin_zones: pin_zones(&exposures, self.config.pin_percentile),
            regime: FieldRegime::Neutral,
            vanna_absorber: absorber,
            vol_of_vol,
            oi_concentration: oi_concentration(snapshot, self.config.distance_decay),
            avg_spread_ratio: avg_spread_ratio(snapshot),
        };

        for e in &exposures {
            let gamma = e.gamma.abs();
            let vanna = e.vanna.abs() * absorber;
            let charm = e.charm.abs();
            // At-the-money strikes push both ways equally
            let up_share = if e.strike > spot {
                1.0
            } else if e.strike < spot {
                0.0
            } else {
                0.5
            };
            let down_share = 1.0 - up_share;
            field.gamma_pressure_up += gamma * up_share;
            field.gamma_pressure_down += gamma * down_share;
            field.vanna_pressure_up += vanna * up_share;
            field.vanna_pressure_down += vanna * down_share;
            field.charm_pressure_up += charm * up_share;
            field.charm_pressure_down += charm * down_share;
        }

        let band = self.config.neutral_dealer_band;
        field.regime = if field.positioning.dealer_sign > band {
            FieldRegime::LongGamma
        } else if field.positioning.dealer_sign < -band {
            FieldRegime::ShortGamma
        } else {
            FieldRegime::Neutral
        };

        field
    }
}

/// Local maxima of per-strike weighted OI at or above the given percentile.
fn pin_zones(exposures: &[ContractExposure], percentile: f64) -> Vec<PinZone> {
    // Merge calls and puts that share a strike
    let mut by_strike: Vec<(f64, f64)> = Vec::new();
    let mut sorted: Vec<&ContractExposure> = exposures.iter().collect();
    sorted.sort_by(|a, b| a.strike.total_cmp(&b.strike));
    for e in sorted {
        match by_strike.last_mut() {
            Some((k, oi)) if (*k - e.strike).abs() < 1e-9 => *oi += e.weighted_oi,
            _ => by_strike.push((e.strike, e.weighted_oi)),
        }
    }

    let total: f64 = by_strike.iter().map(|(_, oi)| oi).sum();
    if by_strike.is_empty() || total <= 0.0 {
        return Vec::new();
    }

    let mut values: Vec<f64> = by_strike.iter().map(|(_, oi)| *oi).collect();
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (percentile * (values.len() - 1) as f64).ceil() as usize;
    let cutoff = values[rank.min(values.len() - 1)];

    let n = by_strike.len();
    let mut zones = Vec::new();
    for i in 0..n {
        let (strike, oi) = by_strike[i];
        let left = if i > 0 { Some(by_strike[i - 1]) } else { None };
        let right = if i + 1 < n { Some(by_strike[i + 1]) } else { None };

        // Strict on the left, weak on the right so plateaus yield one zone
        let is_peak = left.map_or(true, |(_, l)| oi > l) && right.map_or(true, |(_, r)| oi >= r);
        if !is_peak || oi < cutoff {
            continue;
        }

        let lower_gap = left.map(|(k, _)| (strike - k) / 2.0);
        let upper_gap = right.map(|(k, _)| (k - strike) / 2.0);
        let lower = strike - lower_gap.or(upper_gap).unwrap_or(0.0);
        let upper = strike + upper_gap.or(lower_gap).unwrap_or(0.0);

        zones.push(PinZone {
            center: strike,
            lower,
            upper,
            strength: oi / total,
        });
    }
    zones
}

fn oi_concentration(snapshot: &ChainSnapshot, decay: f64) -> f64 {
    let (raw, weighted) = snapshot
        .contracts
        .iter()
        .filter(|c| c.has_valid_open_interest())
        .fold((0.0, 0.0), |(raw, weighted), c| {
            let w = super::dealer::distance_weight(c.strike, snapshot.spot, decay);
            (raw + c.open_interest, weighted + w * c.open_interest)
        });
    if raw > 0.0 {
        (weighted / raw).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn avg_spread_ratio(snapshot: &ChainSnapshot) -> f64 {
    let (oi, weighted) = snapshot
        .contracts
        .iter()
        .filter(|c| c.has_valid_open_interest())
        .filter_map(|c| c.spread_ratio().map(|r| (c.open_interest, r)))
        .filter(|(_, r)| r.is_finite())
        .fold((0.0, 0.0), |(oi, acc), (c_oi, r)| (oi + c_oi, acc + c_oi * r));
    if oi > 0.0 {
        weighted / oi
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OptionContract, OptionType};
    use chrono::{Duration, TimeZone, Utc};

    fn snapshot(contracts: Vec<OptionContract>) -> ChainSnapshot {
        ChainSnapshot {
            symbol: "SPX".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap(),
            spot: 100.0,
            vol_index: Some(18.0),
            vol_of_vol: Some(0.1),
            contracts,
        }
    }

    fn contract(strike: f64, option_type: OptionType, oi: f64) -> OptionContract {
        OptionContract {
            strike,
            expiry: Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap() + Duration::days(7),
            option_type,
            open_interest: oi,
            volume: 10.0,
            bid: 1.0,
            ask: 1.1,
            implied_vol: 0.2,
            delta: 0.5,
            gamma: 0.05,
            vanna: 0.02,
            charm: 0.01,
            vega: 0.1,
            theta: -0.02,
        }
    }

    #[test]
    fn test_empty_chain_is_insufficient() {
        let builder = PressureFieldBuilder::new(PressureConfig::default());
        let field = builder.build(&snapshot(vec![]));
        assert!(field.is_insufficient());
        assert_eq!(field.positioning.confidence, 0.0);
        assert_eq!(field.total_pressure_up(), 0.0);
        assert_eq!(field.total_pressure_down(), 0.0);
    }

    #[test]
    fn test_invalid_spot_is_insufficient() {
        let builder = PressureFieldBuilder::new(PressureConfig::default());
        let mut snap = snapshot(vec![contract(100.0, OptionType::Call, 1000.0)]);
        snap.spot = 0.0;
        assert!(builder.build(&snap).is_insufficient());
    }

    #[test]
    fn test_call_heavy_chain_is_long_gamma() {
        let builder = PressureFieldBuilder::new(PressureConfig::default());
        let field = builder.build(&snapshot(vec![
            contract(95.0, OptionType::Put, 100.0),
            contract(105.0, OptionType::Call, 5000.0),
        ]));
        assert!(field.positioning.dealer_sign > 0.0);
        assert!(field.positioning.dealer_sign <= 1.0);
        assert_eq!(field.regime, FieldRegime::LongGamma);
        assert!(field.gamma_pressure_up > field.gamma_pressure_down);
    }

    #[test]
    fn test_put_heavy_chain_is_short_gamma() {
        let builder = PressureFieldBuilder::new(PressureConfig::default());
        let field = builder.build(&snapshot(vec![
            contract(95.0, OptionType::Put, 5000.0),
            contract(105.0, OptionType::Call, 100.0),
        ]));
        assert!(field.positioning.is_short_gamma());
        assert_eq!(field.regime, FieldRegime::ShortGamma);
        assert!(field.gamma_pressure_down > field.gamma_pressure_up);
    }

    #[test]
    fn test_confidence_tracks_coverage() {
        let builder = PressureFieldBuilder::new(PressureConfig::default());
        let half = builder.build(&snapshot(vec![
            contract(100.0, OptionType::Call, 100.0),
            contract(105.0, OptionType::Call, 0.0),
        ]));
        let full = builder.build(&snapshot(vec![
            contract(100.0, OptionType::Call, 100.0),
            contract(105.0, OptionType::Call, 50.0),
        ]));
        assert!((half.positioning.confidence - 0.5).abs() < 1e-12);
        assert!((full.positioning.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_atm_strike_splits_evenly() {
        let builder = PressureFieldBuilder::new(PressureConfig::default());
        let field = builder.build(&snapshot(vec![contract(100.0, OptionType::Call, 1000.0)]));
        assert!((field.gamma_pressure_up - field.gamma_pressure_down).abs() < 1e-12);
        assert!(field.gamma_pressure_up > 0.0);
    }

    #[test]
    fn test_vanna_shock_absorber_bounds() {
        assert_eq!(vanna_shock_absorber(0.2, 0.5, 1.0), 1.0);
        assert!((vanna_shock_absorber(0.7, 0.5, 1.0) - 0.8).abs() < 1e-12);
        assert_eq!(vanna_shock_absorber(5.0, 0.5, 1.0), VANNA_ABSORBER_FLOOR);
        assert_eq!(vanna_shock_absorber(f64::NAN, 0.5, 1.0), 1.0);
    }

    #[test]
    fn test_high_vol_of_vol_dampens_vanna() {
        let builder = PressureFieldBuilder::new(PressureConfig::default());
        let calm = builder.build(&snapshot(vec![contract(105.0, OptionType::Call, 1000.0)]));
        let mut stressed_snap = snapshot(vec![contract(105.0, OptionType::Call, 1000.0)]);
        stressed_snap.vol_of_vol = Some(3.0);
        let stressed = builder.build(&stressed_snap);
        assert!(stressed.vanna_pressure_up < calm.vanna_pressure_up);
        assert!((stressed.vanna_pressure_up / calm.vanna_pressure_up - VANNA_ABSORBER_FLOOR).abs() < 1e-9);
        // Gamma untouched
        assert!((stressed.gamma_pressure_up - calm.gamma_pressure_up).abs() < 1e-12);
    }

    #[test]
    fn test_pin_zone_at_oi_peak() {
        let builder = PressureFieldBuilder::new(PressureConfig::default());
        let field = builder.build(&snapshot(vec![
            contract(90.0, OptionType::Put, 100.0),
            contract(95.0, OptionType::Put, 200.0),
            contract(100.0, OptionType::Call, 5000.0),
            contract(105.0, OptionType::Call, 200.0),
            contract(110.0, OptionType::Call, 100.0),
        ]));
        assert_eq!(field.pin_zones.len(), 1);
        let zone = &field.pin_zones[0];
        assert_eq!(zone.center, 100.0);
        assert!((zone.lower - 97.5).abs() < 1e-12);
        assert!((zone.upper - 102.5).abs() < 1e-12);
        assert!(zone.strength > 0.5);
        assert!(field.pin_at(101.0).is_some());
        assert!(field.pin_at(104.0).is_none());
    }
}
