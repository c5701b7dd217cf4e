//! Options chain snapshot as delivered by the market-data collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds in a calendar day, used for days-to-expiry.
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

/// A single listed contract with its Greeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub strike: f64,
    pub expiry: DateTime<Utc>,
    pub option_type: OptionType,
    pub open_interest: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub ask: f64,
    #[serde(default)]
    pub implied_vol: f64,
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub gamma: f64,
    #[serde(default)]
    pub vanna: f64,
    #[serde(default)]
    pub charm: f64,
    #[serde(default)]
    pub vega: f64,
    #[serde(default)]
    pub theta: f64,
}

impl OptionContract {
    /// Whether this contract can contribute to the pressure field.
    ///
    /// Requires positive open interest, a positive strike and finite Greeks.
    pub fn has_valid_open_interest(&self) -> bool {
        self.open_interest.is_finite()
            && self.open_interest > 0.0
            && self.strike.is_finite()
            && self.strike > 0.0
            && self.gamma.is_finite()
            && self.vanna.is_finite()
            && self.charm.is_finite()
    }

    /// Mid price, or `None` if either side is missing.
    pub fn mid(&self) -> Option<f64> {
        if self.bid > 0.0 && self.ask > 0.0 && self.ask >= self.bid {
            Some(0.5 * (self.bid + self.ask))
        } else {
            None
        }
    }

    /// Relative bid/ask spread (ask - bid) / mid.
    pub fn spread_ratio(&self) -> Option<f64> {
        self.mid().map(|mid| (self.ask - self.bid) / mid)
    }

    /// Fractional days until expiry measured from `now`. Expired contracts return 0.
    pub fn days_to_expiry(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (self.expiry - now).num_seconds() as f64;
        (seconds / SECONDS_PER_DAY).max(0.0)
    }
}

/// Immutable snapshot of one underlying's options chain at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub spot: f64,
    /// External volatility index level (e.g. VIX), if the collaborator supplies one
    #[serde(default)]
    pub vol_index: Option<f64>,
    /// Externally measured vol-of-vol; estimated from the chain when absent
    #[serde(default)]
    pub vol_of_vol: Option<f64>,
    #[serde(default)]
    pub contracts: Vec<OptionContract>,
}

impl ChainSnapshot {
    /// Whether the spot price can anchor a pressure field.
    pub fn has_valid_spot(&self) -> bool {
        self.spot.is_finite() && self.spot > 0.0
    }

    /// Number of contracts with usable open interest.
    pub fn valid_contract_count(&self) -> usize {
        self.contracts
            .iter()
            .filter(|c| c.has_valid_open_interest())
            .count()
    }

    /// Coefficient of variation of positive implied vols across the chain.
    ///
    /// Used as a vol-of-vol proxy when the collaborator does not provide one.
    pub fn implied_vol_dispersion(&self) -> f64 {
        let ivs: Vec<f64> = self
            .contracts
            .iter()
            .map(|c| c.implied_vol)
            .filter(|iv| iv.is_finite() && *iv > 0.0)
            .collect();
        if ivs.len() < 2 {
            return 0.0;
        }
        let n = ivs.len() as f64;
        let mean = ivs.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return 0.0;
        }
        let var = ivs.iter().map(|iv| (iv - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt() / mean
    }

    /// Vol-of-vol to use for this bar: supplied value if finite, else IV dispersion.
    pub fn effective_vol_of_vol(&self) -> f64 {
        match self.vol_of_vol {
            Some(v) if v.is_finite() && v >= 0.0 => v,
            _ => self.implied_vol_dispersion(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn contract(strike: f64, oi: f64, iv: f64) -> OptionContract {
        OptionContract {
            strike,
            expiry: Utc.with_ymd_and_hms(2024, 1, 19, 21, 0, 0).unwrap(),
            option_type: OptionType::Call,
            open_interest: oi,
            volume: 0.0,
            bid: 1.0,
            ask: 1.2,
            implied_vol: iv,
            delta: 0.5,
            gamma: 0.01,
            vanna: 0.0,
            charm: 0.0,
            vega: 0.0,
            theta: 0.0,
        }
    }

    #[test]
    fn test_valid_open_interest() {
        assert!(contract(100.0, 10.0, 0.2).has_valid_open_interest());
        assert!(!contract(100.0, 0.0, 0.2).has_valid_open_interest());
        assert!(!contract(-1.0, 10.0, 0.2).has_valid_open_interest());

        let mut bad = contract(100.0, 10.0, 0.2);
        bad.gamma = f64::NAN;
        assert!(!bad.has_valid_open_interest());
    }

    #[test]
    fn test_days_to_expiry() {
        let c = contract(100.0, 10.0, 0.2);
        let now = c.expiry - Duration::hours(36);
        assert!((c.days_to_expiry(now) - 1.5).abs() < 1e-9);
        assert_eq!(c.days_to_expiry(c.expiry + Duration::days(1)), 0.0);
    }

    #[test]
    fn test_spread_ratio() {
        let c = contract(100.0, 10.0, 0.2);
        let ratio = c.spread_ratio().unwrap();
        assert!((ratio - 0.2 / 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_vol_of_vol_fallback() {
        let snapshot = ChainSnapshot {
            symbol: "SPY".to_string(),
            timestamp: Utc::now(),
            spot: 100.0,
            vol_index: None,
            vol_of_vol: None,
            contracts: vec![contract(95.0, 1.0, 0.2), contract(105.0, 1.0, 0.3)],
        };
        assert!(snapshot.effective_vol_of_vol() > 0.0);

        let supplied = ChainSnapshot {
            vol_of_vol: Some(0.9),
            ..snapshot
        };
        assert_eq!(supplied.effective_vol_of_vol(), 0.9);
    }
}
