//! Trade-close feedback and the signal state captured at entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of composer signal features fed to the calibrator.
pub const SIGNAL_DIM: usize = 8;

/// Raw composer signal vector.
///
/// Layout: `[score, |score|, hedge, liquidity, sentiment, lookahead,
/// aligned_fraction, dominance]` where each agent slot is
/// `direction × confidence` (0 when the agent was silent).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalVector(pub [f64; SIGNAL_DIM]);

impl SignalVector {
    pub fn zeros() -> Self {
        Self([0.0; SIGNAL_DIM])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn score(&self) -> f64 {
        self.0[0]
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|x| x.is_finite())
    }
}

impl Default for SignalVector {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Pressure-field state at trade entry. Adaptive thresholds learn on these values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PressureSnapshot {
    /// Average of up/down elasticity
    pub elasticity: f64,
    /// max(movement_energy_up, movement_energy_down)
    pub max_energy: f64,
    /// Mean confidence of the agents that agreed with the decision
    pub aligned_confidence: f64,
    pub acceleration_likelihood: f64,
    pub dealer_sign: f64,
    pub signal: SignalVector,
}

impl PressureSnapshot {
    /// True when every field can be learned on and written to JSON.
    pub fn is_finite(&self) -> bool {
        self.elasticity.is_finite()
            && self.max_energy.is_finite()
            && self.aligned_confidence.is_finite()
            && self.acceleration_likelihood.is_finite()
            && self.dealer_sign.is_finite()
            && self.signal.is_finite()
    }
}

/// Realized outcome of a closed trade, delivered by the execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeClose {
    pub symbol: String,
    pub strategy_id: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pressure_snapshot_at_entry: PressureSnapshot,
    pub raw_confidence_at_entry: f64,
    pub realized_pnl: f64,
    pub capital_risked: f64,
    #[serde(default)]
    pub iv_rank: Option<f64>,
    pub closed_at: DateTime<Utc>,
}

impl TradeClose {
    pub fn is_win(&self) -> bool {
        self.realized_pnl > 0.0
    }

    /// Bandit reward: `clip(pnl / capital, 0, 1)`; non-positive capital yields 0.
    pub fn reward(&self) -> f64 {
        bandit_reward(self.realized_pnl, self.capital_risked)
    }

    /// Signed return of the underlying over the holding period.
    pub fn price_return(&self) -> f64 {
        if self.entry_price > 0.0 && self.exit_price.is_finite() {
            (self.exit_price - self.entry_price) / self.entry_price
        } else {
            0.0
        }
    }
}

pub fn bandit_reward(pnl: f64, capital_risked: f64) -> f64 {
    if !pnl.is_finite() || !capital_risked.is_finite() || capital_risked <= 0.0 {
        return 0.0;
    }
    (pnl / capital_risked).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_clipping() {
        assert_eq!(bandit_reward(50.0, 100.0), 0.5);
        assert_eq!(bandit_reward(500.0, 100.0), 1.0);
        assert_eq!(bandit_reward(-50.0, 100.0), 0.0);
        assert_eq!(bandit_reward(50.0, 0.0), 0.0);
        assert_eq!(bandit_reward(50.0, -10.0), 0.0);
        assert_eq!(bandit_reward(f64::NAN, 100.0), 0.0);
    }
}
