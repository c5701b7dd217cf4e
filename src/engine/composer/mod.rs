//! Multi-agent consensus.
//!
//! ```text
//! Hedge ─────┐
//! Liquidity ─┤   score = Σ d·c·w / Σ w
//! Sentiment ─┼─► direction = sign(score) if |score| > threshold
//! Lookahead ─┘   take iff ≥ N aligned agents at the gate
//!                     and winning side beats losing side by the margin
//! ```
//!
//! The composer itself is stateless; the learned confidence gate and the
//! calibrator are supplied per call by the learning orchestrator.

mod agents;

pub use agents::{Agent, BarContext, HedgeAgent, LookaheadAgent};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::engine::config::ComposerConfig;
use crate::engine::learning::SignalVector;
use crate::types::{direction_sign, AgentId, AgentView, ComposerDecision, DecisionAction};

/// Fused decision plus the signal state behind it.
#[derive(Debug, Clone)]
pub struct Composition {
    pub decision: ComposerDecision,
    /// Raw signal vector; calibrator input at entry and at close
    pub signal: SignalVector,
    /// Mean confidence of the agents whose sign matches the decision
    pub aligned_confidence: f64,
    /// Gate applied to aligned agents this bar
    pub gate: f64,
}

#[derive(Debug, Clone)]
pub struct Composer {
    config: ComposerConfig,
}

impl Composer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn weight(&self, agent: AgentId) -> f64 {
        let w = &self.config.weights;
        match agent {
            AgentId::Hedge => w.hedge,
            AgentId::Liquidity => w.liquidity,
            AgentId::Sentiment => w.sentiment,
            AgentId::Lookahead => w.lookahead,
        }
    }

    /// Gate for aligned agents: the learned value clamped to its bounds, or
    /// the configured default before anything has been learned.
    pub fn effective_gate(&self, learned: Option<f64>) -> f64 {
        let (lo, hi) = self.config.learned_gate_bounds;
        match learned {
            Some(g) if g.is_finite() => g.clamp(lo, hi),
            _ => self.config.alignment_confidence,
        }
    }

    /// Fuse one bar's views.
    ///
    /// `calibrate` maps the raw signal to a win probability and returns
    /// `None` while the calibration model is not ready.
    pub fn compose(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        views: Vec<AgentView>,
        learned_gate: Option<f64>,
        calibrate: impl FnOnce(&SignalVector) -> Option<f64>,
    ) -> Composition {
        let gate = self.effective_gate(learned_gate);

        let mut weighted_sum: f64 = 0.0;
        let mut weight_total = 0.0;
        let mut bull: f64 = 0.0;
        let mut bear: f64 = 0.0;
        let mut slots = [0.0; 4];
        for view in &views {
            let w = self.weight(view.agent_id());
            let contribution = view.direction() * view.confidence() * w;
            weighted_sum += contribution;
            weight_total += w;
            if contribution > 0.0 {
                bull += contribution;
            } else {
                bear -= contribution;
            }
            let slot = match view.agent_id() {
                AgentId::Hedge => 0,
                AgentId::Liquidity => 1,
                AgentId::Sentiment => 2,
                AgentId::Lookahead => 3,
            };
            slots[slot] = view.direction() * view.confidence();
        }

        let score = if weight_total > 0.0 {
            (weighted_sum / weight_total).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let direction = if score.abs() > self.config.direction_threshold {
            direction_sign(score)
        } else {
            0
        };

        let agreeing: Vec<&AgentView> = views
            .iter()
            .filter(|v| direction != 0 && v.sign() == direction)
            .collect();
        let aligned = agreeing.iter().filter(|v| v.confidence() >= gate).count();
        let aligned_confidence = if agreeing.is_empty() {
            0.0
        } else {
            agreeing.iter().map(|v| v.confidence()).sum::<f64>() / agreeing.len() as f64
        };
        let (winning, losing) = match direction {
            1 => (bull, bear),
            -1 => (bear, bull),
            _ => (0.0, 0.0),
        };
        let dominance = if bull + bear > 0.0 {
            (winning - losing) / (bull + bear)
        } else {
            0.0
        };

        let aligned_ok = aligned >= self.config.min_aligned_agents;
        let margin_ok = winning > losing * (1.0 + self.config.winning_margin);
        let action = match direction {
            1 if aligned_ok && margin_ok => DecisionAction::Long,
            -1 if aligned_ok && margin_ok => DecisionAction::Short,
            _ => DecisionAction::Hold,
        };

        let aligned_fraction = if views.is_empty() {
            0.0
        } else {
            aligned as f64 / views.len() as f64
        };
        let signal = SignalVector([
            score,
            score.abs(),
            slots[0],
            slots[1],
            slots[2],
            slots[3],
            aligned_fraction,
            dominance,
        ]);

        let rationale = if direction == 0 {
            format!("score {:+.3} inside ±{:.2}", score, self.config.direction_threshold)
        } else if action == DecisionAction::Hold {
            format!(
                "score {:+.3}, {} aligned at gate {:.2} (need {}), win {:.3} vs lose {:.3}",
                score, aligned, gate, self.config.min_aligned_agents, winning, losing
            )
        } else {
            let names: Vec<&str> = agreeing
                .iter()
                .filter(|v| v.confidence() >= gate)
                .map(|v| v.agent_id().as_str())
                .collect();
            format!(
                "score {:+.3}, aligned [{}] at gate {:.2}, win {:.3} vs lose {:.3}",
                score,
                names.join(","),
                gate,
                winning,
                losing
            )
        };

        let calibrated_probability = calibrate(&signal).filter(|p| p.is_finite());

        debug!(
            symbol = %symbol,
            score = %format!("{:+.3}", score),
            direction = direction,
            action = ?action,
            aligned = aligned,
            gate = %format!("{:.2}", gate),
            calibrated = ?calibrated_probability,
            views = views.len(),
            "Composed decision"
        );

        Composition {
            decision: ComposerDecision {
                symbol: symbol.to_string(),
                timestamp,
                direction,
                action,
                raw_confidence: score.abs(),
                calibrated_probability,
                contributing_views: views,
                selected_strategy_id: None,
                rationale,
            },
            signal,
            aligned_confidence,
            gate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: AgentId, dir: f64, conf: f64) -> AgentView {
        AgentView::new(id, dir, conf, "test")
    }

    fn composer() -> Composer {
        Composer::new(ComposerConfig::default())
    }

    fn no_calibration(_: &SignalVector) -> Option<f64> {
        None
    }

    #[test]
    fn test_alignment_example_goes_long() {
        let views = vec![
            view(AgentId::Hedge, 1.0, 0.8),
            view(AgentId::Liquidity, 1.0, 0.7),
            view(AgentId::Sentiment, -1.0, 0.5),
        ];
        let out = composer().compose("SPY", Utc::now(), views, None, no_calibration);

        // (0.8·1.0 + 0.7·0.8 − 0.5·0.6) / (1.0 + 0.8 + 0.6) = 1.06 / 2.4
        assert!((out.decision.raw_confidence - 1.06 / 2.4).abs() < 1e-12);
        assert_eq!(out.decision.direction, 1);
        assert_eq!(out.decision.action, DecisionAction::Long);
        assert!(out.decision.calibrated_probability.is_none());
        assert_eq!(out.decision.contributing_views.len(), 3);
        assert!((out.aligned_confidence - 0.75).abs() < 1e-12);
        assert_eq!(out.signal.score(), out.decision.raw_confidence);
    }

    #[test]
    fn test_weak_score_is_neutral_hold() {
        let views = vec![
            view(AgentId::Hedge, 1.0, 0.3),
            view(AgentId::Liquidity, -1.0, 0.3),
        ];
        let out = composer().compose("SPY", Utc::now(), views, None, no_calibration);
        assert_eq!(out.decision.direction, 0);
        assert_eq!(out.decision.action, DecisionAction::Hold);
    }

    #[test]
    fn test_single_aligned_agent_holds() {
        let views = vec![
            view(AgentId::Hedge, 1.0, 0.9),
            view(AgentId::Liquidity, 1.0, 0.4),
        ];
        let out = composer().compose("SPY", Utc::now(), views, None, no_calibration);
        assert_eq!(out.decision.direction, 1);
        assert_eq!(out.decision.action, DecisionAction::Hold);
    }

    #[test]
    fn test_margin_blocks_contested_decision() {
        let config = ComposerConfig {
            direction_threshold: 0.01,
            ..Default::default()
        };
        let views = vec![
            view(AgentId::Hedge, 1.0, 0.9),
            view(AgentId::Liquidity, 1.0, 0.8),
            view(AgentId::Sentiment, -1.0, 1.0),
            view(AgentId::Lookahead, -1.0, 1.0),
        ];
        // bull = 0.9 + 0.64 = 1.54; bear = 0.6 + 0.3 = 0.9; 1.54 > 1.08 → long
        let out = Composer::new(config.clone()).compose("SPY", Utc::now(), views.clone(), None, no_calibration);
        assert_eq!(out.decision.action, DecisionAction::Long);

        let strict = ComposerConfig {
            winning_margin: 0.8,
            ..config
        };
        // 1.54 < 0.9 · 1.8 = 1.62 → hold
        let out = Composer::new(strict).compose("SPY", Utc::now(), views, None, no_calibration);
        assert_eq!(out.decision.direction, 1);
        assert_eq!(out.decision.action, DecisionAction::Hold);
    }

    #[test]
    fn test_learned_gate_overrides_and_is_clamped() {
        let c = composer();
        assert_eq!(c.effective_gate(None), 0.6);
        assert_eq!(c.effective_gate(Some(0.7)), 0.7);
        assert_eq!(c.effective_gate(Some(0.99)), 0.85);
        assert_eq!(c.effective_gate(Some(0.1)), 0.5);
        assert_eq!(c.effective_gate(Some(f64::NAN)), 0.6);

        let views = vec![
            view(AgentId::Hedge, 1.0, 0.8),
            view(AgentId::Liquidity, 1.0, 0.7),
        ];
        let out = c.compose("SPY", Utc::now(), views, Some(0.75), no_calibration);
        assert_eq!(out.decision.action, DecisionAction::Hold);
        assert_eq!(out.gate, 0.75);
    }

    #[test]
    fn test_calibration_attached_when_ready() {
        let views = vec![
            view(AgentId::Hedge, -1.0, 0.9),
            view(AgentId::Sentiment, -1.0, 0.9),
        ];
        let out = composer().compose("QQQ", Utc::now(), views, None, |s| {
            assert!(s.score() < 0.0);
            Some(0.64)
        });
        assert_eq!(out.decision.action, DecisionAction::Short);
        assert_eq!(out.decision.calibrated_probability, Some(0.64));
        assert_eq!(out.decision.effective_confidence(), 0.64);
    }

    #[test]
    fn test_no_views_holds() {
        let out = composer().compose("SPY", Utc::now(), Vec::new(), None, no_calibration);
        assert_eq!(out.decision.direction, 0);
        assert_eq!(out.decision.raw_confidence, 0.0);
        assert_eq!(out.signal, SignalVector::zeros());
    }
}
