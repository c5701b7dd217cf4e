//! One synchronous decision cycle per bar.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::composer::{Agent, BarContext, Composer};
use crate::engine::config::EngineConfig;
use crate::engine::elasticity::{ElasticityCalculator, ElasticityState, MovementEnergyState};
use crate::engine::learning::{
    FeatureFrame, LearningOrchestrator, LookaheadPrediction, PressureSnapshot, StrategySelection,
};
use crate::engine::pressure::{PressureField, PressureFieldBuilder};
use crate::engine::regime::{RegimeClassification, RegimeClassifier};
use crate::types::{AgentView, ChainSnapshot, ComposerDecision};

/// Strategy-catalog input for one bar: its deterministic pick plus the
/// alternatives the bandit may explore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyChoice {
    pub deterministic: String,
    #[serde(default)]
    pub candidates: Vec<String>,
}

/// Every intermediate state of one bar.
#[derive(Debug, Clone, Serialize)]
pub struct BarReport {
    pub field: PressureField,
    pub elasticity: ElasticityState,
    pub energy: MovementEnergyState,
    pub regime: RegimeClassification,
    pub lookahead: Option<LookaheadPrediction>,
    pub decision: ComposerDecision,
    /// Hand back in the trade close if this decision is executed
    pub entry_snapshot: PressureSnapshot,
    pub strategy: Option<StrategySelection>,
}

/// Sequence features for the lookahead buffer.
pub fn feature_frame(
    spot: f64,
    field: &PressureField,
    elasticity: &ElasticityState,
    energy: &MovementEnergyState,
    regime: &RegimeClassification,
) -> FeatureFrame {
    let ln_or_zero = |x: f64| if x > 0.0 && x.is_finite() { x.ln() } else { 0.0 };
    FeatureFrame::new(
        spot,
        [
            field.positioning.dealer_sign,
            energy.net_energy.tanh(),
            ln_or_zero(energy.energy_asymmetry).tanh(),
            energy.acceleration_likelihood,
            ln_or_zero(elasticity.average()).tanh(),
            regime.jump_score,
        ],
    )
}

/// Runs pressure → elasticity → regime → agents → composer for each bar,
/// consulting the learning orchestrator for gates, calibration, lookahead and
/// strategy selection.
pub struct DecisionEngine {
    pressure: PressureFieldBuilder,
    elasticity: ElasticityCalculator,
    regime: RegimeClassifier,
    composer: Composer,
    agents: Vec<Agent>,
    learning: Arc<LearningOrchestrator>,
    bars: u64,
}

impl DecisionEngine {
    pub fn new(config: &EngineConfig, learning: Arc<LearningOrchestrator>) -> Self {
        Self {
            pressure: PressureFieldBuilder::new(config.pressure.clone()),
            elasticity: ElasticityCalculator::new(config.elasticity.clone()),
            regime: RegimeClassifier::new(config.regime.clone()),
            composer: Composer::new(config.composer.clone()),
            agents: Agent::roster(config.cycle.lookahead_min_confidence),
            learning,
            bars: 0,
        }
    }

    pub fn learning(&self) -> &Arc<LearningOrchestrator> {
        &self.learning
    }

    pub fn bars_processed(&self) -> u64 {
        self.bars
    }

    /// Run one bar. Never fails; degraded data yields a hold.
    pub fn run_bar(
        &mut self,
        snapshot: &ChainSnapshot,
        external_views: &[AgentView],
        strategy: Option<&StrategyChoice>,
    ) -> BarReport {
        let symbol = snapshot.symbol.as_str();
        let field = self.pressure.build(snapshot);
        let (elasticity, energy) = self.elasticity.compute(&field);
        let regime = self
            .regime
            .classify(symbol, &field, &energy, snapshot.vol_index);

        if regime.insufficient_data {
            warn!(
                symbol = %symbol,
                spot = snapshot.spot,
                contracts = snapshot.contracts.len(),
                "Insufficient chain data, hedge agent silent this bar"
            );
        }

        if snapshot.has_valid_spot() {
            let frame = feature_frame(snapshot.spot, &field, &elasticity, &energy, &regime);
            if self.learning.add_snapshot(symbol, frame) {
                debug!(symbol = %symbol, "Lookahead training pair added");
            }
        }
        let lookahead = self.learning.predict(symbol, snapshot.timestamp);

        let thresholds = self.learning.thresholds();
        let ctx = BarContext {
            field: &field,
            elasticity: &elasticity,
            energy: &energy,
            regime: &regime,
            thresholds: &thresholds,
            lookahead: lookahead.as_ref(),
            external: external_views,
        };
        let views: Vec<AgentView> = self.agents.iter().filter_map(|a| a.view(&ctx)).collect();

        let learning = &self.learning;
        let mut composition = self.composer.compose(
            symbol,
            snapshot.timestamp,
            views,
            learning.confidence_gate(),
            |signal| learning.calibrate(signal),
        );

        let selection = match strategy {
            Some(choice) if composition.decision.is_taken() => {
                let selection =
                    self.learning
                        .select_strategy(symbol, &choice.deterministic, &choice.candidates);
                composition.decision.selected_strategy_id = Some(selection.strategy_id.clone());
                Some(selection)
            }
            _ => None,
        };

        let entry_snapshot = PressureSnapshot {
            elasticity: elasticity.average(),
            max_energy: energy.max_energy(),
            aligned_confidence: composition.aligned_confidence,
            acceleration_likelihood: energy.acceleration_likelihood,
            dealer_sign: field.positioning.dealer_sign,
            signal: composition.signal,
        };

        self.bars += 1;
        let decision = composition.decision;
        info!(
            symbol = %symbol,
            action = ?decision.action,
            direction = decision.direction,
            raw_confidence = %format!("{:.3}", decision.raw_confidence),
            calibrated = ?decision.calibrated_probability,
            strategy = ?decision.selected_strategy_id,
            explored = selection.as_ref().map(|s| s.explored),
            regime = %regime.label(),
            "Bar decision"
        );

        BarReport {
            field,
            elasticity,
            energy,
            regime,
            lookahead,
            decision,
            entry_snapshot,
            strategy: selection,
        }
    }
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("agents", &self.agents.len())
            .field("bars", &self.bars)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{BanditConfig, LearningConfig};
    use crate::types::{AgentId, DecisionAction};
    use chrono::Utc;

    fn engine() -> DecisionEngine {
        let config = EngineConfig {
            learning: LearningConfig {
                bandit: BanditConfig {
                    exploration_rate: 0.0,
                    random_seed: Some(3),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };
        let learning = Arc::new(LearningOrchestrator::new(config.learning.clone()));
        DecisionEngine::new(&config, learning)
    }

    fn empty_snapshot() -> ChainSnapshot {
        ChainSnapshot {
            symbol: "SPY".to_string(),
            timestamp: Utc::now(),
            spot: 0.0,
            vol_index: None,
            vol_of_vol: None,
            contracts: Vec::new(),
        }
    }

    #[test]
    fn test_degraded_bar_holds_without_hedge_view() {
        let mut engine = engine();
        let report = engine.run_bar(&empty_snapshot(), &[], None);
        assert!(report.regime.insufficient_data);
        assert!(report.elasticity.is_fallback);
        assert_eq!(report.decision.action, DecisionAction::Hold);
        assert!(report
            .decision
            .contributing_views
            .iter()
            .all(|v| v.agent_id() != AgentId::Hedge));
        assert_eq!(engine.bars_processed(), 1);
    }

    #[test]
    fn test_external_views_drive_decision_and_strategy() {
        let mut engine = engine();
        let views = vec![
            AgentView::new(AgentId::Liquidity, 1.0, 0.9, "bid depth"),
            AgentView::new(AgentId::Sentiment, 1.0, 0.9, "call skew"),
        ];
        let choice = StrategyChoice {
            deterministic: "call_debit_spread".to_string(),
            candidates: vec!["long_call".to_string()],
        };
        let report = engine.run_bar(&empty_snapshot(), &views, Some(&choice));
        assert_eq!(report.decision.action, DecisionAction::Long);
        assert_eq!(
            report.decision.selected_strategy_id.as_deref(),
            Some("call_debit_spread")
        );
        assert_eq!(report.strategy.map(|s| s.explored), Some(false));
        assert_eq!(report.entry_snapshot.signal.score(), report.decision.raw_confidence);
    }

    #[test]
    fn test_feature_frame_is_finite_for_fallback_state() {
        let field = PressureField::insufficient(0.0);
        let elasticity = ElasticityCalculator::new(Default::default()).compute(&field);
        let regime = RegimeClassification::insufficient(1.0);
        let frame = feature_frame(500.0, &field, &elasticity.0, &elasticity.1, &regime);
        assert!(frame.features.iter().all(|v| v.is_finite()));
    }
}
