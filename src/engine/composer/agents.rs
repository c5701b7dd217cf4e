//! Directional agents.
//!
//! The agent set is closed: the hedge and lookahead agents are computed here,
//! while liquidity and sentiment relay the views their external collaborators
//! supplied for the bar.

use crate::engine::elasticity::{DirectionalBias, ElasticityState, MovementEnergyState};
use crate::engine::learning::{LookaheadPrediction, ThresholdSnapshot};
use crate::engine::pressure::PressureField;
use crate::engine::regime::RegimeClassification;
use crate::types::{AgentId, AgentView};

/// Everything an agent may look at for one bar.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub field: &'a PressureField,
    pub elasticity: &'a ElasticityState,
    pub energy: &'a MovementEnergyState,
    pub regime: &'a RegimeClassification,
    pub thresholds: &'a ThresholdSnapshot,
    pub lookahead: Option<&'a LookaheadPrediction>,
    /// Views delivered by external collaborators this bar
    pub external: &'a [AgentView],
}

/// Converts the pressure field into a directional view.
#[derive(Debug, Clone, Default)]
pub struct HedgeAgent;

impl HedgeAgent {
    /// Confidence before coverage and stability damping.
    const BASE_STRENGTH: f64 = 0.4;
    /// Added per adaptive threshold the bar clears.
    const TRIGGER_STRENGTH: f64 = 0.2;

    pub fn view(&self, ctx: &BarContext<'_>) -> Option<AgentView> {
        if ctx.regime.insufficient_data || ctx.field.is_insufficient() {
            return None;
        }

        let energy = ctx.energy;
        let thresholds = ctx.thresholds;
        let mut triggers = Vec::new();
        if energy.max_energy() >= thresholds.energy_explosion {
            triggers.push("energy");
        }
        if ctx.elasticity.average() < thresholds.elasticity_low {
            triggers.push("low_elasticity");
        }
        if energy.acceleration_likelihood >= thresholds.acceleration_gate {
            triggers.push("acceleration");
        }

        let strength = Self::BASE_STRENGTH + Self::TRIGGER_STRENGTH * triggers.len() as f64;
        let stability_damp = 0.5 + 0.5 * ctx.regime.regime_stability;
        let confidence = strength * ctx.field.positioning.confidence * stability_damp;
        let direction = f64::from(energy.directional_bias.sign());

        let rationale = match energy.directional_bias {
            DirectionalBias::Neutral => format!(
                "balanced energy (asym {:.2}), regime {}",
                energy.energy_asymmetry,
                ctx.regime.label()
            ),
            bias => format!(
                "{:?} energy asym {:.2}, triggers [{}], regime {} (stability {:.2})",
                bias,
                energy.energy_asymmetry,
                triggers.join(","),
                ctx.regime.label(),
                ctx.regime.regime_stability
            ),
        };
        Some(AgentView::new(AgentId::Hedge, direction, confidence, rationale))
    }
}

/// Offers the sequence model's prediction as a view.
#[derive(Debug, Clone)]
pub struct LookaheadAgent {
    min_confidence: f64,
}

impl LookaheadAgent {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn view(&self, ctx: &BarContext<'_>) -> Option<AgentView> {
        let prediction = ctx.lookahead?;
        if prediction.direction == 0 || prediction.confidence < self.min_confidence {
            return None;
        }
        Some(AgentView::new(
            AgentId::Lookahead,
            f64::from(prediction.direction),
            prediction.confidence,
            format!("predicted {:+.3}% drift", prediction.predicted_change_pct),
        ))
    }
}

/// The closed set of agents the composer polls each bar.
#[derive(Debug, Clone)]
pub enum Agent {
    Hedge(HedgeAgent),
    Liquidity,
    Sentiment,
    Lookahead(LookaheadAgent),
}

impl Agent {
    pub fn id(&self) -> AgentId {
        match self {
            Agent::Hedge(_) => AgentId::Hedge,
            Agent::Liquidity => AgentId::Liquidity,
            Agent::Sentiment => AgentId::Sentiment,
            Agent::Lookahead(_) => AgentId::Lookahead,
        }
    }

    /// The agent's view for this bar, or `None` when it has nothing to say.
    pub fn view(&self, ctx: &BarContext<'_>) -> Option<AgentView> {
        match self {
            Agent::Hedge(agent) => agent.view(ctx),
            Agent::Lookahead(agent) => agent.view(ctx),
            Agent::Liquidity | Agent::Sentiment => {
                let id = self.id();
                ctx.external.iter().find(|v| v.agent_id() == id).cloned()
            }
        }
    }

    /// Default roster: hedge, liquidity, sentiment, lookahead.
    pub fn roster(lookahead_min_confidence: f64) -> Vec<Agent> {
        vec![
            Agent::Hedge(HedgeAgent),
            Agent::Liquidity,
            Agent::Sentiment,
            Agent::Lookahead(LookaheadAgent::new(lookahead_min_confidence)),
        ]
    }
}
