//! Agent opinions and the fused decision handed to the execution collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a directional agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    /// Dealer-hedging pressure agent (built from the pressure field)
    Hedge,
    /// Liquidity agent (external collaborator)
    Liquidity,
    /// Sentiment agent (external collaborator)
    Sentiment,
    /// Sequence-model lookahead agent
    Lookahead,
}

impl AgentId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Hedge => "hedge",
            AgentId::Liquidity => "liquidity",
            AgentId::Sentiment => "sentiment",
            AgentId::Lookahead => "lookahead",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent's opinion for one bar. Immutable after creation.
///
/// Deserialization goes through [`AgentView::new`], so views decoded from
/// collaborators obey the same ranges as views built in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAgentView")]
pub struct AgentView {
    agent_id: AgentId,
    direction: f64,
    confidence: f64,
    rationale: String,
}

/// Wire form of an [`AgentView`] before range clamping.
#[derive(Deserialize)]
struct RawAgentView {
    agent_id: AgentId,
    direction: f64,
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

impl From<RawAgentView> for AgentView {
    fn from(raw: RawAgentView) -> Self {
        AgentView::new(raw.agent_id, raw.direction, raw.confidence, raw.rationale)
    }
}

impl AgentView {
    /// Create a view. Direction is clamped to [-1, 1] and confidence to [0, 1];
    /// non-finite values collapse to 0.
    pub fn new(agent_id: AgentId, direction: f64, confidence: f64, rationale: impl Into<String>) -> Self {
        let direction = if direction.is_finite() {
            direction.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            agent_id,
            direction,
            confidence,
            rationale: rationale.into(),
        }
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    pub fn direction(&self) -> f64 {
        self.direction
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    /// Sign of the direction: -1, 0 or 1.
    pub fn sign(&self) -> i8 {
        direction_sign(self.direction)
    }
}

/// Sign with a small dead band so near-zero directions count as neutral.
pub fn direction_sign(x: f64) -> i8 {
    const DEAD_BAND: f64 = 1e-9;
    if x > DEAD_BAND {
        1
    } else if x < -DEAD_BAND {
        -1
    } else {
        0
    }
}

/// What the caller should do with the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Long,
    Short,
    Hold,
}

/// Fused output of the composer for one bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerDecision {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// -1, 0 or 1
    pub direction: i8,
    pub action: DecisionAction,
    /// |weighted score| in [0, 1]
    pub raw_confidence: f64,
    /// Present only when the calibration model is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibrated_probability: Option<f64>,
    pub contributing_views: Vec<AgentView>,
    /// Opaque strategy identifier owned by the strategy catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_strategy_id: Option<String>,
    pub rationale: String,
}

impl ComposerDecision {
    /// Whether the decision opens a position.
    pub fn is_taken(&self) -> bool {
        self.action != DecisionAction::Hold
    }

    /// Probability to size with: calibrated if available, raw otherwise.
    pub fn effective_confidence(&self) -> f64 {
        self.calibrated_probability.unwrap_or(self.raw_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_clamps_inputs() {
        let view = AgentView::new(AgentId::Sentiment, 3.0, -0.5, "overheated");
        assert_eq!(view.direction(), 1.0);
        assert_eq!(view.confidence(), 0.0);

        let view = AgentView::new(AgentId::Liquidity, f64::NAN, f64::INFINITY, "");
        assert_eq!(view.direction(), 0.0);
        assert_eq!(view.confidence(), 0.0);
        assert_eq!(view.sign(), 0);
    }

    #[test]
    fn test_decoded_view_is_clamped() {
        let view: AgentView =
            serde_json::from_str(r#"{"agent_id":"liquidity","direction":5.0,"confidence":3.0}"#)
                .unwrap();
        assert_eq!(view.agent_id(), AgentId::Liquidity);
        assert_eq!(view.direction(), 1.0);
        assert_eq!(view.confidence(), 1.0);
        assert_eq!(view.rationale(), "");

        let view: AgentView = serde_json::from_str(
            r#"{"agent_id":"sentiment","direction":-0.4,"confidence":-2.0,"rationale":"fear"}"#,
        )
        .unwrap();
        assert_eq!(view.direction(), -0.4);
        assert_eq!(view.confidence(), 0.0);
    }

    #[test]
    fn test_agent_id_serde_name() {
        let json = serde_json::to_string(&AgentId::Lookahead).unwrap();
        assert_eq!(json, "\"lookahead\"");
        assert_eq!(AgentId::Hedge.to_string(), "hedge");
    }
}
