//! Discrete market-state labels.

use serde::{Deserialize, Serialize};

/// Dealer gamma state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GammaRegime {
    /// Dealers long gamma: hedging sells rallies and buys dips
    Compression,
    /// Dealers short gamma: hedging chases price
    Expansion,
    #[default]
    Neutral,
    InsufficientData,
}

/// Sensitivity of hedging flows to implied-vol changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VannaRegime {
    VolDriven,
    #[default]
    Stable,
}

/// Whether time decay dominates hedging flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CharmRegime {
    DecayDominant,
    #[default]
    Neutral,
}

/// Bucketed jump-risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JumpRisk {
    #[default]
    Low,
    Elevated,
    High,
}

/// Shape of the effective price potential implied by the Greeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PotentialShape {
    /// Single stable well; small gamma and vanna
    #[default]
    Quadratic,
    /// Vanna-dominated skewed potential
    Cubic,
    /// Two competing attractors
    DoubleWell,
    /// Extreme gamma; flat bottom with steep walls
    Quartic,
}

impl PotentialShape {
    /// Shapes where price can snap between attractors.
    pub fn favors_defined_risk(&self) -> bool {
        matches!(self, PotentialShape::DoubleWell | PotentialShape::Quartic)
    }
}

macro_rules! label_display {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

label_display!(GammaRegime {
    Compression => "compression",
    Expansion => "expansion",
    Neutral => "neutral",
    InsufficientData => "insufficient_data",
});
label_display!(VannaRegime {
    VolDriven => "vol_driven",
    Stable => "stable",
});
label_display!(CharmRegime {
    DecayDominant => "decay_dominant",
    Neutral => "neutral",
});
label_display!(JumpRisk {
    Low => "low",
    Elevated => "elevated",
    High => "high",
});
label_display!(PotentialShape {
    Quadratic => "quadratic",
    Cubic => "cubic",
    DoubleWell => "double_well",
    Quartic => "quartic",
});

/// Full multi-dimensional regime label for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub gamma: GammaRegime,
    pub vanna: VannaRegime,
    pub charm: CharmRegime,
    pub jump_risk: JumpRisk,
    /// Raw jump score in [0, 1]
    pub jump_score: f64,
    pub potential_shape: PotentialShape,
    /// In [0, 1]
    pub regime_confidence: f64,
    /// EMA of label persistence in [0, 1]
    pub regime_stability: f64,
    pub insufficient_data: bool,
}

impl RegimeClassification {
    /// Neutral labels with zero confidence.
    pub fn insufficient(regime_stability: f64) -> Self {
        Self {
            gamma: GammaRegime::InsufficientData,
            vanna: VannaRegime::Stable,
            charm: CharmRegime::Neutral,
            jump_risk: JumpRisk::Low,
            jump_score: 0.0,
            potential_shape: PotentialShape::Quadratic,
            regime_confidence: 0.0,
            regime_stability,
            insufficient_data: true,
        }
    }

    /// Compact label used for logging and stability tracking.
    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.gamma, self.vanna, self.charm, self.jump_risk, self.potential_shape
        )
    }
}
