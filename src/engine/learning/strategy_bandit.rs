//! ε-Thompson strategy bandit.
//!
//! One Beta(α, β) posterior per `(symbol, strategy_id)`. Most bars keep the
//! catalog's deterministic pick; with probability ε every known arm for the
//! symbol (plus the offered candidates) is Thompson-sampled and the largest
//! draw wins.
//!
//! ```text
//! reward = clip(pnl / capital_risked, 0, 1)
//! α += reward
//! β += 1 − reward
//! ```

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

use crate::engine::checkpoint::{BanditArmCheckpoint, BanditCheckpoint};
use crate::engine::config::BanditConfig;

use super::outcome::bandit_reward;

/// Beta posterior for one strategy on one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaArm {
    pub alpha: f64,
    pub beta: f64,
    pub trials: u64,
}

impl BetaArm {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            alpha,
            beta,
            trials: 0,
        }
    }

    /// Posterior mean α / (α + β).
    pub fn expected_reward(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    fn update(&mut self, reward: f64) {
        self.alpha += reward;
        self.beta += 1.0 - reward;
        self.trials += 1;
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match Beta::new(self.alpha, self.beta) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.expected_reward(),
        }
    }
}

/// Outcome of a selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySelection {
    pub strategy_id: String,
    /// True when the Thompson draw replaced the deterministic choice
    pub explored: bool,
}

/// Aggregate view for logging.
#[derive(Debug, Clone, Serialize)]
pub struct BanditSummary {
    pub symbols: usize,
    pub arms: usize,
    pub total_updates: u64,
    /// Highest posterior mean among arms with at least one trial
    pub best_arm: Option<(String, String, f64)>,
}

pub struct StrategyBandit {
    config: BanditConfig,
    /// symbol → strategy_id → posterior
    arms: BTreeMap<String, BTreeMap<String, BetaArm>>,
    rng: StdRng,
    total_updates: u64,
}

impl StrategyBandit {
    pub fn new(config: BanditConfig) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            arms: BTreeMap::new(),
            rng,
            total_updates: 0,
        }
    }

    fn prior(&self) -> BetaArm {
        BetaArm::new(self.config.prior_alpha, self.config.prior_beta)
    }

    /// Posterior for an arm; unknown arms report the prior.
    pub fn arm(&self, symbol: &str, strategy_id: &str) -> BetaArm {
        self.arms
            .get(symbol)
            .and_then(|m| m.get(strategy_id))
            .copied()
            .unwrap_or_else(|| self.prior())
    }

    /// Pick a strategy for this bar.
    pub fn select(
        &mut self,
        symbol: &str,
        deterministic: &str,
        candidates: &[String],
    ) -> StrategySelection {
        let explore = self.config.exploration_rate > 0.0
            && self.rng.gen::<f64>() < self.config.exploration_rate;
        if !explore {
            return StrategySelection {
                strategy_id: deterministic.to_string(),
                explored: false,
            };
        }

        let mut pool: Vec<&str> = Vec::new();
        if let Some(known) = self.arms.get(symbol) {
            pool.extend(known.keys().map(String::as_str));
        }
        pool.push(deterministic);
        pool.extend(candidates.iter().map(String::as_str));
        pool.sort_unstable();
        pool.dedup();

        let mut best = deterministic;
        let mut best_sample = f64::NEG_INFINITY;
        for id in pool {
            let arm = self.arm(symbol, id);
            let draw = arm.sample(&mut self.rng);
            if draw > best_sample {
                best_sample = draw;
                best = id;
            }
        }

        StrategySelection {
            strategy_id: best.to_string(),
            explored: best != deterministic,
        }
    }

    /// Apply a closed trade. Returns the reward used.
    pub fn update(&mut self, symbol: &str, strategy_id: &str, pnl: f64, capital_risked: f64) -> f64 {
        let reward = bandit_reward(pnl, capital_risked);
        let prior = self.prior();
        self.arms
            .entry(symbol.to_string())
            .or_default()
            .entry(strategy_id.to_string())
            .or_insert(prior)
            .update(reward);
        self.total_updates += 1;
        reward
    }

    pub fn total_updates(&self) -> u64 {
        self.total_updates
    }

    pub fn summary(&self) -> BanditSummary {
        let mut best: Option<(String, String, f64)> = None;
        for (symbol, arms) in &self.arms {
            for (id, arm) in arms {
                let mean = arm.expected_reward();
                if arm.trials > 0 && best.as_ref().map_or(true, |b| mean > b.2) {
                    best = Some((symbol.clone(), id.clone(), mean));
                }
            }
        }
        BanditSummary {
            symbols: self.arms.len(),
            arms: self.arms.values().map(BTreeMap::len).sum(),
            total_updates: self.total_updates,
            best_arm: best,
        }
    }

    pub fn to_checkpoint(&self, saved_at_ms: u64) -> BanditCheckpoint {
        let arms = self
            .arms
            .iter()
            .flat_map(|(symbol, arms)| {
                arms.iter().map(move |(id, arm)| BanditArmCheckpoint {
                    symbol: symbol.clone(),
                    strategy_id: id.clone(),
                    alpha: arm.alpha,
                    beta: arm.beta,
                    trials: arm.trials,
                })
            })
            .collect();
        BanditCheckpoint {
            saved_at_ms,
            arms,
            total_updates: self.total_updates,
        }
    }

    /// Replace all arms with the checkpointed ones. Arms with invalid
    /// parameters are skipped.
    pub fn restore_from_checkpoint(&mut self, checkpoint: &BanditCheckpoint) {
        self.arms.clear();
        for a in &checkpoint.arms {
            let valid = a.alpha.is_finite() && a.beta.is_finite() && a.alpha > 0.0 && a.beta > 0.0;
            if !valid {
                continue;
            }
            self.arms.entry(a.symbol.clone()).or_default().insert(
                a.strategy_id.clone(),
                BetaArm {
                    alpha: a.alpha,
                    beta: a.beta,
                    trials: a.trials,
                },
            );
        }
        self.total_updates = checkpoint.total_updates;
    }
}

impl std::fmt::Debug for StrategyBandit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyBandit")
            .field("symbols", &self.arms.len())
            .field("total_updates", &self.total_updates)
            .field("exploration_rate", &self.config.exploration_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(exploration_rate: f64, seed: u64) -> StrategyBandit {
        StrategyBandit::new(BanditConfig {
            exploration_rate,
            random_seed: Some(seed),
            ..Default::default()
        })
    }

    #[test]
    fn test_closed_form_update() {
        let mut b = seeded(0.0, 1);
        assert_eq!(b.update("SPY", "iron_condor", 50.0, 100.0), 0.5);
        let arm = b.arm("SPY", "iron_condor");
        assert_eq!((arm.alpha, arm.beta, arm.trials), (1.5, 1.5, 1));

        b.update("SPY", "iron_condor", 400.0, 100.0);
        b.update("SPY", "iron_condor", -30.0, 100.0);
        let arm = b.arm("SPY", "iron_condor");
        assert_eq!((arm.alpha, arm.beta, arm.trials), (2.5, 2.5, 3));
        assert!((arm.expected_reward() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_arm_reports_prior() {
        let b = seeded(0.0, 1);
        let arm = b.arm("QQQ", "never_seen");
        assert_eq!((arm.alpha, arm.beta, arm.trials), (1.0, 1.0, 0));
    }

    #[test]
    fn test_zero_capital_counts_as_loss() {
        let mut b = seeded(0.0, 1);
        assert_eq!(b.update("SPY", "s", 100.0, 0.0), 0.0);
        let arm = b.arm("SPY", "s");
        assert_eq!((arm.alpha, arm.beta), (1.0, 2.0));
    }

    #[test]
    fn test_no_exploration_keeps_deterministic_choice() {
        let mut b = seeded(0.0, 3);
        for _ in 0..20 {
            b.update("SPY", "better", 100.0, 100.0);
        }
        for _ in 0..100 {
            let s = b.select("SPY", "default", &["better".to_string()]);
            assert_eq!(s.strategy_id, "default");
            assert!(!s.explored);
        }
    }

    #[test]
    fn test_thompson_converges_to_better_arm() {
        let mut b = seeded(1.0, 42);
        let mut env = StdRng::seed_from_u64(7);
        let candidates = vec!["good".to_string(), "bad".to_string()];
        let mut good_late = 0;

        for round in 0..600 {
            let s = b.select("SPY", "bad", &candidates);
            let p_win = if s.strategy_id == "good" { 0.75 } else { 0.25 };
            let pnl = if env.gen::<f64>() < p_win { 100.0 } else { -100.0 };
            b.update("SPY", &s.strategy_id, pnl, 100.0);
            if round >= 500 && s.strategy_id == "good" {
                good_late += 1;
            }
        }

        assert!(good_late >= 85, "good arm picked {good_late}/100 late rounds");
        assert!(b.arm("SPY", "good").expected_reward() > b.arm("SPY", "bad").expected_reward());
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let mut b = seeded(0.2, 5);
        b.update("SPY", "a", 20.0, 100.0);
        b.update("QQQ", "b", 80.0, 100.0);
        let cp = b.to_checkpoint(123);

        let mut restored = seeded(0.2, 6);
        restored.restore_from_checkpoint(&cp);
        assert_eq!(restored.arm("SPY", "a"), b.arm("SPY", "a"));
        assert_eq!(restored.arm("QQQ", "b"), b.arm("QQQ", "b"));
        assert_eq!(restored.total_updates(), 2);
        assert_eq!(restored.summary().arms, 2);
    }
}
