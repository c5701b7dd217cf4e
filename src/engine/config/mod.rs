//! Configuration types for the decision engine.
//!
//! This module is organized into focused submodules:
//!
//! - `pipeline`: pressure field, elasticity, regime, composer and cycle cadence
//! - `learning`: bandit, adaptive thresholds, calibrator, lookahead, checkpoint
//!
//! Every section is `#[serde(default)]`, so a TOML file only needs the keys it
//! overrides. [`EngineConfig::load`] parses and validates in one step; any failure
//! is fatal and must stop the process before the first bar.

mod learning;
mod pipeline;

pub use learning::*;
pub use pipeline::*;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::infra::LogConfig;
use crate::errors::{ConfigError, Error};
use crate::prelude::Result;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pressure: PressureConfig,
    pub elasticity: ElasticityConfig,
    pub regime: RegimeConfig,
    pub composer: ComposerConfig,
    pub cycle: CycleConfig,
    pub learning: LearningConfig,
    pub logging: LogConfig,
}

impl EngineConfig {
    /// Load from a TOML file and validate.
    ///
    /// A missing file yields the defaults; a present but unparseable or
    /// out-of-range file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(ConfigError::Parse { message, .. }) => Error::Config(ConfigError::Parse {
                path: path.display().to_string(),
                message,
            }),
            other => other,
        })?;
        info!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every numeric constant is finite and in range.
    pub fn validate(&self) -> Result<()> {
        self.pressure.validate()?;
        self.elasticity.validate()?;
        self.regime.validate()?;
        self.composer.validate()?;
        self.cycle.validate()?;
        self.learning.validate()?;
        Ok(())
    }

    /// Render the defaults as a commented TOML document.
    pub fn sample_toml() -> Result<String> {
        let body = toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Parse {
            path: "<sample>".to_string(),
            message: e.to_string(),
        })?;
        Ok(format!(
            "# Pressure engine configuration\n\
             # Every key is optional; omitted keys take the values shown here.\n\n{body}"
        ))
    }
}

pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_config(field, value, "must be finite and > 0"))
    }
}

pub(crate) fn check_non_negative(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_config(field, value, "must be finite and >= 0"))
    }
}

pub(crate) fn check_range(field: &'static str, value: f64, lo: f64, hi: f64) -> Result<()> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(Error::invalid_config(field, value, "out of allowed range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        EngineConfig::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            [learning.bandit]
            exploration_rate = 0.05
            random_seed = 7

            [pressure]
            distance_decay = 12.5
            "#,
        )
        .expect("parse");
        assert_eq!(config.learning.bandit.exploration_rate, 0.05);
        assert_eq!(config.learning.bandit.random_seed, Some(7));
        assert_eq!(config.pressure.distance_decay, 12.5);
        assert_eq!(config.composer.direction_threshold, 0.15);
    }

    #[test]
    fn test_unparseable_number_is_fatal() {
        let err = EngineConfig::from_toml_str(
            r#"
            [learning.thresholds]
            process_noise = "fast"
            "#,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_out_of_range_is_fatal() {
        let err = EngineConfig::from_toml_str(
            r#"
            [learning.bandit]
            exploration_rate = 1.5
            "#,
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("exploration_rate"));

        let err = EngineConfig::from_toml_str(
            r#"
            [elasticity]
            base = nan
            "#,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_inverted_jump_thresholds_are_fatal() {
        let err = EngineConfig::from_toml_str(
            r#"
            [regime]
            jump_elevated_threshold = 0.8
            jump_high_threshold = 0.6
            "#,
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("jump_elevated_threshold"));
    }

    #[test]
    fn test_sample_toml_roundtrips() {
        let sample = EngineConfig::sample_toml().unwrap();
        let parsed = EngineConfig::from_toml_str(&sample).unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }
}
