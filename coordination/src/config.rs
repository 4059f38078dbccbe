//! Engine configuration
//!
//! Defaults reproduce the fixed parameters the aggregation strategies
//! have always used. A TOML file can override them, and `ENSEMBLE_*`
//! environment variables override both.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ensemble::voting::TieBreaker;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables for the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Linear backoff unit; retry `n` waits `n * backoff_ms`
    pub backoff_ms: u64,

    /// Agreement threshold for the `consensus` strategy
    pub consensus_threshold: f64,

    /// Tie-break rule for the `voting` strategy
    pub voting_tie_breaker: TieBreaker,

    pub voting_weight_by_priority: bool,

    pub voting_weight_by_confidence: bool,

    /// Minimum successful voters for the `voting` strategy
    pub voting_minimum_votes: usize,

    /// Seed mixed into the `random` tie-breaker
    pub voting_random_seed: u64,

    /// Per-agent vote weights for the `voting` strategy, keyed by agent
    /// id; an entry replaces the priority and confidence weight
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub voting_custom_weights: HashMap<String, f64>,

    /// Agreement threshold for `weighted_consensus`
    pub weighted_consensus_threshold: f64,

    /// Agreement threshold for `threshold_consensus`
    pub threshold_consensus_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 1000,
            consensus_threshold: 0.7,
            voting_tie_breaker: TieBreaker::HighestPriority,
            voting_weight_by_priority: true,
            voting_weight_by_confidence: false,
            voting_minimum_votes: 1,
            voting_random_seed: 0,
            voting_custom_weights: HashMap::new(),
            weighted_consensus_threshold: 0.6,
            threshold_consensus_threshold: 0.8,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(raw)?;
        if let Some((agent_id, weight)) = config
            .voting_custom_weights
            .iter()
            .find(|(_, w)| !w.is_finite())
        {
            return Err(ConfigError::InvalidValue {
                key: "voting_custom_weights",
                value: format!("{agent_id} = {weight}"),
            });
        }
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `ENSEMBLE_*` environment variables
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        if let Some(v) = env_parse("ENSEMBLE_BACKOFF_MS")? {
            self.backoff_ms = v;
        }
        if let Some(v) = env_parse("ENSEMBLE_CONSENSUS_THRESHOLD")? {
            self.consensus_threshold = v;
        }
        if let Some(v) = env_parse("ENSEMBLE_VOTING_TIE_BREAKER")? {
            self.voting_tie_breaker = v;
        }
        if let Some(v) = env_flag("ENSEMBLE_VOTING_WEIGHT_BY_PRIORITY") {
            self.voting_weight_by_priority = v;
        }
        if let Some(v) = env_flag("ENSEMBLE_VOTING_WEIGHT_BY_CONFIDENCE") {
            self.voting_weight_by_confidence = v;
        }
        if let Some(v) = env_parse("ENSEMBLE_VOTING_MINIMUM_VOTES")? {
            self.voting_minimum_votes = v;
        }
        if let Some(v) = env_parse("ENSEMBLE_VOTING_RANDOM_SEED")? {
            self.voting_random_seed = v;
        }
        if let Some(v) = env_parse("ENSEMBLE_WEIGHTED_CONSENSUS_THRESHOLD")? {
            self.weighted_consensus_threshold = v;
        }
        if let Some(v) = env_parse("ENSEMBLE_THRESHOLD_CONSENSUS_THRESHOLD")? {
            self.threshold_consensus_threshold = v;
        }
        Ok(())
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &'static str) -> ConfigResult<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(None),
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|val| val.to_lowercase() == "true" || val == "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_parameters() {
        let config = EngineConfig::default();
        assert_eq!(config.backoff_unit(), Duration::from_secs(1));
        assert_eq!(config.consensus_threshold, 0.7);
        assert_eq!(config.weighted_consensus_threshold, 0.6);
        assert_eq!(config.threshold_consensus_threshold, 0.8);
        assert_eq!(config.voting_tie_breaker, TieBreaker::HighestPriority);
        assert!(config.voting_weight_by_priority);
        assert!(config.voting_custom_weights.is_empty());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
backoff_ms = 0
voting_tie_breaker = "first"
"#,
        )
        .unwrap();

        assert_eq!(config.backoff_ms, 0);
        assert_eq!(config.voting_tie_breaker, TieBreaker::First);
        assert_eq!(config.consensus_threshold, 0.7);
    }

    #[test]
    fn test_custom_weights_table() {
        let config = EngineConfig::from_toml_str(
            r#"
voting_random_seed = 7

[voting_custom_weights]
reviewer = 3.5
intern = 0.25
"#,
        )
        .unwrap();

        assert_eq!(config.voting_random_seed, 7);
        assert_eq!(config.voting_custom_weights.len(), 2);
        assert_eq!(config.voting_custom_weights["reviewer"], 3.5);
        assert_eq!(config.voting_custom_weights["intern"], 0.25);
    }

    #[test]
    fn test_non_finite_custom_weight() {
        let err =
            EngineConfig::from_toml_str("[voting_custom_weights]\nloud = inf\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "voting_custom_weights", .. }
        ));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "weighted_consensus_threshold = 0.5\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.weighted_consensus_threshold, 0.5);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("backoff_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
