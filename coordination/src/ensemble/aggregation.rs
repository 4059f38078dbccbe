//! Reduction of agent results into one aggregated value
//!
//! Only successful results with a non-null payload take part. The
//! strategy is named by the ensemble definition:
//!
//! | strategy              | output                                         |
//! |-----------------------|------------------------------------------------|
//! | `first` / `last`      | first / last usable result                     |
//! | `all`                 | array of every usable result                   |
//! | `merge`               | object results merged under `agent_<i>_<key>`  |
//! | `consensus`           | [`ConsensusResult`], priority weighted         |
//! | `voting`              | [`VotingResult`]                               |
//! | `weighted_consensus`  | [`WeightedConsensusResult`]                    |
//! | `threshold_consensus` | [`ThresholdConsensusResult`]                   |
//!
//! [`ConsensusResult`]: super::consensus::ConsensusResult
//! [`VotingResult`]: super::voting::VotingResult
//! [`WeightedConsensusResult`]: super::consensus::WeightedConsensusResult
//! [`ThresholdConsensusResult`]: super::consensus::ThresholdConsensusResult

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::EngineConfig;

use super::consensus::{self, usable, ConsensusConfig};
use super::types::AgentResult;
use super::voting::{self, VotingConfig};

/// Error type for aggregation
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("no successful results to aggregate")]
    NoSuccessfulResults,

    #[error("unsupported aggregation strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("quorum not met: got {got}, required {required}")]
    QuorumNotMet { got: usize, required: usize },

    #[error("insufficient votes: got {got}, required {required}")]
    InsufficientVotes { got: usize, required: usize },

    #[error("invalid vote weight for agent {agent_id}: {weight}")]
    InvalidWeight { agent_id: String, weight: f64 },

    #[error("failed to encode aggregated result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for aggregation
pub type AggregationResult<T> = Result<T, AggregationError>;

/// Named reduction strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationStrategy {
    First,
    Last,
    All,
    Merge,
    Consensus,
    Voting,
    WeightedConsensus,
    ThresholdConsensus,
}

impl AggregationStrategy {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "first" => Some(Self::First),
            "last" => Some(Self::Last),
            "all" => Some(Self::All),
            "merge" => Some(Self::Merge),
            "consensus" => Some(Self::Consensus),
            "voting" => Some(Self::Voting),
            "weighted_consensus" => Some(Self::WeightedConsensus),
            "threshold_consensus" => Some(Self::ThresholdConsensus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Last => "last",
            Self::All => "all",
            Self::Merge => "merge",
            Self::Consensus => "consensus",
            Self::Voting => "voting",
            Self::WeightedConsensus => "weighted_consensus",
            Self::ThresholdConsensus => "threshold_consensus",
        }
    }

    pub fn all() -> [Self; 8] {
        [
            Self::First,
            Self::Last,
            Self::All,
            Self::Merge,
            Self::Consensus,
            Self::Voting,
            Self::WeightedConsensus,
            Self::ThresholdConsensus,
        ]
    }
}

impl std::fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dispatches a strategy name to its reduction
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    config: EngineConfig,
}

impl ResultAggregator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn voting_config(&self) -> VotingConfig {
        VotingConfig {
            weight_by_priority: self.config.voting_weight_by_priority,
            weight_by_confidence: self.config.voting_weight_by_confidence,
            minimum_votes: self.config.voting_minimum_votes,
            tie_breaker: self.config.voting_tie_breaker,
            random_seed: self.config.voting_random_seed,
            custom_weights: self.config.voting_custom_weights.clone(),
        }
    }

    /// Aggregate `results` with the strategy called `strategy`
    ///
    /// `results` is the full result list of an execution; failed and
    /// empty results are filtered out here.
    pub fn aggregate(&self, strategy: &str, results: &[AgentResult]) -> AggregationResult<Value> {
        let successful = usable(results);
        if successful.is_empty() {
            return Err(AggregationError::NoSuccessfulResults);
        }

        let strategy = AggregationStrategy::parse(strategy)
            .ok_or_else(|| AggregationError::UnsupportedStrategy(strategy.to_string()))?;

        debug!(
            strategy = %strategy,
            results = successful.len(),
            "Aggregating results"
        );

        let payload = |r: &AgentResult| r.result.clone().unwrap_or(Value::Null);

        let value = match strategy {
            AggregationStrategy::First => payload(successful[0]),
            AggregationStrategy::Last => payload(successful[successful.len() - 1]),
            AggregationStrategy::All => {
                Value::Array(successful.iter().map(|r| payload(*r)).collect())
            }
            AggregationStrategy::Merge => {
                let mut merged = Map::new();
                for (i, result) in successful.iter().enumerate() {
                    if let Some(Value::Object(fields)) = &result.result {
                        for (key, value) in fields {
                            merged.insert(format!("agent_{i}_{key}"), value.clone());
                        }
                    }
                }
                Value::Object(merged)
            }
            AggregationStrategy::Consensus => {
                let config = ConsensusConfig::new(self.config.consensus_threshold).weighted();
                serde_json::to_value(consensus::consensus(results, &config)?)?
            }
            AggregationStrategy::Voting => {
                serde_json::to_value(voting::vote(results, &self.voting_config())?)?
            }
            AggregationStrategy::WeightedConsensus => serde_json::to_value(
                consensus::weighted_consensus(results, self.config.weighted_consensus_threshold)?,
            )?,
            AggregationStrategy::ThresholdConsensus => {
                // Quorum is half of every invoked agent, successful or not
                let quorum = results.len() / 2;
                serde_json::to_value(consensus::threshold_consensus(
                    results,
                    self.config.threshold_consensus_threshold,
                    quorum,
                )?)?
            }
        };

        Ok(value)
    }
}
