//! Weighted voting over agent results
//!
//! Every successful agent casts one vote for its own result. Votes are
//! weighted by an explicit per-agent override, or by priority and
//! optionally confidence. Ties between equally weighted options are
//! resolved by a configurable [`TieBreaker`], always choosing among the
//! tied options only and in a reproducible order.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::aggregation::{AggregationError, AggregationResult};
use super::consensus::{canonical_key, group_results, priority_weight, usable};
use super::types::AgentResult;

/// Priority assumed for agents that recorded none
const DEFAULT_PRIORITY: i64 = 5;

/// Weights closer than this are considered tied
const TIE_EPSILON: f64 = 1e-9;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Rule for picking a winner among equally weighted options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaker {
    /// Option of the earliest tied voter in invocation order
    First,
    /// Option of the highest-priority tied voter
    #[default]
    HighestPriority,
    /// Seeded, reproducible pick among the tied options
    Random,
}

impl std::fmt::Display for TieBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::HighestPriority => write!(f, "highest_priority"),
            Self::Random => write!(f, "random"),
        }
    }
}

impl FromStr for TieBreaker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "highest_priority" => Ok(Self::HighestPriority),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown tie breaker: {other}")),
        }
    }
}

/// Parameters for a voting round
#[derive(Debug, Clone, PartialEq)]
pub struct VotingConfig {
    pub weight_by_priority: bool,
    pub weight_by_confidence: bool,
    pub minimum_votes: usize,
    pub tie_breaker: TieBreaker,
    /// Per-agent weights that replace priority and confidence weighting
    pub custom_weights: HashMap<String, f64>,
    pub random_seed: u64,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            weight_by_priority: false,
            weight_by_confidence: false,
            minimum_votes: 1,
            tie_breaker: TieBreaker::default(),
            custom_weights: HashMap::new(),
            random_seed: 0,
        }
    }
}

impl VotingConfig {
    fn weight_of(&self, result: &AgentResult) -> f64 {
        if let Some(weight) = self.custom_weights.get(&result.agent_id) {
            return *weight;
        }

        let mut weight = if self.weight_by_priority {
            priority_weight(result)
        } else {
            1.0
        };
        if self.weight_by_confidence {
            if let Some(confidence) = result.confidence() {
                weight *= confidence;
            }
        }
        weight
    }
}

/// Outcome of a voting round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingResult {
    pub winner: Value,
    pub total_votes: f64,
    pub winner_votes: f64,
    /// Winner's share of the total, 0 to 100
    pub percentage: f64,
    pub voters: Vec<String>,
    /// Total weight per option, keyed by canonical form
    pub breakdown: BTreeMap<String, f64>,
    /// True when the tie-breaker decided the winner
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tie_breaker: bool,
}

/// Run a voting round over the usable results
pub fn vote(results: &[AgentResult], config: &VotingConfig) -> AggregationResult<VotingResult> {
    let successful = usable(results);
    if successful.is_empty() {
        return Err(AggregationError::NoSuccessfulResults);
    }

    if successful.len() < config.minimum_votes {
        return Err(AggregationError::InsufficientVotes {
            got: successful.len(),
            required: config.minimum_votes,
        });
    }

    for &voter in &successful {
        let weight = config.weight_of(voter);
        if !weight.is_finite() {
            return Err(AggregationError::InvalidWeight {
                agent_id: voter.agent_id.clone(),
                weight,
            });
        }
    }

    let options = group_results(&successful);
    let weights: Vec<f64> = options
        .iter()
        .map(|o| o.members.iter().map(|r| config.weight_of(r)).sum())
        .collect();
    let total_votes: f64 = weights.iter().sum();

    // Finite weights can still sum past f64::MAX; total_cmp keeps the
    // leader well defined and the leader is always part of the tie set
    let leader = weights
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map_or(0, |(i, _)| i);
    let winner_votes = weights[leader];
    let tied: Vec<usize> = weights
        .iter()
        .enumerate()
        .filter(|&(i, w)| {
            i == leader || *w == winner_votes || (winner_votes - *w).abs() < TIE_EPSILON
        })
        .map(|(i, _)| i)
        .collect();

    let option_keys: Vec<&str> = options.iter().map(|o| o.key.as_str()).collect();
    let is_tie = tied.len() > 1;
    let winner = if is_tie {
        info!(
            tied = tied.len(),
            strategy = %config.tie_breaker,
            "Breaking tie"
        );
        break_tie(&option_keys, &tied, &successful, config)
    } else {
        tied[0]
    };

    debug!(
        options = options.len(),
        voters = successful.len(),
        winner_votes,
        "Vote complete"
    );

    let percentage = if total_votes > 0.0 {
        winner_votes / total_votes * 100.0
    } else {
        0.0
    };

    Ok(VotingResult {
        winner: options[winner].value(),
        total_votes,
        winner_votes,
        percentage,
        voters: successful.iter().map(|r| r.agent_id.clone()).collect(),
        breakdown: option_keys
            .iter()
            .zip(&weights)
            .map(|(k, w)| (k.to_string(), *w))
            .collect(),
        tie_breaker: is_tie,
    })
}

/// Pick one of `tied` (indices into `keys`)
fn break_tie(
    keys: &[&str],
    tied: &[usize],
    voters: &[&AgentResult],
    config: &VotingConfig,
) -> usize {
    let option_of = |voter: &AgentResult| {
        let key = canonical_key(voter.result.as_ref().unwrap_or(&Value::Null));
        tied.iter().copied().find(|&i| keys[i] == key)
    };

    match config.tie_breaker {
        TieBreaker::First => voters
            .iter()
            .find_map(|v| option_of(*v))
            .unwrap_or(tied[0]),

        TieBreaker::HighestPriority => {
            let mut best: Option<(i64, usize)> = None;
            for &voter in voters {
                let Some(option) = option_of(voter) else {
                    continue;
                };
                let priority = voter.priority().unwrap_or(DEFAULT_PRIORITY);
                if best.map_or(true, |(p, _)| priority > p) {
                    best = Some((priority, option));
                }
            }
            best.map(|(_, option)| option).unwrap_or(tied[0])
        }

        TieBreaker::Random => {
            let mut candidates: Vec<usize> = tied.to_vec();
            candidates.sort_by(|a, b| keys[*a].cmp(keys[*b]));

            let mut hash = fnv1a(FNV_OFFSET_BASIS, &config.random_seed.to_le_bytes());
            for &i in &candidates {
                hash = fnv1a(hash, keys[i].as_bytes());
                hash = fnv1a(hash, &[0]);
            }
            candidates[(hash % candidates.len() as u64) as usize]
        }
    }
}

/// 64-bit FNV-1a, continued from `state`
///
/// Stable across platforms and toolchains, unlike the std hashers.
fn fnv1a(state: u64, bytes: &[u8]) -> u64 {
    bytes.iter().fold(state, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
