//! Consensus over agent results
//!
//! Successful results are grouped by structural equality: two values
//! agree when their canonical serialization (object keys sorted at every
//! level) is identical. The largest group wins; agreement is the share of
//! total weight that group carries.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::aggregation::{AggregationError, AggregationResult};
use super::types::AgentResult;

/// Weight given to agents whose priority normalizes to zero or below
const MIN_WEIGHT: f64 = 0.1;

/// Parameters for a consensus round
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusConfig {
    /// Minimum agreement level, 0.0 to 1.0
    pub threshold: f64,
    pub require_quorum: bool,
    pub quorum_size: usize,
    /// Weight agents by `priority / 10` instead of 1.0
    pub weighted_voting: bool,
}

impl ConsensusConfig {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            require_quorum: false,
            quorum_size: 0,
            weighted_voting: false,
        }
    }

    pub fn weighted(mut self) -> Self {
        self.weighted_voting = true;
        self
    }

    pub fn with_quorum(mut self, size: usize) -> Self {
        self.require_quorum = size > 0;
        self.quorum_size = size;
        self
    }
}

/// Outcome of a consensus round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub value: Value,
    /// 0.0 to 1.0
    pub agreement_level: f64,
    pub participants: usize,
    /// Agent ids in the winning group
    pub supporting: Vec<String>,
    /// Representatives of the losing groups, keyed by canonical form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative: Option<BTreeMap<String, Value>>,
    pub reached_consensus: bool,
}

/// Consensus plus the per-agent confidence scores that went into it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedConsensusResult {
    #[serde(flatten)]
    pub consensus: ConsensusResult,
    pub weighted_agreement: f64,
    pub confidence_scores: BTreeMap<String, f64>,
}

/// Consensus judged against a required threshold and quorum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConsensusResult {
    #[serde(flatten)]
    pub consensus: ConsensusResult,
    pub threshold_met: bool,
    pub required_threshold: f64,

    /// Set when too few agents succeeded to form a quorum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quorum_error: Option<String>,
}

/// Canonical, key-order-stable serialization of a value
pub fn canonical_key(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// `priority / 10`, floored at 0.1; 1.0 when no priority is recorded
pub fn priority_weight(result: &AgentResult) -> f64 {
    match result.priority() {
        Some(priority) => {
            let weight = priority as f64 / 10.0;
            if weight <= 0.0 {
                MIN_WEIGHT
            } else {
                weight
            }
        }
        None => 1.0,
    }
}

/// Results sharing one canonical form
#[derive(Debug)]
pub(crate) struct ResultGroup<'a> {
    pub key: String,
    pub members: Vec<&'a AgentResult>,
}

impl ResultGroup<'_> {
    pub fn value(&self) -> Value {
        self.members
            .first()
            .and_then(|r| r.result.clone())
            .unwrap_or(Value::Null)
    }
}

/// Group results by canonical form, in order of first appearance
pub(crate) fn group_results<'a>(results: &[&'a AgentResult]) -> Vec<ResultGroup<'a>> {
    let mut groups: Vec<ResultGroup<'a>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for &result in results {
        let key = canonical_key(result.result.as_ref().unwrap_or(&Value::Null));
        match index.get(&key) {
            Some(&i) => groups[i].members.push(result),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(ResultGroup {
                    key,
                    members: vec![result],
                });
            }
        }
    }

    groups
}

pub(crate) fn usable(results: &[AgentResult]) -> Vec<&AgentResult> {
    results.iter().filter(|r| r.has_usable_result()).collect()
}

/// Run a consensus round over the usable results
pub fn consensus(
    results: &[AgentResult],
    config: &ConsensusConfig,
) -> AggregationResult<ConsensusResult> {
    let successful = usable(results);
    if successful.is_empty() {
        return Err(AggregationError::NoSuccessfulResults);
    }

    if config.require_quorum && successful.len() < config.quorum_size {
        return Err(AggregationError::QuorumNotMet {
            got: successful.len(),
            required: config.quorum_size,
        });
    }

    let groups = group_results(&successful);

    // First group of maximal size
    let mut largest = 0;
    for (i, group) in groups.iter().enumerate() {
        if group.members.len() > groups[largest].members.len() {
            largest = i;
        }
    }

    let weight = |r: &AgentResult| {
        if config.weighted_voting {
            priority_weight(r)
        } else {
            1.0
        }
    };

    let total_weight: f64 = successful.iter().map(|r| weight(*r)).sum();
    let supporting_weight: f64 = groups[largest].members.iter().map(|r| weight(*r)).sum();

    let agreement_level = if total_weight > 0.0 {
        supporting_weight / total_weight
    } else {
        0.0
    };
    let reached_consensus = agreement_level >= config.threshold;

    let alternative = (!reached_consensus && groups.len() > 1).then(|| {
        groups
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != largest)
            .map(|(_, g)| (g.key.clone(), g.value()))
            .collect()
    });

    Ok(ConsensusResult {
        value: groups[largest].value(),
        agreement_level,
        participants: successful.len(),
        supporting: groups[largest]
            .members
            .iter()
            .map(|r| r.agent_id.clone())
            .collect(),
        alternative,
        reached_consensus,
    })
}

/// Priority-weighted consensus, reporting each agent's confidence
pub fn weighted_consensus(
    results: &[AgentResult],
    threshold: f64,
) -> AggregationResult<WeightedConsensusResult> {
    let base = consensus(results, &ConsensusConfig::new(threshold).weighted())?;

    let confidence_scores = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| (r.agent_id.clone(), r.confidence().unwrap_or(1.0)))
        .collect();

    Ok(WeightedConsensusResult {
        weighted_agreement: base.agreement_level,
        consensus: base,
        confidence_scores,
    })
}

/// Unweighted consensus with a quorum; a missed threshold is not an error
///
/// Only the absence of any usable result fails. A missed quorum yields
/// `threshold_met == false` with the participant count filled in.
pub fn threshold_consensus(
    results: &[AgentResult],
    threshold: f64,
    quorum: usize,
) -> AggregationResult<ThresholdConsensusResult> {
    match consensus(results, &ConsensusConfig::new(threshold).with_quorum(quorum)) {
        Ok(base) => Ok(ThresholdConsensusResult {
            threshold_met: base.reached_consensus,
            consensus: base,
            required_threshold: threshold,
            quorum_error: None,
        }),
        Err(e @ AggregationError::QuorumNotMet { got, .. }) => Ok(ThresholdConsensusResult {
            consensus: ConsensusResult {
                participants: got,
                ..Default::default()
            },
            threshold_met: false,
            required_threshold: threshold,
            quorum_error: Some(e.to_string()),
        }),
        Err(e) => Err(e),
    }
}
