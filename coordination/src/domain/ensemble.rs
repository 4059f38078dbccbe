//! Ensemble definitions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::element::ElementMetadata;

/// Lowest priority the hybrid topology schedules
pub const MIN_PRIORITY: i32 = 1;

/// Highest priority the hybrid topology schedules
pub const MAX_PRIORITY: i32 = 10;

/// Execution topology for an ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Members run one after another in definition order
    Sequential,
    /// Every member runs concurrently
    Parallel,
    /// Priority buckets run high to low, members within a bucket concurrently
    Hybrid,
}

impl ExecutionMode {
    /// Recognize a mode key, returning `None` for anything unknown
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sequential" => Some(Self::Sequential),
            "parallel" => Some(Self::Parallel),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn all() -> &'static [ExecutionMode] {
        &[Self::Sequential, Self::Parallel, Self::Hybrid]
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent's participation in an ensemble
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsembleMember {
    pub agent_id: String,
    pub role: String,
    pub priority: i32,
}

impl EnsembleMember {
    pub fn new(agent_id: impl Into<String>, role: impl Into<String>, priority: i32) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: role.into(),
            priority,
        }
    }

    /// Whether the hybrid topology will ever schedule this member
    pub fn in_schedulable_range(&self) -> bool {
        (MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority)
    }
}

/// A named group of agents plus its execution and aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleDefinition {
    #[serde(flatten)]
    pub metadata: ElementMetadata,

    /// Ordered member list
    #[serde(default)]
    pub members: Vec<EnsembleMember>,

    /// Raw mode key; unknown values are kept so execution can report them
    #[serde(default = "default_mode")]
    pub execution_mode: String,

    /// Aggregation strategy key (first, last, all, merge, consensus, ...)
    #[serde(default)]
    pub aggregation_strategy: String,

    /// Backup agents tried in order when a sequential member fails
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_chain: Vec<String>,

    /// Seed values copied into every run's shared context
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub shared_context: HashMap<String, Value>,
}

fn default_mode() -> String {
    ExecutionMode::Sequential.as_str().to_string()
}

impl EnsembleDefinition {
    /// Create an empty sequential ensemble
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ElementMetadata::new(id, name),
            members: Vec::new(),
            execution_mode: default_mode(),
            aggregation_strategy: String::new(),
            fallback_chain: Vec::new(),
            shared_context: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn with_member(mut self, member: EnsembleMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.execution_mode = mode.into();
        self
    }

    pub fn with_aggregation(mut self, strategy: impl Into<String>) -> Self {
        self.aggregation_strategy = strategy.into();
        self
    }

    pub fn with_fallback(mut self, agent_id: impl Into<String>) -> Self {
        self.fallback_chain.push(agent_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.shared_context.insert(key.into(), value);
        self
    }

    /// Parsed execution mode, `None` when the key is unrecognized
    pub fn mode(&self) -> Option<ExecutionMode> {
        ExecutionMode::parse(&self.execution_mode)
    }
}

/// Read-only summary of an ensemble definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleStatusView {
    pub ensemble_id: String,
    pub name: String,
    pub execution_mode: String,
    pub member_count: usize,
    pub members: Vec<String>,
    pub aggregation_strategy: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_chain: Vec<String>,
    pub is_active: bool,
}

impl From<&EnsembleDefinition> for EnsembleStatusView {
    fn from(def: &EnsembleDefinition) -> Self {
        Self {
            ensemble_id: def.metadata.id.clone(),
            name: def.metadata.name.clone(),
            execution_mode: def.execution_mode.clone(),
            member_count: def.members.len(),
            members: def.members.iter().map(|m| m.agent_id.clone()).collect(),
            aggregation_strategy: def.aggregation_strategy.clone(),
            fallback_chain: def.fallback_chain.clone(),
            is_active: def.metadata.is_active,
        }
    }
}
