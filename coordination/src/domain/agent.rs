//! Agent definitions

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::element::ElementMetadata;

/// One step an agent knows how to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub name: String,
    /// tool, skill, decision or loop
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
}

/// Stored definition of an agent
///
/// The engine never interprets goals or actions; they are handed to the
/// agent logic collaborator as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    #[serde(flatten)]
    pub metadata: ElementMetadata,

    #[serde(default)]
    pub goals: Vec<String>,

    #[serde(default)]
    pub actions: Vec<AgentAction>,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, Value>,
}

fn default_max_iterations() -> u32 {
    10
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ElementMetadata::new(id, name),
            goals: Vec::new(),
            actions: Vec::new(),
            max_iterations: default_max_iterations(),
            context: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goals.push(goal.into());
        self
    }

    pub fn with_action(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.actions.push(AgentAction {
            name: name.into(),
            kind: kind.into(),
            parameters: HashMap::new(),
        });
        self
    }
}
