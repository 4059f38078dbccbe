//! Repository elements
//!
//! The repository hands back a single [`Element`] value; callers match on
//! the variant they need instead of downcasting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::AgentDefinition;
use super::ensemble::EnsembleDefinition;

/// Discriminant of an [`Element`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Ensemble,
    Agent,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ensemble => write!(f, "ensemble"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Metadata shared by every stored element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMetadata {
    /// Unique element identifier
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Inactive elements are still loadable; the flag is informational
    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl ElementMetadata {
    /// Create metadata with the given id and name, active, timestamped now
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: String::new(),
            author: String::new(),
            tags: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A stored domain value, tagged by kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element {
    Ensemble(EnsembleDefinition),
    Agent(AgentDefinition),
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Ensemble(_) => ElementKind::Ensemble,
            Self::Agent(_) => ElementKind::Agent,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Ensemble(e) => &e.metadata.id,
            Self::Agent(a) => &a.metadata.id,
        }
    }

    pub fn metadata(&self) -> &ElementMetadata {
        match self {
            Self::Ensemble(e) => &e.metadata,
            Self::Agent(a) => &a.metadata,
        }
    }

    /// Unwrap an ensemble, handing the element back on kind mismatch
    pub fn into_ensemble(self) -> Result<EnsembleDefinition, Element> {
        match self {
            Self::Ensemble(e) => Ok(e),
            other => Err(other),
        }
    }

    /// Unwrap an agent, handing the element back on kind mismatch
    pub fn into_agent(self) -> Result<AgentDefinition, Element> {
        match self {
            Self::Agent(a) => Ok(a),
            other => Err(other),
        }
    }
}

impl From<EnsembleDefinition> for Element {
    fn from(value: EnsembleDefinition) -> Self {
        Self::Ensemble(value)
    }
}

impl From<AgentDefinition> for Element {
    fn from(value: AgentDefinition) -> Self {
        Self::Agent(value)
    }
}
