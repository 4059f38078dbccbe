//! Element repository
//!
//! The engine only ever reads definitions by id. [`InMemoryRepository`]
//! is the bundled implementation; it can be filled programmatically or
//! from a YAML/JSON definitions document:
//!
//! ```yaml
//! ensembles:
//!   - id: review-team
//!     name: Review Team
//!     execution_mode: parallel
//!     aggregation_strategy: voting
//!     members:
//!       - { agent_id: reviewer-a, role: reviewer, priority: 8 }
//! agents:
//!   - id: reviewer-a
//!     name: Reviewer A
//!     goals: [review]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::debug;

use crate::domain::{AgentDefinition, Element, ElementKind, EnsembleDefinition};

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("element {id} is not an {expected} (found {found})")]
    WrongKind {
        id: String,
        expected: ElementKind,
        found: ElementKind,
    },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("failed to read definitions: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse definitions: {0}")]
    Parse(String),
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Shared reference to a repository
pub type SharedRepository = Arc<dyn ElementRepository>;

/// Read access to stored ensemble and agent definitions
pub trait ElementRepository: Send + Sync {
    fn get_by_id(&self, id: &str) -> RepositoryResult<Element>;

    /// Load an element that must be an ensemble
    fn get_ensemble(&self, id: &str) -> RepositoryResult<EnsembleDefinition> {
        self.get_by_id(id)?
            .into_ensemble()
            .map_err(|other| RepositoryError::WrongKind {
                id: id.to_string(),
                expected: ElementKind::Ensemble,
                found: other.kind(),
            })
    }

    /// Load an element that must be an agent
    fn get_agent(&self, id: &str) -> RepositoryResult<AgentDefinition> {
        self.get_by_id(id)?
            .into_agent()
            .map_err(|other| RepositoryError::WrongKind {
                id: id.to_string(),
                expected: ElementKind::Agent,
                found: other.kind(),
            })
    }
}

/// Shape of a definitions document
#[derive(Debug, Default, Deserialize)]
struct DefinitionsDocument {
    #[serde(default)]
    ensembles: Vec<EnsembleDefinition>,
    #[serde(default)]
    agents: Vec<AgentDefinition>,
}

/// Thread-safe in-memory repository
#[derive(Default)]
pub struct InMemoryRepository {
    elements: RwLock<HashMap<String, Element>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this repository
    pub fn shared(self) -> SharedRepository {
        Arc::new(self)
    }

    /// Insert or replace an element, keyed by its id
    pub fn insert(&self, element: impl Into<Element>) -> RepositoryResult<()> {
        let element = element.into();
        let mut elements = self
            .elements
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        debug!(id = element.id(), kind = %element.kind(), "Storing element");
        elements.insert(element.id().to_string(), element);
        Ok(())
    }

    /// Store an element under an explicit id, overriding its own
    pub fn insert_as(&self, id: impl Into<String>, element: impl Into<Element>) -> RepositoryResult<()> {
        let mut elements = self
            .elements
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        elements.insert(id.into(), element.into());
        Ok(())
    }

    pub fn remove(&self, id: &str) -> RepositoryResult<Option<Element>> {
        let mut elements = self
            .elements
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(elements.remove(id))
    }

    pub fn len(&self) -> usize {
        self.elements.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .elements
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Build a repository from a YAML definitions document
    pub fn from_yaml_str(raw: &str) -> RepositoryResult<Self> {
        let doc: DefinitionsDocument =
            serde_yaml::from_str(raw).map_err(|e| RepositoryError::Parse(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Build a repository from a JSON definitions document
    pub fn from_json_str(raw: &str) -> RepositoryResult<Self> {
        let doc: DefinitionsDocument =
            serde_json::from_str(raw).map_err(|e| RepositoryError::Parse(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Load a definitions file; `.json` is parsed as JSON, anything else as YAML
    pub fn load_file(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            _ => Self::from_yaml_str(&raw),
        }
    }

    fn from_document(doc: DefinitionsDocument) -> RepositoryResult<Self> {
        let repo = Self::new();
        for ensemble in doc.ensembles {
            repo.insert(ensemble)?;
        }
        for agent in doc.agents {
            repo.insert(agent)?;
        }
        Ok(repo)
    }
}

impl ElementRepository for InMemoryRepository {
    fn get_by_id(&self, id: &str) -> RepositoryResult<Element> {
        let elements = self
            .elements
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        elements
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}
