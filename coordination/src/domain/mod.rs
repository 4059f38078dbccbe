//! Domain model for ensembles and agents

pub mod agent;
pub mod element;
pub mod ensemble;

pub use agent::{AgentAction, AgentDefinition};
pub use element::{Element, ElementKind, ElementMetadata};
pub use ensemble::{
    EnsembleDefinition, EnsembleMember, EnsembleStatusView, ExecutionMode, MAX_PRIORITY,
    MIN_PRIORITY,
};
