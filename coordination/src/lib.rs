//! Ensemble Coordination Library
//!
//! This library provides:
//! - A domain model for ensembles and agent definitions
//! - A repository that loads definitions from YAML or JSON documents
//! - An execution engine that runs ensembles sequentially, in parallel or
//!   in priority buckets, with retries, cancellation and fallback chains
//! - Result aggregation: first, last, all, merge, consensus, voting,
//!   weighted and threshold consensus
//!
//! # Configuration
//!
//! [`EngineConfig`] carries the backoff unit and the aggregation
//! thresholds. It loads from TOML and honours `ENSEMBLE_*` environment
//! overrides.

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod domain;
pub mod ensemble;
pub mod repository;

// Re-export key config types
pub use config::{ConfigError, ConfigResult, EngineConfig};

// Re-export key domain types
pub use domain::{
    AgentDefinition, Element, ElementKind, EnsembleDefinition, EnsembleMember, ExecutionMode,
};

// Re-export key repository types
pub use repository::{
    ElementRepository, InMemoryRepository, RepositoryError, RepositoryResult, SharedRepository,
};

// Re-export key ensemble types
pub use ensemble::{
    AgentLogic, AgentOutput, AgentResult, ExecutionCoordinator, ExecutionOptions,
    ExecutionRequest, ExecutionResult, ExecutionStatus, ResultAggregator,
    SharedExecutionCoordinator,
};
