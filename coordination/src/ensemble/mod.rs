//! Ensemble execution engine
//!
//! Runs a group of agents under one of three topologies and reduces their
//! outputs to a single aggregated value.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  ExecutionCoordinator                      │
//! │  • Loads the ensemble from the repository                  │
//! │  • Applies the timeout, seeds the SharedContext            │
//! │  • Derives success / partial_success / failed              │
//! └─────────────────────────┬─────────────────────────────────┘
//!                           │
//!           ┌───────────────┼───────────────┐
//!           ▼               ▼               ▼
//!     ┌───────────┐   ┌───────────┐   ┌───────────┐
//!     │Sequential │   │ Parallel  │   │  Hybrid   │
//!     │  Runner   │   │  Runner   │   │  Runner   │
//!     └─────┬─────┘   └─────┬─────┘   └─────┬─────┘
//!           └───────────────┼───────────────┘
//!                           ▼
//!                   ┌──────────────┐       ┌──────────────┐
//!                   │ AgentInvoker │──────▶│  AgentLogic  │
//!                   │ retry+backoff│       │  (pluggable) │
//!                   └──────┬───────┘       └──────────────┘
//!                          ▼
//!                 ┌──────────────────┐
//!                 │ ResultAggregator │  first, last, all, merge,
//!                 │                  │  consensus, voting, ...
//!                 └──────────────────┘
//! ```
//!
//! # Components
//!
//! - **Coordinator**: entry point; returns an [`ExecutionResult`] for every
//!   run that could be started
//! - **Strategy runners**: sequential (with fallback chain), parallel and
//!   priority-bucketed hybrid topologies
//! - **AgentInvoker**: loads the agent definition and calls the
//!   [`AgentLogic`] with retries
//! - **SharedContext**: per-run key/value map agents read from and publish
//!   `agent_{id}_result` entries to
//! - **ResultAggregator**: reduction strategies, including consensus and
//!   voting
//! - **ExecutionMonitor**: optional progress tracking
//!
//! # Usage
//!
//! ```ignore
//! use ensemble_coordination::ensemble::{ExecutionCoordinator, ExecutionRequest};
//! use ensemble_coordination::repository::InMemoryRepository;
//!
//! let repo = InMemoryRepository::load_file("definitions.yaml")?.shared();
//! let coordinator = ExecutionCoordinator::new(repo, Arc::new(MyLogic));
//!
//! let result = coordinator
//!     .execute(ExecutionRequest::new("review-team").with_input("diff", json!(diff)))
//!     .await?;
//! println!("{}", result.summary());
//! ```

pub mod aggregation;
pub mod consensus;
pub mod context;
pub mod coordinator;
pub mod invoker;
pub mod monitor;
pub mod strategy;
pub mod types;
pub mod validation;
pub mod voting;

// Re-export core types
pub use aggregation::{AggregationError, AggregationResult, AggregationStrategy, ResultAggregator};
pub use consensus::{
    ConsensusConfig, ConsensusResult, ThresholdConsensusResult, WeightedConsensusResult,
};
pub use context::{result_key, ExecutionContext, SharedContext};
pub use coordinator::{
    CoordinatorError, CoordinatorResult, ExecutionCoordinator, SharedExecutionCoordinator,
};
pub use invoker::{
    AgentError, AgentInvoker, AgentLogic, AgentLogicResult, AgentOutput, Backoff,
    SharedAgentLogic,
};
pub use monitor::{
    AgentProgress, AgentProgressStatus, ExecutionMonitor, MonitorHandle, ProgressUpdate,
    SharedExecutionMonitor,
};
pub use strategy::{
    runner_for, HybridRunner, ParallelRunner, RunError, RunOutcome, SequentialRunner,
    StrategyRunner,
};
pub use types::{
    AgentResult, AgentStatus, ExecutionOptions, ExecutionRequest, ExecutionResult,
    ExecutionStatus, CANCELLED_MESSAGE,
};
pub use validation::{
    EnsembleValidator, Severity, ValidationIssue, ValidationLevel, ValidationReport,
};
pub use voting::{TieBreaker, VotingConfig, VotingResult};
