//! Execution coordinator - entry point for running an ensemble
//!
//! Loads the ensemble, builds the per-run state, drives the runner for
//! the ensemble's execution mode, aggregates the successful results and
//! derives the overall status.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Map;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::domain::EnsembleStatusView;
use crate::repository::{RepositoryError, SharedRepository};

use super::aggregation::ResultAggregator;
use super::context::{ExecutionContext, SharedContext};
use super::invoker::{AgentInvoker, Backoff, SharedAgentLogic};
use super::monitor::{ExecutionMonitor, MonitorHandle};
use super::strategy::{runner_for, RunError, RunOutcome, RunScope};
use super::types::{ExecutionRequest, ExecutionResult, ExecutionStatus};
use super::validation::{EnsembleValidator, ValidationLevel, ValidationReport};

/// Error type for coordinator operations
///
/// These are the only failures that prevent an [`ExecutionResult`]; every
/// other problem is reported inside the result.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("failed to load ensemble: {0}")]
    LoadEnsemble(#[source] RepositoryError),

    #[error("ensemble has no members")]
    NoMembers,
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Shared reference to ExecutionCoordinator
pub type SharedExecutionCoordinator = Arc<ExecutionCoordinator>;

/// Top-level orchestrator for ensemble execution
pub struct ExecutionCoordinator {
    repository: SharedRepository,
    logic: SharedAgentLogic,
    config: EngineConfig,
    backoff: Option<Backoff>,
    aggregator: ResultAggregator,
}

impl ExecutionCoordinator {
    /// Create a coordinator with default configuration
    pub fn new(repository: SharedRepository, logic: SharedAgentLogic) -> Self {
        let config = EngineConfig::default();
        Self {
            repository,
            logic,
            aggregator: ResultAggregator::new(config.clone()),
            config,
            backoff: None,
        }
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> SharedExecutionCoordinator {
        Arc::new(self)
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.aggregator = ResultAggregator::new(config.clone());
        self.config = config;
        self
    }

    /// Replace the linear retry backoff derived from the config
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn invoker(&self) -> AgentInvoker {
        let backoff = self
            .backoff
            .clone()
            .unwrap_or_else(|| Backoff::linear(self.config.backoff_unit()));
        AgentInvoker::new(self.repository.clone(), self.logic.clone(), backoff)
    }

    /// Run an ensemble with a fresh, unbounded parent context
    pub async fn execute(&self, request: ExecutionRequest) -> CoordinatorResult<ExecutionResult> {
        self.execute_with_context(&ExecutionContext::new(), request)
            .await
    }

    /// Run an ensemble under `parent`; cancelling it stops the run
    ///
    /// Returns an error only when the ensemble cannot be loaded or has no
    /// members. Agent failures, an unknown execution mode and aggregation
    /// problems all come back inside the [`ExecutionResult`].
    pub async fn execute_with_context(
        &self,
        parent: &ExecutionContext,
        request: ExecutionRequest,
    ) -> CoordinatorResult<ExecutionResult> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let ensemble = self
            .repository
            .get_ensemble(&request.ensemble_id)
            .map_err(CoordinatorError::LoadEnsemble)?;

        if ensemble.members.is_empty() {
            return Err(CoordinatorError::NoMembers);
        }

        let options = &request.options;
        info!(
            ensemble_id = %request.ensemble_id,
            mode = %ensemble.execution_mode,
            members = ensemble.members.len(),
            "Executing ensemble"
        );

        let monitor = if options.enable_monitoring {
            let monitor = ExecutionMonitor::for_ensemble(&request.ensemble_id, ensemble.members.len());
            for member in &ensemble.members {
                monitor.queue_agent(&member.agent_id, &member.role).await;
            }
            MonitorHandle::new(monitor.shared())
        } else {
            MonitorHandle::disabled()
        };
        monitor.set_status("running").await;
        monitor.set_phase("initialization").await;

        let ctx = match options.effective_timeout() {
            Some(timeout) => parent.with_timeout(timeout),
            None => parent.clone(),
        };
        let shared = SharedContext::initialize(&ensemble.shared_context, &request.input, ensemble.id());
        let invoker = self.invoker();

        monitor
            .set_phase(format!("execution-{}", ensemble.execution_mode))
            .await;

        let outcome = match ensemble.mode() {
            Some(mode) => {
                let runner = runner_for(mode);
                let scope = RunScope {
                    ctx: &ctx,
                    ensemble: &ensemble,
                    shared: &shared,
                    options,
                    invoker: &invoker,
                    monitor: &monitor,
                };
                runner.run(&scope).await
            }
            None => RunOutcome::stopped(
                Vec::new(),
                RunError::UnsupportedMode(ensemble.execution_mode.clone()),
            ),
        };

        monitor.set_phase("aggregation").await;
        let execution_time_ms = clock.elapsed().as_millis() as u64;

        let mut metadata = Map::new();
        if let Some(update) = monitor.progress_update().await {
            match serde_json::to_value(&update) {
                Ok(value) => {
                    metadata.insert("monitoring".to_string(), value);
                }
                Err(e) => warn!(error = %e, "Failed to encode monitor snapshot"),
            }
            monitor.set_phase("completed").await;
        }

        let RunOutcome {
            results,
            error: run_error,
        } = outcome;

        let mut errors = Vec::new();
        let mut aggregated_result = None;
        if run_error.is_none() {
            match self
                .aggregator
                .aggregate(&ensemble.aggregation_strategy, &results)
            {
                Ok(value) => aggregated_result = Some(value),
                Err(e) => {
                    error!(
                        ensemble_id = %request.ensemble_id,
                        error = %e,
                        "Failed to aggregate results"
                    );
                    errors.push(e.to_string());
                }
            }
        }

        let status = ExecutionStatus::derive(&results, run_error.is_some());
        if let Some(e) = run_error {
            warn!(ensemble_id = %request.ensemble_id, error = %e, "Execution stopped");
            errors.push(e.to_string());
        }

        info!(
            ensemble_id = %request.ensemble_id,
            status = %status,
            results = results.len(),
            execution_time_ms,
            "Ensemble execution finished"
        );

        Ok(ExecutionResult {
            ensemble_id: request.ensemble_id,
            status,
            results,
            aggregated_result,
            execution_time_ms,
            started_at,
            finished_at: Utc::now(),
            errors,
            metadata,
        })
    }

    /// Summary of a stored ensemble
    pub fn ensemble_status(&self, ensemble_id: &str) -> CoordinatorResult<EnsembleStatusView> {
        let ensemble = self
            .repository
            .get_ensemble(ensemble_id)
            .map_err(CoordinatorError::LoadEnsemble)?;
        Ok(EnsembleStatusView::from(&ensemble))
    }

    /// Validate a stored ensemble without running it
    pub fn validate_ensemble(
        &self,
        ensemble_id: &str,
        level: ValidationLevel,
    ) -> CoordinatorResult<ValidationReport> {
        let ensemble = self
            .repository
            .get_ensemble(ensemble_id)
            .map_err(CoordinatorError::LoadEnsemble)?;
        Ok(EnsembleValidator::new().validate(&ensemble, level))
    }
}
