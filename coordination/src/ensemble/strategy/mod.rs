//! Execution topologies
//!
//! A [`StrategyRunner`] drives the [`AgentInvoker`] over an ensemble's
//! members and returns the collected results in a deterministic order,
//! plus an optional terminal error. Results gathered before an error are
//! always kept.
//!
//! ```text
//!  sequential   m1 ──▶ m2 ──▶ m3            (fallback chain on failure)
//!
//!  parallel     ┌─ m1 ─┐
//!               ├─ m2 ─┤──▶ results[i] == members[i]
//!               └─ m3 ─┘
//!
//!  hybrid       p10 [m1 ∥ m2] ──▶ p5 [m3] ──▶ p1 [m4 ∥ m5]
//! ```

mod hybrid;
mod parallel;
mod sequential;

pub use hybrid::HybridRunner;
pub use parallel::ParallelRunner;
pub use sequential::SequentialRunner;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::warn;

use crate::domain::{EnsembleDefinition, EnsembleMember, ExecutionMode};

use super::context::{ExecutionContext, SharedContext};
use super::invoker::AgentInvoker;
use super::monitor::MonitorHandle;
use super::types::{AgentResult, ExecutionOptions, CANCELLED_MESSAGE};

/// Terminal error from a runner
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    #[error("execution timeout or cancelled")]
    Cancelled,

    /// Sequential fail-fast stop
    #[error("execution failed at agent {agent_id}: {error}")]
    StoppedAtAgent { agent_id: String, error: String },

    /// First failure reported by a concurrent member under fail-fast
    #[error("agent {agent_id} failed: {error}")]
    AgentFailed { agent_id: String, error: String },

    #[error("execution failed in priority group {0}")]
    PriorityGroupFailed(i32),

    #[error("unsupported execution mode: {0}")]
    UnsupportedMode(String),
}

/// Result type for runner operations
pub type RunResult<T> = Result<T, RunError>;

/// Collected results plus the error that ended the run, if any
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub results: Vec<AgentResult>,
    pub error: Option<RunError>,
}

impl RunOutcome {
    pub fn completed(results: Vec<AgentResult>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    pub fn stopped(results: Vec<AgentResult>, error: RunError) -> Self {
        Self {
            results,
            error: Some(error),
        }
    }
}

/// Everything a runner needs for one execution
pub struct RunScope<'a> {
    pub ctx: &'a ExecutionContext,
    pub ensemble: &'a EnsembleDefinition,
    pub shared: &'a SharedContext,
    pub options: &'a ExecutionOptions,
    pub invoker: &'a AgentInvoker,
    pub monitor: &'a MonitorHandle,
}

/// An execution topology
#[async_trait]
pub trait StrategyRunner: Send + Sync {
    /// Topology name for logging
    fn name(&self) -> &'static str;

    async fn run(&self, scope: &RunScope<'_>) -> RunOutcome;
}

/// Runner for a recognized mode
pub fn runner_for(mode: ExecutionMode) -> Box<dyn StrategyRunner> {
    match mode {
        ExecutionMode::Sequential => Box::new(SequentialRunner),
        ExecutionMode::Parallel => Box::new(ParallelRunner),
        ExecutionMode::Hybrid => Box::new(HybridRunner),
    }
}

/// Run `members` concurrently, returning results in member order
///
/// Each task checks for cancellation before invoking its agent. Successful
/// results are published to the shared context as they complete. When
/// `failures` is given, every failed member is reported on it.
pub(crate) async fn run_concurrently(
    scope: &RunScope<'_>,
    members: &[EnsembleMember],
    failures: Option<&mpsc::UnboundedSender<RunError>>,
) -> Vec<AgentResult> {
    let mut join_set: JoinSet<(usize, AgentResult)> = JoinSet::new();

    for (idx, member) in members.iter().enumerate() {
        scope.monitor.start_agent(&member.agent_id, &member.role).await;

        let ctx = scope.ctx.clone();
        let shared = scope.shared.clone();
        let options = scope.options.clone();
        let invoker = scope.invoker.clone();
        let monitor = scope.monitor.clone();
        let failures = failures.cloned();
        let member = member.clone();

        join_set.spawn(async move {
            let result = if ctx.is_done() {
                AgentResult::failed(&member, CANCELLED_MESSAGE)
            } else {
                invoker.invoke(&ctx, &member, &shared, &options).await
            };

            monitor.finish_agent(&result).await;

            if result.has_usable_result() {
                if let Some(value) = &result.result {
                    shared.merge_result(&member.agent_id, value.clone()).await;
                }
            }

            if let (Some(tx), Some(error)) = (&failures, &result.error) {
                if result.is_failed() {
                    let _ = tx.send(RunError::AgentFailed {
                        agent_id: member.agent_id.clone(),
                        error: error.clone(),
                    });
                }
            }

            (idx, result)
        });
    }

    let mut slots: Vec<Option<AgentResult>> = vec![None; members.len()];
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(e) => warn!(error = %e, "Agent task panicked"),
        }
    }

    slots
        .into_iter()
        .zip(members)
        .map(|(slot, member)| {
            slot.unwrap_or_else(|| AgentResult::failed(member, "agent task aborted"))
        })
        .collect()
}
