//! Single-agent invocation with bounded retry
//!
//! The decision logic of an agent is opaque to the engine and is supplied
//! through the [`AgentLogic`] trait. [`AgentInvoker`] loads the agent
//! definition, calls the logic up to `max(max_retries, 1)` times with a
//! linear backoff between failures, and always returns an [`AgentResult`].
//!
//! Each call runs in its own task. When the execution context finishes
//! first, the invoker stops waiting and records a cancellation failure;
//! the detached call is left to run to completion on its own.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{AgentDefinition, EnsembleMember};
use crate::repository::SharedRepository;

use super::context::{ExecutionContext, SharedContext};
use super::types::{
    AgentResult, AgentStatus, ExecutionOptions, CANCELLED_MESSAGE, META_CONFIDENCE, META_PRIORITY,
};

/// Error returned by agent logic
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result type for agent logic
pub type AgentLogicResult<T> = Result<T, AgentError>;

/// Value produced by one successful agent call
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub value: Value,
    /// Self-reported confidence, used by confidence-weighted aggregation
    pub confidence: Option<f64>,
}

impl AgentOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

impl From<Value> for AgentOutput {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// The opaque per-agent decision logic
#[async_trait]
pub trait AgentLogic: Send + Sync {
    /// Run the agent once against a snapshot of the shared context
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        agent: &AgentDefinition,
        shared: &Map<String, Value>,
    ) -> AgentLogicResult<AgentOutput>;
}

/// Shared reference to agent logic
pub type SharedAgentLogic = Arc<dyn AgentLogic>;

/// Delay before the next attempt, as a function of the failed attempt number
#[derive(Clone)]
pub struct Backoff(Arc<dyn Fn(u32) -> Duration + Send + Sync>);

impl Backoff {
    /// Attempt `n` waits `n * unit`
    pub fn linear(unit: Duration) -> Self {
        Self(Arc::new(move |attempt| unit.saturating_mul(attempt)))
    }

    pub fn none() -> Self {
        Self(Arc::new(|_| Duration::ZERO))
    }

    pub fn from_fn(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        (self.0)(attempt)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::linear(Duration::from_secs(1))
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Backoff").finish()
    }
}

/// Runs one ensemble member to an [`AgentResult`]
#[derive(Clone)]
pub struct AgentInvoker {
    repository: SharedRepository,
    logic: SharedAgentLogic,
    backoff: Backoff,
}

impl AgentInvoker {
    pub fn new(repository: SharedRepository, logic: SharedAgentLogic, backoff: Backoff) -> Self {
        Self {
            repository,
            logic,
            backoff,
        }
    }

    /// Invoke `member`, retrying failed calls
    ///
    /// Never fails: every outcome, including a missing agent definition or
    /// cancellation, is captured in the returned result.
    pub async fn invoke(
        &self,
        ctx: &ExecutionContext,
        member: &EnsembleMember,
        shared: &SharedContext,
        options: &ExecutionOptions,
    ) -> AgentResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut metadata = Map::new();
        metadata.insert(META_PRIORITY.to_string(), member.priority.into());

        let outcome = match self.repository.get_agent(&member.agent_id) {
            Ok(agent) => self.run_attempts(ctx, member, &agent, shared, options).await,
            Err(e) => {
                warn!(agent_id = %member.agent_id, error = %e, "Failed to load agent");
                Err(format!("failed to load agent: {e}"))
            }
        };

        let (status, result, error) = match outcome {
            Ok(output) => {
                if let Some(confidence) = output.confidence {
                    metadata.insert(META_CONFIDENCE.to_string(), confidence.into());
                }
                (AgentStatus::Success, Some(output.value), None)
            }
            Err(message) => (AgentStatus::Failed, None, Some(message)),
        };

        AgentResult {
            agent_id: member.agent_id.clone(),
            role: member.role.clone(),
            status,
            result,
            error,
            execution_time_ms: clock.elapsed().as_millis() as u64,
            started_at,
            finished_at: Utc::now(),
            metadata,
        }
    }

    async fn run_attempts(
        &self,
        ctx: &ExecutionContext,
        member: &EnsembleMember,
        agent: &AgentDefinition,
        shared: &SharedContext,
        options: &ExecutionOptions,
    ) -> Result<AgentOutput, String> {
        let attempts = options.attempts();
        let mut last_error = CANCELLED_MESSAGE.to_string();

        for attempt in 1..=attempts {
            if ctx.is_done() {
                return Err(CANCELLED_MESSAGE.to_string());
            }

            let snapshot = shared.snapshot().await;
            match self.call_logic(ctx, agent, snapshot).await {
                Ok(output) => {
                    debug!(agent_id = %member.agent_id, attempt, "Agent succeeded");
                    return Ok(output);
                }
                Err(CallError::Cancelled) => return Err(CANCELLED_MESSAGE.to_string()),
                Err(CallError::Failed(message)) => last_error = message,
            }

            if attempt < attempts {
                warn!(
                    agent_id = %member.agent_id,
                    attempt,
                    error = %last_error,
                    "Agent execution failed, retrying"
                );
                let delay = self.backoff.delay(attempt);
                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = ctx.done() => return Err(CANCELLED_MESSAGE.to_string()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn call_logic(
        &self,
        ctx: &ExecutionContext,
        agent: &AgentDefinition,
        snapshot: Map<String, Value>,
    ) -> Result<AgentOutput, CallError> {
        let logic = Arc::clone(&self.logic);
        let agent = agent.clone();
        let call_ctx = ctx.clone();
        let mut handle =
            tokio::spawn(async move { logic.execute(&call_ctx, &agent, &snapshot).await });

        tokio::select! {
            biased;
            _ = ctx.done() => Err(CallError::Cancelled),
            joined = &mut handle => match joined {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(CallError::Failed(e.to_string())),
                Err(e) => Err(CallError::Failed(format!("agent logic panicked: {e}"))),
            },
        }
    }
}

enum CallError {
    Cancelled,
    Failed(String),
}
