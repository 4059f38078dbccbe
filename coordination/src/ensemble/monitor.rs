//! Execution progress tracking
//!
//! An [`ExecutionMonitor`] is created per execution when monitoring is
//! requested. Runners talk to it through a [`MonitorHandle`], which turns
//! every call into a no-op when monitoring is off.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

/// Lifecycle of one agent inside a monitored execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentProgressStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Progress record for a single agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProgress {
    pub agent_id: String,
    pub role: String,
    pub status: AgentProgressStatus,
    /// 0.0 to 1.0
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl AgentProgress {
    fn new(agent_id: &str, role: &str, status: AgentProgressStatus) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.to_string(),
            role: role.to_string(),
            status,
            progress: 0.0,
            started_at: now,
            last_update: now,
            error: None,
            metadata: Map::new(),
        }
    }
}

/// Serializable snapshot of an execution's progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub execution_id: String,
    pub ensemble_id: String,
    pub status: String,
    pub phase: String,
    pub total_agents: usize,
    pub completed_agents: usize,
    pub failed_agents: usize,
    /// 0.0 to 1.0
    pub progress: f64,
    pub elapsed_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_ms: Option<u64>,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agent_progress: BTreeMap<String, AgentProgress>,
}

#[derive(Debug)]
struct MonitorState {
    status: String,
    phase: String,
    completed_agents: usize,
    failed_agents: usize,
    agents: BTreeMap<String, AgentProgress>,
}

/// Tracks one execution's status, phase and per-agent progress
#[derive(Debug)]
pub struct ExecutionMonitor {
    execution_id: String,
    ensemble_id: String,
    total_agents: usize,
    started: Instant,
    state: RwLock<MonitorState>,
}

/// Shared reference to an ExecutionMonitor
pub type SharedExecutionMonitor = Arc<ExecutionMonitor>;

impl ExecutionMonitor {
    pub fn new(
        execution_id: impl Into<String>,
        ensemble_id: impl Into<String>,
        total_agents: usize,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            ensemble_id: ensemble_id.into(),
            total_agents,
            started: Instant::now(),
            state: RwLock::new(MonitorState {
                status: "initializing".to_string(),
                phase: String::new(),
                completed_agents: 0,
                failed_agents: 0,
                agents: BTreeMap::new(),
            }),
        }
    }

    /// Monitor with a fresh `exec-<ensemble>-<uuid>` id
    pub fn for_ensemble(ensemble_id: &str, total_agents: usize) -> Self {
        let execution_id = format!("exec-{}-{}", ensemble_id, uuid::Uuid::new_v4());
        Self::new(execution_id, ensemble_id, total_agents)
    }

    /// Create a shared reference to this monitor
    pub fn shared(self) -> SharedExecutionMonitor {
        Arc::new(self)
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn ensemble_id(&self) -> &str {
        &self.ensemble_id
    }

    pub async fn status(&self) -> String {
        self.state.read().await.status.clone()
    }

    pub async fn phase(&self) -> String {
        self.state.read().await.phase.clone()
    }

    pub async fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        let mut state = self.state.write().await;
        debug!(
            execution_id = %self.execution_id,
            from = %state.status,
            to = %status,
            "Execution status changed"
        );
        state.status = status;
    }

    pub async fn set_phase(&self, phase: impl Into<String>) {
        let phase = phase.into();
        debug!(execution_id = %self.execution_id, phase = %phase, "Execution phase");
        self.state.write().await.phase = phase;
    }

    /// Register an agent that has not started yet
    pub async fn queue_agent(&self, agent_id: &str, role: &str) {
        let mut state = self.state.write().await;
        state
            .agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentProgress::new(agent_id, role, AgentProgressStatus::Queued));
    }

    pub async fn start_agent(&self, agent_id: &str, role: &str) {
        let mut state = self.state.write().await;
        state.agents.insert(
            agent_id.to_string(),
            AgentProgress::new(agent_id, role, AgentProgressStatus::Running),
        );
    }

    /// Record intermediate progress; unknown agents are ignored
    pub async fn update_agent_progress(
        &self,
        agent_id: &str,
        progress: f64,
        metadata: Option<Map<String, Value>>,
    ) {
        let mut state = self.state.write().await;
        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.progress = progress.clamp(0.0, 1.0);
            agent.last_update = Utc::now();
            if let Some(metadata) = metadata {
                agent.metadata.extend(metadata);
            }
        }
    }

    pub async fn complete_agent(&self, agent_id: &str) {
        let mut state = self.state.write().await;
        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.status = AgentProgressStatus::Completed;
            agent.progress = 1.0;
            agent.last_update = Utc::now();
            state.completed_agents += 1;
        }
    }

    pub async fn fail_agent(&self, agent_id: &str, error: &str) {
        let mut state = self.state.write().await;
        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.status = AgentProgressStatus::Failed;
            agent.error = Some(error.to_string());
            agent.last_update = Utc::now();
            state.failed_agents += 1;
        }
    }

    pub async fn agent_progress(&self, agent_id: &str) -> Option<AgentProgress> {
        self.state.read().await.agents.get(agent_id).cloned()
    }

    /// Finished fraction: (completed + failed) / total
    pub async fn progress(&self) -> f64 {
        let state = self.state.read().await;
        self.fraction(&state)
    }

    fn fraction(&self, state: &MonitorState) -> f64 {
        if self.total_agents == 0 {
            return 0.0;
        }
        // fallback agents are counted too and can push past the member total
        let done = (state.completed_agents + state.failed_agents) as f64;
        (done / self.total_agents as f64).min(1.0)
    }

    /// Snapshot of the current progress
    pub async fn progress_update(&self) -> ProgressUpdate {
        let state = self.state.read().await;
        let elapsed = self.started.elapsed();
        let progress = self.fraction(&state);

        let estimated_remaining_ms = (progress > 0.0 && progress < 1.0)
            .then(|| (elapsed.as_millis() as f64 / progress * (1.0 - progress)) as u64);

        ProgressUpdate {
            execution_id: self.execution_id.clone(),
            ensemble_id: self.ensemble_id.clone(),
            status: state.status.clone(),
            phase: state.phase.clone(),
            total_agents: self.total_agents,
            completed_agents: state.completed_agents,
            failed_agents: state.failed_agents,
            progress,
            elapsed_ms: elapsed.as_millis() as u64,
            estimated_remaining_ms,
            timestamp: Utc::now(),
            agent_progress: state.agents.clone(),
        }
    }
}

/// Optional monitor; every call is a no-op without one
#[derive(Debug, Clone, Default)]
pub struct MonitorHandle(Option<SharedExecutionMonitor>);

impl MonitorHandle {
    pub fn new(monitor: SharedExecutionMonitor) -> Self {
        Self(Some(monitor))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    pub fn monitor(&self) -> Option<&SharedExecutionMonitor> {
        self.0.as_ref()
    }

    pub async fn set_status(&self, status: &str) {
        if let Some(m) = &self.0 {
            m.set_status(status).await;
        }
    }

    pub async fn set_phase(&self, phase: impl Into<String>) {
        if let Some(m) = &self.0 {
            m.set_phase(phase).await;
        }
    }

    pub async fn start_agent(&self, agent_id: &str, role: &str) {
        if let Some(m) = &self.0 {
            m.start_agent(agent_id, role).await;
        }
    }

    pub async fn complete_agent(&self, agent_id: &str) {
        if let Some(m) = &self.0 {
            m.complete_agent(agent_id).await;
        }
    }

    pub async fn fail_agent(&self, agent_id: &str, error: &str) {
        if let Some(m) = &self.0 {
            m.fail_agent(agent_id, error).await;
        }
    }

    /// Mark completion or failure from a finished result
    pub async fn finish_agent(&self, result: &super::types::AgentResult) {
        if result.is_success() {
            self.complete_agent(&result.agent_id).await;
        } else {
            self.fail_agent(&result.agent_id, result.error.as_deref().unwrap_or_default())
                .await;
        }
    }

    pub async fn progress_update(&self) -> Option<ProgressUpdate> {
        match &self.0 {
            Some(m) => Some(m.progress_update().await),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_progress_counts() {
        let monitor = ExecutionMonitor::for_ensemble("team", 4);
        assert!(monitor.execution_id().starts_with("exec-team-"));

        monitor.start_agent("a", "planner").await;
        monitor.start_agent("b", "worker").await;
        monitor.complete_agent("a").await;
        monitor.fail_agent("b", "boom").await;

        assert_eq!(monitor.progress().await, 0.5);

        let update = monitor.progress_update().await;
        assert_eq!(update.completed_agents, 1);
        assert_eq!(update.failed_agents, 1);
        assert!(update.estimated_remaining_ms.is_some());
        assert_eq!(
            update.agent_progress["b"].error.as_deref(),
            Some("boom")
        );
        assert_eq!(
            update.agent_progress["a"].status,
            AgentProgressStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_unknown_agent_is_ignored() {
        let monitor = ExecutionMonitor::new("exec-1", "team", 1);
        monitor.complete_agent("ghost").await;
        monitor.update_agent_progress("ghost", 0.5, None).await;
        assert_eq!(monitor.progress().await, 0.0);
        assert!(monitor.agent_progress("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_update_merges_metadata() {
        let monitor = ExecutionMonitor::new("exec-1", "team", 1);
        monitor.queue_agent("a", "worker").await;
        assert_eq!(
            monitor.agent_progress("a").await.unwrap().status,
            AgentProgressStatus::Queued
        );

        monitor.start_agent("a", "worker").await;
        let mut first = Map::new();
        first.insert("step".into(), json!(1));
        monitor.update_agent_progress("a", 0.3, Some(first)).await;
        let mut second = Map::new();
        second.insert("note".into(), json!("halfway"));
        monitor.update_agent_progress("a", 0.5, Some(second)).await;

        let agent = monitor.agent_progress("a").await.unwrap();
        assert_eq!(agent.progress, 0.5);
        assert_eq!(agent.metadata.len(), 2);
    }

    #[tokio::test]
    async fn test_status_and_phase() {
        let monitor = ExecutionMonitor::new("exec-1", "team", 1);
        assert_eq!(monitor.status().await, "initializing");
        monitor.set_status("running").await;
        monitor.set_phase("execution-parallel").await;
        assert_eq!(monitor.status().await, "running");
        assert_eq!(monitor.phase().await, "execution-parallel");
    }

    #[tokio::test]
    async fn test_disabled_handle_is_noop() {
        let handle = MonitorHandle::disabled();
        handle.set_status("running").await;
        handle.start_agent("a", "worker").await;
        handle.fail_agent("a", "boom").await;
        assert!(handle.progress_update().await.is_none());
        assert!(!handle.is_enabled());
    }
}
