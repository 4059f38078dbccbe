//! Request and result shapes for ensemble execution

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::EnsembleMember;

/// Metadata key carrying the member priority on an [`AgentResult`]
pub const META_PRIORITY: &str = "priority";

/// Metadata key carrying the reported confidence on an [`AgentResult`]
pub const META_CONFIDENCE: &str = "confidence";

/// Error recorded on results that never ran or stopped waiting
pub const CANCELLED_MESSAGE: &str = "execution timeout or cancelled";

/// Knobs for a single execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Budget for the whole ensemble run; `None` or zero means unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Attempts per agent; values below 1 are treated as 1
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_retries: u32,

    #[serde(default, skip_serializing_if = "is_false")]
    pub fail_fast: bool,

    /// Accepted for compatibility; every topology already collects all results
    #[serde(default, skip_serializing_if = "is_false")]
    pub collect_all: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub enable_monitoring: bool,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl ExecutionOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Positive timeout, if any
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Request to run one ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub ensemble_id: String,

    #[serde(default)]
    pub input: Map<String, Value>,

    #[serde(default)]
    pub options: ExecutionOptions,
}

impl ExecutionRequest {
    pub fn new(ensemble_id: impl Into<String>) -> Self {
        Self {
            ensemble_id: ensemble_id.into(),
            input: Map::new(),
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Outcome of one agent invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Record of one agent's attempt sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub role: String,
    pub status: AgentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub execution_time_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Carries `priority` and `confidence` for aggregation
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl AgentResult {
    /// A failure record for an agent that was never invoked
    pub fn failed(member: &EnsembleMember, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: member.agent_id.clone(),
            role: member.role.clone(),
            status: AgentStatus::Failed,
            result: None,
            error: Some(error.into()),
            execution_time_ms: 0,
            started_at: now,
            finished_at: now,
            metadata: Map::new(),
        }
    }

    /// A successful record, mostly useful when feeding the aggregator directly
    pub fn success(agent_id: impl Into<String>, result: Value) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            role: String::new(),
            status: AgentStatus::Success,
            result: Some(result),
            error: None,
            execution_time_ms: 0,
            started_at: now,
            finished_at: now,
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.metadata.insert(META_PRIORITY.to_string(), priority.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.metadata
            .insert(META_CONFIDENCE.to_string(), confidence.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == AgentStatus::Failed
    }

    /// Successful with a non-null payload; only these feed aggregation
    pub fn has_usable_result(&self) -> bool {
        self.is_success() && matches!(self.result, Some(ref v) if !v.is_null())
    }

    pub fn priority(&self) -> Option<i64> {
        self.metadata.get(META_PRIORITY).and_then(Value::as_i64)
    }

    pub fn confidence(&self) -> Option<f64> {
        self.metadata.get(META_CONFIDENCE).and_then(Value::as_f64)
    }
}

/// Overall outcome of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl ExecutionStatus {
    /// Derive the overall status from the collected results
    ///
    /// Any terminal execution error fails the run; otherwise no failures
    /// means success, no successes means failed, anything else is partial.
    pub fn derive(results: &[AgentResult], execution_failed: bool) -> Self {
        if execution_failed {
            return Self::Failed;
        }

        let success_count = results.iter().filter(|r| r.is_success()).count();
        let failed_count = results.iter().filter(|r| r.is_failed()).count();

        if failed_count == 0 {
            Self::Success
        } else if success_count == 0 {
            Self::Failed
        } else {
            Self::PartialSuccess
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Full result of one `execute` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub ensemble_id: String,
    pub status: ExecutionStatus,

    /// One entry per invoked agent
    pub results: Vec<AgentResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_result: Option<Value>,

    pub execution_time_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    /// Holds the monitor snapshot under `monitoring` when enabled
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ExecutionResult {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    /// One-line human summary of the outcome
    pub fn summary(&self) -> String {
        match self.status {
            ExecutionStatus::Success => {
                "All agents executed successfully. Results aggregated.".to_string()
            }
            ExecutionStatus::PartialSuccess => format!(
                "{}/{} agents succeeded. Partial results available.",
                self.success_count(),
                self.results.len()
            ),
            ExecutionStatus::Failed => {
                "Ensemble execution failed. Check errors for details.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(status: AgentStatus) -> AgentResult {
        let mut r = AgentResult::success("a", json!("x"));
        r.status = status;
        r
    }

    #[test]
    fn test_derive_status() {
        let ok = result(AgentStatus::Success);
        let bad = result(AgentStatus::Failed);
        let skipped = result(AgentStatus::Skipped);

        assert_eq!(
            ExecutionStatus::derive(&[ok.clone(), ok.clone()], false),
            ExecutionStatus::Success
        );
        assert_eq!(
            ExecutionStatus::derive(&[ok.clone(), bad.clone()], false),
            ExecutionStatus::PartialSuccess
        );
        assert_eq!(
            ExecutionStatus::derive(&[bad.clone(), bad.clone()], false),
            ExecutionStatus::Failed
        );
        assert_eq!(
            ExecutionStatus::derive(&[ok.clone()], true),
            ExecutionStatus::Failed
        );
        assert_eq!(ExecutionStatus::derive(&[], false), ExecutionStatus::Success);
        assert_eq!(
            ExecutionStatus::derive(&[skipped, ok], false),
            ExecutionStatus::Success
        );
    }

    #[test]
    fn test_options_omitted_fields_round_trip() {
        let options: ExecutionOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ExecutionOptions::default());
        assert_eq!(serde_json::to_string(&options).unwrap(), "{}");

        let request: ExecutionRequest =
            serde_json::from_value(json!({"ensemble_id": "team"})).unwrap();
        assert!(request.input.is_empty());
        assert_eq!(request.options.attempts(), 1);
        assert_eq!(request.options.effective_timeout(), None);
    }

    #[test]
    fn test_zero_timeout_is_unbounded() {
        let options = ExecutionOptions::default().with_timeout(Duration::ZERO);
        assert_eq!(options.effective_timeout(), None);

        let options = ExecutionOptions::default().with_timeout(Duration::from_secs(2));
        assert_eq!(options.effective_timeout(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn test_usable_result() {
        assert!(AgentResult::success("a", json!({"k": 1})).has_usable_result());
        assert!(!AgentResult::success("a", Value::Null).has_usable_result());
        assert!(!result(AgentStatus::Failed).has_usable_result());
    }

    #[test]
    fn test_summary() {
        let now = Utc::now();
        let exec = ExecutionResult {
            ensemble_id: "team".into(),
            status: ExecutionStatus::PartialSuccess,
            results: vec![result(AgentStatus::Success), result(AgentStatus::Failed)],
            aggregated_result: None,
            execution_time_ms: 0,
            started_at: now,
            finished_at: now,
            errors: vec![],
            metadata: Map::new(),
        };
        assert_eq!(
            exec.summary(),
            "1/2 agents succeeded. Partial results available."
        );
    }
}
