//! Per-execution state: cancellation scope and the shared key/value map
//!
//! Both values are created fresh for every `execute` call and cloned
//! cheaply into spawned tasks.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation scope for one execution
///
/// Bundles a cancellation token with an optional deadline. Runners check
/// [`is_done`](Self::is_done) before starting work and await
/// [`done`](Self::done) while waiting on agent logic.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Unbounded context
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context that uses an external token, e.g. one tied to Ctrl-C
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Derive a child bounded by `timeout`; the earlier deadline wins
    pub fn with_timeout(&self, timeout: std::time::Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once cancelled or past the deadline
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves when the context is cancelled or the deadline passes
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}

/// Key under which an agent's successful result is published
pub fn result_key(agent_id: &str) -> String {
    format!("agent_{agent_id}_result")
}

/// Mutable key/value state visible to every agent in one execution
///
/// Cloning shares the same underlying map. The single mutex is also the
/// coordinating lock the runners take while publishing results.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl SharedContext {
    /// Seed with the ensemble's context, then the request input, then the id
    ///
    /// Later sources win on key collisions.
    pub fn initialize<'a>(
        seed: impl IntoIterator<Item = (&'a String, &'a Value)>,
        input: &Map<String, Value>,
        ensemble_id: &str,
    ) -> Self {
        let mut map: Map<String, Value> = seed
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        map.insert("input".to_string(), Value::Object(input.clone()));
        map.insert("ensemble_id".to_string(), Value::String(ensemble_id.to_string()));
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// Copy of the current state, handed to agent logic
    pub async fn snapshot(&self) -> Map<String, Value> {
        self.inner.lock().await.clone()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.get(key).cloned()
    }

    pub async fn insert(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().await.insert(key.into(), value);
    }

    /// Publish an agent's result under `agent_{id}_result`
    pub async fn merge_result(&self, agent_id: &str, value: Value) {
        self.insert(result_key(agent_id), value).await;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initialize_layers() {
        let mut seed = HashMap::new();
        seed.insert("project".to_string(), json!("demo"));
        seed.insert("input".to_string(), json!("shadowed"));

        let mut input = Map::new();
        input.insert("task".to_string(), json!("review"));

        let shared = SharedContext::initialize(&seed, &input, "team");
        let snapshot = shared.snapshot().await;

        assert_eq!(snapshot["project"], "demo");
        assert_eq!(snapshot["input"], json!({"task": "review"}));
        assert_eq!(snapshot["ensemble_id"], "team");
        assert_eq!(shared.len().await, 3);
    }

    #[tokio::test]
    async fn test_merge_result_visible_to_clones() {
        let shared = SharedContext::default();
        let clone = shared.clone();

        shared.merge_result("planner", json!({"plan": 1})).await;
        assert_eq!(
            clone.get("agent_planner_result").await,
            Some(json!({"plan": 1}))
        );
    }

    #[tokio::test]
    async fn test_cancel_marks_done() {
        let ctx = ExecutionContext::new();
        assert!(!ctx.is_done());
        ctx.cancel();
        assert!(ctx.is_done());
        ctx.done().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let ctx = ExecutionContext::new().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_done());
        ctx.done().await;
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_child() {
        let parent = ExecutionContext::new();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(child.is_done());
    }
}
