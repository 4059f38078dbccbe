use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::EnsembleMember;

use super::{RunError, RunOutcome, RunScope, StrategyRunner};
use crate::ensemble::types::AgentResult;

/// Role given to fallback agents
const FALLBACK_ROLE: &str = "fallback";

/// Priority given to fallback agents
const FALLBACK_PRIORITY: i32 = 1;

/// Members one after another, in definition order
///
/// Each successful result is published to the shared context before the
/// next member starts. When a member fails and the ensemble has a
/// fallback chain, the first fallback agent to succeed is appended and
/// ends the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialRunner;

#[async_trait]
impl StrategyRunner for SequentialRunner {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn run(&self, scope: &RunScope<'_>) -> RunOutcome {
        let members = &scope.ensemble.members;
        let mut results = Vec::with_capacity(members.len());

        for member in members {
            if scope.ctx.is_done() {
                warn!(
                    ensemble_id = scope.ensemble.id(),
                    completed = results.len(),
                    "Execution cancelled before all members ran"
                );
                return RunOutcome::stopped(results, RunError::Cancelled);
            }

            scope.monitor.start_agent(&member.agent_id, &member.role).await;
            let result = scope
                .invoker
                .invoke(scope.ctx, member, scope.shared, scope.options)
                .await;
            scope.monitor.finish_agent(&result).await;

            if let (true, Some(value)) = (result.has_usable_result(), &result.result) {
                scope.shared.merge_result(&member.agent_id, value.clone()).await;
            }

            let failure = result.is_failed().then(|| result.error.clone().unwrap_or_default());
            results.push(result);

            let Some(error) = failure else {
                continue;
            };

            if scope.options.fail_fast {
                return RunOutcome::stopped(
                    results,
                    RunError::StoppedAtAgent {
                        agent_id: member.agent_id.clone(),
                        error,
                    },
                );
            }

            if !scope.ensemble.fallback_chain.is_empty() {
                if let Some(fallback) = try_fallback_chain(scope).await {
                    info!(
                        failed_agent = %member.agent_id,
                        fallback_agent = %fallback.agent_id,
                        "Fallback agent succeeded, ending run"
                    );
                    results.push(fallback);
                    break;
                }
            }
        }

        RunOutcome::completed(results)
    }
}

/// First successful fallback agent, trying the chain in order
async fn try_fallback_chain(scope: &RunScope<'_>) -> Option<AgentResult> {
    for agent_id in &scope.ensemble.fallback_chain {
        let member = EnsembleMember::new(agent_id.clone(), FALLBACK_ROLE, FALLBACK_PRIORITY);
        debug!(agent_id = %member.agent_id, "Trying fallback agent");

        scope.monitor.start_agent(&member.agent_id, &member.role).await;
        let result = scope
            .invoker
            .invoke(scope.ctx, &member, scope.shared, scope.options)
            .await;
        scope.monitor.finish_agent(&result).await;
        if result.is_success() {
            return Some(result);
        }
        warn!(
            agent_id = %member.agent_id,
            error = result.error.as_deref().unwrap_or_default(),
            "Fallback agent failed"
        );
    }

    warn!("All fallback agents failed");
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::domain::EnsembleDefinition;
    use crate::ensemble::monitor::{AgentProgressStatus, ExecutionMonitor, MonitorHandle};
    use crate::ensemble::strategy::test_support::{Harness, Script, Scripted};

    fn ensemble() -> EnsembleDefinition {
        EnsembleDefinition::new("pipeline", "Pipeline")
            .with_member(EnsembleMember::new("planner", "plan", 5))
            .with_member(EnsembleMember::new("builder", "build", 5))
            .with_member(EnsembleMember::new("checker", "check", 5))
    }

    #[tokio::test]
    async fn test_runs_in_order_and_shares_results() {
        let logic = Arc::new(Scripted::default().with("planner", Script::Succeed(json!({"steps": 2}))));
        let harness = Harness::new(ensemble(), logic.clone());

        let outcome = SequentialRunner.run(&harness.scope()).await;

        assert!(outcome.error.is_none());
        assert_eq!(logic.calls(), vec!["planner", "builder", "checker"]);
        let ids: Vec<_> = outcome.results.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["planner", "builder", "checker"]);

        assert_eq!(
            logic.seen_by("builder")["agent_planner_result"],
            json!({"steps": 2})
        );
        assert!(!logic.seen_by("planner").contains_key("agent_planner_result"));
    }

    #[tokio::test]
    async fn test_fail_fast_keeps_failure() {
        let logic = Arc::new(Scripted::default().with("builder", Script::Fail("compile error")));
        let mut harness = Harness::new(ensemble(), logic.clone());
        harness.options.fail_fast = true;

        let outcome = SequentialRunner.run(&harness.scope()).await;

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(
            outcome.error.unwrap().to_string(),
            "execution failed at agent builder: compile error"
        );
        assert_eq!(logic.calls(), vec!["planner", "builder"]);
    }

    #[tokio::test]
    async fn test_failure_without_fail_fast_continues() {
        let logic = Arc::new(Scripted::default().with("builder", Script::Fail("boom")));
        let harness = Harness::new(ensemble(), logic.clone());

        let outcome = SequentialRunner.run(&harness.scope()).await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results[1].is_failed());
    }

    #[tokio::test]
    async fn test_fallback_success_ends_run() {
        let logic = Arc::new(
            Scripted::default()
                .with("builder", Script::Fail("boom"))
                .with("backup-1", Script::Fail("also boom"))
                .with("backup-2", Script::Succeed(json!("rescued"))),
        );
        let harness = Harness::new(
            ensemble().with_fallback("backup-1").with_fallback("backup-2"),
            logic.clone(),
        );

        let outcome = SequentialRunner.run(&harness.scope()).await;

        assert!(outcome.error.is_none());
        let ids: Vec<_> = outcome.results.iter().map(|r| r.agent_id.as_str()).collect();
        // failed fallback attempts are not recorded; checker never runs
        assert_eq!(ids, vec!["planner", "builder", "backup-2"]);
        assert_eq!(outcome.results[2].role, "fallback");
        assert_eq!(outcome.results[2].priority(), Some(1));
        assert!(!logic.calls().contains(&"checker".to_string()));
    }

    #[tokio::test]
    async fn test_exhausted_fallback_continues() {
        let logic = Arc::new(
            Scripted::default()
                .with("builder", Script::Fail("boom"))
                .with("backup", Script::Fail("also boom")),
        );
        let harness = Harness::new(ensemble().with_fallback("backup"), logic.clone());

        let outcome = SequentialRunner.run(&harness.scope()).await;

        let ids: Vec<_> = outcome.results.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["planner", "builder", "checker"]);
    }

    #[tokio::test]
    async fn test_fallback_attempts_are_monitored() {
        let logic = Arc::new(
            Scripted::default()
                .with("builder", Script::Fail("boom"))
                .with("backup-1", Script::Fail("also boom"))
                .with("backup-2", Script::Succeed(json!("rescued"))),
        );
        let mut harness = Harness::new(
            ensemble().with_fallback("backup-1").with_fallback("backup-2"),
            logic,
        );
        let monitor = ExecutionMonitor::new("exec-pipeline", "pipeline", 3).shared();
        harness.monitor = MonitorHandle::new(monitor.clone());

        SequentialRunner.run(&harness.scope()).await;

        let failed = monitor.agent_progress("backup-1").await.unwrap();
        assert_eq!(failed.status, AgentProgressStatus::Failed);
        assert_eq!(failed.role, "fallback");
        assert_eq!(failed.error.as_deref(), Some("also boom"));

        let rescued = monitor.agent_progress("backup-2").await.unwrap();
        assert_eq!(rescued.status, AgentProgressStatus::Completed);
        assert_eq!(rescued.role, "fallback");

        // planner, builder and two fallbacks against three members
        let update = monitor.progress_update().await;
        assert_eq!(update.completed_agents, 2);
        assert_eq!(update.failed_agents, 2);
        assert_eq!(update.progress, 1.0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let logic = Arc::new(Scripted::default());
        let harness = Harness::new(ensemble(), logic.clone());
        harness.ctx.cancel();

        let outcome = SequentialRunner.run(&harness.scope()).await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.error, Some(RunError::Cancelled));
        assert!(logic.calls().is_empty());
    }
}
