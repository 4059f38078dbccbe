use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{EnsembleMember, MAX_PRIORITY, MIN_PRIORITY};

use super::{run_concurrently, RunError, RunOutcome, RunScope, StrategyRunner};

/// Priority buckets from 10 down to 1, members within a bucket concurrently
///
/// A bucket only starts once the previous one has fully finished, so its
/// agents see every result published by higher-priority buckets. Members
/// with a priority outside 1..=10 are never scheduled. With fail-fast, a
/// failing bucket stops all lower buckets.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridRunner;

/// Members grouped by priority, preserving definition order in each group
fn group_by_priority(members: &[EnsembleMember]) -> BTreeMap<i32, Vec<EnsembleMember>> {
    let mut groups: BTreeMap<i32, Vec<EnsembleMember>> = BTreeMap::new();
    for member in members {
        groups.entry(member.priority).or_default().push(member.clone());
    }
    groups
}

#[async_trait]
impl StrategyRunner for HybridRunner {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    async fn run(&self, scope: &RunScope<'_>) -> RunOutcome {
        let members = &scope.ensemble.members;
        let groups = group_by_priority(members);

        for member in members.iter().filter(|m| !m.in_schedulable_range()) {
            warn!(
                agent_id = %member.agent_id,
                priority = member.priority,
                "Member priority outside 1..=10 will not be scheduled"
            );
        }

        let mut results = Vec::with_capacity(members.len());
        for priority in (MIN_PRIORITY..=MAX_PRIORITY).rev() {
            let Some(bucket) = groups.get(&priority) else {
                continue;
            };

            scope.monitor.set_phase(format!("priority-group-{priority}")).await;
            info!(priority, members = bucket.len(), "Running priority group");

            let bucket_results = run_concurrently(scope, bucket, None).await;
            let failed = bucket_results.iter().any(|r| r.is_failed());
            results.extend(bucket_results);

            if scope.options.fail_fast && failed {
                return RunOutcome::stopped(results, RunError::PriorityGroupFailed(priority));
            }
        }

        RunOutcome::completed(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::domain::EnsembleDefinition;
    use crate::ensemble::strategy::test_support::{Harness, Script, Scripted};

    fn staged() -> EnsembleDefinition {
        EnsembleDefinition::new("staged", "Staged")
            .with_mode("hybrid")
            .with_member(EnsembleMember::new("worker-a", "execute", 5))
            .with_member(EnsembleMember::new("planner", "plan", 10))
            .with_member(EnsembleMember::new("worker-b", "execute", 5))
            .with_member(EnsembleMember::new("reviewer", "review", 1))
    }

    #[tokio::test]
    async fn test_buckets_run_high_to_low() {
        let logic = Arc::new(
            Scripted::default().with("planner", Script::Succeed(json!({"plan": "ship it"}))),
        );
        let harness = Harness::new(staged(), logic.clone());

        let outcome = HybridRunner.run(&harness.scope()).await;

        assert!(outcome.error.is_none());
        let ids: Vec<_> = outcome.results.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["planner", "worker-a", "worker-b", "reviewer"]);

        // lower buckets observe the planner's published result
        assert_eq!(
            logic.seen_by("worker-a")["agent_planner_result"],
            json!({"plan": "ship it"})
        );
        assert!(logic.seen_by("reviewer").contains_key("agent_worker-b_result"));
    }

    #[tokio::test]
    async fn test_fail_fast_stops_lower_buckets() {
        let logic = Arc::new(Scripted::default().with("worker-b", Script::Fail("boom")));
        let mut harness = Harness::new(staged(), logic.clone());
        harness.options.fail_fast = true;

        let outcome = HybridRunner.run(&harness.scope()).await;

        assert_eq!(outcome.error, Some(RunError::PriorityGroupFailed(5)));
        assert_eq!(outcome.results.len(), 3);
        assert!(!logic.calls().contains(&"reviewer".to_string()));
    }

    #[tokio::test]
    async fn test_out_of_range_priorities_are_skipped() {
        let logic = Arc::new(Scripted::default());
        let ensemble = EnsembleDefinition::new("odd", "Odd")
            .with_mode("hybrid")
            .with_member(EnsembleMember::new("zero", "x", 0))
            .with_member(EnsembleMember::new("eleven", "x", 11))
            .with_member(EnsembleMember::new("three", "x", 3));
        let harness = Harness::new(ensemble, logic.clone());

        let outcome = HybridRunner.run(&harness.scope()).await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].agent_id, "three");
        assert_eq!(logic.calls(), vec!["three"]);
    }

    #[test]
    fn test_group_preserves_member_order() {
        let groups = group_by_priority(&staged().members);
        let fives: Vec<_> = groups[&5].iter().map(|m| m.agent_id.as_str()).collect();
        assert_eq!(fives, vec!["worker-a", "worker-b"]);
    }
}
