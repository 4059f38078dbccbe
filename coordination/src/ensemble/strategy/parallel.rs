use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{run_concurrently, RunOutcome, RunScope, StrategyRunner};

/// Every member at once
///
/// Results are ordered by member position, not completion. With
/// fail-fast, in-flight members still run to completion; the first
/// reported failure only becomes the run's error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelRunner;

#[async_trait]
impl StrategyRunner for ParallelRunner {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn run(&self, scope: &RunScope<'_>) -> RunOutcome {
        let members = &scope.ensemble.members;
        debug!(
            ensemble_id = scope.ensemble.id(),
            members = members.len(),
            "Launching members"
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let failures = scope.options.fail_fast.then_some(&tx);
        let results = run_concurrently(scope, members, failures).await;

        match rx.try_recv() {
            Ok(error) => RunOutcome::stopped(results, error),
            Err(_) => RunOutcome::completed(results),
        }
    }
}
