//! Built-in agent logic for the command-line runner

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use ensemble_coordination::ensemble::{AgentLogic, AgentLogicResult, AgentOutput, ExecutionContext};
use ensemble_coordination::AgentDefinition;

/// Reports what the agent was given instead of doing real work
///
/// Useful for checking an ensemble's wiring (ordering, shared context,
/// aggregation) before real agent logic is plugged in.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoLogic;

#[async_trait]
impl AgentLogic for EchoLogic {
    async fn execute(
        &self,
        _ctx: &ExecutionContext,
        agent: &AgentDefinition,
        shared: &Map<String, Value>,
    ) -> AgentLogicResult<AgentOutput> {
        Ok(AgentOutput::new(json!({
            "agent_id": agent.id(),
            "status": "executed",
            "input": shared,
            "goals": agent.goals,
            "actions": agent.actions.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_reports_definition() {
        let agent = AgentDefinition::new("scout", "Scout")
            .with_goal("map the repo")
            .with_action("grep", "tool");
        let mut shared = Map::new();
        shared.insert("ensemble_id".into(), json!("team"));

        let output = EchoLogic
            .execute(&ExecutionContext::new(), &agent, &shared)
            .await
            .unwrap();

        assert_eq!(output.value["agent_id"], "scout");
        assert_eq!(output.value["status"], "executed");
        assert_eq!(output.value["input"]["ensemble_id"], "team");
        assert_eq!(output.value["goals"], json!(["map the repo"]));
        assert_eq!(output.value["actions"], 1);
        assert!(output.confidence.is_none());
    }
}
