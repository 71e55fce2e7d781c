use std::path::PathBuf;

use async_trait::async_trait;
use loom_dispatch::{DomainEvent, IntentKind, Operation, OperationContext};
use loom_protocol::domain_events;
use loom_service_traits::RestartOutcome;
use serde::{Deserialize, Serialize};

pub const RESTART_AGENT: &str = "restart";
pub const GET_SESSION: &str = "get-session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartAgent {
    pub workspace_path: PathBuf,
}

impl IntentKind for RestartAgent {
    type Output = u16;
    const TAG: &'static str = "agent:restart";
}

pub struct RestartAgentOperation;

#[async_trait]
impl Operation for RestartAgentOperation {
    type Input = RestartAgent;
    type Output = u16;

    async fn execute(&self, input: RestartAgent, ctx: OperationContext) -> anyhow::Result<u16> {
        let collected = ctx.hooks().collect::<PathBuf, RestartOutcome>(RESTART_AGENT, input.workspace_path.clone()).await;
        let outcome = collected.results.into_iter().next().ok_or_else(|| anyhow::anyhow!("no agent server manager contributed a restart outcome"))?;

        match outcome {
            RestartOutcome::Success { port } => {
                ctx.emit(DomainEvent::new(domain_events::AGENT_RESTARTED, serde_json::json!({ "workspacePath": input.workspace_path, "port": port })));
                Ok(port)
            }
            RestartOutcome::Failure { error } => Err(anyhow::anyhow!(error)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAgentSession {
    pub project_id: String,
    pub workspace_name: String,
}

impl IntentKind for GetAgentSession {
    type Output = Option<AgentSession>;
    const TAG: &'static str = "agent:get-session";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSession {
    pub port: u16,
    pub session_id: String,
}

pub struct GetAgentSessionOperation;

#[async_trait]
impl Operation for GetAgentSessionOperation {
    type Input = GetAgentSession;
    type Output = Option<AgentSession>;

    async fn execute(&self, input: GetAgentSession, ctx: OperationContext) -> anyhow::Result<Option<AgentSession>> {
        let collected = ctx.hooks().collect::<GetAgentSession, AgentSession>(GET_SESSION, input).await;
        Ok(collected.results.into_iter().next())
    }
}
