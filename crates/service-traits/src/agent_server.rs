use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Success { port: u16 },
    Failure { error: String },
}

pub type ServerLifecycleCallback = Arc<dyn Fn(&Path) + Send + Sync>;

#[async_trait]
pub trait AgentServerManager: Send + Sync {
    async fn start_server(&self, workspace_path: &Path) -> anyhow::Result<u16>;
    async fn stop_server(&self, workspace_path: &Path) -> anyhow::Result<()>;
    async fn restart_server(&self, workspace_path: &Path) -> RestartOutcome;
    fn on_server_started(&self, callback: ServerLifecycleCallback);
    fn on_server_stopped(&self, callback: ServerLifecycleCallback);
}

pub struct NoopAgentServerManager;

#[async_trait]
impl AgentServerManager for NoopAgentServerManager {
    async fn start_server(&self, _workspace_path: &Path) -> anyhow::Result<u16> {
        anyhow::bail!("agent server manager not configured")
    }
    async fn stop_server(&self, _workspace_path: &Path) -> anyhow::Result<()> {
        Ok(())
    }
    async fn restart_server(&self, _workspace_path: &Path) -> RestartOutcome {
        RestartOutcome::Failure { error: "agent server manager not configured".into() }
    }
    fn on_server_started(&self, _callback: ServerLifecycleCallback) {}
    fn on_server_stopped(&self, _callback: ServerLifecycleCallback) {}
}
