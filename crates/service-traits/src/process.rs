use std::path::Path;

use async_trait::async_trait;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Processes whose binary or open files sit inside `path` and would
    /// block removing it.
    async fn detect_blockers(&self, path: &Path) -> anyhow::Result<Vec<u32>>;
    /// Processes whose current working directory is `path`.
    async fn detect_by_cwd(&self, path: &Path) -> anyhow::Result<Vec<u32>>;
    async fn kill_processes(&self, pids: &[u32]) -> anyhow::Result<()>;
}

pub struct SystemProcessManager;

#[async_trait]
impl ProcessManager for SystemProcessManager {
    async fn detect_blockers(&self, path: &Path) -> anyhow::Result<Vec<u32>> {
        self.detect_by_cwd(path).await
    }

    async fn detect_by_cwd(&self, path: &Path) -> anyhow::Result<Vec<u32>> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut system = System::new();
            system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::everything());
            system
                .processes()
                .iter()
                .filter(|(_, process)| process.cwd().map(|cwd| cwd.starts_with(&path)).unwrap_or(false))
                .map(|(pid, _)| pid.as_u32())
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| anyhow::anyhow!("process scan panicked: {e}"))
    }

    async fn kill_processes(&self, pids: &[u32]) -> anyhow::Result<()> {
        let pids = pids.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut system = System::new();
            system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::nothing());
            for pid in pids {
                if let Some(process) = system.process(Pid::from_u32(pid)) {
                    process.kill();
                }
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!("process kill panicked: {e}"))
    }
}

pub struct NoopProcessManager;

#[async_trait]
impl ProcessManager for NoopProcessManager {
    async fn detect_blockers(&self, _path: &Path) -> anyhow::Result<Vec<u32>> {
        Ok(Vec::new())
    }
    async fn detect_by_cwd(&self, _path: &Path) -> anyhow::Result<Vec<u32>> {
        Ok(Vec::new())
    }
    async fn kill_processes(&self, _pids: &[u32]) -> anyhow::Result<()> {
        Ok(())
    }
}
