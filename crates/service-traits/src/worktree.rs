//! The git worktree provider: the one collaborator every workspace
//! operation ultimately bottoms out in. `GitWorktreeProvider` shells out to
//! `git worktree` the same way the grounding module does; `NoopWorktreeProvider`
//! lets the control plane start up before a real provider is wired in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

const WORKTREE_DIR: &str = ".loom-worktrees";
const BRANCH_PREFIX: &str = "loom";

/// Crosses the gateway boundary as the JSON result of `workspace:create`/
/// `workspace:open`, hence `Serialize`/`Deserialize` alongside the plain
/// `Eq` the dispatch-layer hook plumbing needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

#[async_trait]
pub trait WorktreeProvider: Send + Sync {
    async fn register_project(&self, project_dir: &Path) -> anyhow::Result<()>;
    async fn unregister_project(&self, project_dir: &Path) -> anyhow::Result<()>;
    async fn ensure_workspace_registered(&self, project_dir: &Path, workspace_name: &str) -> anyhow::Result<WorktreeInfo>;
    async fn remove_workspace(&self, project_dir: &Path, workspace_name: &str, keep_branch: bool) -> anyhow::Result<()>;
    async fn set_metadata(&self, workspace_path: &Path, key: &str, value: Option<&str>) -> anyhow::Result<()>;
    async fn get_metadata(&self, workspace_path: &Path) -> anyhow::Result<BTreeMap<String, String>>;
    async fn list_worktrees(&self, project_dir: &Path) -> anyhow::Result<Vec<WorktreeInfo>>;
    async fn validate_repository(&self, project_dir: &Path) -> anyhow::Result<()>;
}

/// Git-backed provider. `register_project`/`unregister_project` are no-ops
/// here — unlike the grounding module, this provider does not maintain a
/// separate project registry of its own; that bookkeeping belongs to
/// `loom-control`'s project store, not the worktree mechanics.
pub struct GitWorktreeProvider {
    /// In-memory metadata keyed by canonicalized workspace path, since
    /// `git worktree` has no notion of arbitrary key/value metadata.
    metadata: Mutex<BTreeMap<PathBuf, BTreeMap<String, String>>>,
}

impl Default for GitWorktreeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GitWorktreeProvider {
    pub fn new() -> Self {
        Self { metadata: Mutex::new(BTreeMap::new()) }
    }

    fn branch_name(workspace_name: &str) -> String {
        format!("{BRANCH_PREFIX}/{workspace_name}")
    }

    async fn is_branch_pushed(project_dir: &Path, branch: &str) -> bool {
        let output = Command::new("git").args(["branch", "-r", "--list", &format!("origin/{branch}")]).current_dir(project_dir).output().await;
        match output {
            Ok(o) => !String::from_utf8_lossy(&o.stdout).trim().is_empty(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl WorktreeProvider for GitWorktreeProvider {
    async fn register_project(&self, _project_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    async fn unregister_project(&self, _project_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    async fn ensure_workspace_registered(&self, project_dir: &Path, workspace_name: &str) -> anyhow::Result<WorktreeInfo> {
        if !project_dir.join(".git").exists() {
            anyhow::bail!("{} is not a git repository", project_dir.display());
        }

        let branch = Self::branch_name(workspace_name);
        let wt_dir = project_dir.join(WORKTREE_DIR).join(workspace_name);

        if wt_dir.exists() {
            return Ok(WorktreeInfo { path: wt_dir, branch });
        }

        let output = Command::new("git")
            .args(["worktree", "add", "-b", &branch])
            .arg(&wt_dir)
            .current_dir(project_dir)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("failed to run git worktree add: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git worktree add failed: {stderr}");
        }

        debug!(worktree = %wt_dir.display(), branch = %branch, "created worktree");
        Ok(WorktreeInfo { path: wt_dir, branch })
    }

    async fn remove_workspace(&self, project_dir: &Path, workspace_name: &str, keep_branch: bool) -> anyhow::Result<()> {
        let branch = Self::branch_name(workspace_name);
        let wt_dir = project_dir.join(WORKTREE_DIR).join(workspace_name);

        if wt_dir.exists() {
            let output = Command::new("git").args(["worktree", "remove", "--force"]).arg(&wt_dir).current_dir(project_dir).output().await;
            let ok = matches!(&output, Ok(o) if o.status.success());
            if !ok {
                warn!(worktree = %wt_dir.display(), "git worktree remove failed, falling back to manual cleanup");
                let _ = tokio::fs::remove_dir_all(&wt_dir).await;
                let _ = Command::new("git").args(["worktree", "prune"]).current_dir(project_dir).output().await;
            }
        }

        self.metadata.lock().unwrap_or_else(|poison| poison.into_inner()).remove(&wt_dir);

        if keep_branch || Self::is_branch_pushed(project_dir, &branch).await {
            debug!(branch = %branch, "keeping branch");
            return Ok(());
        }

        match Command::new("git").args(["branch", "-D", &branch]).current_dir(project_dir).output().await {
            Ok(o) if o.status.success() => debug!(branch = %branch, "deleted local branch"),
            Ok(o) => debug!(branch = %branch, stderr = %String::from_utf8_lossy(&o.stderr), "branch delete skipped"),
            Err(error) => warn!(branch = %branch, %error, "failed to delete branch"),
        }

        Ok(())
    }

    async fn set_metadata(&self, workspace_path: &Path, key: &str, value: Option<&str>) -> anyhow::Result<()> {
        let mut metadata = self.metadata.lock().unwrap_or_else(|poison| poison.into_inner());
        let entry = metadata.entry(workspace_path.to_path_buf()).or_default();
        match value {
            Some(value) => {
                entry.insert(key.to_string(), value.to_string());
            }
            None => {
                entry.remove(key);
            }
        }
        Ok(())
    }

    async fn get_metadata(&self, workspace_path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
        Ok(self.metadata.lock().unwrap_or_else(|poison| poison.into_inner()).get(workspace_path).cloned().unwrap_or_default())
    }

    async fn list_worktrees(&self, project_dir: &Path) -> anyhow::Result<Vec<WorktreeInfo>> {
        let output = Command::new("git")
            .args(["worktree", "list", "--porcelain"])
            .current_dir(project_dir)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("failed to run git worktree list: {e}"))?;

        if !output.status.success() {
            return Ok(Vec::new());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut worktrees = Vec::new();
        let mut current_path: Option<PathBuf> = None;
        let mut current_branch: Option<String> = None;

        let mut flush = |path: &mut Option<PathBuf>, branch: &mut Option<String>, out: &mut Vec<WorktreeInfo>| {
            if let (Some(path), Some(branch)) = (path.take(), branch.take())
                && branch.starts_with(&format!("{BRANCH_PREFIX}/"))
            {
                out.push(WorktreeInfo { path, branch });
            }
        };

        for line in stdout.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                current_path = Some(PathBuf::from(path));
            } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
                current_branch = Some(branch.to_string());
            } else if line.is_empty() {
                flush(&mut current_path, &mut current_branch, &mut worktrees);
            }
        }
        flush(&mut current_path, &mut current_branch, &mut worktrees);

        Ok(worktrees)
    }

    async fn validate_repository(&self, project_dir: &Path) -> anyhow::Result<()> {
        if !project_dir.join(".git").exists() {
            anyhow::bail!("{} is not a git repository", project_dir.display());
        }
        Ok(())
    }
}

pub struct NoopWorktreeProvider;

#[async_trait]
impl WorktreeProvider for NoopWorktreeProvider {
    async fn register_project(&self, _project_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }
    async fn unregister_project(&self, _project_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }
    async fn ensure_workspace_registered(&self, _project_dir: &Path, _workspace_name: &str) -> anyhow::Result<WorktreeInfo> {
        anyhow::bail!("worktree provider not configured")
    }
    async fn remove_workspace(&self, _project_dir: &Path, _workspace_name: &str, _keep_branch: bool) -> anyhow::Result<()> {
        Ok(())
    }
    async fn set_metadata(&self, _workspace_path: &Path, _key: &str, _value: Option<&str>) -> anyhow::Result<()> {
        Ok(())
    }
    async fn get_metadata(&self, _workspace_path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }
    async fn list_worktrees(&self, _project_dir: &Path) -> anyhow::Result<Vec<WorktreeInfo>> {
        Ok(Vec::new())
    }
    async fn validate_repository(&self, _project_dir: &Path) -> anyhow::Result<()> {
        anyhow::bail!("worktree provider not configured")
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use tokio::process::Command;

    use super::*;

    async fn init_test_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &[&str]| {
            let dir = dir.path().to_path_buf();
            let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            async move { Command::new("git").args(&args).current_dir(&dir).output().await.unwrap() }
        };
        run(&["init", "-q"]).await;
        run(&["config", "user.email", "test@example.com"]).await;
        run(&["config", "user.name", "test"]).await;
        tokio::fs::write(dir.path().join("README.md"), "hi").await.unwrap();
        run(&["add", "."]).await;
        run(&["commit", "-q", "-m", "init"]).await;
        dir
    }

    #[tokio::test]
    async fn creates_and_removes_a_worktree() {
        let repo = init_test_repo().await;
        let provider = GitWorktreeProvider::new();

        let info = provider.ensure_workspace_registered(repo.path(), "feature-x").await.unwrap();
        assert!(info.path.exists());
        assert_eq!(info.branch, "loom/feature-x");

        provider.remove_workspace(repo.path(), "feature-x", false).await.unwrap();
        assert!(!info.path.exists());
    }

    #[tokio::test]
    async fn metadata_round_trips_per_workspace() {
        let repo = init_test_repo().await;
        let provider = GitWorktreeProvider::new();
        let info = provider.ensure_workspace_registered(repo.path(), "ws").await.unwrap();

        provider.set_metadata(&info.path, "agent", Some("claude")).await.unwrap();
        let metadata = provider.get_metadata(&info.path).await.unwrap();
        assert_eq!(metadata.get("agent"), Some(&"claude".to_string()));

        provider.set_metadata(&info.path, "agent", None).await.unwrap();
        let metadata = provider.get_metadata(&info.path).await.unwrap();
        assert!(!metadata.contains_key("agent"));
    }

    #[tokio::test]
    async fn validate_repository_rejects_non_git_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let provider = GitWorktreeProvider::new();
        assert!(provider.validate_repository(dir.path()).await.is_err());
    }
}
