use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use loom_dispatch::{DomainEvent, IntentKind, Operation, OperationContext};
use loom_protocol::domain_events;
use serde::{Deserialize, Serialize};

use crate::ids::derive_project_id;
use crate::state::{ControlState, Project as ProjectRecord};

pub const VALIDATE_PROJECT: &str = "validate";
pub const REGISTER_PROJECT: &str = "register";
pub const UNREGISTER_PROJECT: &str = "unregister";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenProject {
    pub path: Option<PathBuf>,
    /// Present when the caller wants the project cloned from a remote
    /// first. Acquiring the repository is business knowledge the
    /// dispatcher does not own (§1 Non-goals); unset this and point `path`
    /// at an already-cloned checkout instead.
    pub git: Option<String>,
}

impl IntentKind for OpenProject {
    type Output = ProjectRecord;
    const TAG: &'static str = "project:open";
}

pub struct OpenProjectOperation {
    state: Arc<ControlState>,
}

impl OpenProjectOperation {
    pub fn new(state: Arc<ControlState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Operation for OpenProjectOperation {
    type Input = OpenProject;
    type Output = ProjectRecord;

    async fn execute(&self, input: OpenProject, ctx: OperationContext) -> anyhow::Result<ProjectRecord> {
        if input.git.is_some() {
            anyhow::bail!("opening a project directly from a git URL is not supported by this control plane");
        }
        let path = input.path.ok_or_else(|| anyhow::anyhow!("project:open requires `path` when `git` is absent"))?;

        let collected = ctx.hooks().collect::<PathBuf, ()>(VALIDATE_PROJECT, path.clone()).await;
        if let Some(error) = collected.errors.into_iter().next() {
            return Err(error);
        }

        let collected = ctx.hooks().collect::<PathBuf, ()>(REGISTER_PROJECT, path.clone()).await;
        if let Some(error) = collected.errors.into_iter().next() {
            return Err(error);
        }

        let id = derive_project_id(&path)?;
        let project = ProjectRecord { id, path };
        self.state.insert_project(project.clone());

        ctx.emit(DomainEvent::new(domain_events::PROJECT_OPENED, serde_json::json!({ "projectId": project.id, "path": project.path })));
        Ok(project)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseProject {
    pub project_id: String,
    pub remove_local_repo: bool,
}

impl IntentKind for CloseProject {
    type Output = ();
    const TAG: &'static str = "project:close";
}

pub struct CloseProjectOperation {
    state: Arc<ControlState>,
}

impl CloseProjectOperation {
    pub fn new(state: Arc<ControlState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Operation for CloseProjectOperation {
    type Input = CloseProject;
    type Output = ();

    async fn execute(&self, input: CloseProject, ctx: OperationContext) -> anyhow::Result<()> {
        let project = self.state.remove_project(&input.project_id).ok_or_else(|| anyhow::anyhow!("unknown project `{}`", input.project_id))?;

        // Best-effort: clear the active-workspace pointer if it pointed
        // under this project, mirroring the deletion pipeline's own
        // best-effort nested switch (spec.md open question #1 — this is
        // the second of the two sites that can emit `workspace:switched(null)`).
        if self.state.active_workspace().map(|p| p.starts_with(&project.path)).unwrap_or(false) {
            let _ = ctx.dispatch(crate::workspace::SwitchWorkspace::Auto { current_path: project.path.clone(), focus: false }).await;
        }

        let collected = ctx.hooks().collect::<std::path::PathBuf, ()>(UNREGISTER_PROJECT, project.path.clone()).await;
        for error in &collected.errors {
            tracing::warn!(project_id = %input.project_id, %error, "project unregister hook failed");
        }

        if input.remove_local_repo {
            self.state.filesystem.rm(&project.path).await?;
        }

        ctx.emit(DomainEvent::new(domain_events::PROJECT_CLOSED, serde_json::json!({ "projectId": input.project_id })));
        Ok(())
    }
}
