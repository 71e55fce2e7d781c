use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use loom_dispatch::{DomainEvent, IntentKind, Operation, OperationContext};
use loom_protocol::domain_events;
use loom_service_traits::WorktreeInfo;
use serde::{Deserialize, Serialize};

use crate::state::ControlState;

pub const ENSURE_WORKSPACE: &str = "ensure";
pub const SWITCH_WORKSPACE: &str = "switch";
pub const GET_METADATA: &str = "get-metadata";
pub const SET_METADATA: &str = "set-metadata";
pub const GET_STATUS: &str = "status";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureWorkspaceInput {
    pub project_path: PathBuf,
    pub workspace_name: String,
}

async fn ensure_workspace(ctx: &OperationContext, input: EnsureWorkspaceInput, emit_created: bool) -> anyhow::Result<WorktreeInfo> {
    let collected = ctx.hooks().collect::<EnsureWorkspaceInput, WorktreeInfo>(ENSURE_WORKSPACE, input.clone()).await;
    let info = collected
        .results
        .into_iter()
        .next()
        .ok_or_else(|| collected.errors.into_iter().next().unwrap_or_else(|| anyhow::anyhow!("no worktree provider contributed a workspace")))?;

    if emit_created {
        ctx.emit(DomainEvent::new(
            domain_events::WORKSPACE_CREATED,
            serde_json::json!({ "projectPath": input.project_path, "workspaceName": input.workspace_name, "workspacePath": info.path, "branch": info.branch }),
        ));
    }
    Ok(info)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkspace(pub EnsureWorkspaceInput);

impl IntentKind for CreateWorkspace {
    type Output = WorktreeInfo;
    const TAG: &'static str = "workspace:create";
}

pub struct CreateWorkspaceOperation;

#[async_trait]
impl Operation for CreateWorkspaceOperation {
    type Input = CreateWorkspace;
    type Output = WorktreeInfo;

    async fn execute(&self, input: CreateWorkspace, ctx: OperationContext) -> anyhow::Result<WorktreeInfo> {
        ensure_workspace(&ctx, input.0, true).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWorkspace(pub EnsureWorkspaceInput);

impl IntentKind for OpenWorkspace {
    type Output = WorktreeInfo;
    const TAG: &'static str = "workspace:open";
}

pub struct OpenWorkspaceOperation;

#[async_trait]
impl Operation for OpenWorkspaceOperation {
    type Input = OpenWorkspace;
    type Output = WorktreeInfo;

    async fn execute(&self, input: OpenWorkspace, ctx: OperationContext) -> anyhow::Result<WorktreeInfo> {
        ensure_workspace(&ctx, input.0, false).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwitchWorkspace {
    Explicit { project_id: String, workspace_name: String, focus: bool },
    Auto { current_path: PathBuf, focus: bool },
}

impl IntentKind for SwitchWorkspace {
    type Output = ();
    const TAG: &'static str = "workspace:switch";
}

pub struct SwitchWorkspaceOperation {
    state: Arc<ControlState>,
}

impl SwitchWorkspaceOperation {
    pub fn new(state: Arc<ControlState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Operation for SwitchWorkspaceOperation {
    type Input = SwitchWorkspace;
    type Output = ();

    async fn execute(&self, input: SwitchWorkspace, ctx: OperationContext) -> anyhow::Result<()> {
        let (target, focus) = match input {
            SwitchWorkspace::Explicit { project_id, workspace_name, focus } => {
                let project = self.state.get_project(&project_id).ok_or_else(|| anyhow::anyhow!("unknown project `{project_id}`"))?;
                let info = ensure_workspace(&ctx, EnsureWorkspaceInput { project_path: project.path, workspace_name }, false).await?;
                (Some(info.path), focus)
            }
            SwitchWorkspace::Auto { current_path: _, focus } => (None, focus),
        };

        self.state.set_active_workspace(target.clone());

        let payload = target.as_ref().map(|p| serde_json::json!({ "workspacePath": p, "focus": focus })).unwrap_or(serde_json::Value::Null);
        ctx.emit(DomainEvent::new(domain_events::WORKSPACE_SWITCHED, payload));
        let collected = ctx.hooks().collect::<bool, ()>(SWITCH_WORKSPACE, focus).await;
        for error in &collected.errors {
            tracing::warn!(%error, "workspace switch hook failed");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetWorkspaceMetadata {
    pub workspace_path: PathBuf,
}

impl IntentKind for GetWorkspaceMetadata {
    type Output = BTreeMap<String, String>;
    const TAG: &'static str = "workspace:get-metadata";
}

pub struct GetWorkspaceMetadataOperation;

#[async_trait]
impl Operation for GetWorkspaceMetadataOperation {
    type Input = GetWorkspaceMetadata;
    type Output = BTreeMap<String, String>;

    async fn execute(&self, input: GetWorkspaceMetadata, ctx: OperationContext) -> anyhow::Result<BTreeMap<String, String>> {
        let collected = ctx.hooks().collect::<PathBuf, BTreeMap<String, String>>(GET_METADATA, input.workspace_path).await;
        Ok(collected.results.into_iter().next().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWorkspaceMetadata {
    pub workspace_path: PathBuf,
    pub key: String,
    pub value: Option<String>,
}

impl IntentKind for SetWorkspaceMetadata {
    type Output = ();
    const TAG: &'static str = "workspace:set-metadata";
}

pub struct SetWorkspaceMetadataOperation;

#[async_trait]
impl Operation for SetWorkspaceMetadataOperation {
    type Input = SetWorkspaceMetadata;
    type Output = ();

    async fn execute(&self, input: SetWorkspaceMetadata, ctx: OperationContext) -> anyhow::Result<()> {
        let collected = ctx.hooks().collect::<SetWorkspaceMetadata, ()>(SET_METADATA, input.clone()).await;
        if let Some(error) = collected.errors.into_iter().next() {
            return Err(error);
        }
        ctx.emit(DomainEvent::new(
            domain_events::WORKSPACE_METADATA_CHANGED,
            serde_json::json!({ "workspacePath": input.workspace_path, "key": input.key, "value": input.value }),
        ));
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceStatus {
    pub is_dirty: bool,
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetWorkspaceStatus {
    pub workspace_path: PathBuf,
}

impl IntentKind for GetWorkspaceStatus {
    type Output = WorkspaceStatus;
    const TAG: &'static str = "workspace:get-status";
}

pub struct GetWorkspaceStatusOperation;

#[async_trait]
impl Operation for GetWorkspaceStatusOperation {
    type Input = GetWorkspaceStatus;
    type Output = WorkspaceStatus;

    async fn execute(&self, input: GetWorkspaceStatus, ctx: OperationContext) -> anyhow::Result<WorkspaceStatus> {
        let collected = ctx.hooks().collect::<PathBuf, WorkspaceStatus>(GET_STATUS, input.workspace_path).await;
        let merged = collected.results.into_iter().fold(WorkspaceStatus::default(), |mut acc, contribution| {
            acc.is_dirty = acc.is_dirty || contribution.is_dirty;
            acc.agent = acc.agent.or(contribution.agent);
            acc
        });
        Ok(merged)
    }
}
