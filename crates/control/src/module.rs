//! Wires every named hook point to the real collaborators held in
//! `ControlState`. This is the one place in the crate that is allowed to
//! know about `GitWorktreeProvider`/`SystemProcessManager`/etc. concretely —
//! everywhere else only ever sees the `loom-service-traits` interfaces.

use std::path::PathBuf;
use std::sync::Arc;

use loom_dispatch::{HookRegistry, Module};

use crate::agent::RESTART_AGENT;
use crate::deletion::{ShutdownContribution, StageError, DELETE, DETECT, FLUSH, RELEASE, RESOLVE_PROJECT, RESOLVE_WORKSPACE, SHUTDOWN};
use crate::project::{REGISTER_PROJECT, UNREGISTER_PROJECT, VALIDATE_PROJECT};
use crate::setup::{BINARY, EXTENSIONS};
use crate::state::ControlState;
use crate::workspace::{EnsureWorkspaceInput, ENSURE_WORKSPACE, GET_METADATA, GET_STATUS, SET_METADATA, SWITCH_WORKSPACE};

pub struct DefaultControlModule {
    state: Arc<ControlState>,
}

impl DefaultControlModule {
    pub fn new(state: Arc<ControlState>) -> Self {
        Self { state }
    }
}

impl Module for DefaultControlModule {
    fn name(&self) -> &'static str {
        "loom-control/default"
    }

    fn install_hooks(&self, registry: &HookRegistry) {
        let state = Arc::clone(&self.state);
        registry.register::<PathBuf, ()>(
            "project:open",
            VALIDATE_PROJECT,
            Arc::new(move |path| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    state.worktrees.validate_repository(&path).await?;
                    Ok(None)
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<PathBuf, ()>(
            "project:open",
            REGISTER_PROJECT,
            Arc::new(move |path| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    state.worktrees.register_project(&path).await?;
                    Ok(None)
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<PathBuf, ()>(
            "project:close",
            UNREGISTER_PROJECT,
            Arc::new(move |path| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    state.worktrees.unregister_project(&path).await?;
                    Ok(None)
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<crate::deletion::DeleteWorkspace, PathBuf>(
            "workspace:delete",
            RESOLVE_PROJECT,
            Arc::new(move |input| {
                let state = Arc::clone(&state);
                Box::pin(async move { Ok(state.get_project(&input.project_id).map(|p| p.path)) })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<crate::deletion::ResolveWorkspaceInput, PathBuf>(
            "workspace:delete",
            RESOLVE_WORKSPACE,
            Arc::new(move |input| {
                let state = Arc::clone(&state);
                Box::pin(async move { Ok(Some(state.worktrees.ensure_workspace_registered(&input.project_path, &input.workspace_name).await?.path)) })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<bool, ()>(
            "workspace:switch",
            SWITCH_WORKSPACE,
            Arc::new(move |focus| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    state.ui.send("workspace:focus-changed", serde_json::json!({ "focus": focus }));
                    Ok(None)
                })
            }),
        );

        for operation_id in ["workspace:create", "workspace:open", "workspace:switch"] {
            let state = Arc::clone(&self.state);
            registry.register::<EnsureWorkspaceInput, loom_service_traits::WorktreeInfo>(
                operation_id,
                ENSURE_WORKSPACE,
                Arc::new(move |input| {
                    let state = Arc::clone(&state);
                    Box::pin(async move { Ok(Some(state.worktrees.ensure_workspace_registered(&input.project_path, &input.workspace_name).await?)) })
                }),
            );
        }

        let state = Arc::clone(&self.state);
        registry.register::<PathBuf, std::collections::BTreeMap<String, String>>(
            "workspace:get-metadata",
            GET_METADATA,
            Arc::new(move |path| {
                let state = Arc::clone(&state);
                Box::pin(async move { Ok(Some(state.worktrees.get_metadata(&path).await?)) })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<crate::workspace::SetWorkspaceMetadata, ()>(
            "workspace:set-metadata",
            SET_METADATA,
            Arc::new(move |input| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    state.worktrees.set_metadata(&input.workspace_path, &input.key, input.value.as_deref()).await?;
                    Ok(None)
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<PathBuf, crate::workspace::WorkspaceStatus>(
            "workspace:get-status",
            GET_STATUS,
            Arc::new(move |path| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    let metadata = state.worktrees.get_metadata(&path).await?;
                    Ok(Some(crate::workspace::WorkspaceStatus { is_dirty: false, agent: metadata.get("agent").cloned() }))
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<PathBuf, loom_service_traits::RestartOutcome>(
            "agent:restart",
            RESTART_AGENT,
            Arc::new(move |path| {
                let state = Arc::clone(&state);
                Box::pin(async move { Ok(Some(state.agent_servers.restart_server(&path).await)) })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<crate::deletion::WorkspaceTarget, ShutdownContribution>(
            "workspace:delete",
            SHUTDOWN,
            Arc::new(move |target| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    let was_active = state.active_workspace().as_deref() == Some(target.workspace_path.as_path());
                    let error = state.agent_servers.stop_server(&target.workspace_path).await.err().map(|e| e.to_string());
                    Ok(Some(ShutdownContribution { was_active, error }))
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<crate::deletion::WorkspaceTarget, StageError>(
            "workspace:delete",
            RELEASE,
            Arc::new(move |target| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    let blockers = state.process_manager.detect_blockers(&target.workspace_path).await.unwrap_or_default();
                    if blockers.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some(StageError { error: Some(format!("{} process(es) still hold the workspace open", blockers.len())) }))
                    }
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<crate::deletion::WorkspaceTarget, StageError>(
            "workspace:delete",
            DELETE,
            Arc::new(move |target| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    match state.worktrees.remove_workspace(&target.project_path, &target.workspace_name, target.keep_branch).await {
                        Ok(()) => Ok(None),
                        Err(error) => Ok(Some(StageError { error: Some(error.to_string()) })),
                    }
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<crate::deletion::WorkspaceTarget, Vec<u32>>(
            "workspace:delete",
            DETECT,
            Arc::new(move |target| {
                let state = Arc::clone(&state);
                Box::pin(async move { Ok(Some(state.process_manager.detect_blockers(&target.workspace_path).await?)) })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<Vec<u32>, ()>(
            "workspace:delete",
            FLUSH,
            Arc::new(move |pids| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    state.process_manager.kill_processes(&pids).await?;
                    Ok(None)
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<(crate::setup::SetupInstallInput, loom_service_traits::ProgressCallback), ()>(
            "app:setup",
            BINARY,
            Arc::new(move |(_input, on_progress)| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    state.binaries.download_binary(on_progress).await?;
                    Ok(None)
                })
            }),
        );

        let state = Arc::clone(&self.state);
        registry.register::<(crate::setup::SetupInstallInput, loom_service_traits::ProgressCallback), ()>(
            "app:setup",
            EXTENSIONS,
            Arc::new(move |(input, on_progress)| {
                let state = Arc::clone(&state);
                Box::pin(async move {
                    state.binaries.install(input.items, on_progress).await?;
                    Ok(None)
                })
            }),
        );
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use loom_dispatch::Dispatcher;

    #[tokio::test]
    async fn installs_hooks_without_panicking() {
        let state = ControlState::new(
            Arc::new(loom_service_traits::NoopWorktreeProvider),
            Arc::new(loom_service_traits::NoopFilesystem),
            Arc::new(loom_service_traits::NoopProcessManager),
            Arc::new(loom_service_traits::NoopBinaryExtensionManager),
            Arc::new(loom_service_traits::NoopAgentServerManager),
            Arc::new(loom_service_traits::NoopUiTransport),
        );
        let dispatcher = Dispatcher::new();
        dispatcher.register_module(Arc::new(DefaultControlModule::new(state)));
    }
}
