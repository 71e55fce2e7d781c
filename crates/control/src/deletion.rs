//! The deletion operation (spec.md §4.6, the hardest subsystem): shutdown
//! of runtime resources, OS process release, worktree removal, and a
//! user-gated retry loop when the filesystem reports the target is busy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loom_dispatch::{DomainEvent, IntentKind, Operation, OperationContext};
use loom_protocol::domain_events;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::workspace::SwitchWorkspace;

pub const RESOLVE_PROJECT: &str = "resolve-project";
pub const RESOLVE_WORKSPACE: &str = "resolve-workspace";
pub const SHUTDOWN: &str = "shutdown";
pub const RELEASE: &str = "release";
pub const DELETE: &str = "delete";
pub const DETECT: &str = "detect";
pub const FLUSH: &str = "flush";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteWorkspace {
    pub project_id: String,
    pub workspace_name: String,
    pub keep_branch: bool,
    pub force: bool,
    pub remove_worktree: bool,
    #[serde(default)]
    pub skip_switch: bool,
    pub workspace_path: Option<PathBuf>,
    pub project_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionStarted {
    pub started: bool,
}

impl IntentKind for DeleteWorkspace {
    type Output = DeletionStarted;
    const TAG: &'static str = "workspace:delete";
}

// ── Hook contribution shapes ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveWorkspaceInput {
    pub project_path: PathBuf,
    pub workspace_name: String,
}

/// What `shutdown`/`release`/`delete`/`detect` handlers need to act — the
/// bare `workspace_path` alone isn't enough to shell out `git worktree
/// remove`, which also wants the project root, the workspace name, and
/// whether to keep the branch. Each hook point gets its own input variant
/// rather than threading one ever-growing context through every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceTarget {
    pub project_path: PathBuf,
    pub workspace_name: String,
    pub workspace_path: PathBuf,
    pub keep_branch: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShutdownContribution {
    pub was_active: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageError {
    pub error: Option<String>,
}

// ── Progress snapshot ────────────────────────────────────────────────────────

pub const STEP_KILL_TERMINALS: &str = "kill-terminals";
pub const STEP_STOP_SERVER: &str = "stop-server";
pub const STEP_CLEANUP_VSCODE: &str = "cleanup-vscode";
pub const STEP_DETECTING_BLOCKERS: &str = "detecting-blockers";
pub const STEP_KILLING_BLOCKERS: &str = "killing-blockers";
pub const STEP_CLEANUP_WORKSPACE: &str = "cleanup-workspace";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionProgress {
    pub workspace_path: PathBuf,
    pub steps: HashMap<String, StepStatus>,
    pub has_errors: bool,
    pub blocking_processes: Option<Vec<u32>>,
}

impl DeletionProgress {
    fn new(workspace_path: PathBuf) -> Self {
        let mut steps = HashMap::new();
        for step in [STEP_KILL_TERMINALS, STEP_STOP_SERVER, STEP_CLEANUP_VSCODE, STEP_DETECTING_BLOCKERS, STEP_KILLING_BLOCKERS, STEP_CLEANUP_WORKSPACE] {
            steps.insert(step.to_string(), StepStatus::Pending);
        }
        Self { workspace_path, steps, has_errors: false, blocking_processes: None }
    }

    fn set(&mut self, step: &str, status: StepStatus) {
        self.steps.insert(step.to_string(), status);
    }
}

pub type ProgressCallback = Arc<dyn Fn(&DeletionProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryChoice {
    Retry,
    Dismiss,
}

/// The external control surface for the per-workspace retry wait, plus the
/// progress-subscriber table. Neither is a domain event: progress streams
/// during the operation, and the retry choice is a one-shot reply — both
/// would be lost if they only flowed through the buffered event mechanism
/// the dispatcher uses for domain events (those publish only once the
/// whole operation has resolved).
#[derive(Default)]
pub struct DeletionController {
    pending_retries: Mutex<HashMap<PathBuf, oneshot::Sender<RetryChoice>>>,
    progress_subscribers: Mutex<HashMap<PathBuf, Vec<ProgressCallback>>>,
}

impl DeletionController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_progress(self: &Arc<Self>, workspace_path: &Path, callback: ProgressCallback) {
        self.progress_subscribers.lock().unwrap_or_else(|p| p.into_inner()).entry(workspace_path.to_path_buf()).or_default().push(callback);
    }

    fn report(&self, progress: &DeletionProgress) {
        let subscribers = self.progress_subscribers.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(list) = subscribers.get(&progress.workspace_path) {
            for callback in list {
                callback(progress);
            }
        }
    }

    /// Registers the wait slot and blocks until `signal_retry`/`signal_dismiss`
    /// resolves it. Only one outstanding wait per path is supported — a
    /// second call replaces the first, whose sender is dropped (its await
    /// resolves to a disconnect, treated as dismiss by the caller).
    pub async fn wait_for_retry_choice(&self, workspace_path: &Path) -> RetryChoice {
        let (tx, rx) = oneshot::channel();
        self.pending_retries.lock().unwrap_or_else(|p| p.into_inner()).insert(workspace_path.to_path_buf(), tx);
        rx.await.unwrap_or(RetryChoice::Dismiss)
    }

    pub fn signal_retry(&self, workspace_path: &Path) {
        if let Some(tx) = self.pending_retries.lock().unwrap_or_else(|p| p.into_inner()).remove(workspace_path) {
            let _ = tx.send(RetryChoice::Retry);
        }
    }

    pub fn signal_dismiss(&self, workspace_path: &Path) {
        if let Some(tx) = self.pending_retries.lock().unwrap_or_else(|p| p.into_inner()).remove(workspace_path) {
            let _ = tx.send(RetryChoice::Dismiss);
        }
    }

    pub fn has_pending_retry(&self, workspace_path: &Path) -> bool {
        self.pending_retries.lock().unwrap_or_else(|p| p.into_inner()).contains_key(workspace_path)
    }
}

pub struct DeleteWorkspaceOperation {
    controller: Arc<DeletionController>,
}

impl DeleteWorkspaceOperation {
    pub fn new(controller: Arc<DeletionController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl Operation for DeleteWorkspaceOperation {
    type Input = DeleteWorkspace;
    type Output = DeletionStarted;

    async fn execute(&self, input: DeleteWorkspace, ctx: OperationContext) -> anyhow::Result<DeletionStarted> {
        let controller = Arc::clone(&self.controller);
        let force = input.force;

        // Resolve.
        let project_path = match &input.project_path {
            Some(path) => path.clone(),
            None => {
                let collected = ctx.hooks().collect::<DeleteWorkspace, PathBuf>(RESOLVE_PROJECT, input.clone()).await;
                collected.results.into_iter().next().ok_or_else(|| anyhow::anyhow!("could not resolve project path for `{}`", input.project_id))?
            }
        };
        let workspace_path = match &input.workspace_path {
            Some(path) => path.clone(),
            None => {
                let resolve_input = ResolveWorkspaceInput { project_path: project_path.clone(), workspace_name: input.workspace_name.clone() };
                let collected = ctx.hooks().collect::<ResolveWorkspaceInput, PathBuf>(RESOLVE_WORKSPACE, resolve_input).await;
                collected.results.into_iter().next().ok_or_else(|| anyhow::anyhow!("could not resolve workspace path for `{}`", input.workspace_name))?
            }
        };

        let target = WorkspaceTarget {
            project_path: project_path.clone(),
            workspace_name: input.workspace_name.clone(),
            workspace_path: workspace_path.clone(),
            keep_branch: input.keep_branch,
        };

        let mut progress = DeletionProgress::new(workspace_path.clone());
        let result = self.run_pipeline(&input, &target, &ctx, &mut progress, force).await;
        let deleted = matches!(result, Ok(true));

        if force || deleted {
            ctx.emit(DomainEvent::new(
                domain_events::WORKSPACE_DELETED,
                serde_json::json!({
                    "workspacePath": workspace_path,
                    "projectId": input.project_id,
                    "workspaceName": input.workspace_name,
                    "projectPath": project_path,
                }),
            ));
        }
        controller.report(&progress);

        result.map(|_| DeletionStarted { started: true })
    }
}

impl DeleteWorkspaceOperation {
    /// `Ok(true)` means the worktree was actually removed (or never needed
    /// to be) and `workspace:deleted` should fire in non-force mode;
    /// `Ok(false)` means the pipeline resolved without deleting anything
    /// (shutdown failed, or the user dismissed the retry loop) — still a
    /// non-thrown result per §7.4's "user-gated outcome", just one that
    /// must not emit `workspace:deleted` unless `force` is set.
    async fn run_pipeline(
        &self,
        input: &DeleteWorkspace,
        target: &WorkspaceTarget,
        ctx: &OperationContext,
        progress: &mut DeletionProgress,
        force: bool,
    ) -> anyhow::Result<bool> {
        let workspace_path = target.workspace_path.as_path();

        // Shutdown.
        progress.set(STEP_KILL_TERMINALS, StepStatus::InProgress);
        progress.set(STEP_STOP_SERVER, StepStatus::InProgress);
        self.controller.report(progress);

        let shutdown = ctx.hooks().collect::<WorkspaceTarget, ShutdownContribution>(SHUTDOWN, target.clone()).await;
        let was_active = shutdown.results.iter().any(|c| c.was_active);
        let shutdown_errors: Vec<String> = shutdown.results.iter().filter_map(|c| c.error.clone()).chain(shutdown.errors.iter().map(|e| e.to_string())).collect();

        progress.set(STEP_KILL_TERMINALS, StepStatus::Done);
        progress.set(STEP_STOP_SERVER, StepStatus::Done);
        progress.set(STEP_CLEANUP_VSCODE, StepStatus::Done);

        if was_active && !input.skip_switch {
            let _ = ctx.dispatch(SwitchWorkspace::Auto { current_path: workspace_path.to_path_buf(), focus: true }).await;
        }

        if !shutdown_errors.is_empty() && !force {
            // A non-force shutdown failure is a user-gated outcome, not a
            // thrown error: resolve `Ok` with `has_errors` set and let the
            // caller skip the `workspace:deleted` emission.
            progress.has_errors = true;
            self.controller.report(progress);
            return Ok(false);
        }

        if !input.remove_worktree {
            progress.set(STEP_CLEANUP_WORKSPACE, StepStatus::Done);
            self.controller.report(progress);
            return Ok(true);
        }

        // Release.
        let release = ctx.hooks().collect::<WorkspaceTarget, StageError>(RELEASE, target.clone()).await;
        for err in release.results.into_iter().filter_map(|c| c.error) {
            tracing::debug!(workspace = %workspace_path.display(), error = %err, "release stage reported a non-fatal error");
        }

        // Delete.
        progress.set(STEP_CLEANUP_WORKSPACE, StepStatus::InProgress);
        self.controller.report(progress);
        let mut delete_errors = self.try_delete(target, ctx).await;

        if delete_errors.is_empty() {
            progress.set(STEP_CLEANUP_WORKSPACE, StepStatus::Done);
            self.controller.report(progress);
            return Ok(true);
        }

        if force {
            progress.set(STEP_CLEANUP_WORKSPACE, StepStatus::Error);
            progress.has_errors = true;
            self.controller.report(progress);
            return Ok(false);
        }

        // Retry loop.
        loop {
            progress.set(STEP_DETECTING_BLOCKERS, StepStatus::InProgress);
            self.controller.report(progress);
            let detect = ctx.hooks().collect::<WorkspaceTarget, Vec<u32>>(DETECT, target.clone()).await;
            let blockers: Vec<u32> = detect.results.into_iter().flatten().collect();
            progress.set(STEP_DETECTING_BLOCKERS, StepStatus::Done);
            progress.blocking_processes = if blockers.is_empty() { None } else { Some(blockers.clone()) };
            progress.has_errors = true;
            self.controller.report(progress);

            let choice = self.controller.wait_for_retry_choice(workspace_path).await;
            if choice == RetryChoice::Dismiss {
                // Dismissal is a user-gated outcome, not a thrown error: the
                // dispatch still resolves `{started:true}`, just with
                // `has_errors` left set and no `workspace:deleted` emitted.
                return Ok(false);
            }

            progress.set(STEP_KILLING_BLOCKERS, StepStatus::InProgress);
            self.controller.report(progress);
            let _ = ctx.hooks().collect::<Vec<u32>, ()>(FLUSH, blockers).await;
            progress.set(STEP_KILLING_BLOCKERS, StepStatus::Done);

            progress.set(STEP_CLEANUP_WORKSPACE, StepStatus::InProgress);
            self.controller.report(progress);
            delete_errors = self.try_delete(target, ctx).await;
            if delete_errors.is_empty() {
                progress.set(STEP_CLEANUP_WORKSPACE, StepStatus::Done);
                progress.has_errors = false;
                self.controller.report(progress);
                return Ok(true);
            }
        }
    }

    async fn try_delete(&self, target: &WorkspaceTarget, ctx: &OperationContext) -> Vec<String> {
        let collected = ctx.hooks().collect::<WorkspaceTarget, StageError>(DELETE, target.clone()).await;
        collected.results.into_iter().filter_map(|c| c.error).chain(collected.errors.into_iter().map(|e| e.to_string())).collect()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retry_choice_resolves_the_wait() {
        let controller = DeletionController::new();
        let path = PathBuf::from("/tmp/ws");
        let controller2 = Arc::clone(&controller);
        let path2 = path.clone();
        let waiter = tokio::spawn(async move { controller2.wait_for_retry_choice(&path2).await });
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(controller.has_pending_retry(&path));
        controller.signal_retry(&path);
        assert_eq!(waiter.await.unwrap(), RetryChoice::Retry);
    }

    #[tokio::test]
    async fn dismiss_resolves_to_dismiss_and_clears_the_slot() {
        let controller = DeletionController::new();
        let path = PathBuf::from("/tmp/ws2");
        let controller2 = Arc::clone(&controller);
        let path2 = path.clone();
        let waiter = tokio::spawn(async move { controller2.wait_for_retry_choice(&path2).await });
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        controller.signal_dismiss(&path);
        assert_eq!(waiter.await.unwrap(), RetryChoice::Dismiss);
        assert!(!controller.has_pending_retry(&path));
    }

    #[test]
    fn progress_starts_with_every_step_pending() {
        let progress = DeletionProgress::new(PathBuf::from("/tmp/ws"));
        assert_eq!(progress.steps.len(), 6);
        assert!(progress.steps.values().all(|s| *s == StepStatus::Pending));
    }

    fn hook_fn<In, Out>(f: impl Fn(In) -> anyhow::Result<Option<Out>> + Send + Sync + 'static) -> loom_dispatch::HookFn<In, Out>
    where
        In: Send + 'static,
        Out: Send + 'static,
    {
        Arc::new(move |input| {
            let result = f(input);
            Box::pin(async move { result })
        })
    }

    fn delete_input(workspace_path: PathBuf, force: bool) -> DeleteWorkspace {
        DeleteWorkspace {
            project_id: "proj".to_string(),
            workspace_name: "feature-x".to_string(),
            keep_branch: false,
            force,
            remove_worktree: true,
            skip_switch: true,
            workspace_path: Some(workspace_path),
            project_path: Some(PathBuf::from("/tmp/proj")),
        }
    }

    #[tokio::test]
    async fn dismissing_a_stuck_delete_resolves_started_with_no_deleted_event() {
        let dispatcher = loom_dispatch::Dispatcher::new();
        let controller = DeletionController::new();
        dispatcher.register_operation::<DeleteWorkspace, _>(DeleteWorkspaceOperation::new(Arc::clone(&controller)));
        dispatcher.hooks().register::<WorkspaceTarget, StageError>(
            "workspace:delete",
            DELETE,
            hook_fn(|_| Ok(Some(StageError { error: Some("file busy".to_string()) }))),
        );
        dispatcher.hooks().register::<WorkspaceTarget, Vec<u32>>("workspace:delete", DETECT, hook_fn(|_| Ok(Some(vec![4242]))));

        let deleted_events = Arc::new(Mutex::new(0u32));
        let deleted_events2 = Arc::clone(&deleted_events);
        dispatcher.subscribe(
            domain_events::WORKSPACE_DELETED,
            Arc::new(move |_event: &DomainEvent| {
                *deleted_events2.lock().unwrap_or_else(|p| p.into_inner()) += 1;
                Ok(())
            }),
        );

        let workspace_path = PathBuf::from("/tmp/ws-dismiss");
        let waiter_controller = Arc::clone(&controller);
        let waiter_path = workspace_path.clone();
        let dismisser = tokio::spawn(async move {
            loop {
                if waiter_controller.has_pending_retry(&waiter_path) {
                    waiter_controller.signal_dismiss(&waiter_path);
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
        });

        let outcome = dispatcher.dispatch(delete_input(workspace_path, false)).await.unwrap();
        dismisser.await.unwrap();

        assert_eq!(outcome, Some(DeletionStarted { started: true }));
        assert_eq!(*deleted_events.lock().unwrap_or_else(|p| p.into_inner()), 0);
    }

    #[tokio::test]
    async fn force_delete_emits_deleted_even_when_the_delete_hook_errors() {
        let dispatcher = loom_dispatch::Dispatcher::new();
        let controller = DeletionController::new();
        dispatcher.register_operation::<DeleteWorkspace, _>(DeleteWorkspaceOperation::new(Arc::clone(&controller)));
        dispatcher.hooks().register::<WorkspaceTarget, StageError>(
            "workspace:delete",
            DELETE,
            hook_fn(|_| Ok(Some(StageError { error: Some("file busy".to_string()) }))),
        );

        let payloads = Arc::new(Mutex::new(Vec::new()));
        let payloads2 = Arc::clone(&payloads);
        dispatcher.subscribe(
            domain_events::WORKSPACE_DELETED,
            Arc::new(move |event: &DomainEvent| {
                payloads2.lock().unwrap_or_else(|p| p.into_inner()).push(event.payload.clone());
                Ok(())
            }),
        );

        let workspace_path = PathBuf::from("/tmp/ws-force");
        let outcome = dispatcher.dispatch(delete_input(workspace_path.clone(), true)).await.unwrap();

        assert_eq!(outcome, Some(DeletionStarted { started: true }));
        let payloads = payloads.lock().unwrap_or_else(|p| p.into_inner());
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["workspacePath"], serde_json::json!(workspace_path));
        assert_eq!(payloads[0]["workspaceName"], serde_json::json!("feature-x"));
        assert_eq!(payloads[0]["projectPath"], serde_json::json!("/tmp/proj"));
    }
}
