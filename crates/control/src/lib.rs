//! Concrete operations implementing the control plane's named intents
//! (spec.md §4.6–4.9), the collaborator-backed default module that wires
//! them to real services, and the small amount of bookkeeping state
//! (`ControlState`) those operations share.

mod agent;
mod deletion;
mod ids;
mod module;
mod project;
mod setup;
mod state;
mod workspace;

pub use agent::{AgentSession, GetAgentSession, GetAgentSessionOperation, RestartAgent, RestartAgentOperation};
pub use deletion::{
    DeleteWorkspace, DeleteWorkspaceOperation, DeletionController, DeletionProgress, DeletionStarted, ProgressCallback as DeletionProgressCallback, ResolveWorkspaceInput,
    RetryChoice, StepStatus, WorkspaceTarget,
};
pub use ids::derive_project_id;
pub use module::DefaultControlModule;
pub use project::{CloseProject, CloseProjectOperation, OpenProject, OpenProjectOperation};
pub use setup::{AppShutdown, AppShutdownOperation, AppSetup, AppStart, AppStartOperation, SetupInstallInput, SetupOperation};
pub use state::{ControlState, Project};
pub use workspace::{
    CreateWorkspace, CreateWorkspaceOperation, EnsureWorkspaceInput, GetWorkspaceMetadata, GetWorkspaceMetadataOperation, GetWorkspaceStatus, GetWorkspaceStatusOperation,
    OpenWorkspace, OpenWorkspaceOperation, SetWorkspaceMetadata, SetWorkspaceMetadataOperation, SwitchWorkspace, SwitchWorkspaceOperation, WorkspaceStatus,
};

/// Registers the nine named operations (§6) against `dispatcher`, plus the
/// default module that wires their hook points to `state`'s collaborators.
/// Returns the `DeletionController` so the gateway layer can route
/// `signalRetry`/`signalDismiss` IPC replies and subscribe to per-workspace
/// deletion progress — neither travels through the dispatcher's own event
/// bus (see `deletion` module docs).
///
/// Callers that need a non-default wiring (tests, alternate collaborators)
/// should call `Dispatcher::register_operation`/`register_module` directly
/// instead of this convenience function.
pub fn install(dispatcher: &std::sync::Arc<loom_dispatch::Dispatcher>, state: std::sync::Arc<ControlState>) -> std::sync::Arc<DeletionController> {
    dispatcher.register_operation::<OpenProject, _>(OpenProjectOperation::new(std::sync::Arc::clone(&state)));
    dispatcher.register_operation::<CloseProject, _>(CloseProjectOperation::new(std::sync::Arc::clone(&state)));
    dispatcher.register_operation::<CreateWorkspace, _>(CreateWorkspaceOperation);
    dispatcher.register_operation::<OpenWorkspace, _>(OpenWorkspaceOperation);
    dispatcher.register_operation::<SwitchWorkspace, _>(SwitchWorkspaceOperation::new(std::sync::Arc::clone(&state)));
    dispatcher.register_operation::<GetWorkspaceMetadata, _>(GetWorkspaceMetadataOperation);
    dispatcher.register_operation::<SetWorkspaceMetadata, _>(SetWorkspaceMetadataOperation);
    dispatcher.register_operation::<GetWorkspaceStatus, _>(GetWorkspaceStatusOperation);
    dispatcher.register_operation::<RestartAgent, _>(RestartAgentOperation);
    dispatcher.register_operation::<GetAgentSession, _>(GetAgentSessionOperation);
    dispatcher.register_operation::<AppStart, _>(AppStartOperation::new(std::sync::Arc::clone(&state)));
    dispatcher.register_operation::<AppSetup, _>(SetupOperation::new(std::sync::Arc::clone(&state)));
    dispatcher.register_operation::<AppShutdown, _>(AppShutdownOperation::new(std::sync::Arc::clone(&state)));

    let controller = DeletionController::new();
    dispatcher.register_operation::<DeleteWorkspace, _>(DeleteWorkspaceOperation::new(std::sync::Arc::clone(&controller)));

    dispatcher.register_module(std::sync::Arc::new(DefaultControlModule::new(state)));
    controller
}
