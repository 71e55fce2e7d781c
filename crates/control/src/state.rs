use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use loom_service_traits::{AgentServerManager, BinaryExtensionManager, Filesystem, ProcessManager, UiTransport, WorktreeProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub path: PathBuf,
}

/// Shared collaborator handles plus the small amount of bookkeeping state
/// (open projects, the currently focused workspace) that belongs to the
/// control plane itself rather than to any external collaborator.
///
/// Operations reach collaborators only through hooks the default module
/// (`DefaultControlModule`) registers over these — they never hold a
/// `ControlState` field of their own concrete type.
pub struct ControlState {
    pub worktrees: Arc<dyn WorktreeProvider>,
    pub filesystem: Arc<dyn Filesystem>,
    pub process_manager: Arc<dyn ProcessManager>,
    pub binaries: Arc<dyn BinaryExtensionManager>,
    pub agent_servers: Arc<dyn AgentServerManager>,
    pub ui: Arc<dyn UiTransport>,

    projects: Mutex<HashMap<String, Project>>,
    active_workspace: Mutex<Option<PathBuf>>,
}

impl ControlState {
    pub fn new(
        worktrees: Arc<dyn WorktreeProvider>,
        filesystem: Arc<dyn Filesystem>,
        process_manager: Arc<dyn ProcessManager>,
        binaries: Arc<dyn BinaryExtensionManager>,
        agent_servers: Arc<dyn AgentServerManager>,
        ui: Arc<dyn UiTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            worktrees,
            filesystem,
            process_manager,
            binaries,
            agent_servers,
            ui,
            projects: Mutex::new(HashMap::new()),
            active_workspace: Mutex::new(None),
        })
    }

    pub fn insert_project(&self, project: Project) {
        self.projects.lock().unwrap_or_else(|p| p.into_inner()).insert(project.id.clone(), project);
    }

    pub fn remove_project(&self, project_id: &str) -> Option<Project> {
        self.projects.lock().unwrap_or_else(|p| p.into_inner()).remove(project_id)
    }

    pub fn get_project(&self, project_id: &str) -> Option<Project> {
        self.projects.lock().unwrap_or_else(|p| p.into_inner()).get(project_id).cloned()
    }

    pub fn set_active_workspace(&self, path: Option<PathBuf>) {
        *self.active_workspace.lock().unwrap_or_else(|p| p.into_inner()) = path;
    }

    pub fn active_workspace(&self) -> Option<PathBuf> {
        self.active_workspace.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}
