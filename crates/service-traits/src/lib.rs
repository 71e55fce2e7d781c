//! Trait interfaces for the collaborators hook handlers delegate to. The
//! dispatch core never calls these directly — only hooks registered by
//! `loom-control`'s operations do. Each trait has a `Noop*` implementation
//! so the control plane can start up before a real backend is wired in.

mod agent_server;
mod binary;
mod fs;
mod process;
mod ui_transport;
mod worktree;

pub use agent_server::{AgentServerManager, NoopAgentServerManager, RestartOutcome, ServerLifecycleCallback};
pub use binary::{BinaryExtensionManager, NoopBinaryExtensionManager, PreflightReport, ProgressCallback};
pub use fs::{Filesystem, NoopFilesystem, TokioFilesystem};
pub use process::{NoopProcessManager, ProcessManager, SystemProcessManager};
pub use ui_transport::{NoopUiTransport, UiChannelHandler, UiTransport, UiUnsubscribe};
pub use worktree::{GitWorktreeProvider, NoopWorktreeProvider, WorktreeInfo, WorktreeProvider};
