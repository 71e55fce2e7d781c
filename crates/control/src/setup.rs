//! The setup wizard (spec.md §4.7) and the two operations that bracket it:
//! `app:start` runs preflight checks and conditionally nests a `app:setup`
//! dispatch; `app:shutdown` tears the process down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use loom_dispatch::{DomainEvent, IntentKind, Operation, OperationContext};
use loom_protocol::domain_events;
use loom_service_traits::{PreflightReport, ProgressCallback};
use serde::{Deserialize, Serialize};

use crate::state::ControlState;

pub const SHOW_UI: &str = "show-ui";
pub const AGENT_SELECTION: &str = "agent-selection";
pub const SAVE_AGENT: &str = "save-agent";
pub const BINARY: &str = "binary";
pub const EXTENSIONS: &str = "extensions";
pub const HIDE_UI: &str = "hide-ui";

const PROGRESS_THROTTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSetup {
    pub needs_agent_selection: bool,
    pub configured_agent: Option<String>,
    pub missing_binaries: Vec<String>,
    pub needs_binary_download: bool,
    pub missing_extensions: Vec<String>,
    pub outdated_extensions: Vec<String>,
    pub needs_extensions: bool,
}

impl IntentKind for AppSetup {
    type Output = ();
    const TAG: &'static str = "app:setup";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupInstallInput {
    pub items: Vec<String>,
}

/// Closes over a throttled sink so a hook contributor can report percentage
/// progress without re-deriving the ≥100ms gate itself.
fn throttled_callback(ui: Arc<dyn loom_service_traits::UiTransport>, channel: &'static str) -> ProgressCallback {
    let last = Arc::new(Mutex::new(Instant::now() - PROGRESS_THROTTLE));
    Arc::new(move |fraction: f32| {
        let mut last = last.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        if now.duration_since(*last) >= PROGRESS_THROTTLE {
            *last = now;
            ui.send(channel, serde_json::json!({ "progress": fraction }));
        }
    })
}

pub struct SetupOperation {
    state: Arc<ControlState>,
}

impl SetupOperation {
    pub fn new(state: Arc<ControlState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Operation for SetupOperation {
    type Input = AppSetup;
    type Output = ();

    async fn execute(&self, input: AppSetup, ctx: OperationContext) -> anyhow::Result<()> {
        let result = self.run(&input, &ctx).await;
        if let Err(error) = &result {
            // `execute` is about to return `Err`, so `ctx.emit` (buffered,
            // published only on `Ok`) would silently drop this — publish it
            // directly so subscribers still observe the rejection.
            ctx.emit_immediate(DomainEvent::new(domain_events::SETUP_ERROR, serde_json::json!({ "message": error.to_string() })));
        }
        result
    }
}

impl SetupOperation {
    async fn run(&self, input: &AppSetup, ctx: &OperationContext) -> anyhow::Result<()> {
        ctx.hooks().collect::<(), ()>(SHOW_UI, ()).await;

        let mut selected_agent = input.configured_agent.clone();
        if input.needs_agent_selection {
            let collected = ctx.hooks().collect::<(), String>(AGENT_SELECTION, ()).await;
            selected_agent = collected.results.into_iter().next();
        }

        if let Some(agent) = &selected_agent {
            let collected = ctx.hooks().collect::<String, ()>(SAVE_AGENT, agent.clone()).await;
            if let Some(error) = collected.errors.into_iter().next() {
                return Err(error);
            }
        }

        if input.needs_binary_download {
            let on_progress = throttled_callback(Arc::clone(&self.state.ui), "api:lifecycle:setup-progress");
            let collected = ctx
                .hooks()
                .collect::<(SetupInstallInput, ProgressCallback), ()>(BINARY, (SetupInstallInput { items: input.missing_binaries.clone() }, on_progress))
                .await;
            if let Some(error) = collected.errors.into_iter().next() {
                return Err(error);
            }
        }

        if input.needs_extensions {
            let on_progress = throttled_callback(Arc::clone(&self.state.ui), "api:lifecycle:setup-progress");
            let mut items = input.missing_extensions.clone();
            items.extend(input.outdated_extensions.iter().cloned());
            let collected = ctx.hooks().collect::<(SetupInstallInput, ProgressCallback), ()>(EXTENSIONS, (SetupInstallInput { items }, on_progress)).await;
            if let Some(error) = collected.errors.into_iter().next() {
                return Err(error);
            }
        }

        ctx.hooks().collect::<(), ()>(HIDE_UI, ()).await;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppStart;

impl IntentKind for AppStart {
    type Output = ();
    const TAG: &'static str = "app:start";
}

pub const PREFLIGHT: &str = "preflight";

pub struct AppStartOperation {
    state: Arc<ControlState>,
}

impl AppStartOperation {
    pub fn new(state: Arc<ControlState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Operation for AppStartOperation {
    type Input = AppStart;
    type Output = ();

    async fn execute(&self, _input: AppStart, ctx: OperationContext) -> anyhow::Result<()> {
        let report = self.state.binaries.preflight().await.unwrap_or_else(|error| {
            tracing::warn!(%error, "preflight check failed, assuming setup is required");
            PreflightReport { success: false, needs_download: true, missing_extensions: Vec::new(), outdated_extensions: Vec::new() }
        });

        if !report.success || report.needs_download || !report.missing_extensions.is_empty() || !report.outdated_extensions.is_empty() {
            let setup = AppSetup {
                needs_agent_selection: !report.success,
                configured_agent: None,
                missing_binaries: if report.needs_download { vec!["agent-server".to_string()] } else { Vec::new() },
                needs_binary_download: report.needs_download,
                missing_extensions: report.missing_extensions.clone(),
                outdated_extensions: report.outdated_extensions.clone(),
                needs_extensions: !report.missing_extensions.is_empty() || !report.outdated_extensions.is_empty(),
            };
            ctx.dispatch(setup).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppShutdown;

impl IntentKind for AppShutdown {
    type Output = ();
    const TAG: &'static str = "app:shutdown";
}

pub struct AppShutdownOperation {
    state: Arc<ControlState>,
    shutdowns: AtomicU64,
}

impl AppShutdownOperation {
    pub fn new(state: Arc<ControlState>) -> Self {
        Self { state, shutdowns: AtomicU64::new(0) }
    }
}

#[async_trait]
impl Operation for AppShutdownOperation {
    type Input = AppShutdown;
    type Output = ();

    async fn execute(&self, _input: AppShutdown, _ctx: OperationContext) -> anyhow::Result<()> {
        let count = self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if count > 0 {
            tracing::warn!(count, "app:shutdown dispatched more than once");
        }
        let projects = self.state.active_workspace();
        tracing::debug!(active_workspace = ?projects, "shutting down");
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingUi {
        sent: Mutex<u32>,
    }

    #[async_trait]
    impl loom_service_traits::UiTransport for RecordingUi {
        async fn invoke(&self, _channel: &str, _payload: serde_json::Value) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        fn on(&self, _channel: &str, _handler: loom_service_traits::UiChannelHandler) -> loom_service_traits::UiUnsubscribe {
            Box::new(|| {})
        }
        fn send(&self, _channel: &str, _payload: serde_json::Value) {
            *self.sent.lock().unwrap() += 1;
        }
    }

    #[test]
    fn throttled_callback_drops_calls_inside_the_window() {
        let recorder = Arc::new(RecordingUi { sent: Mutex::new(0) });
        let ui: Arc<dyn loom_service_traits::UiTransport> = Arc::clone(&recorder) as Arc<dyn loom_service_traits::UiTransport>;
        let callback = throttled_callback(ui, "test-channel");

        callback(0.1);
        callback(0.2);
        callback(0.3);

        assert_eq!(*recorder.sent.lock().unwrap(), 1);
    }
}
