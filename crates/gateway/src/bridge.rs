use std::path::Path;
use std::sync::Arc;

use loom_control::{DeletionController, DeletionProgress};
use loom_dispatch::{Dispatcher, DomainEvent};
use loom_protocol::{EventFrame, channels, domain_events};

use crate::registry::MethodRegistry;
use crate::state::GatewayState;

const BRIDGED_EVENTS: &[&str] = &[
    domain_events::PROJECT_OPENED,
    domain_events::PROJECT_CLOSED,
    domain_events::WORKSPACE_CREATED,
    domain_events::WORKSPACE_DELETED,
    domain_events::WORKSPACE_SWITCHED,
    domain_events::WORKSPACE_METADATA_CHANGED,
    domain_events::AGENT_RESTARTED,
    domain_events::SETUP_ERROR,
    domain_events::WORKSPACE_MCP_ATTACHED,
];

/// Subscribes `state` to every bridged domain event type and fans each one
/// out to every connected client as an `EventFrame`, the way
/// `moltis_gateway::broadcast::broadcast` pushes to every `ConnectedClient`.
/// Call once, after `loom_control::install` has registered its operations
/// on `dispatcher`.
pub fn install_event_bridge(dispatcher: &Arc<Dispatcher>, state: &Arc<GatewayState>) {
    for event_type in BRIDGED_EVENTS {
        let state = Arc::clone(state);
        dispatcher.subscribe(
            event_type,
            Arc::new(move |event: &DomainEvent| {
                let frame = EventFrame::new(event.event_type, Some(event.payload.clone()), state.next_seq());
                let json = serde_json::to_string(&frame)?;
                state.broadcast(&json);
                Ok(())
            }),
        );
    }
}

/// Registers the three methods that let a UI client drive the deletion
/// retry loop without going through a dispatched intent: these resolve the
/// `DeletionController`'s per-path oneshot waits and progress subscribers,
/// neither of which travels through `Dispatcher::subscribe` (see
/// `loom_control::deletion` module docs for why).
pub fn install_deletion_bridge(methods: &mut MethodRegistry, controller: Arc<DeletionController>, state: Arc<GatewayState>) {
    methods.register("workspace:delete:retry", {
        let controller = Arc::clone(&controller);
        Arc::new(move |ctx| {
            let controller = Arc::clone(&controller);
            Box::pin(async move { with_workspace_path(ctx, |path| controller.signal_retry(path)) })
        })
    });

    methods.register("workspace:delete:dismiss", {
        let controller = Arc::clone(&controller);
        Arc::new(move |ctx| {
            let controller = Arc::clone(&controller);
            Box::pin(async move { with_workspace_path(ctx, |path| controller.signal_dismiss(path)) })
        })
    });

    methods.register(
        "workspace:delete:subscribe-progress",
        Arc::new(move |ctx| {
            let controller = Arc::clone(&controller);
            let state = Arc::clone(&state);
            Box::pin(async move { with_workspace_path(ctx, |path| subscribe_progress(&controller, &state, path)) })
        }),
    );
}

fn with_workspace_path(ctx: crate::registry::MethodContext, action: impl FnOnce(&Path)) -> loom_protocol::ResponseFrame {
    match ctx.params.get("workspacePath").and_then(serde_json::Value::as_str) {
        Some(path) => {
            action(Path::new(path));
            loom_protocol::ResponseFrame::ok(ctx.request_id, serde_json::Value::Null)
        }
        None => loom_protocol::ResponseFrame::err(
            ctx.request_id,
            loom_protocol::ErrorShape::new(loom_protocol::error_codes::VALIDATION_ERROR, format!("`{}` requires `workspacePath`", ctx.method)),
        ),
    }
}

fn subscribe_progress(controller: &Arc<DeletionController>, state: &Arc<GatewayState>, path: &Path) {
    let channel = format!("{}{}", channels::DELETION_PROGRESS_PREFIX, path.display());
    let path = path.to_path_buf();
    let state = Arc::clone(state);
    controller.on_progress(
        &path,
        Arc::new(move |progress: &DeletionProgress| {
            let Ok(payload) = serde_json::to_value(progress) else { return };
            let frame = EventFrame::new(channel.clone(), Some(payload), state.next_seq());
            if let Ok(json) = serde_json::to_string(&frame) {
                state.broadcast(&json);
            }
        }),
    );
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use loom_control::DeletionController;
    use loom_dispatch::Dispatcher;

    use super::*;
    use crate::registry::MethodContext;

    #[tokio::test]
    async fn retry_with_no_workspace_path_is_a_validation_error() {
        let mut registry = MethodRegistry::new();
        let controller = DeletionController::new();
        let state = GatewayState::new(Dispatcher::new());
        install_deletion_bridge(&mut registry, controller, state.clone());

        let response = registry
            .dispatch(MethodContext { request_id: "r1".into(), method: "workspace:delete:retry".into(), params: serde_json::Value::Null, dispatcher: Dispatcher::new() })
            .await;
        assert!(!response.ok);
    }

    #[tokio::test]
    async fn retry_resolves_the_pending_wait() {
        let mut registry = MethodRegistry::new();
        let controller = DeletionController::new();
        let state = GatewayState::new(Dispatcher::new());
        install_deletion_bridge(&mut registry, controller.clone(), state);

        let wait = tokio::spawn({
            let controller = controller.clone();
            async move { controller.wait_for_retry_choice(Path::new("/tmp/ws")).await }
        });
        tokio::task::yield_now().await;

        let response = registry
            .dispatch(MethodContext {
                request_id: "r1".into(),
                method: "workspace:delete:retry".into(),
                params: serde_json::json!({ "workspacePath": "/tmp/ws" }),
                dispatcher: Dispatcher::new(),
            })
            .await;
        assert!(response.ok);
        assert_eq!(wait.await.unwrap(), loom_control::RetryChoice::Retry);
    }
}
