use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use loom_control::{
    AppSetup, AppShutdown, AppStart, CloseProject, CreateWorkspace, DeleteWorkspace, GetAgentSession, GetWorkspaceMetadata, GetWorkspaceStatus, OpenProject, OpenWorkspace, RestartAgent,
    SetWorkspaceMetadata, SwitchWorkspace,
};
use loom_dispatch::{Dispatcher, IntentKind};
use loom_protocol::{ErrorShape, ResponseFrame, error_codes};

/// Everything a method handler needs: the raw JSON params, the request id
/// (for correlating its `ResponseFrame`), and the dispatcher every handler
/// ultimately calls into.
pub struct MethodContext {
    pub request_id: String,
    pub method: String,
    pub params: serde_json::Value,
    pub dispatcher: Arc<Dispatcher>,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A type-erased method handler: JSON in (via `MethodContext`), a
/// `ResponseFrame` out. `register_intent` is the only thing that builds
/// one of these for the thirteen named operations; a future caller could
/// add a handwritten one for a method with no 1:1 intent.
pub type HandlerFn = Arc<dyn Fn(MethodContext) -> BoxFuture<ResponseFrame> + Send + Sync>;

/// Maps named wire methods onto dispatcher calls. Generalizes
/// `moltis_gateway::methods::MethodRegistry` to dispatch into
/// `loom_dispatch::Dispatcher::dispatch` instead of calling a domain
/// method directly — the type-erasure happens at the JSON boundary here
/// rather than inside the dispatcher itself.
pub struct MethodRegistry {
    handlers: HashMap<&'static str, HandlerFn>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        let mut registry = Self { handlers: HashMap::new() };
        registry.register_defaults();
        registry
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: &'static str, handler: HandlerFn) {
        self.handlers.insert(method, handler);
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().map(|s| s.to_string()).collect();
        names.sort();
        names
    }

    pub async fn dispatch(&self, ctx: MethodContext) -> ResponseFrame {
        let request_id = ctx.request_id.clone();
        let method = ctx.method.clone();
        match self.handlers.get(method.as_str()) {
            Some(handler) => handler(ctx).await,
            None => ResponseFrame::err(request_id, ErrorShape::new(error_codes::VALIDATION_ERROR, format!("unknown method `{method}`"))),
        }
    }

    fn register_defaults(&mut self) {
        register_intent::<OpenProject>(self, "project:open");
        register_intent::<CloseProject>(self, "project:close");
        register_intent::<CreateWorkspace>(self, "workspace:create");
        register_intent::<OpenWorkspace>(self, "workspace:open");
        register_intent::<SwitchWorkspace>(self, "workspace:switch");
        register_intent::<GetWorkspaceMetadata>(self, "workspace:get-metadata");
        register_intent::<SetWorkspaceMetadata>(self, "workspace:set-metadata");
        register_intent::<GetWorkspaceStatus>(self, "workspace:get-status");
        register_intent::<RestartAgent>(self, "agent:restart");
        register_intent::<GetAgentSession>(self, "agent:get-session");
        register_intent::<AppStart>(self, "app:start");
        register_intent::<AppSetup>(self, "app:setup");
        register_intent::<AppShutdown>(self, "app:shutdown");
        register_intent::<DeleteWorkspace>(self, "workspace:delete");
    }
}

/// Registers `method` as a handler that deserializes its JSON params into
/// `I`, dispatches it, and serializes whatever `I::Output` comes back.
/// `I::TAG` is what actually selects the operation; `method` is a separate
/// wire-level name so the two can drift without forcing a dispatcher-side
/// rename — today `register_defaults` keeps them identical.
fn register_intent<I>(registry: &mut MethodRegistry, method: &'static str)
where
    I: IntentKind + serde::de::DeserializeOwned,
    I::Output: serde::Serialize,
{
    registry.register(
        method,
        Arc::new(move |ctx: MethodContext| {
            Box::pin(async move {
                let input: I = match serde_json::from_value(ctx.params) {
                    Ok(input) => input,
                    Err(error) => return ResponseFrame::err(ctx.request_id, ErrorShape::new(error_codes::VALIDATION_ERROR, format!("bad params for `{method}`: {error}"))),
                };
                match ctx.dispatcher.dispatch(input).await {
                    Ok(Some(output)) => match serde_json::to_value(output) {
                        Ok(payload) => ResponseFrame::ok(ctx.request_id, payload),
                        Err(error) => ResponseFrame::err(ctx.request_id, ErrorShape::new(error_codes::PROGRAMMING_ERROR, format!("failed to serialize `{method}` result: {error}"))),
                    },
                    Ok(None) => ResponseFrame::ok(ctx.request_id, serde_json::Value::Null),
                    Err(error) => ResponseFrame::err(ctx.request_id, ErrorShape::new(error_codes::UNAVAILABLE, error.to_string())),
                }
            })
        }),
    );
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use loom_control::{AppShutdown, AppShutdownOperation, ControlState};
    use loom_dispatch::Dispatcher;
    use loom_service_traits::{NoopAgentServerManager, NoopBinaryExtensionManager, NoopFilesystem, NoopProcessManager, NoopUiTransport, NoopWorktreeProvider};

    use super::*;

    fn noop_state() -> Arc<ControlState> {
        ControlState::new(
            Arc::new(NoopWorktreeProvider),
            Arc::new(NoopFilesystem),
            Arc::new(NoopProcessManager),
            Arc::new(NoopBinaryExtensionManager),
            Arc::new(NoopAgentServerManager),
            Arc::new(NoopUiTransport),
        )
    }

    #[test]
    fn method_names_lists_every_registered_intent() {
        let registry = MethodRegistry::new();
        let names = registry.method_names();
        assert!(names.contains(&"workspace:delete".to_string()));
        assert!(names.contains(&"app:setup".to_string()));
        assert_eq!(names.len(), 14);
    }

    #[tokio::test]
    async fn unknown_method_returns_a_validation_error() {
        let registry = MethodRegistry::new();
        let dispatcher = Dispatcher::new();
        let response = registry.dispatch(MethodContext { request_id: "r1".into(), method: "nope".into(), params: serde_json::Value::Null, dispatcher }).await;
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().code, error_codes::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn malformed_params_returns_a_validation_error_not_a_panic() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_operation::<AppShutdown, _>(AppShutdownOperation::new(noop_state()));
        let registry = MethodRegistry::new();
        let response = registry.dispatch(MethodContext { request_id: "r1".into(), method: "app:shutdown".into(), params: serde_json::json!("not-a-unit-struct"), dispatcher }).await;
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().code, error_codes::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn dispatches_a_registered_intent_and_serializes_its_output() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_operation::<AppShutdown, _>(AppShutdownOperation::new(noop_state()));
        let registry = MethodRegistry::new();
        let response = registry.dispatch(MethodContext { request_id: "r1".into(), method: "app:shutdown".into(), params: serde_json::Value::Null, dispatcher }).await;
        assert!(response.ok);
    }
}
