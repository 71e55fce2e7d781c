use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::event::{DomainEvent, EventHandler};
use crate::hooks::HookRegistry;
use crate::intent::{Intent, IntentKind};
use crate::interceptor::Interceptor;
use crate::module::Module;
use crate::operation::{ErasedOperation, Operation, OperationBox, OperationContext};

/// A handle returned by `subscribe`, needed to `unsubscribe` later. Modules
/// that subscribe for their own lifetime don't need to keep these around —
/// `Dispatcher::shutdown` disposes modules, not individual subscriptions.
pub struct Subscription {
    event_type: &'static str,
    id: u64,
}

/// Routes intents to the single operation registered for their type,
/// running registered interceptors ahead of it and publishing the events it
/// emits to subscribers once it has committed successfully.
///
/// There is exactly one `Dispatcher` per running control plane. It is
/// always held as `Arc<Dispatcher>` because operations and nested
/// dispatches need to dispatch further intents through the same instance.
pub struct Dispatcher {
    operations: RwLock<HashMap<&'static str, Arc<dyn ErasedOperation>>>,
    interceptors: RwLock<Vec<Arc<dyn Interceptor>>>,
    subscribers: RwLock<HashMap<&'static str, Vec<(u64, EventHandler)>>>,
    next_subscription_id: AtomicU64,
    modules: Mutex<Vec<Arc<dyn Module>>>,
    hooks: Arc<HookRegistry>,
}

impl Dispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            operations: RwLock::new(HashMap::new()),
            interceptors: RwLock::new(Vec::new()),
            subscribers: RwLock::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(0),
            modules: Mutex::new(Vec::new()),
            hooks: Arc::new(HookRegistry::new()),
        })
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Registers the operation that handles `I`. Panics if an operation is
    /// already registered for `I::TAG` — a duplicate registration is a
    /// wiring bug, not a runtime condition callers should handle.
    pub fn register_operation<I, O>(&self, op: O)
    where
        I: IntentKind,
        O: Operation<Input = I, Output = I::Output> + 'static,
    {
        let mut ops = self.operations.write().unwrap_or_else(|poison| poison.into_inner());
        assert!(!ops.contains_key(I::TAG), "operation `{}` already registered", I::TAG);
        ops.insert(I::TAG, Arc::new(OperationBox(op)));
    }

    /// Adds an interceptor. Interceptors run in ascending `order()`; ties
    /// break by the order `add_interceptor` was called, since the sort is
    /// stable.
    pub fn add_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
        let mut interceptors = self.interceptors.write().unwrap_or_else(|poison| poison.into_inner());
        interceptors.push(interceptor);
        interceptors.sort_by_key(|i| i.order());
    }

    pub fn subscribe(&self, event_type: &'static str, handler: EventHandler) -> Subscription {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().unwrap_or_else(|poison| poison.into_inner());
        subscribers.entry(event_type).or_default().push((id, handler));
        Subscription { event_type, id }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|poison| poison.into_inner());
        if let Some(list) = subscribers.get_mut(subscription.event_type) {
            list.retain(|(id, _)| *id != subscription.id);
        }
    }

    /// Installs a module's hooks, interceptors, and event subscriptions, in
    /// that order, and records it for reverse-order teardown.
    pub fn register_module(&self, module: Arc<dyn Module>) {
        module.install_hooks(&self.hooks);
        for interceptor in module.interceptors() {
            self.add_interceptor(interceptor);
        }
        for (event_type, handler) in module.event_subscriptions() {
            self.subscribe(event_type, handler);
        }
        self.modules.lock().unwrap_or_else(|poison| poison.into_inner()).push(module);
    }

    /// Disposes every registered module in the reverse of its registration
    /// order.
    pub fn shutdown(&self) {
        let modules = std::mem::take(&mut *self.modules.lock().unwrap_or_else(|poison| poison.into_inner()));
        for module in modules.into_iter().rev() {
            module.dispose();
        }
    }

    pub async fn dispatch<I>(self: &Arc<Self>, payload: I) -> anyhow::Result<Option<I::Output>>
    where
        I: IntentKind,
    {
        self.dispatch_with_causation(payload, Vec::new()).await
    }

    pub(crate) async fn dispatch_with_causation<I>(self: &Arc<Self>, payload: I, causation: Vec<&'static str>) -> anyhow::Result<Option<I::Output>>
    where
        I: IntentKind,
    {
        let mut intent = Intent::new(I::TAG, payload);

        let interceptors: Vec<Arc<dyn Interceptor>> = self.interceptors.read().unwrap_or_else(|poison| poison.into_inner()).clone();
        let mut release_callbacks: Vec<Box<dyn FnOnce() + Send>> = Vec::new();
        for interceptor in &interceptors {
            match interceptor.before(intent).await {
                Some(outcome) => {
                    intent = outcome.intent;
                    if let Some(on_resolved) = outcome.on_resolved {
                        release_callbacks.push(on_resolved);
                    }
                }
                None => {
                    tracing::debug!(intent_type = I::TAG, interceptor = interceptor.id(), "dispatch cancelled by interceptor");
                    return Ok(None);
                }
            }
        }

        let op = {
            let ops = self.operations.read().unwrap_or_else(|poison| poison.into_inner());
            ops.get(I::TAG).cloned()
        }
        .ok_or_else(|| anyhow::anyhow!("no operation registered for intent `{}`", I::TAG))?;

        let events = Arc::new(Mutex::new(Vec::new()));
        let ctx = OperationContext::new(I::TAG, causation, self.hooks.resolve(I::TAG), Arc::clone(&events), Arc::clone(self));

        let input = intent.into_payload::<I>()?;
        let result = op.execute(Box::new(input), ctx).await;

        for on_resolved in release_callbacks {
            on_resolved();
        }

        let boxed_output = result?;
        let output = *boxed_output
            .downcast::<I::Output>()
            .map_err(|_| anyhow::anyhow!("operation output type mismatch for `{}`", I::TAG))?;

        let pending = std::mem::take(&mut *events.lock().unwrap_or_else(|poison| poison.into_inner()));
        for event in &pending {
            self.publish(event);
        }

        for interceptor in &interceptors {
            interceptor.after(I::TAG).await;
        }

        Ok(Some(output))
    }

    /// Publishes `event` to subscribers right away, outside the normal
    /// buffer-until-commit path. Needed for events that must be observable
    /// even when the operation that raises them resolves to `Err` — `emit`
    /// alone can't do this since its buffer is only drained after a
    /// successful `execute`.
    pub(crate) fn publish(&self, event: &DomainEvent) {
        let handlers: Vec<EventHandler> = {
            let subscribers = self.subscribers.read().unwrap_or_else(|poison| poison.into_inner());
            subscribers.get(event.event_type).map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect()).unwrap_or_default()
        };
        for handler in handlers {
            if let Err(error) = handler(event) {
                tracing::warn!(event = event.event_type, %error, "event subscriber failed");
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::interceptor::BeforeOutcome;

    struct Echo;
    impl IntentKind for u32 {
        type Output = u32;
        const TAG: &'static str = "test:echo";
    }
    #[async_trait]
    impl Operation for Echo {
        type Input = u32;
        type Output = u32;
        async fn execute(&self, input: u32, ctx: OperationContext) -> anyhow::Result<u32> {
            ctx.emit(DomainEvent::new("test:echoed", serde_json::json!(input)));
            Ok(input)
        }
    }

    struct AlwaysCancel;
    #[async_trait]
    impl Interceptor for AlwaysCancel {
        fn id(&self) -> &'static str {
            "always-cancel"
        }
        async fn before(&self, _intent: Intent) -> Option<BeforeOutcome> {
            None
        }
    }

    #[tokio::test]
    async fn dispatches_to_the_registered_operation() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_operation::<u32, _>(Echo);
        let result = dispatcher.dispatch(42u32).await.unwrap();
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn unknown_intent_is_an_error() {
        let dispatcher = Dispatcher::new();
        let err = dispatcher.dispatch(1u32).await.unwrap_err();
        assert!(err.to_string().contains("no operation registered"));
    }

    #[tokio::test]
    async fn interceptor_cancellation_short_circuits_without_running_the_operation() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_operation::<u32, _>(Echo);
        dispatcher.add_interceptor(Arc::new(AlwaysCancel));
        let result = dispatcher.dispatch(1u32).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn events_publish_only_after_the_operation_resolves() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_operation::<u32, _>(Echo);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        dispatcher.subscribe(
            "test:echoed",
            Arc::new(move |event: &DomainEvent| {
                seen_clone.lock().unwrap_or_else(|p| p.into_inner()).push(event.payload.clone());
                Ok(())
            }),
        );
        dispatcher.dispatch(9u32).await.unwrap();
        assert_eq!(*seen.lock().unwrap_or_else(|p| p.into_inner()), vec![serde_json::json!(9)]);
    }
}
