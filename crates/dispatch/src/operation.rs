use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::dispatcher::Dispatcher;
use crate::event::DomainEvent;
use crate::hooks::ResolvedHooks;
use crate::intent::IntentKind;

/// Everything an operation's `execute` needs besides its own typed input:
/// the hooks resolved for its operation id, a place to emit events, and a
/// way to dispatch nested intents with the causation chain already
/// extended.
///
/// `OperationContext` is constructed fresh per dispatch call — it is never
/// reused across two calls to the same operation.
pub struct OperationContext {
    pub intent_type: &'static str,
    pub causation: Vec<&'static str>,
    hooks: ResolvedHooks,
    events: Arc<Mutex<Vec<DomainEvent>>>,
    dispatcher: Arc<Dispatcher>,
}

impl OperationContext {
    pub(crate) fn new(
        intent_type: &'static str,
        causation: Vec<&'static str>,
        hooks: ResolvedHooks,
        events: Arc<Mutex<Vec<DomainEvent>>>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self { intent_type, causation, hooks, events, dispatcher }
    }

    pub fn hooks(&self) -> &ResolvedHooks {
        &self.hooks
    }

    /// Buffers `event`; it is published to subscribers only after this
    /// operation's `execute` returns `Ok`, and only then.
    pub fn emit(&self, event: DomainEvent) {
        self.events.lock().unwrap_or_else(|poison| poison.into_inner()).push(event);
    }

    /// Publishes `event` to subscribers immediately, independent of whether
    /// this operation's `execute` eventually returns `Ok` or `Err`. Use for
    /// an event that reports the failure itself (e.g. `setup:error`) — it
    /// would otherwise be buffered and silently dropped the moment
    /// `execute` returns `Err`.
    pub fn emit_immediate(&self, event: DomainEvent) {
        self.dispatcher.publish(&event);
    }

    /// Dispatches a nested intent. Its causation chain is this context's
    /// causation chain with the current intent type appended, and its
    /// events publish (synchronously, to completion) before this call
    /// returns — so a nested operation's events are always visible to
    /// subscribers before the outer operation's own events are.
    pub async fn dispatch<I>(&self, payload: I) -> anyhow::Result<Option<I::Output>>
    where
        I: IntentKind,
    {
        let mut nested_causation = self.causation.clone();
        nested_causation.push(self.intent_type);
        self.dispatcher.dispatch_with_causation(payload, nested_causation).await
    }
}

/// A single typed operation: one intent type in, one output type out.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn execute(&self, input: Self::Input, ctx: OperationContext) -> anyhow::Result<Self::Output>;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased form the dispatcher actually stores, so the operation
/// registry can hold operations of many different `Input`/`Output` types in
/// one map keyed by `&'static str`.
pub(crate) trait ErasedOperation: Send + Sync {
    fn execute<'a>(&'a self, input: Box<dyn Any + Send>, ctx: OperationContext) -> BoxFuture<'a, anyhow::Result<Box<dyn Any + Send>>>;
}

pub(crate) struct OperationBox<O>(pub O);

impl<O: Operation> ErasedOperation for OperationBox<O> {
    fn execute<'a>(&'a self, input: Box<dyn Any + Send>, ctx: OperationContext) -> BoxFuture<'a, anyhow::Result<Box<dyn Any + Send>>> {
        Box::pin(async move {
            let input = *input
                .downcast::<O::Input>()
                .map_err(|_| anyhow::anyhow!("operation input type mismatch for `{}`", ctx.intent_type))?;
            let output = self.0.execute(input, ctx).await?;
            Ok(Box::new(output) as Box<dyn Any + Send>)
        })
    }
}
