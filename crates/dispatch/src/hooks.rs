//! The hook registry.
//!
//! Unlike the block/modify/circuit-breaker hook registry this crate's
//! grounding file implements, hook points here never abort an operation and
//! never see each other's results: every registered handler for a
//! `(operation_id, hook_point)` pair runs, in registration order, and the
//! operation gets back everything that didn't decline to contribute plus a
//! side list of whatever went wrong. A broken hook degrades the pipeline,
//! it does not wedge it.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A hook handler for a specific `(operation, hook point)` pair. `In` is
/// cloned once per handler so that one handler's (im)mutation of its copy
/// can never be observed by the next — the collect contract hands every
/// handler an equally pristine view of the input.
pub type HookFn<In, Out> = Arc<dyn Fn(In) -> BoxFuture<'static, anyhow::Result<Option<Out>>> + Send + Sync>;

#[derive(Default)]
pub struct HookRegistry {
    handlers: Mutex<HashMap<(&'static str, &'static str), Vec<Box<dyn Any + Send + Sync>>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(operation_id, point)`. Handlers for the
    /// same pair run in the order they were registered.
    pub fn register<In, Out>(&self, operation_id: &'static str, point: &'static str, handler: HookFn<In, Out>)
    where
        In: Clone + Send + Sync + 'static,
        Out: Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock().unwrap_or_else(|poison| poison.into_inner());
        handlers.entry((operation_id, point)).or_default().push(Box::new(handler));
    }

    pub(crate) fn resolve(self: &Arc<Self>, operation_id: &'static str) -> ResolvedHooks {
        ResolvedHooks { registry: Arc::clone(self), operation_id }
    }
}

/// The hooks bound to a single operation, handed to it inside its
/// `OperationContext`. An operation never reaches into the registry by
/// operation id itself — it only ever calls `collect` at the points it
/// names.
pub struct ResolvedHooks {
    registry: Arc<HookRegistry>,
    operation_id: &'static str,
}

/// The result of a `collect` call: every handler that chose to contribute,
/// in the order it ran, plus every handler that errored instead.
pub struct CollectResult<Out> {
    pub results: Vec<Out>,
    pub errors: Vec<anyhow::Error>,
}

impl<Out> Default for CollectResult<Out> {
    fn default() -> Self {
        Self { results: Vec::new(), errors: Vec::new() }
    }
}

impl ResolvedHooks {
    pub async fn collect<In, Out>(&self, point: &'static str, input: In) -> CollectResult<Out>
    where
        In: Clone + Send + Sync + 'static,
        Out: Send + Sync + 'static,
    {
        let handlers: Vec<HookFn<In, Out>> = {
            let handlers = self.registry.handlers.lock().unwrap_or_else(|poison| poison.into_inner());
            match handlers.get(&(self.operation_id, point)) {
                Some(entries) => entries.iter().filter_map(|entry| entry.downcast_ref::<HookFn<In, Out>>().cloned()).collect(),
                None => Vec::new(),
            }
        };

        let mut out = CollectResult::default();
        for handler in handlers {
            match handler(input.clone()).await {
                Ok(Some(value)) => out.results.push(value),
                Ok(None) => {}
                Err(error) => out.errors.push(error),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_hook<In, Out>(f: impl Fn(In) -> anyhow::Result<Option<Out>> + Send + Sync + 'static) -> HookFn<In, Out>
    where
        In: Send + 'static,
        Out: Send + 'static,
    {
        Arc::new(move |input| {
            let result = f(input);
            Box::pin(async move { result })
        })
    }

    #[tokio::test]
    async fn runs_handlers_in_registration_order() {
        let registry = Arc::new(HookRegistry::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            registry.register::<u32, &'static str>(
                "op",
                "point",
                sync_hook(move |_: u32| {
                    order.lock().unwrap_or_else(|p| p.into_inner()).push(tag);
                    Ok(Some(tag))
                }),
            );
        }

        let resolved = registry.resolve("op");
        let collected = resolved.collect::<u32, &'static str>("point", 7).await;
        assert_eq!(collected.results, vec!["a", "b", "c"]);
        assert_eq!(*order.lock().unwrap_or_else(|p| p.into_inner()), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn a_failing_handler_does_not_stop_the_rest() {
        let registry = Arc::new(HookRegistry::new());
        registry.register::<u32, u32>("op", "point", sync_hook(|_| anyhow::bail!("boom")));
        registry.register::<u32, u32>("op", "point", sync_hook(|n: u32| Ok(Some(n * 2))));

        let resolved = registry.resolve("op");
        let collected = resolved.collect::<u32, u32>("point", 5).await;
        assert_eq!(collected.results, vec![10]);
        assert_eq!(collected.errors.len(), 1);
    }

    #[tokio::test]
    async fn a_handler_returning_none_contributes_nothing() {
        let registry = Arc::new(HookRegistry::new());
        registry.register::<u32, u32>("op", "point", sync_hook(|_| Ok(None)));

        let resolved = registry.resolve("op");
        let collected = resolved.collect::<u32, u32>("point", 1).await;
        assert!(collected.results.is_empty());
        assert!(collected.errors.is_empty());
    }

    #[tokio::test]
    async fn unregistered_point_collects_empty() {
        let registry = Arc::new(HookRegistry::new());
        let resolved = registry.resolve("op");
        let collected = resolved.collect::<u32, u32>("nothing-here", 1).await;
        assert!(collected.results.is_empty());
        assert!(collected.errors.is_empty());
    }
}
