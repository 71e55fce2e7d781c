use async_trait::async_trait;

use crate::intent::Intent;

/// What `Interceptor::before` hands back to the dispatcher: the (possibly
/// replaced) intent to keep dispatching, plus an optional release callback.
///
/// The release callback is a Rust-specific addition with no counterpart in
/// the block/modify hook registry this crate generalizes from: a stateful
/// interceptor (idempotency) sometimes needs to release state keyed to the
/// exact value it computed in `before`, at the exact moment the operation
/// resolves and before any interceptor's `after` runs. Passing the intent
/// back into `after` would work too, but would force every interceptor to
/// re-derive its key from scratch; a closure captured at `before` time is
/// cheaper and keeps the key derivation in one place.
pub struct BeforeOutcome {
    pub intent: Intent,
    pub on_resolved: Option<Box<dyn FnOnce() + Send>>,
}

impl BeforeOutcome {
    pub fn pass(intent: Intent) -> Self {
        Self { intent, on_resolved: None }
    }

    pub fn with_release(intent: Intent, on_resolved: impl FnOnce() + Send + 'static) -> Self {
        Self { intent, on_resolved: Some(Box::new(on_resolved)) }
    }
}

/// Runs ahead of every operation, regardless of which intent it handles.
///
/// Returning `None` from `before` cancels the dispatch outright: the
/// operation never runs, no hooks fire, no events are emitted, and the
/// dispatcher's caller receives `Ok(None)`.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn id(&self) -> &'static str;

    /// Interceptors run in ascending order; ties break by registration
    /// order. Default order is `0`.
    fn order(&self) -> i32 {
        0
    }

    async fn before(&self, intent: Intent) -> Option<BeforeOutcome>;

    async fn after(&self, _intent_type: &'static str) {}
}
