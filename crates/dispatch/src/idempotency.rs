//! The idempotency interceptor.
//!
//! One rule per intent type that needs de-duplication. While a key is
//! in-flight, further dispatches of the same intent type with the same key
//! are cancelled outright (the caller gets `Ok(None)`) unless the intent is
//! marked forced. A key is released either the moment its operation
//! resolves (no `reset_on` configured) or when a named event carrying the
//! same key is observed — whichever the rule asks for.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::dispatcher::Dispatcher;
use crate::event::DomainEvent;
use crate::intent::Intent;
use crate::interceptor::{BeforeOutcome, Interceptor};

type KeyFromIntent = Arc<dyn Fn(&Intent) -> String + Send + Sync>;
type KeyFromEvent = Arc<dyn Fn(&serde_json::Value) -> String + Send + Sync>;
type ForcedPredicate = Arc<dyn Fn(&Intent) -> bool + Send + Sync>;

pub struct IdempotencyRule {
    pub intent_type: &'static str,
    pub key_from_intent: KeyFromIntent,
    pub is_forced: Option<ForcedPredicate>,
    /// When set, the key releases on this event instead of immediately
    /// after the operation resolves. `key_from_event` must derive the same
    /// key the originating intent did — the two closures read different
    /// shapes (a typed intent payload vs. a serialized event payload) but
    /// must agree on identity.
    pub reset_on: Option<(&'static str, KeyFromEvent)>,
}

impl IdempotencyRule {
    pub fn new(intent_type: &'static str, key_from_intent: impl Fn(&Intent) -> String + Send + Sync + 'static) -> Self {
        Self { intent_type, key_from_intent: Arc::new(key_from_intent), is_forced: None, reset_on: None }
    }

    pub fn forced_when(mut self, predicate: impl Fn(&Intent) -> bool + Send + Sync + 'static) -> Self {
        self.is_forced = Some(Arc::new(predicate));
        self
    }

    pub fn reset_on(mut self, event_type: &'static str, key_from_event: impl Fn(&serde_json::Value) -> String + Send + Sync + 'static) -> Self {
        self.reset_on = Some((event_type, Arc::new(key_from_event)));
        self
    }
}

pub struct IdempotencyInterceptor {
    rules: Vec<IdempotencyRule>,
    in_flight: Arc<Mutex<HashSet<(&'static str, String)>>>,
}

impl IdempotencyInterceptor {
    pub fn new(rules: Vec<IdempotencyRule>) -> Arc<Self> {
        Arc::new(Self { rules, in_flight: Arc::new(Mutex::new(HashSet::new())) })
    }

    /// Registers this interceptor on `dispatcher` and subscribes, for each
    /// rule that names a `reset_on` event, to clear that rule's key when
    /// the event fires.
    pub fn wire(self: &Arc<Self>, dispatcher: &Dispatcher) {
        dispatcher.add_interceptor(Arc::clone(self) as Arc<dyn Interceptor>);
        for rule in &self.rules {
            if let Some((event_type, key_from_event)) = &rule.reset_on {
                let in_flight = Arc::clone(&self.in_flight);
                let intent_type = rule.intent_type;
                let key_from_event = Arc::clone(key_from_event);
                dispatcher.subscribe(
                    event_type,
                    Arc::new(move |event: &DomainEvent| {
                        let key = key_from_event(&event.payload);
                        in_flight.lock().unwrap_or_else(|poison| poison.into_inner()).remove(&(intent_type, key));
                        Ok(())
                    }),
                );
            }
        }
    }

    fn rule_for(&self, intent_type: &str) -> Option<&IdempotencyRule> {
        self.rules.iter().find(|rule| rule.intent_type == intent_type)
    }
}

#[async_trait]
impl Interceptor for IdempotencyInterceptor {
    fn id(&self) -> &'static str {
        "idempotency"
    }

    fn order(&self) -> i32 {
        -100 // runs ahead of ordinary interceptors so cancellation is cheap
    }

    async fn before(&self, intent: Intent) -> Option<BeforeOutcome> {
        let Some(rule) = self.rule_for(intent.type_tag) else {
            return Some(BeforeOutcome::pass(intent));
        };

        let key = (rule.key_from_intent)(&intent);
        let forced = rule.is_forced.as_ref().is_some_and(|is_forced| is_forced(&intent));
        let full_key = (rule.intent_type, key);

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|poison| poison.into_inner());
        if !forced && in_flight.contains(&full_key) {
            return None;
        }
        in_flight.insert(full_key.clone());
        drop(in_flight);

        if rule.reset_on.is_some() {
            return Some(BeforeOutcome::pass(intent));
        }

        let in_flight = Arc::clone(&self.in_flight);
        Some(BeforeOutcome::with_release(intent, move || {
            in_flight.lock().unwrap_or_else(|poison| poison.into_inner()).remove(&full_key);
        }))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::intent::IntentKind;
    use crate::operation::{Operation, OperationContext};

    struct SlowCreate;
    impl IntentKind for CreatePayload {
        type Output = ();
        const TAG: &'static str = "test:create";
    }
    #[derive(Clone)]
    struct CreatePayload {
        key: String,
    }
    #[async_trait]
    impl Operation for SlowCreate {
        type Input = CreatePayload;
        type Output = ();
        async fn execute(&self, _input: CreatePayload, _ctx: OperationContext) -> anyhow::Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_second_dispatch_with_the_same_key_is_cancelled_while_in_flight() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_operation::<CreatePayload, _>(SlowCreate);
        let idempotency = IdempotencyInterceptor::new(vec![IdempotencyRule::new("test:create", |intent| {
            intent.downcast_ref::<CreatePayload>().unwrap().key.clone()
        })]);
        idempotency.wire(&dispatcher);

        let d1 = Arc::clone(&dispatcher);
        let first = tokio::spawn(async move { d1.dispatch(CreatePayload { key: "a".into() }).await.unwrap() });
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = dispatcher.dispatch(CreatePayload { key: "a".into() }).await.unwrap();

        assert_eq!(second, None);
        assert_eq!(first.await.unwrap(), Some(()));
    }

    #[tokio::test]
    async fn the_key_releases_once_the_operation_resolves() {
        let dispatcher = Dispatcher::new();
        dispatcher.register_operation::<CreatePayload, _>(SlowCreate);
        let idempotency = IdempotencyInterceptor::new(vec![IdempotencyRule::new("test:create", |intent| {
            intent.downcast_ref::<CreatePayload>().unwrap().key.clone()
        })]);
        idempotency.wire(&dispatcher);

        dispatcher.dispatch(CreatePayload { key: "a".into() }).await.unwrap();
        let again = dispatcher.dispatch(CreatePayload { key: "a".into() }).await.unwrap();
        assert_eq!(again, Some(()));
    }
}
