use std::sync::Arc;

/// A domain event emitted by an operation after it has already committed its
/// effect. Events are the only thing the rest of the system learns about —
/// no caller ever awaits an event, and an operation's own return value is
/// never an event.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub event_type: &'static str,
    pub payload: serde_json::Value,
}

impl DomainEvent {
    pub fn new(event_type: &'static str, payload: serde_json::Value) -> Self {
        Self { event_type, payload }
    }
}

/// Event subscribers run synchronously, in registration order, on the
/// dispatch call that produced the event. A subscriber that needs to do
/// async work spawns its own task; the dispatcher does not await it.
pub type EventHandler = Arc<dyn Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync>;
