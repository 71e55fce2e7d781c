use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use loom_dispatch::Dispatcher;
use loom_service_traits::UiChannelHandler;
use tokio::sync::{mpsc, oneshot};

/// A UI client connected over the websocket transport. Sending is a plain
/// channel enqueue so `WsUiTransport::send`/`invoke` (not `async fn`s in
/// every case) never has to await a lock.
pub struct ConnectedClient {
    pub conn_id: String,
    sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

impl ConnectedClient {
    pub fn new(conn_id: String, sender: mpsc::UnboundedSender<String>) -> Self {
        Self { conn_id, sender, connected_at: Instant::now() }
    }

    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

struct DedupeEntry {
    inserted_at: Instant,
}

/// TTL-bounded cache of raw request ids the gateway has already dispatched,
/// guarding against a reconnecting client replaying its last unacked
/// request. Distinct from (and much dumber than) the dispatcher's own
/// `IdempotencyInterceptor`, which keys on intent semantics, not wire ids.
struct DedupeCache {
    entries: HashMap<String, DedupeEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl DedupeCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_millis(loom_protocol::REQUEST_DEDUPE_TTL_MS),
            max_entries: loom_protocol::REQUEST_DEDUPE_MAX_ENTRIES,
        }
    }

    /// Returns `true` if `key` was already seen within the TTL window.
    fn check_and_insert(&mut self, key: &str) -> bool {
        self.evict_expired();
        if self.entries.contains_key(key) {
            return true;
        }
        if self.entries.len() >= self.max_entries
            && let Some(oldest) = self.entries.iter().min_by_key(|(_, v)| v.inserted_at).map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest);
        }
        self.entries.insert(key.to_string(), DedupeEntry { inserted_at: Instant::now() });
        false
    }

    fn evict_expired(&mut self) {
        let cutoff = Instant::now() - self.ttl;
        self.entries.retain(|_, v| v.inserted_at > cutoff);
    }
}

/// Shared gateway runtime state: connected clients, the outbound event
/// sequence counter, and the bookkeeping `WsUiTransport` needs for
/// `invoke`/`on`. One instance per running gateway, held as `Arc` across
/// connection tasks and the control-plane collaborators that push through
/// the UI transport built on top of it.
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    clients: Mutex<HashMap<String, ConnectedClient>>,
    seq: AtomicU64,
    dedupe: Mutex<DedupeCache>,
    pending_invokes: Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>,
    channel_handlers: Mutex<HashMap<String, Vec<UiChannelHandler>>>,
}

impl GatewayState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            clients: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            dedupe: Mutex::new(DedupeCache::new()),
            pending_invokes: Mutex::new(HashMap::new()),
            channel_handlers: Mutex::new(HashMap::new()),
        })
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_client(&self, client: ConnectedClient) {
        self.clients.lock().unwrap_or_else(|p| p.into_inner()).insert(client.conn_id.clone(), client);
    }

    pub fn remove_client(&self, conn_id: &str) {
        self.clients.lock().unwrap_or_else(|p| p.into_inner()).remove(conn_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Returns `true` if `request_id` has already been dispatched within
    /// the dedupe window.
    pub fn is_duplicate_request(&self, request_id: &str) -> bool {
        self.dedupe.lock().unwrap_or_else(|p| p.into_inner()).check_and_insert(request_id)
    }

    /// Sends `frame` to every connected client. A client whose send fails
    /// (socket already gone) is left for the next `remove_client` rather
    /// than pruned inline here.
    pub fn broadcast(&self, frame: &str) {
        let clients = self.clients.lock().unwrap_or_else(|p| p.into_inner());
        for client in clients.values() {
            let _ = client.send(frame);
        }
    }

    /// Sends `frame` to one connected client. `invoke` has no notion of
    /// "which client" beyond "the UI" — this control plane expects exactly
    /// one active renderer, matching the single-process desktop shape §5
    /// assumes.
    pub(crate) fn send_to_any(&self, frame: &str) -> bool {
        let clients = self.clients.lock().unwrap_or_else(|p| p.into_inner());
        clients.values().next().map(|c| c.send(frame)).unwrap_or(false)
    }

    pub(crate) fn register_pending_invoke(&self, request_id: String, tx: oneshot::Sender<serde_json::Value>) {
        self.pending_invokes.lock().unwrap_or_else(|p| p.into_inner()).insert(request_id, tx);
    }

    pub(crate) fn resolve_pending_invoke(&self, request_id: &str, payload: serde_json::Value) -> bool {
        match self.pending_invokes.lock().unwrap_or_else(|p| p.into_inner()).remove(request_id) {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    pub(crate) fn register_channel_handler(&self, channel: &str, handler: UiChannelHandler) {
        self.channel_handlers.lock().unwrap_or_else(|p| p.into_inner()).entry(channel.to_string()).or_default().push(handler);
    }

    pub(crate) fn dispatch_channel_push(&self, channel: &str, payload: serde_json::Value) {
        let handlers = self.channel_handlers.lock().unwrap_or_else(|p| p.into_inner()).get(channel).cloned().unwrap_or_default();
        for handler in handlers {
            handler(payload.clone());
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_cache_flags_a_repeated_key_within_the_window() {
        let mut cache = DedupeCache::new();
        assert!(!cache.check_and_insert("req-1"));
        assert!(cache.check_and_insert("req-1"));
    }

    #[test]
    fn pending_invoke_resolves_exactly_once() {
        let state = GatewayState::new(Dispatcher::new());
        let (tx, rx) = oneshot::channel();
        state.register_pending_invoke("req-1".into(), tx);

        assert!(state.resolve_pending_invoke("req-1", serde_json::json!({"ok": true})));
        assert!(!state.resolve_pending_invoke("req-1", serde_json::Value::Null));

        drop(rx);
    }
}
