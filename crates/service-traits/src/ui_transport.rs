use std::sync::Arc;

use async_trait::async_trait;

pub type UiChannelHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;
pub type UiUnsubscribe = Box<dyn FnOnce() + Send>;

/// The renderer/IPC boundary. The core never assumes a particular
/// transport (axum websocket, Electron IPC, a test double) — it only ever
/// goes through this trait.
#[async_trait]
pub trait UiTransport: Send + Sync {
    async fn invoke(&self, channel: &str, payload: serde_json::Value) -> anyhow::Result<serde_json::Value>;
    fn on(&self, channel: &str, handler: UiChannelHandler) -> UiUnsubscribe;
    fn send(&self, channel: &str, payload: serde_json::Value);
}

pub struct NoopUiTransport;

#[async_trait]
impl UiTransport for NoopUiTransport {
    async fn invoke(&self, _channel: &str, _payload: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("ui transport not configured")
    }
    fn on(&self, _channel: &str, _handler: UiChannelHandler) -> UiUnsubscribe {
        Box::new(|| {})
    }
    fn send(&self, _channel: &str, _payload: serde_json::Value) {}
}
