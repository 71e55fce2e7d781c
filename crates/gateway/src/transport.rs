use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loom_protocol::{EventFrame, RequestFrame};
use loom_service_traits::{UiChannelHandler, UiTransport, UiUnsubscribe};
use tokio::sync::oneshot;

use crate::state::GatewayState;

const INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// The concrete `UiTransport` wired into `ControlState`: pushes and
/// invokes travel as JSON-ish frames over whichever websocket connection
/// the UI currently holds open. `invoke` reuses the request/response frame
/// shape in reverse — the core plays the role of caller, the UI client of
/// responder — so the wire format needs no frame type of its own.
pub struct WsUiTransport {
    state: Arc<GatewayState>,
}

impl WsUiTransport {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl UiTransport for WsUiTransport {
    async fn invoke(&self, channel: &str, payload: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.state.register_pending_invoke(request_id.clone(), tx);

        let frame = RequestFrame { r#type: "req".into(), id: request_id.clone(), method: channel.to_string(), params: Some(payload) };
        let json = serde_json::to_string(&frame)?;
        if !self.state.send_to_any(&json) {
            self.state.resolve_pending_invoke(&request_id, serde_json::Value::Null);
            anyhow::bail!("no UI client connected to invoke `{channel}` on");
        }

        match tokio::time::timeout(INVOKE_TIMEOUT, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => anyhow::bail!("UI client disconnected before replying to `{channel}`"),
            Err(_) => anyhow::bail!("invoke `{channel}` timed out after {INVOKE_TIMEOUT:?}"),
        }
    }

    fn on(&self, channel: &str, handler: UiChannelHandler) -> UiUnsubscribe {
        self.state.register_channel_handler(channel, handler);
        Box::new(|| {})
    }

    fn send(&self, channel: &str, payload: serde_json::Value) {
        let frame = EventFrame::new(channel, Some(payload), self.state.next_seq());
        match serde_json::to_string(&frame) {
            Ok(json) => self.state.broadcast(&json),
            Err(error) => tracing::warn!(%error, channel, "failed to serialize ui push"),
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use loom_dispatch::Dispatcher;
    use loom_service_traits::UiTransport as _;

    use super::*;

    #[test]
    fn send_with_no_clients_connected_does_not_panic() {
        let state = GatewayState::new(Dispatcher::new());
        let transport = WsUiTransport::new(state);
        transport.send("test:channel", serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn invoke_with_no_clients_connected_errors_immediately() {
        let state = GatewayState::new(Dispatcher::new());
        let transport = WsUiTransport::new(state);
        let result = transport.invoke("test:channel", serde_json::Value::Null).await;
        assert!(result.is_err());
    }
}
