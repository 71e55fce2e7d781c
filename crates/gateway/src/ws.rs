use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use loom_protocol::{MAX_PAYLOAD_BYTES, RequestFrame, ResponseFrame};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::{MethodContext, MethodRegistry};
use crate::state::{ConnectedClient, GatewayState};

/// The two pieces a connection handler needs: the shared runtime state and
/// the method table it dispatches `"req"` frames through.
pub struct GatewayRuntime {
    pub state: Arc<GatewayState>,
    pub methods: Arc<MethodRegistry>,
}

pub async fn ws_handler(ws: WebSocketUpgrade, ConnectInfo(remote_addr): ConnectInfo<SocketAddr>, State(runtime): State<Arc<GatewayRuntime>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, runtime, remote_addr))
}

/// Handle a single websocket connection end to end: registration, the
/// inbound message loop, cleanup. Translates inbound JSON-RPC-ish frames
/// into `dispatch()` calls and leaves outbound domain-event/push delivery
/// to `install_event_bridge`/`WsUiTransport`, both of which write to the
/// same per-client channel this loop drains.
async fn handle_connection(socket: WebSocket, runtime: Arc<GatewayRuntime>, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, remote = %remote_addr, "gateway: client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "gateway: write loop closed");
                break;
            }
        }
    });

    runtime.state.register_client(ConnectedClient::new(conn_id.clone(), client_tx.clone()));

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                debug!(conn_id = %conn_id, %error, "gateway: read error");
                break;
            }
        };

        if text.len() > MAX_PAYLOAD_BYTES {
            warn!(conn_id = %conn_id, size = text.len(), "gateway: payload too large");
            continue;
        }

        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            warn!(conn_id = %conn_id, "gateway: invalid frame");
            continue;
        };

        match value.get("type").and_then(serde_json::Value::as_str) {
            Some("req") => handle_request(&runtime, &conn_id, &client_tx, value).await,
            Some("res") => handle_response(&runtime, value),
            _ => debug!(conn_id = %conn_id, "gateway: ignoring frame with no recognized `type`"),
        }
    }

    runtime.state.remove_client(&conn_id);
    info!(conn_id = %conn_id, "gateway: client disconnected");

    drop(client_tx);
    write_handle.abort();
}

/// A `"push"` method is a fire-and-forget notification to a channel
/// subscriber registered via `UiTransport::on` — everything else is routed
/// through the method registry and gets a `ResponseFrame` back.
async fn handle_request(runtime: &GatewayRuntime, conn_id: &str, client_tx: &mpsc::UnboundedSender<String>, value: serde_json::Value) {
    let req: RequestFrame = match serde_json::from_value(value) {
        Ok(req) => req,
        Err(error) => {
            warn!(conn_id = %conn_id, %error, "gateway: malformed request frame");
            return;
        }
    };

    if req.method == "push" {
        let Some(params) = req.params else { return };
        let Some(channel) = params.get("channel").and_then(serde_json::Value::as_str) else { return };
        let payload = params.get("payload").cloned().unwrap_or(serde_json::Value::Null);
        runtime.state.dispatch_channel_push(channel, payload);
        return;
    }

    if runtime.state.is_duplicate_request(&req.id) {
        debug!(conn_id = %conn_id, request_id = %req.id, "gateway: dropping duplicate request");
        return;
    }

    let ctx = MethodContext { request_id: req.id.clone(), method: req.method.clone(), params: req.params.unwrap_or(serde_json::Value::Null), dispatcher: Arc::clone(&runtime.state.dispatcher) };
    let response = runtime.methods.dispatch(ctx).await;
    if let Ok(json) = serde_json::to_string(&response) {
        let _ = client_tx.send(json);
    }
}

/// A `"res"` frame from the UI is always a reply to a core-initiated
/// `UiTransport::invoke` — resolve the matching pending oneshot.
fn handle_response(runtime: &GatewayRuntime, value: serde_json::Value) {
    let res: ResponseFrame = match serde_json::from_value(value) {
        Ok(res) => res,
        Err(error) => {
            warn!(%error, "gateway: malformed response frame");
            return;
        }
    };
    let payload = res.payload.unwrap_or(serde_json::Value::Null);
    runtime.state.resolve_pending_invoke(&res.id, payload);
}
