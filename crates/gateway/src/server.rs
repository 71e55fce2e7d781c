use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use crate::registry::MethodRegistry;
use crate::state::GatewayState;
use crate::ws::{GatewayRuntime, ws_handler};

/// Builds the gateway's axum router. `methods` is passed in rather than
/// built here so a caller can register extra methods (`install_deletion_bridge`)
/// before the first connection arrives.
pub fn router(state: Arc<GatewayState>, methods: Arc<MethodRegistry>) -> Router {
    let runtime = Arc::new(GatewayRuntime { state, methods });
    Router::new().route("/ws", get(ws_handler)).with_state(runtime)
}

/// Binds `addr` and serves the gateway until the process is killed or the
/// listener errors. Connection-level shutdown (draining in-flight requests)
/// is the caller's job via `app:shutdown`; this just stops accepting new
/// sockets when the future is dropped.
pub async fn serve(addr: SocketAddr, state: Arc<GatewayState>, methods: Arc<MethodRegistry>) -> anyhow::Result<()> {
    let app = router(state, methods);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway: listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
