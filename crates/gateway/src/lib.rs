//! Websocket transport binding the dispatcher to a single UI renderer: wire
//! frame types live in `loom-protocol`, intent handling in `loom-dispatch`;
//! this crate is the method table and connection plumbing between them.

mod bridge;
mod registry;
mod server;
mod state;
mod transport;
mod ws;

pub use bridge::{install_deletion_bridge, install_event_bridge};
pub use registry::{HandlerFn, MethodContext, MethodRegistry};
pub use server::{router, serve};
pub use state::{ConnectedClient, GatewayState};
pub use transport::WsUiTransport;
pub use ws::GatewayRuntime;
