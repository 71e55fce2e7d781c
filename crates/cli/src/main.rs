use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use loom_control::{AppShutdown, AppStart, ControlState, CreateWorkspace, DeleteWorkspace};
use loom_dispatch::{Dispatcher, IdempotencyInterceptor, IdempotencyRule, IntentKind};
use loom_gateway::{GatewayState, MethodRegistry, WsUiTransport};
use loom_service_traits::{GitWorktreeProvider, NoopAgentServerManager, NoopBinaryExtensionManager, NoopProcessManager, TokioFilesystem};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loom", about = "Workspace control plane: dispatcher + gateway")]
struct Cli {
    /// Address the websocket gateway listens on.
    #[arg(long, default_value = "127.0.0.1:4190")]
    listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error); overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);
    info!(version = env!("CARGO_PKG_VERSION"), "loom starting");

    let config = loom_config::discover_and_load();
    info!(idempotency_enabled = config.idempotency.enabled, "config loaded");

    let dispatcher = Dispatcher::new();

    if config.idempotency.enabled {
        dispatcher.add_interceptor(IdempotencyInterceptor::new(vec![
            IdempotencyRule::new(CreateWorkspace::TAG, |intent| match intent.downcast_ref::<CreateWorkspace>() {
                Some(create) => format!("{}:{}", create.0.project_path.display(), create.0.workspace_name),
                None => String::new(),
            }),
            IdempotencyRule::new(DeleteWorkspace::TAG, |intent| match intent.downcast_ref::<DeleteWorkspace>() {
                Some(delete) => format!("{}:{}", delete.project_id, delete.workspace_name),
                None => String::new(),
            })
            .forced_when(|intent| intent.downcast_ref::<DeleteWorkspace>().map(|d| d.force).unwrap_or(false)),
        ]));
        if !config.idempotency.extra_keyed_intents.is_empty() {
            tracing::debug!(extra = ?config.idempotency.extra_keyed_intents, "extra keyed intents configured but need a per-type key closure to wire up; ignored");
        }
    }

    let gateway_state = GatewayState::new(Arc::clone(&dispatcher));
    let ui = Arc::new(WsUiTransport::new(Arc::clone(&gateway_state)));

    let control_state =
        ControlState::new(Arc::new(GitWorktreeProvider::new()), Arc::new(TokioFilesystem), Arc::new(NoopProcessManager), Arc::new(NoopBinaryExtensionManager), Arc::new(NoopAgentServerManager), ui);

    let deletion_controller = loom_control::install(&dispatcher, control_state);
    loom_gateway::install_event_bridge(&dispatcher, &gateway_state);

    let mut methods = MethodRegistry::new();
    loom_gateway::install_deletion_bridge(&mut methods, deletion_controller, Arc::clone(&gateway_state));
    let methods = Arc::new(methods);

    if let Err(error) = dispatcher.dispatch(AppStart).await {
        error!(%error, "app:start failed");
    }

    let serve = loom_gateway::serve(cli.listen, Arc::clone(&gateway_state), methods);
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, dispatching app:shutdown");
            if let Err(error) = dispatcher.dispatch(AppShutdown).await {
                error!(%error, "app:shutdown failed");
            }
        }
    }

    Ok(())
}

/// Resolves on the first `SIGINT` (ctrl-c) or, on unix, `SIGTERM`.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else { return };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
