pub mod app;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;

use crate::app::{build_socket_app, build_webhook_app};
use crate::state::AppState;

/// Serve the provider-facing callback listener plus status routes.
///
/// Takes a bound listener so callers can have the port open before asking the
/// hub to verify a subscription against it.
pub async fn serve_with_state(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    serve_router(listener, build_webhook_app(state), "webhook", shutdown).await
}

/// Serve the downstream push channel.
pub async fn serve_push_channel(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    serve_router(listener, build_socket_app(state), "push", shutdown).await
}

async fn serve_router(
    listener: TcpListener,
    app: Router,
    listener_name: &'static str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(listener = listener_name, "Listening on {}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
