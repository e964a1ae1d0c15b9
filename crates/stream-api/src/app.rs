use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::routes;
use crate::state::AppState;

/// Routes reachable by the provider's hub, plus status and metrics.
pub fn build_webhook_app(state: AppState) -> Router {
    Router::new()
        .nest("/webhooks", routes::webhooks::router())
        .nest("/api/v1", routes::status::router())
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The downstream push channel. Browsers connect here directly, hence CORS.
pub fn build_socket_app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(routes::socket::ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
