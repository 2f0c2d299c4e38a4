use crate::config::ServerConfig;
use crate::shutdown;
use anyhow::Result;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use infra_mcp::McpHandler;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;
pub mod sessions;

use sessions::SessionStore;

/// Header carrying the HTTP session id
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
}

/// Start the HTTP transport and run until a shutdown signal
pub async fn serve(config: &ServerConfig, handler: Arc<McpHandler>) -> Result<()> {
    let sessions = SessionStore::new(handler);
    let sweeper = config
        .session_idle_timeout()
        .map(|idle| sessions.spawn_sweeper(idle, config.sweep_interval()));

    let app = create_router(AppState {
        sessions: sessions.clone(),
    });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("MCP HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    sessions.close_all();
    tracing::info!("HTTP server stopped");

    Ok(())
}

/// Create the HTTP router
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/mcp",
            post(handlers::post_mcp)
                .get(handlers::get_mcp)
                .delete(handlers::delete_mcp),
        )
        .fallback(not_found)
        // Middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Liveness probe
async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
