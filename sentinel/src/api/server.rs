//! HTTP server setup and routing. Grounded on `wkmp-ap/src/api/server.rs`;
//! the auth layer and developer UI route it builds are dropped since the
//! admin web UI is out of scope (SPEC_FULL.md §3).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sentinel_common::events::EventBus;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub pool: SqlitePool,
    pub events: EventBus,
    pub build_version: Arc<String>,
}

pub async fn run(addr: SocketAddr, ctx: AppContext) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(super::handlers::health))
        .route("/status", get(super::handlers::status))
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!(%addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
