//! Health and status handlers. Grounded on `wkmp-ap/src/api/handlers.rs`'s
//! `health`/`get_build_info` shape.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::orchestrator::build_status_snapshot;
use sentinel_common::db::queries::settings;

use super::server::AppContext;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn status(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let settings_map = settings::all(&ctx.pool).await.unwrap_or_default();
    let snapshot = build_status_snapshot(&ctx.pool, &settings_map, &ctx.build_version).await;
    Json(serde_json::to_value(snapshot).unwrap_or_else(|_| json!({})))
}
