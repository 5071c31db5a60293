use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::app::AppState;

pub const SERVER_NAME: &str = "kommo-mcp-server";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub name: &'static str,
    pub transport: &'static str,
    pub tools: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Unauthenticated service description with the tool names.
pub async fn index(State(state): State<AppState>) -> Json<IndexResponse> {
    Json(IndexResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        name: SERVER_NAME,
        transport: "streamable-http",
        tools: state.registry.names().map(str::to_string).collect(),
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", timestamp: Utc::now().to_rfc3339() })
}
