//! REST surface kept for clients that predate the JSON-RPC endpoint.
//!
//! - `GET  /tools`: catalog with pipeline hints
//! - `POST /execute`: `{tool, params}` runs one tool

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kommo_agent::{ToolContext, ToolError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::app::AppState;
use crate::auth::{authenticate, UNAUTHORIZED_MESSAGE};

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    tool: String,
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: bool,
    message: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: true, message: message.into() })).into_response()
}

fn tenant(state: &AppState, headers: &HeaderMap, route: &'static str) -> Result<ToolContext, Response> {
    let credentials = authenticate(headers, &state.password).map_err(|auth_error| {
        warn!(event_name = "http.auth.denied", route, reason_code = auth_error.reason_code(), "request rejected");
        error(StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE)
    })?;
    state
        .tenant_context(&credentials)
        .map_err(|client_error| error(StatusCode::INTERNAL_SERVER_ERROR, client_error.to_string()))
}

pub async fn list_tools(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = match tenant(&state, &headers, "/tools") {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let tools = state.registry.enriched_definitions(&ctx).await;
    Json(json!({ "tools": tools })).into_response()
}

pub async fn execute(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let ctx = match tenant(&state, &headers, "/execute") {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let request = match serde_json::from_slice::<ExecuteRequest>(&body) {
        Ok(request) => request,
        Err(parse_error) => return error(StatusCode::BAD_REQUEST, format!("Invalid request: {parse_error}")),
    };

    let params = Value::Object(request.params.unwrap_or_default());
    match state.registry.dispatch(&request.tool, &params, &ctx).await {
        Ok(output) => {
            info!(event_name = "http.execute", tool = %request.tool, "tool executed");
            Json(json!({ "success": true, "data": output.data })).into_response()
        }
        Err(tool_error) => {
            warn!(
                event_name = "http.execute.failed",
                tool = %request.tool,
                kind = tool_error.kind(),
                error = %tool_error,
                "tool execution failed"
            );
            let status = match &tool_error {
                ToolError::NotFound(_) => StatusCode::NOT_FOUND,
                ToolError::Validation(_) => StatusCode::BAD_REQUEST,
                ToolError::Unauthorized(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error(status, tool_error.user_message())
        }
    }
}
