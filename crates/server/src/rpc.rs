//! JSON-RPC 2.0 endpoint for MCP clients.
//!
//! `POST /mcp` takes one message or a batch. Notifications (no `id`) are executed but
//! get no response entry; a request made only of notifications is answered with 202.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kommo_agent::ToolContext;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::auth::{authenticate, UNAUTHORIZED_MESSAGE};
use crate::health::SERVER_NAME;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const SERVER_ERROR: i64 = -32000;
pub const UNAUTHORIZED: i64 = -32001;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn failure(id: Value, error: RpcError) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(error) }
    }
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

fn reply(status: StatusCode, error: RpcError) -> Response {
    (status, Json(RpcResponse::failure(Value::Null, error))).into_response()
}

pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let credentials = match authenticate(&headers, &state.password) {
        Ok(credentials) => credentials,
        Err(error) => {
            warn!(event_name = "http.auth.denied", route = "/mcp", reason_code = error.reason_code(), "request rejected");
            return reply(StatusCode::UNAUTHORIZED, RpcError::new(UNAUTHORIZED, UNAUTHORIZED_MESSAGE));
        }
    };

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return reply(StatusCode::BAD_REQUEST, RpcError::new(PARSE_ERROR, "Parse error"));
    };

    let ctx = match state.tenant_context(&credentials) {
        Ok(ctx) => ctx,
        Err(error) => return reply(StatusCode::OK, RpcError::new(SERVER_ERROR, error.to_string())),
    };

    match payload {
        Value::Array(messages) if messages.is_empty() => {
            reply(StatusCode::OK, RpcError::new(INVALID_REQUEST, "Invalid request: empty batch"))
        }
        Value::Array(messages) => {
            let mut responses = Vec::with_capacity(messages.len());
            for message in messages {
                if let Some(response) = process(&state, &ctx, message).await {
                    responses.push(response);
                }
            }
            if responses.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        message => match process(&state, &ctx, message).await {
            Some(response) => Json(response).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        },
    }
}

/// Session teardown for streamable-HTTP clients. Sessions are not tracked per client.
pub async fn close() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn process(state: &AppState, ctx: &ToolContext, message: Value) -> Option<RpcResponse> {
    let id_hint = message.get("id").cloned().unwrap_or(Value::Null);
    let request = match serde_json::from_value::<RpcRequest>(message) {
        Ok(request) if request.jsonrpc == "2.0" => request,
        Ok(_) => {
            return Some(RpcResponse::failure(id_hint, RpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\"")))
        }
        Err(error) => {
            return Some(RpcResponse::failure(id_hint, RpcError::new(INVALID_REQUEST, format!("Invalid request: {error}"))))
        }
    };

    let id = request.id.filter(|id| !id.is_null());
    if id.as_ref().is_some_and(|id| !id.is_string() && !id.is_number()) {
        return Some(RpcResponse::failure(
            Value::Null,
            RpcError::new(INVALID_REQUEST, "id must be a string or a number"),
        ));
    }

    debug!(event_name = "http.rpc.message", method = %request.method, notification = id.is_none(), "rpc message");
    let outcome = execute(state, ctx, &request.method, request.params).await;

    let id = id?;
    Some(match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => RpcResponse::failure(id, error),
    })
}

async fn execute(state: &AppState, ctx: &ToolContext, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        })),
        "notifications/initialized" | "ping" => Ok(json!({})),
        "tools/list" => {
            let tools = state.registry.enriched_definitions(ctx).await;
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => call_tool(state, ctx, params).await,
        other => Err(RpcError::new(METHOD_NOT_FOUND, format!("Method \"{other}\" not supported"))),
    }
}

async fn call_tool(state: &AppState, ctx: &ToolContext, params: Option<Value>) -> Result<Value, RpcError> {
    let params = params.ok_or_else(|| RpcError::new(INVALID_PARAMS, "tools/call requires params"))?;
    let call: CallParams = serde_json::from_value(params)
        .map_err(|error| RpcError::new(INVALID_PARAMS, format!("invalid tools/call params: {error}")))?;

    if !state.registry.contains(&call.name) {
        return Err(RpcError::new(METHOD_NOT_FOUND, format!("Tool \"{}\" not found", call.name)));
    }

    let arguments = call.arguments.unwrap_or(Value::Null);
    let result = state.registry.call(&call.name, &arguments, ctx).await;
    Ok(json!({
        "content": [{ "type": "text", "text": result.text }],
        "isError": result.is_error,
    }))
}
