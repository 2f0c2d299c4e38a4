use super::{AppState, SESSION_HEADER};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use infra_mcp::decode_request;
use infra_mcp::protocol::JsonRpcResponse;
use serde_json::Value;
use std::sync::Arc;

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

/// Accept one JSON-RPC envelope. Execution happens on the session's worker;
/// the caller gets an immediate acknowledgement. A body that does not decode
/// never opens a session.
pub async fn post_mcp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match decode_request(&body) {
        Ok(request) => request,
        Err(response) => {
            let known = session_id(&headers).and_then(|id| state.sessions.get(id));
            tracing::warn!(session = ?known.as_ref().map(|s| s.id()), "Rejected malformed envelope");
            return match known {
                Some(session) => {
                    (StatusCode::OK, [(SESSION_HEADER, session.id().to_string())], Json(response)).into_response()
                }
                None => (StatusCode::OK, Json(response)).into_response(),
            };
        }
    };

    let session = state.sessions.resolve(session_id(&headers));

    let ack_id = request.id.clone().unwrap_or(Value::Null);
    if let Err(e) = session.enqueue(request).await {
        tracing::warn!("{}", e);
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    }

    let ack = JsonRpcResponse::success(ack_id, Value::Object(Default::default()));
    (StatusCode::ACCEPTED, [(SESSION_HEADER, session.id().to_string())], Json(ack)).into_response()
}

pub async fn get_mcp() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        "Method Not Allowed - use POST for JSON-RPC",
    )
}

/// Close the session named by the header
pub async fn delete_mcp(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    match session_id(&headers) {
        Some(id) if state.sessions.close(id) => (StatusCode::OK, "Session closed"),
        _ => (StatusCode::NOT_FOUND, "Session not found"),
    }
}
