//! `/mcp`: the streamable HTTP protocol endpoint.
//!
//! POST carries client messages, GET opens the session's server-sent event
//! stream, DELETE terminates the session. Sessions are created only by a POST
//! whose body contains an `initialize` request.

use super::{ApiError, ApiResult};
use crate::classify::RequestInfo;
use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use exa_gateway_core::SessionId;
use exa_gateway_mcp::protocol::McpPayload;
use exa_gateway_mcp::{McpTransport, RequestContext, TransportError, SESSION_ID_HEADER};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn transport_error(err: TransportError, id: &SessionId) -> ApiError {
    match err {
        TransportError::Closed => ApiError::SessionNotFound(Some(id.clone())),
        TransportError::NotInitialized => {
            ApiError::bad_request("Session is not initialized; send initialize first")
        }
        TransportError::AlreadyInitialized => {
            ApiError::bad_request("Session is already initialized")
        }
        TransportError::ProtocolViolation(message) => {
            ApiError::bad_request(format!("Protocol violation: {}", message))
        }
        TransportError::Internal(e) => ApiError::Internal(e),
    }
}

/// POST /mcp
pub async fn handle_message(
    State(state): State<Arc<AppState>>,
    info: RequestInfo,
    body: Bytes,
) -> ApiResult<Response> {
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;
    let payload = McpPayload::from_value(body);

    let existing = info
        .session_id
        .as_ref()
        .and_then(|id| state.sessions.lookup(id));

    let (transport, created) = match (existing, &info.session_id) {
        (Some(transport), _) => (transport, false),
        (None, _) if payload.is_initialize() => {
            let (_, transport) = state.sessions.create();
            (transport, true)
        }
        (None, Some(id)) => return Err(ApiError::SessionNotFound(Some(id.clone()))),
        (None, None) => {
            return Err(ApiError::bad_request(
                "No valid session ID provided; initialize a session first",
            ))
        }
    };

    let ctx = RequestContext::new(info.api_key.clone());
    let session_id = transport.session_id().clone();
    let outcome = transport.handle(payload, &ctx).await;

    // Calls that reached the collaborator count even if a later batch entry failed
    for tool in ctx.dispatched_tools() {
        state.analytics.record_tool_call(&tool, &info.client);
    }

    // A new session that failed to initialize must not linger
    if created && !transport.is_active() {
        state.sessions.remove(&session_id);
    }

    let response = match outcome.map_err(|e| transport_error(e, &session_id))? {
        Some(body) => Json(body).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };

    Ok(with_session_header(response, &transport))
}

fn with_session_header(mut response: Response, transport: &McpTransport) -> Response {
    if transport.is_active() {
        if let Ok(value) = HeaderValue::from_str(transport.session_id().as_str()) {
            response.headers_mut().insert(SESSION_ID_HEADER, value);
        }
    }
    response
}

/// GET /mcp
pub async fn open_stream(
    State(state): State<Arc<AppState>>,
    info: RequestInfo,
) -> ApiResult<Response> {
    let id = info.session_id.ok_or(ApiError::SessionNotFound(None))?;
    let transport = state
        .sessions
        .lookup(&id)
        .ok_or_else(|| ApiError::SessionNotFound(Some(id.clone())))?;

    let mut push = transport
        .open_stream()
        .map_err(|e| transport_error(e, &id))?;
    drop(transport);

    let stream = async_stream::stream! {
        while let Some(message) = push.next().await {
            match serde_json::to_string(&message) {
                Ok(data) => yield Ok::<_, Infallible>(Event::default().event("message").data(data)),
                Err(e) => tracing::warn!(session_id = %push.session_id(), error = %e, "Failed to encode pushed message"),
            }
        }
        tracing::debug!(session_id = %push.session_id(), "Push stream ended");
    };

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response();
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    Ok(response)
}

/// DELETE /mcp
///
/// Always 204, whether or not the session existed.
pub async fn terminate_session(
    State(state): State<Arc<AppState>>,
    info: RequestInfo,
) -> StatusCode {
    if let Some(id) = info.session_id {
        if state.sessions.remove(&id) {
            tracing::info!(session_id = %id, "Session terminated by client");
        }
    }
    StatusCode::NO_CONTENT
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
