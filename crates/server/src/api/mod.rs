use crate::config::AppState;
use crate::{middleware, ui};
use anyhow::{Context, Result};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use exa_gateway_core::SessionId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;
mod mcp;

#[cfg(test)]
mod tests;

/// Start the API server and run until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::server_info))
        .route("/health", get(handlers::health_check))
        .route("/analytics", get(handlers::get_analytics))
        .route("/analytics/tools", get(handlers::get_tool_analytics))
        .route("/analytics/import", post(handlers::import_analytics))
        .route("/analytics/dashboard", get(ui::serve_dashboard))
        .route(
            "/mcp",
            get(mcp::open_stream)
                .post(mcp::handle_message)
                .delete(mcp::terminate_session)
                .fallback(mcp::method_not_allowed),
        )
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::record_request,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
        }
    }
}

/// Error type for API handlers
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    SessionNotFound(Option<SessionId>),
    Forbidden(String),
    MethodNotAllowed,
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::SessionNotFound(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            Self::BadRequest(message) => ErrorResponse::with_message("Bad Request", message),
            Self::SessionNotFound(Some(id)) => ErrorResponse::with_message(
                "Session not found",
                format!("No active session with id {}", id),
            ),
            Self::SessionNotFound(None) => ErrorResponse::with_message(
                "Session not found",
                format!("Missing {} header", exa_gateway_mcp::SESSION_ID_HEADER),
            ),
            Self::Forbidden(message) => ErrorResponse::with_message("Forbidden", message),
            Self::MethodNotAllowed => {
                return (
                    status,
                    [(header::ALLOW, "GET, POST, DELETE")],
                    Json(ErrorResponse::new("Method not allowed")),
                )
                    .into_response();
            }
            Self::Internal(err) => {
                tracing::error!(error = ?err, "Request failed");
                let details = err
                    .chain()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(": ");
                ErrorResponse::with_message("Internal server error", details)
            }
        };

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
