use crate::classify;
use crate::config::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Endpoint key shared by every request that matched no route.
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Requests to the analytics surface itself are not counted.
fn is_analytics_route(route: &str) -> bool {
    route == "/analytics" || route.starts_with("/analytics/")
}

/// Count an incoming request before it reaches its handler.
///
/// Endpoints are keyed by route template so unrouted paths cannot grow the
/// endpoint table.
pub async fn record_request(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str());

    match route {
        Some(route) if is_analytics_route(route) => {}
        route => {
            let client = classify::client_info(request.headers(), request.extensions());
            state.analytics.record_request(
                request.method().as_str(),
                route.unwrap_or(UNMATCHED_ENDPOINT),
                &client,
            );
        }
    }

    next.run(request).await
}
