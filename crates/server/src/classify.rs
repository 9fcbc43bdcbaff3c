//! Request classification.
//!
//! Pulls everything the handlers need out of an incoming request in one place:
//! the session id header, who the client is, and which collaborator API key
//! applies to this request.

use crate::config::AppState;
use axum::extract::{ConnectInfo, FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, Uri};
use exa_gateway_core::analytics::ClientInfo;
use exa_gateway_core::SessionId;
use exa_gateway_mcp::SESSION_ID_HEADER;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub session_id: Option<SessionId>,
    pub client: ClientInfo,
    pub api_key: Option<String>,
}

impl RequestInfo {
    pub fn from_parts(parts: &Parts, default_api_key: Option<&str>) -> Self {
        Self {
            session_id: session_id(&parts.headers),
            client: client_info(&parts.headers, &parts.extensions),
            api_key: resolve_api_key(
                query_api_key(&parts.uri).as_deref(),
                header_str(&parts.headers, API_KEY_HEADER),
                default_api_key,
            ),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for RequestInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state.config.exa_api_key.as_deref()))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub fn session_id(headers: &HeaderMap) -> Option<SessionId> {
    header_str(headers, SESSION_ID_HEADER)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(SessionId::from)
}

/// Peer address recorded by `into_make_service_with_connect_info`.
pub fn peer_ip(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

pub fn client_info(headers: &HeaderMap, extensions: &Extensions) -> ClientInfo {
    ClientInfo::resolve(
        header_str(headers, FORWARDED_FOR_HEADER),
        peer_ip(extensions),
        header_str(headers, "user-agent"),
    )
}

#[derive(Debug, Deserialize)]
struct ApiKeyQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

fn query_api_key(uri: &Uri) -> Option<String> {
    Query::<ApiKeyQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.api_key)
}

/// Query parameter, then header, then the configured default.
pub fn resolve_api_key(
    query: Option<&str>,
    header: Option<&str>,
    default: Option<&str>,
) -> Option<String> {
    [query, header, default]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|key| !key.is_empty())
        .map(str::to_string)
}
