use super::{ApiError, ApiResult};
use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use exa_gateway_core::analytics::{AnalyticsImport, ToolCallRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;

const TOP_CLIENTS: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: BTreeMap<String, String>,
    pub tools: Vec<String>,
}

/// Server descriptor
pub async fn server_info(State(state): State<Arc<AppState>>) -> Json<ServerDescriptor> {
    let endpoints = [
        ("mcp", "/mcp"),
        ("health", "/health"),
        ("analytics", "/analytics"),
        ("toolAnalytics", "/analytics/tools"),
        ("import", "/analytics/import"),
        ("dashboard", "/analytics/dashboard"),
    ]
    .into_iter()
    .map(|(name, path)| (name.to_string(), path.to_string()))
    .collect();

    Json(ServerDescriptor {
        name: "exa-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "MCP gateway for Exa web search, crawling and research".to_string(),
        endpoints,
        tools: state
            .sessions
            .policy()
            .enabled()
            .map(|id| id.as_str().to_string())
            .collect(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    pub timestamp: DateTime<Utc>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        started_at: state.started_at,
        uptime_seconds: state.uptime().as_secs(),
        active_sessions: state.sessions.len(),
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyCount {
    pub hour: String,
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub total_requests: u64,
    pub total_tool_calls: u64,
    pub server_start_time: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub last_saved: Option<DateTime<Utc>>,
    pub active_sessions: usize,
    pub tool_calls: Vec<NamedCount>,
    pub hourly: Vec<HourlyCount>,
    pub requests_by_method: BTreeMap<String, u64>,
    pub requests_by_endpoint: BTreeMap<String, u64>,
    pub top_ips: Vec<NamedCount>,
    pub top_user_agents: Vec<NamedCount>,
}

/// Counts sorted by count descending, ties broken by name.
fn ranked(counts: &BTreeMap<String, u64>, limit: Option<usize>) -> Vec<NamedCount> {
    let mut entries: Vec<NamedCount> = counts
        .iter()
        .map(|(name, count)| NamedCount {
            name: name.clone(),
            count: *count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    entries
}

/// Current analytics snapshot with sorted breakdowns
pub async fn get_analytics(State(state): State<Arc<AppState>>) -> Json<AnalyticsReport> {
    let snapshot = state.analytics.snapshot();
    let uptime = Utc::now() - snapshot.server_start_time;

    Json(AnalyticsReport {
        total_requests: snapshot.total_requests,
        total_tool_calls: snapshot.total_tool_calls,
        server_start_time: snapshot.server_start_time,
        uptime_seconds: uptime.num_seconds().max(0),
        last_saved: snapshot.last_saved,
        active_sessions: state.sessions.len(),
        tool_calls: ranked(&snapshot.tool_calls, None),
        // BTreeMap keys are "%Y-%m-%dT%H", so iteration order is chronological
        hourly: snapshot
            .hourly_requests
            .iter()
            .map(|(hour, count)| HourlyCount {
                hour: hour.clone(),
                count: *count,
            })
            .collect(),
        top_ips: ranked(&snapshot.requests_by_ip, Some(TOP_CLIENTS)),
        top_user_agents: ranked(&snapshot.requests_by_user_agent, Some(TOP_CLIENTS)),
        requests_by_method: snapshot.requests_by_method,
        requests_by_endpoint: snapshot.requests_by_endpoint,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCount {
    pub tool: String,
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnalyticsResponse {
    pub total_tool_calls: u64,
    pub tools: Vec<ToolCount>,
    pub recent_calls: Vec<ToolCallRecord>,
}

/// Per-tool counts and the most recent calls
pub async fn get_tool_analytics(
    State(state): State<Arc<AppState>>,
) -> Json<ToolAnalyticsResponse> {
    let snapshot = state.analytics.snapshot();

    Json(ToolAnalyticsResponse {
        total_tool_calls: snapshot.total_tool_calls,
        tools: ranked(&snapshot.tool_calls, None)
            .into_iter()
            .map(|entry| ToolCount {
                tool: entry.name,
                count: entry.count,
            })
            .collect(),
        recent_calls: snapshot.recent_tool_calls.into_iter().collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub success: bool,
    pub total_requests: u64,
    pub total_tool_calls: u64,
}

/// Additively merge an exported snapshot into the live counters
pub async fn import_analytics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> ApiResult<Json<ImportResponse>> {
    if let Some(expected) = state.config.import_key.as_deref() {
        if !key_matches(query.key.as_deref(), expected) {
            tracing::warn!("Rejected analytics import with invalid key");
            return Err(ApiError::Forbidden("Invalid import key".to_string()));
        }
    }

    let import: AnalyticsImport = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid analytics payload: {}", e)))?;

    state.analytics.import_merge(&import);
    tracing::info!(
        total_requests = import.total_requests,
        total_tool_calls = import.total_tool_calls,
        "Imported analytics"
    );

    if let Err(e) = state.analytics.save().await {
        tracing::warn!(error = %e, "Failed to save analytics after import");
    }

    let snapshot = state.analytics.snapshot();
    Ok(Json(ImportResponse {
        success: true,
        total_requests: snapshot.total_requests,
        total_tool_calls: snapshot.total_tool_calls,
    }))
}

/// Compare a supplied secret without short-circuiting on the first mismatch.
fn key_matches(supplied: Option<&str>, expected: &str) -> bool {
    supplied.is_some_and(|key| bool::from(key.as_bytes().ct_eq(expected.as_bytes())))
}
