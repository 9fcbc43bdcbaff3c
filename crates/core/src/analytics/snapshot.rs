use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// One entry of the recent tool call log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool: String,
    pub timestamp: DateTime<Utc>,
    pub client_ip: String,
    pub user_agent: String,
}

/// Durable analytics record, persisted as a single JSON document.
///
/// Counters only ever grow. `recent_tool_calls` is newest first and capped by
/// the accumulator that owns the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsSnapshot {
    pub total_requests: u64,
    pub total_tool_calls: u64,
    pub requests_by_method: BTreeMap<String, u64>,
    pub requests_by_endpoint: BTreeMap<String, u64>,
    pub tool_calls: BTreeMap<String, u64>,
    pub requests_by_ip: BTreeMap<String, u64>,
    pub requests_by_user_agent: BTreeMap<String, u64>,
    /// Keyed by ISO hour, e.g. `2026-10-19T14`.
    pub hourly_requests: BTreeMap<String, u64>,
    pub recent_tool_calls: VecDeque<ToolCallRecord>,
    pub server_start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<DateTime<Utc>>,
}

impl Default for AnalyticsSnapshot {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Externally supplied analytics to fold into the current state.
///
/// Every field is optional so partial payloads can be imported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsImport {
    pub total_requests: u64,
    pub total_tool_calls: u64,
    pub requests_by_method: BTreeMap<String, u64>,
    pub requests_by_endpoint: BTreeMap<String, u64>,
    pub tool_calls: BTreeMap<String, u64>,
    pub requests_by_ip: BTreeMap<String, u64>,
    pub requests_by_user_agent: BTreeMap<String, u64>,
    pub hourly_requests: BTreeMap<String, u64>,
    pub recent_tool_calls: Vec<ToolCallRecord>,
    pub server_start_time: Option<DateTime<Utc>>,
}

impl AnalyticsSnapshot {
    pub fn new(server_start_time: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            total_tool_calls: 0,
            requests_by_method: BTreeMap::new(),
            requests_by_endpoint: BTreeMap::new(),
            tool_calls: BTreeMap::new(),
            requests_by_ip: BTreeMap::new(),
            requests_by_user_agent: BTreeMap::new(),
            hourly_requests: BTreeMap::new(),
            recent_tool_calls: VecDeque::new(),
            server_start_time,
            last_saved: None,
        }
    }

    pub(crate) fn record_request(
        &mut self,
        method: &str,
        endpoint: &str,
        client_ip: &str,
        user_agent: &str,
        at: DateTime<Utc>,
    ) {
        self.total_requests = self.total_requests.saturating_add(1);
        bump(&mut self.requests_by_method, method, 1);
        bump(&mut self.requests_by_endpoint, endpoint, 1);
        bump(&mut self.requests_by_ip, client_ip, 1);
        bump(&mut self.requests_by_user_agent, user_agent, 1);
        bump(&mut self.hourly_requests, &hour_bucket(at), 1);
    }

    pub(crate) fn record_tool_call(&mut self, record: ToolCallRecord, max_recent_calls: usize) {
        self.total_tool_calls = self.total_tool_calls.saturating_add(1);
        bump(&mut self.tool_calls, &record.tool, 1);
        self.recent_tool_calls.push_front(record);
        self.recent_tool_calls.truncate(max_recent_calls);
    }

    /// Additively fold `other` into this snapshot.
    ///
    /// Counters are summed, the start time becomes the earlier of the two and
    /// recent calls are interleaved by timestamp before re-applying the cap.
    pub(crate) fn merge(&mut self, other: &AnalyticsImport, max_recent_calls: usize) {
        self.total_requests = self.total_requests.saturating_add(other.total_requests);
        self.total_tool_calls = self.total_tool_calls.saturating_add(other.total_tool_calls);
        merge_counts(&mut self.requests_by_method, &other.requests_by_method);
        merge_counts(&mut self.requests_by_endpoint, &other.requests_by_endpoint);
        merge_counts(&mut self.tool_calls, &other.tool_calls);
        merge_counts(&mut self.requests_by_ip, &other.requests_by_ip);
        merge_counts(&mut self.requests_by_user_agent, &other.requests_by_user_agent);
        merge_counts(&mut self.hourly_requests, &other.hourly_requests);

        if let Some(start) = other.server_start_time {
            if start < self.server_start_time {
                self.server_start_time = start;
            }
        }

        let mut recent: Vec<ToolCallRecord> = self
            .recent_tool_calls
            .drain(..)
            .chain(other.recent_tool_calls.iter().cloned())
            .collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(max_recent_calls);
        self.recent_tool_calls = recent.into();
    }

    /// Drop the oldest recent calls beyond `max_recent_calls`.
    pub(crate) fn enforce_recent_cap(&mut self, max_recent_calls: usize) {
        self.recent_tool_calls.truncate(max_recent_calls);
    }
}

/// ISO hour bucket used as the hourly grouping key.
pub fn hour_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H").to_string()
}

fn bump(counts: &mut BTreeMap<String, u64>, key: &str, by: u64) {
    let entry = counts.entry(key.to_string()).or_insert(0);
    *entry = entry.saturating_add(by);
}

fn merge_counts(into: &mut BTreeMap<String, u64>, from: &BTreeMap<String, u64>) {
    for (key, count) in from {
        bump(into, key, *count);
    }
}
