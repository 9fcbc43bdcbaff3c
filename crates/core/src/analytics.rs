//! Usage analytics that survive restarts.
//!
//! [`AnalyticsAccumulator`] owns the in-memory [`AnalyticsSnapshot`] behind a
//! mutex so concurrent handlers never lose an increment. It is loaded from an
//! [`AnalyticsStore`] at startup, saved by [`PeriodicFlush`] on an interval and
//! once more on shutdown, and accepts additive imports.

mod flush;
mod snapshot;
mod store;

pub use flush::PeriodicFlush;
pub use snapshot::{hour_bucket, AnalyticsImport, AnalyticsSnapshot, ToolCallRecord};
pub use store::AnalyticsStore;

use crate::error::PersistenceError;
use chrono::Utc;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// User agents longer than this are truncated before being used as a key.
pub const USER_AGENT_MAX_LEN: usize = 100;

pub const DEFAULT_MAX_RECENT_CALLS: usize = 100;

/// Placeholder for an IP or user agent that could not be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Who sent a request, as used for analytics grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip: impl Into<String>, user_agent: Option<&str>) -> Self {
        let user_agent = match user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
            Some(ua) => ua.chars().take(USER_AGENT_MAX_LEN).collect(),
            None => UNKNOWN_CLIENT.to_string(),
        };

        Self {
            ip: ip.into(),
            user_agent,
        }
    }

    /// Resolve the client from a forwarded-for header and the observed peer.
    pub fn resolve(
        forwarded_for: Option<&str>,
        peer: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Self {
        Self::new(resolve_client_ip(forwarded_for, peer), user_agent)
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_CLIENT, None)
    }
}

/// First forwarded-for entry, else the peer address, else `unknown`.
pub fn resolve_client_ip(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> String {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Process-wide analytics state.
pub struct AnalyticsAccumulator {
    state: Mutex<AnalyticsSnapshot>,
    store: AnalyticsStore,
    max_recent_calls: usize,
    // Serializes writers so two saves never interleave on disk
    save_lock: tokio::sync::Mutex<()>,
}

impl AnalyticsAccumulator {
    /// Fresh, empty accumulator; nothing is read from `store`.
    pub fn new(store: AnalyticsStore, max_recent_calls: usize) -> Self {
        Self::with_snapshot(store, max_recent_calls, AnalyticsSnapshot::default())
    }

    fn with_snapshot(
        store: AnalyticsStore,
        max_recent_calls: usize,
        snapshot: AnalyticsSnapshot,
    ) -> Self {
        Self {
            state: Mutex::new(snapshot),
            store,
            max_recent_calls,
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Rehydrate from `store`.
    ///
    /// A missing file starts fresh and writes the file immediately; an
    /// unreadable or corrupt file starts fresh without aborting startup.
    pub async fn load(store: AnalyticsStore, max_recent_calls: usize) -> Self {
        let (snapshot, first_run) = match store.load().await {
            Ok(Some(mut snapshot)) => {
                snapshot.enforce_recent_cap(max_recent_calls);
                tracing::info!(
                    path = %store.path().display(),
                    total_requests = snapshot.total_requests,
                    total_tool_calls = snapshot.total_tool_calls,
                    "Loaded analytics"
                );
                (snapshot, false)
            }
            Ok(None) => {
                tracing::info!(path = %store.path().display(), "No analytics file found, starting fresh");
                (AnalyticsSnapshot::default(), true)
            }
            Err(e) => {
                tracing::warn!(
                    path = %store.path().display(),
                    error = %e,
                    "Failed to load analytics, starting fresh"
                );
                (AnalyticsSnapshot::default(), false)
            }
        };

        let accumulator = Self::with_snapshot(store, max_recent_calls, snapshot);
        if first_run {
            if let Err(e) = accumulator.save().await {
                tracing::warn!(error = %e, "Failed to create analytics file");
            }
        }

        accumulator
    }

    fn lock(&self) -> MutexGuard<'_, AnalyticsSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_request(&self, method: &str, endpoint: &str, client: &ClientInfo) {
        self.lock()
            .record_request(method, endpoint, &client.ip, &client.user_agent, Utc::now());
    }

    pub fn record_tool_call(&self, tool: &str, client: &ClientInfo) {
        let record = ToolCallRecord {
            tool: tool.to_string(),
            timestamp: Utc::now(),
            client_ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
        };
        self.lock().record_tool_call(record, self.max_recent_calls);
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.lock().clone()
    }

    /// Additively fold an external payload into the current state.
    pub fn import_merge(&self, import: &AnalyticsImport) {
        self.lock().merge(import, self.max_recent_calls);
    }

    pub fn store(&self) -> &AnalyticsStore {
        &self.store
    }

    /// Write the current state to the durable store.
    pub async fn save(&self) -> Result<(), PersistenceError> {
        let _guard = self.save_lock.lock().await;

        let saved_at = Utc::now();
        let mut snapshot = self.snapshot();
        snapshot.last_saved = Some(saved_at);

        self.store.save(&snapshot).await?;
        self.lock().last_saved = Some(saved_at);
        Ok(())
    }
}
