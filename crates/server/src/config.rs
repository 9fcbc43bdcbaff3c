use crate::Args;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use exa_gateway_core::analytics::{AnalyticsAccumulator, AnalyticsStore, DEFAULT_MAX_RECENT_CALLS};
use exa_gateway_core::backend::{ExaClient, SearchBackend, DEFAULT_EXA_BASE_URL};
use exa_gateway_core::tools::ToolPolicy;
use exa_gateway_mcp::SessionRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Optional TOML configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub analytics: AnalyticsFileConfig,

    #[serde(default)]
    pub tools: ToolsFileConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsFileConfig {
    pub data_dir: Option<PathBuf>,
    pub file: Option<String>,
    pub save_interval_secs: Option<u64>,
    pub max_recent_calls: Option<usize>,
    pub import_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsFileConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_analytics_file() -> String {
    "analytics.json".to_string()
}

const DEFAULT_SAVE_INTERVAL_SECS: u64 = 60;

/// Fully resolved server configuration: CLI/env over file over defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub analytics_path: PathBuf,
    pub save_interval: Duration,
    pub max_recent_calls: usize,
    pub enabled_tools: Vec<String>,
    pub import_key: Option<String>,
    pub exa_api_key: Option<String>,
    pub exa_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            analytics_path: default_data_dir().join(default_analytics_file()),
            save_interval: Duration::from_secs(DEFAULT_SAVE_INTERVAL_SECS),
            max_recent_calls: DEFAULT_MAX_RECENT_CALLS,
            enabled_tools: Vec::new(),
            import_key: None,
            exa_api_key: None,
            exa_base_url: DEFAULT_EXA_BASE_URL.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn load(args: &Args) -> Result<Self> {
        let file = Self::read_file(&args.config)?;
        Ok(Self::resolve(args, file))
    }

    fn read_file(path: &Path) -> Result<FileConfig> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(FileConfig::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }

    fn resolve(args: &Args, file: FileConfig) -> Self {
        let data_dir = args
            .data_dir
            .clone()
            .or(file.analytics.data_dir)
            .unwrap_or_else(default_data_dir);
        let analytics_file = args
            .analytics_file
            .clone()
            .or(file.analytics.file)
            .unwrap_or_else(default_analytics_file);
        let save_interval_secs = args
            .save_interval_secs
            .or(file.analytics.save_interval_secs)
            .unwrap_or(DEFAULT_SAVE_INTERVAL_SECS)
            .max(1);
        let enabled_tools = if args.enabled_tools.is_empty() {
            file.tools.enabled
        } else {
            args.enabled_tools.clone()
        };

        Self {
            host: args.host.clone(),
            port: args.port,
            analytics_path: data_dir.join(analytics_file),
            save_interval: Duration::from_secs(save_interval_secs),
            max_recent_calls: args
                .max_recent_calls
                .or(file.analytics.max_recent_calls)
                .unwrap_or(DEFAULT_MAX_RECENT_CALLS),
            enabled_tools,
            import_key: non_empty(args.import_key.clone().or(file.analytics.import_key)),
            exa_api_key: non_empty(args.exa_api_key.clone()),
            exa_base_url: args.exa_base_url.clone(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Tool enablement, fixed for the lifetime of the process.
    pub fn tool_policy(&self) -> ToolPolicy {
        ToolPolicy::resolve(&self.enabled_tools)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: SessionRegistry,
    pub analytics: Arc<AnalyticsAccumulator>,
    started: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let backend: Arc<dyn SearchBackend> = Arc::new(
            ExaClient::new(config.exa_base_url.clone()).context("Failed to create Exa client")?,
        );

        let analytics = Arc::new(
            AnalyticsAccumulator::load(
                AnalyticsStore::new(config.analytics_path.clone()),
                config.max_recent_calls,
            )
            .await,
        );

        Ok(Self::with_backend(config, backend, analytics))
    }

    pub fn with_backend(
        config: ServerConfig,
        backend: Arc<dyn SearchBackend>,
        analytics: Arc<AnalyticsAccumulator>,
    ) -> Self {
        let policy = config.tool_policy();
        tracing::info!(
            tools = ?policy.enabled().map(|id| id.as_str()).collect::<Vec<_>>(),
            "Tool policy resolved"
        );

        Self {
            sessions: SessionRegistry::new(policy, backend),
            config,
            analytics,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}
