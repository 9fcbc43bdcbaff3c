use anyhow::Result;
use clap::Parser;
use exa_gateway_core::analytics::{AnalyticsAccumulator, PeriodicFlush};
use exa_gateway_core::error::PersistenceError;
use std::path::PathBuf;
use std::sync::Arc;

mod api;
mod classify;
mod config;
mod middleware;
mod ui;

use config::{AppState, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "exa-gateway")]
#[command(about = "MCP gateway for Exa search with persistent usage analytics", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "EXA_GATEWAY_CONFIG", default_value = "exa-gateway.toml")]
    config: PathBuf,

    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Directory holding the analytics file
    #[arg(short, long, env = "ANALYTICS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Analytics file name, relative to the data directory
    #[arg(long, env = "ANALYTICS_FILE")]
    analytics_file: Option<String>,

    /// Seconds between analytics flushes
    #[arg(long, env = "ANALYTICS_SAVE_INTERVAL_SECS")]
    save_interval_secs: Option<u64>,

    /// Number of recent tool calls kept in analytics
    #[arg(long, env = "ANALYTICS_MAX_RECENT_CALLS")]
    max_recent_calls: Option<usize>,

    /// Comma-separated list of tools to expose
    #[arg(long, env = "ENABLED_TOOLS", value_delimiter = ',')]
    enabled_tools: Vec<String>,

    /// Verbose logging
    #[arg(long, env = "DEBUG")]
    debug: bool,

    /// Secret required by the analytics import endpoint
    #[arg(long, env = "ANALYTICS_IMPORT_KEY", hide_env_values = true)]
    import_key: Option<String>,

    /// Default Exa API key for requests that do not supply one
    #[arg(long, env = "EXA_API_KEY", hide_env_values = true)]
    exa_api_key: Option<String>,

    /// Exa API base URL
    #[arg(long, env = "EXA_API_BASE_URL", default_value = exa_gateway_core::backend::DEFAULT_EXA_BASE_URL)]
    exa_base_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "exa_gateway=debug,tower_http=debug"
    } else {
        "exa_gateway=info,tower_http=info"
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting Exa MCP gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load(&args)?;
    tracing::info!("Analytics file: {}", config.analytics_path.display());
    if config.exa_api_key.is_none() {
        tracing::warn!("No default Exa API key configured; clients must supply one per request");
    }

    let addr = config.bind_addr();
    let save_interval = config.save_interval;
    let state = Arc::new(AppState::new(config).await?);

    let flush = PeriodicFlush::spawn(state.analytics.clone(), save_interval);

    // Closing sessions ends their event streams so graceful shutdown can finish
    let sessions = state.sessions.clone();
    let shutdown = async move {
        shutdown_signal().await;
        sessions.close_all();
    };

    tracing::info!("Starting API server on {}", addr);
    let served = api::serve(&addr, state.clone(), shutdown).await;

    match final_flush(flush, &state.analytics).await {
        Ok(()) => tracing::info!("Final analytics flush complete"),
        Err(e) => tracing::error!(error = %e, "Final analytics flush failed"),
    }

    served
}

/// Stop the periodic flush, then write the final analytics state once.
async fn final_flush(
    flush: PeriodicFlush,
    analytics: &AnalyticsAccumulator,
) -> Result<(), PersistenceError> {
    flush.stop().await;
    analytics.save().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use exa_gateway_core::analytics::{AnalyticsStore, ClientInfo};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_final_flush_saves_after_timer_stops() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("analytics.json");
        let analytics = Arc::new(AnalyticsAccumulator::new(AnalyticsStore::new(&path), 10));

        // The timer never fires within the test
        let flush = PeriodicFlush::spawn(analytics.clone(), Duration::from_secs(3600));
        analytics.record_request("POST", "/mcp", &ClientInfo::unknown());
        assert!(!path.exists());

        final_flush(flush, &analytics).await.unwrap();

        let saved = AnalyticsStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(saved.total_requests, 1);
        assert!(saved.last_saved.is_some());
        assert_eq!(analytics.snapshot().last_saved, saved.last_saved);
    }
}
