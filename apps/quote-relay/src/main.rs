//! Quote Relay Binary
//!
//! Starts the polling scheduler and the read-only quote API.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-relay
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//!
//! - `QUOTE_RELAY_PROFILE`: local | cloud (default: detected from `RAILWAY_ENVIRONMENT` / `RENDER`)
//! - `QUOTE_RELAY_PORT` / `PORT`: HTTP port (default: 5000)
//! - `QUOTE_SOURCE`: simulated | http (default: simulated)
//! - `QUOTE_SOURCE_URL`: base URL of the HTTP quote source
//! - `BROKER_EMAIL`, `BROKER_PASSWORD`: credentials for the HTTP quote source
//! - `DEMO_FALLBACK`: serve simulated prices when the source is unavailable (default: true)
//! - `POLL_*`, `RECONNECT_*`, `QUOTE_STALE_AFTER_SECS`: pacing overrides
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use quote_relay::infrastructure::telemetry;
use quote_relay::{
    ApiServer, ApiState, ConnectionManager, ConnectionStatus, PollingConfig, PollingScheduler,
    PriceCache, ReconnectConfig, ReconnectPolicy, RelayConfig, SymbolCatalog, build_sources,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let telemetry_guard = telemetry::init();

    tracing::info!(
        span_export = telemetry_guard.is_exporting(),
        "Starting quote relay"
    );

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = RelayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let catalog = Arc::new(SymbolCatalog::builtin());
    let cache = Arc::new(PriceCache::new());
    let status = Arc::new(ConnectionStatus::new());

    let sources = build_sources(&config.source);
    tracing::debug!(?sources, "Quote sources built");

    let connection = ConnectionManager::new(
        sources.primary,
        sources.fallback,
        Arc::clone(&status),
        ReconnectPolicy::new(ReconnectConfig::from(&config.reconnect)),
        shutdown_token.clone(),
    );

    let scheduler = PollingScheduler::new(
        Arc::clone(&catalog),
        Arc::clone(&cache),
        connection,
        PollingConfig::from(&config.polling),
        shutdown_token.clone(),
    );

    let api_state = Arc::new(ApiState::new(
        Arc::clone(&cache),
        Arc::clone(&status),
        Arc::clone(&catalog),
        config.server.stale_after,
    ));
    let api_server = ApiServer::new(config.server.port, api_state, shutdown_token.clone());

    let scheduler_handle = tokio::spawn(scheduler.run());

    let api_shutdown = shutdown_token.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "API server error");
            api_shutdown.cancel();
        }
    });

    tracing::info!("Quote relay ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = scheduler_handle.await;
        let _ = api_handle.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timed out, exiting anyway");
    }

    tracing::info!("Quote relay stopped");
    drop(telemetry_guard);
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        profile = config.profile.as_str(),
        source = config.source.kind.as_str(),
        port = config.server.port,
        demo_fallback = config.source.demo_fallback,
        "Configuration loaded"
    );
    tracing::debug!(
        batch_size = config.polling.batch_size,
        symbol_delay_ms = u64::try_from(config.polling.symbol_delay.as_millis()).unwrap_or(u64::MAX),
        batch_delay_ms = u64::try_from(config.polling.batch_delay.as_millis()).unwrap_or(u64::MAX),
        max_symbols_per_cycle = ?config.polling.max_symbols_per_cycle,
        realtime_stream = config.polling.realtime_stream,
        "Polling settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT) or an internal cancel.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Internal shutdown requested");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
