//! Quote API and Health Endpoints
//!
//! Read-only HTTP surface over the price cache and connection status.
//! Handlers never wait on the polling loop; every response is built from a
//! snapshot taken at request time.
//!
//! # Endpoints
//!
//! - `GET /` - Service index
//! - `GET /api/status` - Connection and coverage summary
//! - `GET /api/quotes` - Every cached quote, keyed by symbol
//! - `GET /api/quotes/{symbol}` - One quote, or 404 `{"error": ...}`
//! - `GET /api/quotes/{symbol}/history` - Recent prices, oldest first
//! - `GET /api/candles/{symbol}?duration=60&count=100` - OHLC candles from history
//! - `GET /api/symbols` - Catalog with per-symbol freshness
//! - `GET /healthz` - Liveness check
//! - `GET /readyz` - Readiness check (a session and at least one quote)
//! - `GET /metrics` - Prometheus metrics in text format

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::application::services::{ConnectionStatus, PriceCache};
use crate::domain::catalog::{AssetClass, SymbolCatalog};
use crate::domain::connection::ConnectionState;
use crate::domain::history::{Candle, HISTORY_CAPACITY, PricePoint};
use crate::domain::quote::{Quote, now_secs};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// `GET /api/status` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Connection state.
    pub connection: ConnectionState,
    /// Symbols with a cached quote.
    pub cached_count: usize,
    /// Symbols in the catalog.
    pub total_symbols: usize,
    /// `cached_count / total_symbols * 100`.
    pub coverage_percent: f64,
    /// Timestamp of the newest cache write.
    pub last_update_timestamp: Option<f64>,
    /// Server clock, epoch seconds.
    pub server_time: f64,
    /// Provider of the active session.
    pub provider: Option<String>,
    /// Attempts in the current reconnect round.
    pub reconnect_attempts: u32,
    /// Last connection error.
    pub last_error: Option<String>,
    /// When the last session was established.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Whether a quote source could be used at all.
    #[serde(rename = "library_available")]
    pub library_available: bool,
    /// Relay version.
    pub version: String,
    /// Seconds since start.
    pub uptime_secs: u64,
}

/// One row of `GET /api/symbols`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    /// Canonical symbol.
    pub symbol: String,
    /// Asset class.
    pub asset_class: AssetClass,
    /// Upstream identifiers in fetch order.
    pub identifiers: Vec<String>,
    /// Whether a quote is cached.
    pub available: bool,
    /// Last cached price.
    pub last_price: Option<f64>,
    /// Timestamp of the last cached price.
    pub last_update: Option<f64>,
    /// Seconds since `last_update`.
    pub age_secs: Option<f64>,
    /// Missing or older than the staleness threshold.
    pub stale: bool,
}

/// `GET /api/symbols` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolsResponse {
    /// Symbols in the catalog.
    pub total: usize,
    /// Symbols with a cached quote.
    pub available: usize,
    /// Staleness threshold.
    pub stale_after_secs: u64,
    /// One row per catalog symbol, in catalog order.
    pub symbols: Vec<SymbolInfo>,
}

/// `GET /api/quotes/{symbol}/history` body.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    /// Canonical symbol.
    pub symbol: String,
    /// Accepted prices, oldest first.
    pub points: Vec<PricePoint>,
}

/// `GET /api/candles/{symbol}` body.
#[derive(Debug, Clone, Serialize)]
pub struct CandlesResponse {
    /// Canonical symbol.
    pub symbol: String,
    /// Candle width in seconds.
    pub duration: u64,
    /// Candles, oldest first.
    pub candles: Vec<Candle>,
}

/// Default candle width.
const DEFAULT_CANDLE_SECS: u64 = 60;

/// Default number of candles.
const DEFAULT_CANDLE_COUNT: usize = 100;

#[derive(Debug, Deserialize)]
struct CandleParams {
    duration: Option<u64>,
    count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn not_available(symbol: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Quote for {symbol} not available"),
    )
}

// =============================================================================
// API State
// =============================================================================

/// Shared state for the API handlers.
#[derive(Debug)]
pub struct ApiState {
    cache: Arc<PriceCache>,
    status: Arc<ConnectionStatus>,
    catalog: Arc<SymbolCatalog>,
    stale_after: Duration,
    version: String,
    started_at: Instant,
}

impl ApiState {
    /// Create API state.
    #[must_use]
    pub fn new(
        cache: Arc<PriceCache>,
        status: Arc<ConnectionStatus>,
        catalog: Arc<SymbolCatalog>,
        stale_after: Duration,
    ) -> Self {
        Self {
            cache,
            status,
            catalog,
            stale_after,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }
}

/// Build the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/status", get(status_handler))
        .route("/api/quotes", get(quotes_handler))
        .route("/api/quotes/{symbol}", get(quote_handler))
        .route("/api/quotes/{symbol}/history", get(history_handler))
        .route("/api/candles/{symbol}", get(candles_handler))
        .route("/api/symbols", get(symbols_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// API Server
// =============================================================================

/// Quote API HTTP server.
#[derive(Debug)]
pub struct ApiServer {
    port: u16,
    state: Arc<ApiState>,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new API server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<ApiState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the API server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ApiServerError> {
        let app = create_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ApiServerError::ServerFailed(e.to_string()))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn index_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let connection = state.status.state();
    Json(serde_json::json!({
        "server": "quote-relay",
        "version": &state.version,
        "status": connection,
        "library_available": connection != ConnectionState::LibraryMissing,
        "endpoints": {
            "/api/status": "Server status",
            "/api/quotes": "All quotes",
            "/api/quotes/{symbol}": "Specific quote",
            "/api/quotes/{symbol}/history": "Recent prices",
            "/api/candles/{symbol}?duration=60&count=100": "Candles from recent prices",
            "/api/symbols": "Symbol catalog with freshness",
        },
    }))
}

async fn status_handler(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(build_status(&state))
}

async fn quotes_handler(State(state): State<Arc<ApiState>>) -> Json<BTreeMap<String, Quote>> {
    Json(state.cache.get_all().into_iter().collect())
}

async fn quote_handler(
    State(state): State<Arc<ApiState>>,
    Path(symbol): Path<String>,
) -> Response {
    match state.cache.get(&symbol) {
        Some(quote) => Json(quote).into_response(),
        None => not_available(&symbol),
    }
}

async fn history_handler(
    State(state): State<Arc<ApiState>>,
    Path(symbol): Path<String>,
) -> Response {
    match state.cache.history(&symbol) {
        Some(points) => Json(HistoryResponse { symbol, points }).into_response(),
        None => not_available(&symbol),
    }
}

async fn candles_handler(
    State(state): State<Arc<ApiState>>,
    Path(symbol): Path<String>,
    Query(params): Query<CandleParams>,
) -> Response {
    let duration = params.duration.unwrap_or(DEFAULT_CANDLE_SECS);
    if duration == 0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "duration must be a positive number of seconds".to_string(),
        );
    }
    let count = params
        .count
        .unwrap_or(DEFAULT_CANDLE_COUNT)
        .min(HISTORY_CAPACITY);

    match state.cache.candles(&symbol, duration, count) {
        Some(candles) => Json(CandlesResponse {
            symbol,
            duration,
            candles,
        })
        .into_response(),
        None => not_available(&symbol),
    }
}

async fn symbols_handler(State(state): State<Arc<ApiState>>) -> Json<SymbolsResponse> {
    Json(build_symbols(&state, now_secs()))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let is_ready = state.status.state().has_session() && !state.cache.is_empty();

    if is_ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn coverage_percent(cached: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = cached as f64 / total as f64;
    (ratio * 1000.0).round() / 10.0
}

fn build_status(state: &ApiState) -> StatusResponse {
    let connection = state.status.snapshot();
    let total_symbols = state.catalog.len();
    let cached_count = state
        .catalog
        .entries()
        .iter()
        .filter(|e| state.cache.contains(e.symbol()))
        .count();

    StatusResponse {
        connection: connection.state,
        cached_count,
        total_symbols,
        coverage_percent: coverage_percent(cached_count, total_symbols),
        last_update_timestamp: state.cache.last_update(),
        server_time: now_secs(),
        provider: connection.provider,
        reconnect_attempts: connection.reconnect_attempts,
        last_error: connection.last_error,
        last_connected_at: connection.last_connected_at,
        library_available: connection.state != ConnectionState::LibraryMissing,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    }
}

fn build_symbols(state: &ApiState, now: f64) -> SymbolsResponse {
    let max_age = state.stale_after.as_secs_f64();
    let symbols: Vec<SymbolInfo> = state
        .catalog
        .entries()
        .iter()
        .map(|entry| {
            let quote = state.cache.get(entry.symbol());
            SymbolInfo {
                symbol: entry.symbol().to_string(),
                asset_class: entry.asset_class(),
                identifiers: entry.identifiers().to_vec(),
                available: quote.is_some(),
                last_price: quote.as_ref().map(|q| q.price),
                last_update: quote.as_ref().map(|q| q.timestamp),
                age_secs: quote.as_ref().map(|q| q.age_secs(now)),
                stale: quote.as_ref().is_none_or(|q| q.is_stale(now, max_age)),
            }
        })
        .collect();

    SymbolsResponse {
        total: symbols.len(),
        available: symbols.iter().filter(|s| s.available).count(),
        stale_after_secs: state.stale_after.as_secs(),
        symbols,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// API server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::QuoteOrigin;

    fn state() -> ApiState {
        ApiState::new(
            Arc::new(PriceCache::new()),
            Arc::new(ConnectionStatus::new()),
            Arc::new(SymbolCatalog::builtin()),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn coverage_is_rounded_to_one_decimal() {
        assert_eq!(coverage_percent(0, 0), 0.0);
        assert_eq!(coverage_percent(1, 3), 33.3);
        assert_eq!(coverage_percent(42, 42), 100.0);
    }

    #[test]
    fn status_reflects_cache_and_connection() {
        let state = state();
        state
            .cache
            .put_at("EURUSD_otc", 1.085, QuoteOrigin::Live, "test", 100.0)
            .unwrap();
        state.status.set_state(ConnectionState::Connected);

        let status = build_status(&state);
        assert_eq!(status.connection, ConnectionState::Connected);
        assert_eq!(status.cached_count, 1);
        assert_eq!(status.total_symbols, 42);
        assert_eq!(status.last_update_timestamp, Some(100.0));
        assert!(status.library_available);
    }

    #[test]
    fn library_missing_is_reported() {
        let state = state();
        state
            .status
            .set_error(ConnectionState::LibraryMissing, "no source".into());
        let status = build_status(&state);
        assert!(!status.library_available);
        assert_eq!(status.last_error.as_deref(), Some("no source"));
    }

    #[test]
    fn symbols_mark_stale_and_missing() {
        let state = state();
        state
            .cache
            .put_at("EURUSD_otc", 1.085, QuoteOrigin::Live, "test", 100.0)
            .unwrap();
        state
            .cache
            .put_at("GBPUSD_otc", 1.275, QuoteOrigin::Live, "test", 10.0)
            .unwrap();

        let response = build_symbols(&state, 120.0);
        let find = |s: &str| response.symbols.iter().find(|i| i.symbol == s).unwrap();

        assert_eq!(response.total, 42);
        assert_eq!(response.available, 2);

        let fresh = find("EURUSD_otc");
        assert!(fresh.available && !fresh.stale);
        assert_eq!(fresh.age_secs, Some(20.0));

        assert!(find("GBPUSD_otc").stale);

        let missing = find("BTCUSD_otc");
        assert!(!missing.available && missing.stale);
        assert!(missing.last_price.is_none());
    }
}
