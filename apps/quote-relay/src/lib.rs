#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::unreadable_literal
    )
)]

//! Quote Relay - Polling Price Cache
//!
//! Polls a quote source for a fixed catalog of currency, commodity and
//! crypto symbols, keeps the latest quote per symbol in memory and serves
//! it over a read-only HTTP API.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Quote records, connection states, the symbol catalog
//!   - `quote`: Quote type with derived bid/ask/change
//!   - `connection`: Connection state machine states
//!   - `catalog`: Canonical symbols and their upstream identifiers
//!   - `history`: Bounded price history and candles
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Quote source and session traits
//!   - `services`: Connection manager, price cache, polling scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `source`: Simulated and HTTP quote sources
//!   - `api`: Read-only HTTP API and health checks
//!   - `config`: Environment-driven configuration
//!   - `metrics`, `telemetry`: Prometheus and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//!                  ┌────────────┐    ┌───────────┐    ┌─────────┐
//! Quote Source ◄───│ Connection │◄───│ Scheduler │───►│  Price  │◄─── HTTP API
//!  (http / sim)    │  Manager   │    │  (1 task) │    │  Cache  │     (readers)
//!                  └─────┬──────┘    └───────────┘    └─────────┘
//!                        └──── status ──────────────────────────────►
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core quote types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::catalog::{AssetClass, CatalogError, SymbolCatalog, SymbolEntry};
pub use domain::connection::ConnectionState;
pub use domain::history::{Candle, HISTORY_CAPACITY, PriceHistory, PricePoint};
pub use domain::quote::{Quote, QuoteError, QuoteOrigin, Symbol};

// Ports
pub use application::ports::{ConnectError, FetchError, FetchStrategy, QuoteSession, QuoteSource};

// Services
pub use application::services::{
    ConnectResult, ConnectionManager, ConnectionSnapshot, ConnectionStatus, CycleReport,
    IdleDelays, PollingConfig, PollingScheduler, PriceCache, ReconnectConfig, ReconnectPolicy,
    RetryConfig,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, Credentials, EnvironmentProfile, PollingSettings, ReconnectSettings, RelayConfig,
    ServerSettings, SourceKind, SourceSettings,
};

// API server
pub use infrastructure::api::{
    ApiServer, ApiServerError, ApiState, CandlesResponse, HistoryResponse, create_router,
};

// Quote sources
pub use infrastructure::source::{HttpQuoteSource, SimulatedQuoteSource, SourceSet, build_sources};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
