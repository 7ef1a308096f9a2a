//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the process-level plumbing.

/// Read-only HTTP API and health endpoints.
pub mod api;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Quote source adapters (simulated, HTTP).
pub mod source;

/// OpenTelemetry tracing integration.
pub mod telemetry;
