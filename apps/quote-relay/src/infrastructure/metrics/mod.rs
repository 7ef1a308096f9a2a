//! Prometheus Metrics Module
//!
//! Exposes polling and connection metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Fetches**: Per-outcome fetch counts
//! - **Cycles**: Cycle counts, durations and the last success ratio
//! - **Connection**: Connection state gauge, connects and disconnects
//! - **Cache**: Number of cached symbols
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the API server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns a `BuildError` if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_relay_fetches_total",
        "Price fetches by outcome (ok, unavailable, transient, session_broken, invalid)"
    );

    describe_counter!(
        "quote_relay_cycles_total",
        "Polling cycles by outcome (completed, aborted, skipped)"
    );
    describe_histogram!(
        "quote_relay_cycle_duration_seconds",
        "Wall time of one polling cycle"
    );
    describe_gauge!(
        "quote_relay_cycle_success_ratio",
        "Updated over total symbols in the last cycle"
    );

    describe_gauge!(
        "quote_relay_connection_state",
        "0=disconnected 1=connecting 2=connected 3=failed 4=library_missing 5=demo_mode"
    );
    describe_counter!(
        "quote_relay_connects_total",
        "Connect attempts by result"
    );
    describe_counter!(
        "quote_relay_disconnects_total",
        "Sessions dropped by reason"
    );

    describe_gauge!("quote_relay_cached_symbols", "Number of symbols in the cache");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A valid price was returned.
    Ok,
    /// The identifier had no price.
    Unavailable,
    /// A retryable failure.
    Transient,
    /// The session died.
    SessionBroken,
    /// The source returned an unusable price.
    Invalid,
}

impl FetchOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Unavailable => "unavailable",
            Self::Transient => "transient",
            Self::SessionBroken => "session_broken",
            Self::Invalid => "invalid",
        }
    }
}

/// Outcome label for a polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every batch was walked.
    Completed,
    /// A broken session ended the cycle early.
    Aborted,
    /// No session was available.
    Skipped,
}

impl CycleOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Skipped => "skipped",
        }
    }
}

/// Record one fetch attempt.
pub fn record_fetch(outcome: FetchOutcome) {
    counter!("quote_relay_fetches_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record a finished polling cycle.
pub fn record_cycle(outcome: CycleOutcome, duration: Duration, success_ratio: f64) {
    counter!("quote_relay_cycles_total", "outcome" => outcome.as_str()).increment(1);
    if outcome != CycleOutcome::Skipped {
        histogram!("quote_relay_cycle_duration_seconds").record(duration.as_secs_f64());
        gauge!("quote_relay_cycle_success_ratio").set(success_ratio);
    }
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("quote_relay_connection_state").set(state.as_gauge());
}

/// Record a connect attempt.
pub fn record_connect(success: bool) {
    let result = if success { "ok" } else { "error" };
    counter!("quote_relay_connects_total", "result" => result).increment(1);
}

/// Record a dropped session.
pub fn record_disconnect(reason: &'static str) {
    counter!("quote_relay_disconnects_total", "reason" => reason).increment(1);
}

/// Update the cached-symbol gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_cached_symbols(count: usize) {
    gauge!("quote_relay_cached_symbols").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_outcome_as_str() {
        assert_eq!(FetchOutcome::Ok.as_str(), "ok");
        assert_eq!(FetchOutcome::Unavailable.as_str(), "unavailable");
        assert_eq!(FetchOutcome::Transient.as_str(), "transient");
        assert_eq!(FetchOutcome::SessionBroken.as_str(), "session_broken");
        assert_eq!(FetchOutcome::Invalid.as_str(), "invalid");
    }

    #[test]
    fn cycle_outcome_as_str() {
        assert_eq!(CycleOutcome::Completed.as_str(), "completed");
        assert_eq!(CycleOutcome::Aborted.as_str(), "aborted");
        assert_eq!(CycleOutcome::Skipped.as_str(), "skipped");
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_fetch(FetchOutcome::Ok);
        record_cycle(CycleOutcome::Skipped, Duration::ZERO, 0.0);
        set_connection_state(ConnectionState::Connected);
        record_disconnect("test");
    }
}
