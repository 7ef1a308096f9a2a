//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ConnectionManager`: owns the quote-source session and its state
//! - `PriceCache`: latest quote per symbol, shared with readers
//! - `PollingScheduler`: the background loop that fills the cache

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub mod cache;
pub mod connection;
pub mod reconnect;
pub mod scheduler;

pub use cache::PriceCache;
pub use connection::{ConnectResult, ConnectionManager, ConnectionSnapshot, ConnectionStatus};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use scheduler::{
    CycleReport, IdleDelays, PollingConfig, PollingScheduler, RetryConfig, fetch_with_retry,
};

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` if cancelled.
pub(crate) async fn sleep_or_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
