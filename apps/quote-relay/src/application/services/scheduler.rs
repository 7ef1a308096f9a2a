//! Polling Scheduler
//!
//! Background loop that walks the symbol catalog in batches, fetches a price
//! for every symbol through the connection manager and stores it in the
//! price cache. Pacing adapts to how well the last cycle went.
//!
//! # Cycle
//!
//! ```text
//! ensure session ─► batch 1 ─► batch_delay ─► batch 2 ─► ... ─► idle delay
//!                     │
//!                     └─ symbol ─► symbol_delay ─► symbol ─► ...
//! ```
//!
//! A broken session aborts the rest of the cycle. Cycles that update
//! nothing are counted, and after `max_failure_cycles` of them in a row the
//! session is dropped so the next cycle reconnects.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::cache::PriceCache;
use super::connection::ConnectionManager;
use super::sleep_or_cancelled;
use crate::application::ports::{FetchError, FetchStrategy, QuoteSession};
use crate::domain::catalog::{SymbolCatalog, SymbolEntry};
use crate::domain::quote::{QuoteOrigin, Symbol, is_valid_price};
use crate::infrastructure::metrics::{self, CycleOutcome, FetchOutcome};

// =============================================================================
// Configuration
// =============================================================================

/// Idle delays between cycles, picked by the last cycle's success ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleDelays {
    /// Ratio of at least 0.8.
    pub healthy: Duration,
    /// Ratio of at least 0.5.
    pub degraded: Duration,
    /// Anything worse, and skipped cycles.
    pub failing: Duration,
}

impl Default for IdleDelays {
    fn default() -> Self {
        Self {
            healthy: Duration::from_secs(5),
            degraded: Duration::from_secs(15),
            failing: Duration::from_secs(30),
        }
    }
}

impl IdleDelays {
    /// Pick the delay for a success ratio in `[0, 1]`.
    #[must_use]
    pub fn for_ratio(&self, ratio: f64) -> Duration {
        if ratio >= 0.8 {
            self.healthy
        } else if ratio >= 0.5 {
            self.degraded
        } else {
            self.failing
        }
    }
}

/// Bounded retry for one strategy on one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Tries per strategy.
    pub attempts: u32,
    /// Wait after a transient failure.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay: Duration::from_millis(500),
        }
    }
}

/// Polling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    /// Symbols per batch.
    pub batch_size: usize,
    /// Pause after every symbol.
    pub symbol_delay: Duration,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Pause between cycles.
    pub idle: IdleDelays,
    /// Consecutive empty cycles before forcing a reconnect (0 = never).
    pub max_failure_cycles: u32,
    /// Cap on symbols per cycle; later cycles continue where this one stopped.
    pub max_symbols_per_cycle: Option<usize>,
    /// Symbols polled ahead of catalog order.
    pub priority: Vec<Symbol>,
    /// Retry settings for each fetch.
    pub retry: RetryConfig,
    /// Strategies tried in order for each identifier.
    pub strategies: Vec<FetchStrategy>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            symbol_delay: Duration::from_millis(100),
            batch_delay: Duration::from_millis(500),
            idle: IdleDelays::default(),
            max_failure_cycles: 5,
            max_symbols_per_cycle: None,
            priority: Vec::new(),
            retry: RetryConfig::default(),
            strategies: vec![FetchStrategy::Snapshot],
        }
    }
}

// =============================================================================
// Cycle Report
// =============================================================================

/// Summary of one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Symbols a fetch was attempted for.
    pub attempted: usize,
    /// Symbols whose cache entry was replaced.
    pub updated: usize,
    /// Symbols with no price this cycle.
    pub failed: usize,
    /// Symbols scheduled for this cycle.
    pub total_symbols: usize,
    /// Symbols in the whole catalog.
    pub catalog_size: usize,
    /// A broken session ended the cycle early.
    pub aborted: bool,
    /// No session was available; nothing was fetched.
    pub skipped: bool,
    /// Wall time spent in the cycle.
    pub duration: Duration,
}

impl CycleReport {
    /// `updated / catalog_size`, or 0 for an empty catalog.
    ///
    /// Capped cycles are measured against the whole catalog too.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_ratio(&self) -> f64 {
        if self.catalog_size == 0 {
            return 0.0;
        }
        self.updated as f64 / self.catalog_size as f64
    }

    const fn outcome(&self) -> CycleOutcome {
        if self.skipped {
            CycleOutcome::Skipped
        } else if self.aborted {
            CycleOutcome::Aborted
        } else {
            CycleOutcome::Completed
        }
    }
}

// =============================================================================
// Fetch With Retry
// =============================================================================

/// Fetch a price for one symbol.
///
/// Tries each identifier in order and, for each, each strategy in order.
/// A strategy gets up to `retry.attempts` tries; only transient failures are
/// retried. Unavailable identifiers and unusable prices move on to the next
/// strategy. Returns `Ok(None)` when nothing produced a price.
///
/// # Errors
///
/// Returns `FetchError::SessionBroken` as soon as the session reports it.
pub async fn fetch_with_retry(
    session: &dyn QuoteSession,
    identifiers: &[String],
    strategies: &[FetchStrategy],
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<Option<f64>, FetchError> {
    let attempts = retry.attempts.max(1);

    for identifier in identifiers {
        for &strategy in strategies {
            for attempt in 1..=attempts {
                match session.fetch_price(identifier, strategy).await {
                    Ok(price) if is_valid_price(price) => {
                        metrics::record_fetch(FetchOutcome::Ok);
                        return Ok(Some(price));
                    }
                    Ok(price) => {
                        metrics::record_fetch(FetchOutcome::Invalid);
                        tracing::debug!(identifier = %identifier, price, "Discarding unusable price");
                        break;
                    }
                    Err(FetchError::SymbolUnavailable(reason)) => {
                        metrics::record_fetch(FetchOutcome::Unavailable);
                        tracing::debug!(
                            identifier = %identifier,
                            strategy = strategy.as_str(),
                            reason = %reason,
                            "No price for identifier"
                        );
                        break;
                    }
                    Err(FetchError::Transient(reason)) => {
                        metrics::record_fetch(FetchOutcome::Transient);
                        tracing::debug!(
                            identifier = %identifier,
                            strategy = strategy.as_str(),
                            attempt,
                            reason = %reason,
                            "Transient fetch failure"
                        );
                        if attempt < attempts && !sleep_or_cancelled(cancel, retry.delay).await {
                            return Ok(None);
                        }
                    }
                    Err(e @ FetchError::SessionBroken(_)) => {
                        metrics::record_fetch(FetchOutcome::SessionBroken);
                        return Err(e);
                    }
                }
            }
        }
    }

    Ok(None)
}

// =============================================================================
// Scheduler
// =============================================================================

/// Polling scheduler. The only writer of the price cache.
#[derive(Debug)]
pub struct PollingScheduler {
    catalog: Arc<SymbolCatalog>,
    cache: Arc<PriceCache>,
    connection: ConnectionManager,
    config: PollingConfig,
    cancel: CancellationToken,
    consecutive_failure_cycles: u32,
    cursor: usize,
}

impl PollingScheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(
        catalog: Arc<SymbolCatalog>,
        cache: Arc<PriceCache>,
        connection: ConnectionManager,
        config: PollingConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            catalog,
            cache,
            connection,
            config,
            cancel,
            consecutive_failure_cycles: 0,
            cursor: 0,
        }
    }

    /// Empty cycles since the last update.
    #[must_use]
    pub const fn consecutive_failure_cycles(&self) -> u32 {
        self.consecutive_failure_cycles
    }

    /// Run cycles until cancelled.
    pub async fn run(mut self) {
        let initial = self.connection.connect().await;
        if let Some(reason) = &initial.reason {
            tracing::warn!(reason = %reason, "Initial connect did not produce a session");
        }

        tracing::info!(
            symbols = self.catalog.len(),
            batch_size = self.config.batch_size,
            "Polling scheduler started"
        );

        while !self.cancel.is_cancelled() {
            let report = self.run_cycle().await;
            let idle = if report.skipped {
                self.config.idle.failing
            } else {
                self.config.idle.for_ratio(report.success_ratio())
            };

            if !sleep_or_cancelled(&self.cancel, idle).await {
                break;
            }
        }

        tracing::info!("Polling scheduler stopped");
    }

    /// Run one polling cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        if !self.connection.is_usable() && !self.connection.ensure_connected().await {
            report.skipped = true;
            report.duration = started.elapsed();
            metrics::record_cycle(report.outcome(), report.duration, 0.0);
            tracing::warn!(state = %self.connection.state(), "Skipping cycle, no session");
            return report;
        }

        let origin = self.connection.origin().unwrap_or(QuoteOrigin::Live);
        let provider = self.connection.provider().unwrap_or_default().to_string();
        let catalog = Arc::clone(&self.catalog);
        let scheduled = self.schedule(&catalog);
        report.total_symbols = scheduled.len();
        report.catalog_size = catalog.len();

        let batch_size = self.config.batch_size.max(1);
        let mut cancelled = false;

        'batches: for (index, batch) in scheduled.chunks(batch_size).enumerate() {
            if index > 0 && !sleep_or_cancelled(&self.cancel, self.config.batch_delay).await {
                cancelled = true;
                break;
            }

            for entry in batch {
                report.attempted += 1;
                let result = fetch_with_retry(
                    &self.connection,
                    entry.identifiers(),
                    &self.config.strategies,
                    &self.config.retry,
                    &self.cancel,
                )
                .await;

                match result {
                    Ok(Some(price)) => match self.cache.put(entry.symbol(), price, origin, &provider) {
                        Ok(quote) => {
                            report.updated += 1;
                            self.consecutive_failure_cycles = 0;
                            tracing::trace!(symbol = %quote.symbol, price = quote.price, "Quote updated");
                        }
                        Err(e) => {
                            report.failed += 1;
                            tracing::debug!(symbol = entry.symbol(), error = %e, "Rejected price");
                        }
                    },
                    Ok(None) => {
                        report.failed += 1;
                    }
                    Err(e) => {
                        report.failed += 1;
                        report.aborted = true;
                        self.connection
                            .mark_disconnected("session_broken", &e.to_string());
                        break 'batches;
                    }
                }

                if !sleep_or_cancelled(&self.cancel, self.config.symbol_delay).await {
                    cancelled = true;
                    break 'batches;
                }
            }
        }

        if !report.aborted && !cancelled {
            self.track_failure_cycles(&report);
        }

        report.duration = started.elapsed();
        metrics::record_cycle(report.outcome(), report.duration, report.success_ratio());
        metrics::set_cached_symbols(self.cache.len());
        tracing::info!(
            updated = report.updated,
            failed = report.failed,
            total = report.total_symbols,
            aborted = report.aborted,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "Polling cycle finished"
        );
        report
    }

    fn track_failure_cycles(&mut self, report: &CycleReport) {
        if report.updated > 0 {
            return;
        }

        self.consecutive_failure_cycles = self.consecutive_failure_cycles.saturating_add(1);
        let max = self.config.max_failure_cycles;
        tracing::warn!(
            consecutive = self.consecutive_failure_cycles,
            max,
            "Cycle updated no symbols"
        );

        if max > 0 && self.consecutive_failure_cycles >= max {
            self.connection.mark_disconnected(
                "failure_cycles",
                &format!("{max} consecutive cycles without a price"),
            );
            self.consecutive_failure_cycles = 0;
        }
    }

    /// Symbols for this cycle, advancing the cursor when capped.
    fn schedule<'a>(&mut self, catalog: &'a SymbolCatalog) -> Vec<&'a SymbolEntry> {
        let order = catalog.poll_order(&self.config.priority);
        match self.config.max_symbols_per_cycle {
            Some(cap) if cap > 0 && cap < order.len() => {
                let start = self.cursor % order.len();
                self.cursor = (start + cap) % order.len();
                order.iter().cycle().skip(start).take(cap).copied().collect()
            }
            _ => order,
        }
    }
}
