//! Polling Cycle Integration Tests
//!
//! Drives the scheduler against scripted quote sources and checks what ends
//! up in the cache and the connection status.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quote_relay::{
    AssetClass, ConnectError, ConnectionManager, ConnectionState, ConnectionStatus, FetchError,
    FetchStrategy, IdleDelays, PollingConfig, PollingScheduler, PriceCache, QuoteOrigin,
    QuoteSession, QuoteSource, ReconnectConfig, ReconnectPolicy, SimulatedQuoteSource,
    SymbolCatalog, SymbolEntry,
};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Scripted Source
// =============================================================================

/// Session whose answer per identifier can be changed between cycles.
#[derive(Default)]
struct ScriptedSession {
    answers: Mutex<HashMap<String, Result<f64, FetchError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSession {
    fn set(&self, identifier: &str, answer: Result<f64, FetchError>) {
        self.answers.lock().insert(identifier.to_string(), answer);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl QuoteSession for ScriptedSession {
    async fn fetch_price(
        &self,
        identifier: &str,
        _strategy: FetchStrategy,
    ) -> Result<f64, FetchError> {
        self.calls.lock().push(identifier.to_string());
        self.answers
            .lock()
            .get(identifier)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::SymbolUnavailable(identifier.to_string())))
    }
}

/// Source that either hands out the scripted session or refuses.
struct ScriptedSource {
    session: Arc<ScriptedSession>,
    refuse: Option<ConnectError>,
    connects: AtomicUsize,
}

impl ScriptedSource {
    fn accepting(session: Arc<ScriptedSession>) -> Arc<Self> {
        Arc::new(Self {
            session,
            refuse: None,
            connects: AtomicUsize::new(0),
        })
    }

    fn refusing(error: ConnectError) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::default(),
            refuse: Some(error),
            connects: AtomicUsize::new(0),
        })
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for ScriptedSource {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn QuoteSession>, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.refuse {
            Some(error) => Err(error.clone()),
            None => Ok(self.session.clone()),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn fast_config() -> PollingConfig {
    PollingConfig {
        batch_size: 10,
        symbol_delay: Duration::ZERO,
        batch_delay: Duration::ZERO,
        idle: IdleDelays {
            healthy: Duration::from_millis(10),
            degraded: Duration::from_millis(10),
            failing: Duration::from_millis(10),
        },
        ..PollingConfig::default()
    }
}

fn catalog_of(symbols: &[&str]) -> Arc<SymbolCatalog> {
    let entries = symbols
        .iter()
        .map(|s| SymbolEntry::new(*s, AssetClass::Major, vec![(*s).to_string()]).unwrap())
        .collect();
    Arc::new(SymbolCatalog::new(entries).unwrap())
}

struct Harness {
    scheduler: PollingScheduler,
    cache: Arc<PriceCache>,
    status: Arc<ConnectionStatus>,
}

async fn harness(
    catalog: Arc<SymbolCatalog>,
    primary: Arc<dyn QuoteSource>,
    fallback: Option<Arc<dyn QuoteSource>>,
    config: PollingConfig,
) -> Harness {
    let cache = Arc::new(PriceCache::new());
    let status = Arc::new(ConnectionStatus::new());
    let cancel = CancellationToken::new();
    let mut connection = ConnectionManager::new(
        Some(primary),
        fallback,
        Arc::clone(&status),
        ReconnectPolicy::new(ReconnectConfig::default()),
        cancel.clone(),
    );
    connection.connect().await;

    Harness {
        scheduler: PollingScheduler::new(catalog, Arc::clone(&cache), connection, config, cancel),
        cache,
        status,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn otc_identifier_supplies_price_and_change_is_tracked() {
    let catalog = Arc::new(
        SymbolCatalog::new(vec![
            SymbolEntry::new(
                "EURUSD_otc",
                AssetClass::Major,
                vec!["EURUSD-OTC".to_string(), "EURUSD".to_string()],
            )
            .unwrap(),
        ])
        .unwrap(),
    );
    let session = Arc::new(ScriptedSession::default());
    session.set("EURUSD-OTC", Ok(1.0850));
    let mut h = harness(
        catalog,
        ScriptedSource::accepting(Arc::clone(&session)),
        None,
        fast_config(),
    )
    .await;

    let report = h.scheduler.run_cycle().await;
    assert_eq!(report.updated, 1);
    // regular identifier is tried before the OTC one
    assert_eq!(session.calls(), ["EURUSD", "EURUSD-OTC"]);

    let first = h.cache.get("EURUSD_otc").unwrap();
    assert_eq!(first.price, 1.0850);
    assert!((first.bid - 1.084_989_15).abs() < 1e-9);
    assert!((first.ask - 1.085_010_85).abs() < 1e-9);
    assert_eq!(first.change, 0.0);
    assert_eq!(first.source, QuoteOrigin::Live);
    assert!(first.is_real);
    assert_eq!(first.provider, "scripted");

    session.set("EURUSD-OTC", Ok(1.0860));
    h.scheduler.run_cycle().await;

    let second = h.cache.get("EURUSD_otc").unwrap();
    assert!((second.change - 0.0010).abs() < 1e-9);
    assert!((second.change_percent - 0.0922).abs() < 1e-4);
    assert!(second.timestamp >= first.timestamp);

    let history = h.cache.history("EURUSD_otc").unwrap();
    let prices: Vec<f64> = history.iter().map(|p| p.price).collect();
    assert_eq!(prices, [1.0850, 1.0860]);
}

#[tokio::test]
async fn broken_session_aborts_rest_of_cycle() {
    let symbols = ["S1", "S2", "S3", "S4", "S5", "S6", "S7", "S8", "S9", "S10"];
    let session = Arc::new(ScriptedSession::default());
    for (i, s) in symbols.iter().enumerate() {
        session.set(s, Ok(1.0 + f64::from(u8::try_from(i).unwrap())));
    }
    session.set("S5", Err(FetchError::SessionBroken("connection reset".into())));

    let mut h = harness(
        catalog_of(&symbols),
        ScriptedSource::accepting(Arc::clone(&session)),
        None,
        fast_config(),
    )
    .await;

    let report = h.scheduler.run_cycle().await;

    assert!(report.aborted);
    assert_eq!(report.attempted, 5);
    assert_eq!(report.updated, 4);
    assert_eq!(h.status.snapshot().state, ConnectionState::Disconnected);
    for s in &symbols[..4] {
        assert!(h.cache.contains(s), "{s} should be cached");
    }
    for s in &symbols[4..] {
        assert!(!h.cache.contains(s), "{s} should not be cached");
    }
    assert_eq!(session.calls(), ["S1", "S2", "S3", "S4", "S5"]);
}

#[tokio::test]
async fn failed_symbol_keeps_previous_quote() {
    let session = Arc::new(ScriptedSession::default());
    session.set("A", Ok(10.0));
    session.set("B", Ok(20.0));
    let mut h = harness(
        catalog_of(&["A", "B"]),
        ScriptedSource::accepting(Arc::clone(&session)),
        None,
        fast_config(),
    )
    .await;

    h.scheduler.run_cycle().await;
    let before = h.cache.get("B").unwrap();

    session.set("A", Ok(11.0));
    session.set("B", Err(FetchError::SymbolUnavailable("B".into())));
    let report = h.scheduler.run_cycle().await;

    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(h.cache.get("B"), Some(before));
    assert_eq!(h.cache.get("A").unwrap().price, 11.0);
    assert_eq!(h.scheduler.consecutive_failure_cycles(), 0);
}

#[tokio::test]
async fn repeated_empty_cycles_force_disconnect() {
    let session = Arc::new(ScriptedSession::default());
    let mut h = harness(
        catalog_of(&["A", "B", "C"]),
        ScriptedSource::accepting(Arc::clone(&session)),
        None,
        fast_config(),
    )
    .await;

    for expected in 1..=4 {
        let report = h.scheduler.run_cycle().await;
        assert_eq!(report.updated, 0);
        assert_eq!(h.scheduler.consecutive_failure_cycles(), expected);
        assert_eq!(h.status.snapshot().state, ConnectionState::Connected);
    }

    h.scheduler.run_cycle().await;

    assert_eq!(h.status.snapshot().state, ConnectionState::Disconnected);
    assert_eq!(h.scheduler.consecutive_failure_cycles(), 0);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn zero_failure_threshold_never_disconnects() {
    let session = Arc::new(ScriptedSession::default());
    let config = PollingConfig {
        max_failure_cycles: 0,
        ..fast_config()
    };
    let mut h = harness(
        catalog_of(&["A", "B"]),
        ScriptedSource::accepting(Arc::clone(&session)),
        None,
        config,
    )
    .await;

    for _ in 0..8 {
        h.scheduler.run_cycle().await;
    }

    assert_eq!(h.scheduler.consecutive_failure_cycles(), 8);
    assert_eq!(h.status.snapshot().state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn unreachable_source_skips_cycle_after_backoff() {
    let source = ScriptedSource::refusing(ConnectError::Rejected("network down".into()));
    let mut h = harness(
        catalog_of(&["A"]),
        Arc::clone(&source) as Arc<dyn QuoteSource>,
        None,
        fast_config(),
    )
    .await;
    assert_eq!(source.connects(), 1);

    let start = tokio::time::Instant::now();
    let report = h.scheduler.run_cycle().await;

    assert!(report.skipped);
    assert_eq!(report.attempted, 0);
    assert_eq!(source.connects(), 4);
    // 30 + 60 + 90 between attempts, then the 300 s cooldown
    assert!(start.elapsed() >= Duration::from_secs(480));
    assert_eq!(h.scheduler.consecutive_failure_cycles(), 0);
    assert_eq!(h.status.snapshot().state, ConnectionState::Failed);
}

#[tokio::test]
async fn unavailable_source_serves_simulated_prices() {
    let mut h = harness(
        Arc::new(SymbolCatalog::builtin()),
        ScriptedSource::refusing(ConnectError::Unavailable("not installed".into())),
        Some(Arc::new(SimulatedQuoteSource::new())),
        fast_config(),
    )
    .await;
    assert_eq!(h.status.snapshot().state, ConnectionState::DemoMode);

    let report = h.scheduler.run_cycle().await;

    assert_eq!(report.updated, 42);
    assert_eq!(report.success_ratio(), 1.0);
    let quote = h.cache.get("XAUUSD_otc").unwrap();
    assert_eq!(quote.source, QuoteOrigin::Simulated);
    assert!(!quote.is_real);
    assert_eq!(quote.provider, "simulated");
}

#[tokio::test]
async fn priority_symbols_are_polled_first() {
    let session = Arc::new(ScriptedSession::default());
    for s in ["A", "B", "C", "D"] {
        session.set(s, Ok(1.0));
    }
    let config = PollingConfig {
        priority: vec!["C".to_string(), "MISSING".to_string(), "A".to_string()],
        batch_size: 2,
        ..fast_config()
    };
    let mut h = harness(
        catalog_of(&["A", "B", "C", "D"]),
        ScriptedSource::accepting(Arc::clone(&session)),
        None,
        config,
    )
    .await;

    h.scheduler.run_cycle().await;

    assert_eq!(session.calls(), ["C", "A", "B", "D"]);
}

#[tokio::test]
async fn symbol_cap_rotates_through_catalog() {
    let session = Arc::new(ScriptedSession::default());
    for s in ["A", "B", "C", "D", "E"] {
        session.set(s, Ok(1.0));
    }
    let config = PollingConfig {
        max_symbols_per_cycle: Some(2),
        ..fast_config()
    };
    let mut h = harness(
        catalog_of(&["A", "B", "C", "D", "E"]),
        ScriptedSource::accepting(Arc::clone(&session)),
        None,
        config,
    )
    .await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        session.clear_calls();
        let report = h.scheduler.run_cycle().await;
        assert_eq!(report.total_symbols, 2);
        assert_eq!(report.catalog_size, 5);
        // a capped cycle is measured against the whole catalog
        assert_eq!(report.success_ratio(), 0.4);
        seen.push(session.calls());
    }

    assert_eq!(seen, [vec!["A", "B"], vec!["C", "D"], vec!["E", "A"]]);
}

#[tokio::test]
async fn run_stops_when_cancelled() {
    let session = Arc::new(ScriptedSession::default());
    session.set("A", Ok(1.5));
    let cache = Arc::new(PriceCache::new());
    let status = Arc::new(ConnectionStatus::new());
    let cancel = CancellationToken::new();
    let connection = ConnectionManager::new(
        Some(ScriptedSource::accepting(session)),
        None,
        Arc::clone(&status),
        ReconnectPolicy::new(ReconnectConfig::default()),
        cancel.clone(),
    );
    let scheduler = PollingScheduler::new(
        catalog_of(&["A"]),
        Arc::clone(&cache),
        connection,
        fast_config(),
        cancel.clone(),
    );

    let handle = tokio::spawn(scheduler.run());

    tokio::time::timeout(Duration::from_secs(5), async {
        while cache.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("scheduler never filled the cache");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    assert_eq!(status.snapshot().state, ConnectionState::Connected);
    assert_eq!(cache.get("A").unwrap().price, 1.5);
}
