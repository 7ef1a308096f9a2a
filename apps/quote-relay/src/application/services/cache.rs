//! Price Cache
//!
//! Latest quote per symbol. The polling scheduler is the only writer; HTTP
//! handlers read concurrently. Each `put` swaps one entry under the write
//! lock, so a reader sees either the previous quote or the new one.
//!
//! Entries are never evicted. Staleness is left to readers, who compare a
//! quote's `timestamp` against their own threshold. Every accepted price is
//! also appended to the symbol's bounded history under the same lock.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::history::{Candle, PriceHistory, PricePoint};
use crate::domain::quote::{Quote, QuoteError, QuoteOrigin, Symbol, now_secs};

#[derive(Debug, Default)]
struct CacheInner {
    quotes: HashMap<Symbol, Quote>,
    history: HashMap<Symbol, PriceHistory>,
    last_update: Option<f64>,
}

/// In-memory quote cache.
#[derive(Debug, Default)]
pub struct PriceCache {
    inner: RwLock<CacheInner>,
}

impl PriceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the latest quote for `symbol`.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.inner.read().quotes.get(symbol).cloned()
    }

    /// Snapshot of every cached quote.
    #[must_use]
    pub fn get_all(&self) -> HashMap<Symbol, Quote> {
        self.inner.read().quotes.clone()
    }

    /// Store a freshly fetched price, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError::InvalidPrice` for nonpositive or non-finite
    /// prices; the existing entry is left untouched.
    pub fn put(
        &self,
        symbol: &str,
        price: f64,
        origin: QuoteOrigin,
        provider: &str,
    ) -> Result<Quote, QuoteError> {
        self.put_at(symbol, price, origin, provider, now_secs())
    }

    /// Store a price with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// See [`PriceCache::put`].
    pub fn put_at(
        &self,
        symbol: &str,
        price: f64,
        origin: QuoteOrigin,
        provider: &str,
        timestamp: f64,
    ) -> Result<Quote, QuoteError> {
        let mut inner = self.inner.write();
        let quote = Quote::new(
            symbol,
            price,
            origin,
            provider,
            timestamp,
            inner.quotes.get(symbol),
        )?;

        inner.quotes.insert(symbol.to_string(), quote.clone());
        inner
            .history
            .entry(symbol.to_string())
            .or_default()
            .push(PricePoint { price, timestamp });
        inner.last_update = Some(inner.last_update.map_or(timestamp, |t| t.max(timestamp)));
        Ok(quote)
    }

    /// Whether `symbol` has ever been fetched.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.inner.read().quotes.contains_key(symbol)
    }

    /// Number of cached symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().quotes.len()
    }

    /// Whether nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().quotes.is_empty()
    }

    /// Timestamp of the newest write, if any.
    #[must_use]
    pub fn last_update(&self) -> Option<f64> {
        self.inner.read().last_update
    }

    /// Recent prices for `symbol`, oldest first.
    #[must_use]
    pub fn history(&self, symbol: &str) -> Option<Vec<PricePoint>> {
        self.inner.read().history.get(symbol).map(PriceHistory::points)
    }

    /// The most recent `count` candles of `duration_secs` for `symbol`.
    #[must_use]
    pub fn candles(&self, symbol: &str, duration_secs: u64, count: usize) -> Option<Vec<Candle>> {
        self.inner
            .read()
            .history
            .get(symbol)
            .map(|h| h.candles(duration_secs, count))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::history::HISTORY_CAPACITY;

    #[test]
    fn get_unknown_symbol_is_none() {
        let cache = PriceCache::new();
        assert!(cache.get("UNKNOWN_otc").is_none());
        assert!(cache.is_empty());
        assert!(cache.last_update().is_none());
    }

    #[test]
    fn put_derives_change_from_previous_entry() {
        let cache = PriceCache::new();
        let first = cache
            .put_at("EURUSD_otc", 1.0850, QuoteOrigin::Live, "test", 10.0)
            .unwrap();
        assert_eq!(first.change, 0.0);

        let second = cache
            .put_at("EURUSD_otc", 1.0860, QuoteOrigin::Live, "test", 20.0)
            .unwrap();
        assert!((second.change - 0.0010).abs() < 1e-9);
        assert!((second.change_percent - 0.0922).abs() < 1e-4);
        assert_eq!(cache.get("EURUSD_otc"), Some(second));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.last_update(), Some(20.0));
    }

    #[test]
    fn change_uses_immediately_preceding_quote() {
        let cache = PriceCache::new();
        for (i, price) in [100.0, 110.0, 99.0].into_iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let ts = i as f64;
            cache.put_at("X", price, QuoteOrigin::Live, "test", ts).unwrap();
        }
        let q = cache.get("X").unwrap();
        assert!((q.change - -11.0).abs() < 1e-9);
        assert!((q.change_percent - -10.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_price_leaves_entry_untouched() {
        let cache = PriceCache::new();
        let stored = cache
            .put_at("X", 2.0, QuoteOrigin::Simulated, "sim", 1.0)
            .unwrap();

        assert!(cache.put_at("X", 0.0, QuoteOrigin::Live, "test", 2.0).is_err());
        assert!(cache.put_at("X", -3.0, QuoteOrigin::Live, "test", 3.0).is_err());
        assert_eq!(cache.get("X"), Some(stored));
        assert_eq!(cache.last_update(), Some(1.0));
    }

    #[test]
    fn get_all_is_a_snapshot() {
        let cache = PriceCache::new();
        cache.put_at("A", 1.0, QuoteOrigin::Live, "t", 1.0).unwrap();
        let snapshot = cache.get_all();
        cache.put_at("B", 2.0, QuoteOrigin::Live, "t", 2.0).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(cache.get_all().len(), 2);
    }

    #[test]
    fn accepted_prices_are_recorded_in_history() {
        let cache = PriceCache::new();
        cache.put_at("A", 1.0, QuoteOrigin::Live, "t", 100.0).unwrap();
        cache.put_at("A", 2.0, QuoteOrigin::Live, "t", 130.0).unwrap();
        assert!(cache.put_at("A", f64::NAN, QuoteOrigin::Live, "t", 140.0).is_err());
        cache.put_at("A", 3.0, QuoteOrigin::Live, "t", 170.0).unwrap();

        let points = cache.history("A").unwrap();
        let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, [1.0, 2.0, 3.0]);
        assert!(cache.history("MISSING").is_none());

        let candles = cache.candles("A", 60, 10).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 1.0);
        assert_eq!(candles[0].close, 2.0);
        assert_eq!(candles[1].open, 3.0);
    }

    #[test]
    fn history_is_bounded() {
        let cache = PriceCache::new();
        for i in 0..1_050 {
            let ts = f64::from(i);
            cache.put_at("A", ts + 1.0, QuoteOrigin::Live, "t", ts).unwrap();
        }

        let points = cache.history("A").unwrap();
        assert_eq!(points.len(), HISTORY_CAPACITY);
        assert_eq!(points[0].timestamp, 50.0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_readers_see_whole_quotes() {
        let cache = Arc::new(PriceCache::new());
        cache.put_at("A", 1.0, QuoteOrigin::Live, "t", 0.0).unwrap();

        let writer = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                for i in 1..500 {
                    let price = f64::from(i);
                    cache.put_at("A", price, QuoteOrigin::Live, "t", price).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..500 {
            let q = cache.get("A").unwrap();
            assert!(q.bid < q.price && q.price < q.ask);
            assert!((q.timestamp - q.price).abs() < f64::EPSILON || q.timestamp == 0.0);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }
}
