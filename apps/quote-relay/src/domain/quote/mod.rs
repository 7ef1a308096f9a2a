//! Quote Records
//!
//! A `Quote` is the cached view of one symbol's latest price. Bid and ask
//! are derived from the price with a fixed per-side spread, and the change
//! fields are computed against the quote it replaces.
//!
//! Quotes are never mutated in place. Every successful fetch builds a new
//! record from the raw price and the previous record, and the cache swaps it
//! in wholesale.

use serde::{Deserialize, Serialize};

/// A canonical symbol (e.g. `EURUSD_otc`).
pub type Symbol = String;

/// Per-side spread applied to the raw price (0.001%).
pub const SPREAD: f64 = 0.000_01;

/// Where a quote's price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteOrigin {
    /// Fetched from a live upstream session.
    Live,
    /// Produced by the simulated generator.
    Simulated,
}

impl QuoteOrigin {
    /// Get the origin name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Simulated => "simulated",
        }
    }

    /// Whether quotes with this origin reflect real market data.
    #[must_use]
    pub const fn is_real(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// Latest known quote for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Canonical symbol.
    pub symbol: Symbol,
    /// Raw fetched price, always positive.
    pub price: f64,
    /// `price * (1 - SPREAD)`.
    pub bid: f64,
    /// `price * (1 + SPREAD)`.
    pub ask: f64,
    /// Wall-clock time of the fetch, in seconds since the Unix epoch.
    pub timestamp: f64,
    /// Price difference versus the previous quote.
    pub change: f64,
    /// `change` as a percentage of the previous price.
    pub change_percent: f64,
    /// Origin of the price.
    pub source: QuoteOrigin,
    /// True for live data.
    pub is_real: bool,
    /// Name of the quote source that produced the price.
    pub provider: String,
}

impl Quote {
    /// Build a quote from a raw price, deriving change fields from `previous`.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError::InvalidPrice` if `price` is not a positive,
    /// finite number.
    pub fn new(
        symbol: impl Into<Symbol>,
        price: f64,
        origin: QuoteOrigin,
        provider: impl Into<String>,
        timestamp: f64,
        previous: Option<&Self>,
    ) -> Result<Self, QuoteError> {
        if !is_valid_price(price) {
            return Err(QuoteError::InvalidPrice(price));
        }

        let (change, change_percent) = previous.map_or((0.0, 0.0), |prev| {
            let change = price - prev.price;
            let percent = if prev.price > 0.0 {
                change / prev.price * 100.0
            } else {
                0.0
            };
            (change, percent)
        });

        Ok(Self {
            symbol: symbol.into(),
            price,
            bid: price * (1.0 - SPREAD),
            ask: price * (1.0 + SPREAD),
            timestamp,
            change,
            change_percent,
            source: origin,
            is_real: origin.is_real(),
            provider: provider.into(),
        })
    }

    /// Seconds elapsed between the fetch and `now`.
    #[must_use]
    pub fn age_secs(&self, now: f64) -> f64 {
        (now - self.timestamp).max(0.0)
    }

    /// Whether the quote is older than `max_age_secs` at `now`.
    #[must_use]
    pub fn is_stale(&self, now: f64, max_age_secs: f64) -> bool {
        self.age_secs(now) > max_age_secs
    }
}

/// Check that a fetched price can be stored.
#[must_use]
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Current wall-clock time in seconds since the Unix epoch.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Quote construction errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuoteError {
    /// Price is zero, negative, NaN or infinite.
    #[error("invalid price: {0}")]
    InvalidPrice(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn quote(price: f64, previous: Option<&Quote>) -> Quote {
        Quote::new("EURUSD_otc", price, QuoteOrigin::Live, "test", 1_000.0, previous).unwrap()
    }

    #[test]
    fn first_quote_has_zero_change() {
        let q = quote(1.0850, None);
        assert_eq!(q.price, 1.0850);
        assert_eq!(q.change, 0.0);
        assert_eq!(q.change_percent, 0.0);
        assert!((q.bid - 1.084_989_15).abs() < 1e-9);
        assert!((q.ask - 1.085_010_85).abs() < 1e-9);
    }

    #[test]
    fn change_is_relative_to_previous() {
        let first = quote(1.0850, None);
        let second = quote(1.0860, Some(&first));
        assert!((second.change - 0.0010).abs() < 1e-9);
        assert!((second.change_percent - 0.092_165_9).abs() < 1e-6);
    }

    #[test]
    fn rejects_nonpositive_and_non_finite_prices() {
        for price in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = Quote::new("X", price, QuoteOrigin::Live, "test", 0.0, None);
            assert!(matches!(result, Err(QuoteError::InvalidPrice(_))));
        }
    }

    #[test]
    fn origin_drives_is_real() {
        let q = Quote::new("X", 2.0, QuoteOrigin::Simulated, "sim", 0.0, None).unwrap();
        assert!(!q.is_real);
        assert_eq!(q.source, QuoteOrigin::Simulated);
    }

    #[test]
    fn staleness_uses_timestamp_age() {
        let q = quote(1.0, None);
        assert!(!q.is_stale(1_030.0, 60.0));
        assert!(q.is_stale(1_061.0, 60.0));
        // Clock skew never produces a negative age.
        assert_eq!(q.age_secs(900.0), 0.0);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(quote(1.5, None)).unwrap();
        assert!(json.get("changePercent").is_some());
        assert_eq!(json["isReal"], true);
        assert_eq!(json["source"], "live");
    }

    proptest! {
        #[test]
        fn bid_below_price_below_ask(price in 1e-6_f64..1e9) {
            let q = quote(price, None);
            prop_assert!(q.price > 0.0);
            prop_assert!(q.bid < q.price);
            prop_assert!(q.price < q.ask);
        }

        #[test]
        fn change_percent_matches_previous(prev in 1e-3_f64..1e6, next in 1e-3_f64..1e6) {
            let first = quote(prev, None);
            let second = quote(next, Some(&first));
            let expected = (next - prev) / prev * 100.0;
            prop_assert!((second.change_percent - expected).abs() <= expected.abs() * 1e-12 + 1e-12);
        }
    }
}
