//! Port Interfaces
//!
//! Defines the quote-source capability the polling core depends on,
//! following the Hexagonal Architecture pattern. Infrastructure adapters
//! implement these traits; the application services only see the traits.
//!
//! ## Driven Ports (Outbound)
//!
//! - `QuoteSource`: opens sessions with an upstream price provider
//! - `QuoteSession`: fetches one price for one upstream identifier
//!
//! Failures are typed. Each adapter decides which of its own errors mean
//! the whole session is gone (`SessionBroken`), which mean only this
//! identifier has no price (`SymbolUnavailable`), and which are worth
//! retrying (`Transient`).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

/// How a session should obtain a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// One-shot request for the latest closed price.
    Snapshot,
    /// Read from a real-time stream subscription.
    RealtimeStream,
}

impl FetchStrategy {
    /// Get the strategy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::RealtimeStream => "realtime_stream",
        }
    }
}

/// Errors from opening a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// The source refused the session (bad credentials, network down).
    #[error("connection rejected: {0}")]
    Rejected(String),
    /// The source cannot be used at all in this process.
    #[error("quote source unavailable: {0}")]
    Unavailable(String),
}

/// Errors from a single price fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The session is dead; every further fetch on it will fail.
    #[error("session broken: {0}")]
    SessionBroken(String),
    /// No price for this identifier right now.
    #[error("symbol unavailable: {0}")]
    SymbolUnavailable(String),
    /// A one-off failure that may succeed on retry.
    #[error("transient fetch error: {0}")]
    Transient(String),
}

impl FetchError {
    /// Whether this error invalidates the session.
    #[must_use]
    pub const fn is_session_broken(&self) -> bool {
        matches!(self, Self::SessionBroken(_))
    }
}

/// An established session with a quote source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSession: Send + Sync {
    /// Fetch the latest price for an upstream identifier.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` classified by the adapter.
    async fn fetch_price(&self, identifier: &str, strategy: FetchStrategy)
    -> Result<f64, FetchError>;
}

/// Factory for quote sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Human-readable provider name, stamped on every quote.
    fn name(&self) -> String;

    /// Open a new session.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError::Rejected` when the session was refused and
    /// `ConnectError::Unavailable` when the source can never connect.
    async fn connect(&self) -> Result<Arc<dyn QuoteSession>, ConnectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names() {
        assert_eq!(FetchStrategy::Snapshot.as_str(), "snapshot");
        assert_eq!(FetchStrategy::RealtimeStream.as_str(), "realtime_stream");
    }

    #[test]
    fn only_session_broken_invalidates_session() {
        assert!(FetchError::SessionBroken("x".into()).is_session_broken());
        assert!(!FetchError::SymbolUnavailable("x".into()).is_session_broken());
        assert!(!FetchError::Transient("x".into()).is_session_broken());
    }

    #[tokio::test]
    async fn mocked_session_returns_configured_price() {
        let mut session = MockQuoteSession::new();
        session
            .expect_fetch_price()
            .times(2)
            .returning(|id, _| {
                if id == "EURUSD-OTC" {
                    Ok(1.085)
                } else {
                    Err(FetchError::SymbolUnavailable(id.to_string()))
                }
            });

        let price = session
            .fetch_price("EURUSD-OTC", FetchStrategy::Snapshot)
            .await
            .unwrap();
        assert!((price - 1.085).abs() < f64::EPSILON);

        let missing = session.fetch_price("NOPE", FetchStrategy::Snapshot).await;
        assert!(matches!(missing, Err(FetchError::SymbolUnavailable(_))));
    }
}
