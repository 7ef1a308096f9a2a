//! Connection Manager
//!
//! Owns the single quote-source session and drives the connection state
//! machine. Status is published through a shared [`ConnectionStatus`] that
//! the HTTP layer reads without touching the manager.
//!
//! When the primary source reports itself unavailable the manager falls
//! back to the configured simulated source (`demo_mode`) or gives up for the
//! life of the process (`library_missing`). Both states are sticky.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::reconnect::ReconnectPolicy;
use super::sleep_or_cancelled;
use crate::application::ports::{
    ConnectError, FetchError, FetchStrategy, QuoteSession, QuoteSource,
};
use crate::domain::connection::ConnectionState;
use crate::domain::quote::QuoteOrigin;
use crate::infrastructure::metrics;

// =============================================================================
// Shared Status
// =============================================================================

/// Connection status shared between the manager and readers.
///
/// Every field sits behind one lock, so a snapshot never mixes two
/// transitions.
#[derive(Debug, Default)]
pub struct ConnectionStatus {
    inner: RwLock<StatusInner>,
}

#[derive(Debug, Default)]
struct StatusInner {
    state: ConnectionState,
    last_error: Option<String>,
    last_connected_at: Option<DateTime<Utc>>,
    provider: Option<String>,
    reconnect_attempts: u32,
    connects_total: u64,
}

/// Point-in-time copy of [`ConnectionStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    /// Current state.
    pub state: ConnectionState,
    /// Last connect or transport error.
    pub last_error: Option<String>,
    /// When the last session was established.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Provider of the active session.
    pub provider: Option<String>,
    /// Attempts in the current reconnect round.
    pub reconnect_attempts: u32,
    /// Sessions opened since start.
    pub connects_total: u64,
}

impl ConnectionStatus {
    /// Create a status in `disconnected`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    ///
    /// Entering `connected` or `demo_mode` clears the last error and the
    /// reconnect round.
    pub fn set_state(&self, state: ConnectionState) {
        {
            let mut inner = self.inner.write();
            inner.state = state;
            if state.has_session() {
                inner.last_connected_at = Some(Utc::now());
                inner.reconnect_attempts = 0;
                inner.connects_total += 1;
                inner.last_error = None;
            }
        }
        metrics::set_connection_state(state);
    }

    /// Set a state together with the error that caused it.
    pub fn set_error(&self, state: ConnectionState, message: String) {
        {
            let mut inner = self.inner.write();
            inner.state = state;
            inner.last_error = Some(message);
        }
        metrics::set_connection_state(state);
    }

    fn set_provider(&self, provider: Option<String>) {
        self.inner.write().provider = provider;
    }

    fn increment_reconnect_attempts(&self) {
        let mut inner = self.inner.write();
        inner.reconnect_attempts = inner.reconnect_attempts.saturating_add(1);
    }

    fn reset_reconnect_attempts(&self) {
        self.inner.write().reconnect_attempts = 0;
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.read().state
    }

    /// Get the last recorded error.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// Copy every field under one read lock.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        let inner = self.inner.read();
        ConnectionSnapshot {
            state: inner.state,
            last_error: inner.last_error.clone(),
            last_connected_at: inner.last_connected_at,
            provider: inner.provider.clone(),
            reconnect_attempts: inner.reconnect_attempts,
            connects_total: inner.connects_total,
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Outcome of a single connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResult {
    /// Whether a usable session now exists.
    pub ok: bool,
    /// Why the connect did not produce a live session.
    pub reason: Option<String>,
}

impl ConnectResult {
    const fn ok() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

struct ActiveSession {
    session: Arc<dyn QuoteSession>,
    origin: QuoteOrigin,
    provider: String,
}

/// Owner of the quote-source session.
pub struct ConnectionManager {
    primary: Option<Arc<dyn QuoteSource>>,
    fallback: Option<Arc<dyn QuoteSource>>,
    active: Option<ActiveSession>,
    status: Arc<ConnectionStatus>,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("primary", &self.primary.as_ref().map(|s| s.name()))
            .field("fallback", &self.fallback.as_ref().map(|s| s.name()))
            .field("provider", &self.provider())
            .field("state", &self.status.state())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager.
    ///
    /// `primary` is `None` when the configured source could not be built;
    /// the manager then goes straight to the fallback on first connect.
    #[must_use]
    pub fn new(
        primary: Option<Arc<dyn QuoteSource>>,
        fallback: Option<Arc<dyn QuoteSource>>,
        status: Arc<ConnectionStatus>,
        policy: ReconnectPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            primary,
            fallback,
            active: None,
            status,
            policy,
            cancel,
        }
    }

    /// Shared status handle.
    #[must_use]
    pub fn status(&self) -> Arc<ConnectionStatus> {
        Arc::clone(&self.status)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Whether fetches can be served right now.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.active.is_some() && self.state().has_session()
    }

    /// Origin of prices from the active session.
    #[must_use]
    pub fn origin(&self) -> Option<QuoteOrigin> {
        self.active.as_ref().map(|a| a.origin)
    }

    /// Provider name of the active session.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.provider.as_str())
    }

    /// Open a new session, replacing the current one.
    ///
    /// Sticky states are left untouched.
    pub async fn connect(&mut self) -> ConnectResult {
        let state = self.state();
        if state.is_sticky() {
            return if self.is_usable() {
                ConnectResult::ok()
            } else {
                ConnectResult::failed(format!("connection is {state}"))
            };
        }

        self.active = None;
        self.status.set_provider(None);

        let Some(primary) = self.primary.clone() else {
            return self
                .enter_degraded("no quote source configured".to_string())
                .await;
        };

        self.status.set_state(ConnectionState::Connecting);
        let provider = primary.name();
        tracing::info!(provider = %provider, "Connecting to quote source");

        match primary.connect().await {
            Ok(session) => {
                self.install(session, QuoteOrigin::Live, provider.clone());
                self.status.set_state(ConnectionState::Connected);
                metrics::record_connect(true);
                tracing::info!(provider = %provider, "Quote source connected");
                ConnectResult::ok()
            }
            Err(ConnectError::Rejected(reason)) => {
                metrics::record_connect(false);
                tracing::warn!(provider = %provider, reason = %reason, "Connection rejected");
                self.status.set_error(ConnectionState::Failed, reason.clone());
                ConnectResult::failed(reason)
            }
            Err(ConnectError::Unavailable(reason)) => {
                metrics::record_connect(false);
                tracing::warn!(provider = %provider, reason = %reason, "Quote source unavailable");
                self.enter_degraded(reason).await
            }
        }
    }

    async fn enter_degraded(&mut self, reason: String) -> ConnectResult {
        if let Some(fallback) = self.fallback.clone() {
            let provider = fallback.name();
            match fallback.connect().await {
                Ok(session) => {
                    self.install(session, QuoteOrigin::Simulated, provider.clone());
                    self.status.set_state(ConnectionState::DemoMode);
                    tracing::warn!(
                        provider = %provider,
                        reason = %reason,
                        "Serving simulated prices"
                    );
                    return ConnectResult::ok();
                }
                Err(e) => {
                    tracing::error!(provider = %provider, error = %e, "Fallback source failed");
                }
            }
        }

        tracing::error!(reason = %reason, "No usable quote source");
        self.status
            .set_error(ConnectionState::LibraryMissing, reason.clone());
        ConnectResult::failed(reason)
    }

    fn install(&mut self, session: Arc<dyn QuoteSession>, origin: QuoteOrigin, provider: String) {
        self.status.set_provider(Some(provider.clone()));
        self.active = Some(ActiveSession {
            session,
            origin,
            provider,
        });
    }

    /// Make sure a usable session exists, reconnecting with backoff.
    ///
    /// Returns `false` after a whole round of attempts failed (the cooldown
    /// has then already been slept), in sticky states without a session, or
    /// when shutdown was requested.
    pub async fn ensure_connected(&mut self) -> bool {
        if self.is_usable() {
            return true;
        }
        if self.state().is_sticky() {
            return false;
        }

        while let Some(delay) = self.policy.next_delay() {
            self.status.increment_reconnect_attempts();
            tracing::info!(
                attempt = self.policy.attempt_count(),
                delay_secs = delay.as_secs(),
                "Reconnecting to quote source"
            );

            if !sleep_or_cancelled(&self.cancel, delay).await {
                return false;
            }

            let result = self.connect().await;
            if result.ok {
                self.policy.reset();
                return true;
            }
            if self.state().is_sticky() {
                return false;
            }
        }

        let cooldown = self.policy.cooldown();
        tracing::warn!(
            attempts = self.policy.attempt_count(),
            cooldown_secs = cooldown.as_secs(),
            "Reconnect attempts exhausted, cooling down"
        );
        let completed = sleep_or_cancelled(&self.cancel, cooldown).await;
        self.policy.reset();
        if completed {
            self.status.reset_reconnect_attempts();
        }
        false
    }

    /// Drop the session after a transport failure.
    pub fn mark_disconnected(&mut self, reason: &'static str, detail: &str) {
        let state = self.state();
        if state.is_sticky() {
            tracing::debug!(state = %state, reason, "Ignoring disconnect in sticky state");
            return;
        }

        self.active = None;
        self.status.set_provider(None);
        self.status
            .set_error(ConnectionState::Disconnected, format!("{reason}: {detail}"));
        metrics::record_disconnect(reason);
        tracing::warn!(reason, detail, "Quote source disconnected");
    }
}

#[async_trait]
impl QuoteSession for ConnectionManager {
    async fn fetch_price(
        &self,
        identifier: &str,
        strategy: FetchStrategy,
    ) -> Result<f64, FetchError> {
        match &self.active {
            Some(active) => active.session.fetch_price(identifier, strategy).await,
            None => Err(FetchError::SessionBroken("no active session".to_string())),
        }
    }
}
