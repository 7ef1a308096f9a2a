//! Connection State
//!
//! Process-wide state of the quote-source session. Only the connection
//! manager drives transitions; everything else reads.
//!
//! ```text
//! disconnected ──► connecting ──► connected
//!      ▲                │   └───► failed
//!      │                ├───────► library_missing (sticky)
//!      └── transport    └───────► demo_mode       (sticky)
//!          error
//! ```

use serde::{Deserialize, Serialize};

/// Connection state of the quote-source session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// A live session is established.
    Connected,
    /// The last connect attempt was rejected.
    Failed,
    /// The quote source cannot be constructed at all.
    LibraryMissing,
    /// Serving simulated prices in place of an unavailable source.
    DemoMode,
}

impl ConnectionState {
    /// Get the state name as serialized on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::LibraryMissing => "library_missing",
            Self::DemoMode => "demo_mode",
        }
    }

    /// States that persist until the process restarts.
    #[must_use]
    pub const fn is_sticky(&self) -> bool {
        matches!(self, Self::LibraryMissing | Self::DemoMode)
    }

    /// States in which a session can serve fetches.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        matches!(self, Self::Connected | Self::DemoMode)
    }

    /// Numeric code for the connection-state gauge.
    #[must_use]
    pub const fn as_gauge(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Failed => 3.0,
            Self::LibraryMissing => 4.0,
            Self::DemoMode => 5.0,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
