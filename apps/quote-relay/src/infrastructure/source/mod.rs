//! Quote Source Adapters
//!
//! Implementations of the `QuoteSource` port.

mod http;
mod simulated;

use std::sync::Arc;

pub use http::HttpQuoteSource;
pub use simulated::{SimulatedQuoteSource, simulated_price};

use crate::application::ports::QuoteSource;
use crate::infrastructure::config::{SourceKind, SourceSettings};

/// Configured primary and fallback sources.
#[derive(Clone)]
pub struct SourceSet {
    /// Source polled normally; `None` when it could not be built.
    pub primary: Option<Arc<dyn QuoteSource>>,
    /// Source used when the primary is unavailable.
    pub fallback: Option<Arc<dyn QuoteSource>>,
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSet")
            .field("primary", &self.primary.as_ref().map(|s| s.name()))
            .field("fallback", &self.fallback.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// Build the sources described by `settings`.
///
/// The simulated source never needs a fallback. An HTTP source that cannot
/// be constructed is left out so the connection manager degrades on first
/// connect.
#[must_use]
pub fn build_sources(settings: &SourceSettings) -> SourceSet {
    let fallback: Option<Arc<dyn QuoteSource>> = settings
        .demo_fallback
        .then(|| Arc::new(SimulatedQuoteSource::new()) as Arc<dyn QuoteSource>);

    match settings.kind {
        SourceKind::Simulated => SourceSet {
            primary: Some(Arc::new(SimulatedQuoteSource::new())),
            fallback: None,
        },
        SourceKind::Http => {
            let primary = match HttpQuoteSource::new(
                settings.url.clone(),
                settings.credentials.clone(),
                settings.timeout,
            ) {
                Ok(source) => Some(Arc::new(source) as Arc<dyn QuoteSource>),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to build HTTP quote source");
                    None
                }
            };
            SourceSet { primary, fallback }
        }
    }
}
