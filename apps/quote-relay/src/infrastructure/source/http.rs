//! HTTP Quote Source
//!
//! Talks to an upstream price endpoint over plain HTTP/JSON.
//!
//! - `GET {base}/ping` opens a session (credentials as basic auth)
//! - `GET {base}/price/{identifier}?strategy=snapshot` returns `{"price": f64}`
//!
//! Response classification:
//!
//! | Response | Error |
//! |---|---|
//! | 404, other 4xx, unusable body | `SymbolUnavailable` |
//! | 429, 5xx, timeout | `Transient` |
//! | 401/403, refused or reset connection | `SessionBroken` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::application::ports::{ConnectError, FetchError, FetchStrategy, QuoteSession, QuoteSource};
use crate::infrastructure::config::Credentials;

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: Option<f64>,
}

/// Quote source backed by an HTTP price endpoint.
#[derive(Debug, Clone)]
pub struct HttpQuoteSource {
    client: Client,
    base_url: Option<String>,
    credentials: Option<Credentials>,
}

impl HttpQuoteSource {
    /// Create a source.
    ///
    /// A missing `base_url` is not an error here; `connect` then reports
    /// the source as unavailable.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError::Unavailable` if the HTTP client cannot be built.
    pub fn new(
        base_url: Option<String>,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            credentials,
        })
    }
}

fn authorize(request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
    match credentials {
        Some(c) => request.basic_auth(c.email(), Some(c.password())),
        None => request,
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    fn name(&self) -> String {
        "http".to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn QuoteSession>, ConnectError> {
        let Some(base_url) = self.base_url.clone() else {
            return Err(ConnectError::Unavailable(
                "QUOTE_SOURCE_URL is not set".to_string(),
            ));
        };

        let request = authorize(
            self.client.get(format!("{base_url}/ping")),
            self.credentials.as_ref(),
        );
        let response = request
            .send()
            .await
            .map_err(|e| ConnectError::Rejected(format!("ping failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectError::Rejected(format!(
                "authentication failed ({status})"
            )));
        }
        if !status.is_success() {
            return Err(ConnectError::Rejected(format!("ping returned {status}")));
        }

        tracing::debug!(base_url = %base_url, "HTTP quote session opened");
        Ok(Arc::new(HttpSession {
            client: self.client.clone(),
            base_url,
            credentials: self.credentials.clone(),
        }))
    }
}

#[derive(Debug)]
struct HttpSession {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

fn classify_send_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Transient(format!("request timed out: {error}"))
    } else {
        FetchError::SessionBroken(format!("transport error: {error}"))
    }
}

fn classify_status(status: StatusCode, identifier: &str) -> FetchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::SessionBroken(format!("session rejected ({status})"))
        }
        StatusCode::TOO_MANY_REQUESTS => FetchError::Transient(format!("rate limited ({status})")),
        s if s.is_server_error() => FetchError::Transient(format!("upstream error ({s})")),
        s => FetchError::SymbolUnavailable(format!("{identifier}: {s}")),
    }
}

#[async_trait]
impl QuoteSession for HttpSession {
    async fn fetch_price(
        &self,
        identifier: &str,
        strategy: FetchStrategy,
    ) -> Result<f64, FetchError> {
        let request = authorize(
            self.client
                .get(format!("{}/price/{identifier}", self.base_url))
                .query(&[("strategy", strategy.as_str())]),
            self.credentials.as_ref(),
        );

        let response = request
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, identifier));
        }

        let body: PriceResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Transient(format!("body timed out: {e}"))
            } else {
                FetchError::SymbolUnavailable(format!("{identifier}: bad body: {e}"))
            }
        })?;

        body.price
            .ok_or_else(|| FetchError::SymbolUnavailable(format!("{identifier}: no price")))
    }
}
