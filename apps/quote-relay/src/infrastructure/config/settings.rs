//! Relay Configuration Settings
//!
//! Configuration types for the quote relay, loaded from environment variables.
//! Pacing defaults depend on the deployment profile: hosted platforms get
//! slower polling so the upstream does not throttle the shared egress IP.

use std::time::Duration;

use crate::application::ports::FetchStrategy;
use crate::application::services::{IdleDelays, PollingConfig, ReconnectConfig, RetryConfig};

/// Deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvironmentProfile {
    /// Developer machine or a dedicated host.
    #[default]
    Local,
    /// Shared hosting platform.
    Cloud,
}

impl EnvironmentProfile {
    /// Parse profile from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cloud" => Self::Cloud,
            _ => Self::Local,
        }
    }

    /// Pick the profile from `QUOTE_RELAY_PROFILE`, or from platform markers.
    fn detect(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        if let Some(profile) = lookup("QUOTE_RELAY_PROFILE") {
            return Self::from_str_case_insensitive(&profile);
        }
        if lookup("RAILWAY_ENVIRONMENT").is_some() || lookup("RENDER").is_some() {
            Self::Cloud
        } else {
            Self::Local
        }
    }

    /// Get the profile name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

/// Which quote source to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Generated prices.
    #[default]
    Simulated,
    /// Upstream HTTP price endpoint.
    Http,
}

impl SourceKind {
    /// Parse source kind from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "http" => Self::Http,
            _ => Self::Simulated,
        }
    }

    /// Get the source kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Http => "http",
        }
    }
}

/// Broker account credentials.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(email: String, password: String) -> Self {
        Self { email, password }
    }

    /// Get the account email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Get the account password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listen port.
    pub port: u16,
    /// Quotes older than this are reported stale.
    pub stale_after: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 5000,
            stale_after: Duration::from_secs(60),
        }
    }
}

/// Quote source settings.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Source to build.
    pub kind: SourceKind,
    /// Base URL for the HTTP source.
    pub url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Account credentials, if any.
    pub credentials: Option<Credentials>,
    /// Serve simulated prices when the source is unavailable.
    pub demo_fallback: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            url: None,
            timeout: Duration::from_millis(5000),
            credentials: None,
            demo_fallback: true,
        }
    }
}

/// Polling pace and retry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingSettings {
    /// Symbols per batch.
    pub batch_size: usize,
    /// Pause after every symbol.
    pub symbol_delay: Duration,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Idle after a cycle with ratio >= 0.8.
    pub idle_healthy: Duration,
    /// Idle after a cycle with ratio >= 0.5.
    pub idle_degraded: Duration,
    /// Idle after worse cycles.
    pub idle_failing: Duration,
    /// Cap on symbols per cycle.
    pub max_symbols_per_cycle: Option<usize>,
    /// Symbols polled first.
    pub priority_symbols: Vec<String>,
    /// Empty cycles before forcing a reconnect (0 = never).
    pub max_failure_cycles: u32,
    /// Tries per fetch strategy.
    pub fetch_attempts: u32,
    /// Wait after a transient fetch failure.
    pub retry_delay: Duration,
    /// Also try the real-time stream strategy.
    pub realtime_stream: bool,
}

impl PollingSettings {
    /// Default pacing for a profile.
    #[must_use]
    pub fn for_profile(profile: EnvironmentProfile) -> Self {
        match profile {
            EnvironmentProfile::Local => Self {
                batch_size: 8,
                symbol_delay: Duration::from_millis(100),
                batch_delay: Duration::from_millis(500),
                idle_healthy: Duration::from_secs(5),
                idle_degraded: Duration::from_secs(15),
                idle_failing: Duration::from_secs(30),
                max_symbols_per_cycle: None,
                priority_symbols: Vec::new(),
                max_failure_cycles: 5,
                fetch_attempts: 2,
                retry_delay: Duration::from_millis(500),
                realtime_stream: false,
            },
            EnvironmentProfile::Cloud => Self {
                batch_size: 2,
                symbol_delay: Duration::from_millis(2000),
                batch_delay: Duration::from_millis(5000),
                idle_healthy: Duration::from_secs(15),
                idle_degraded: Duration::from_secs(45),
                idle_failing: Duration::from_secs(90),
                retry_delay: Duration::from_millis(2000),
                ..Self::for_profile(EnvironmentProfile::Local)
            },
        }
    }
}

impl From<&PollingSettings> for PollingConfig {
    fn from(settings: &PollingSettings) -> Self {
        let mut strategies = vec![FetchStrategy::Snapshot];
        if settings.realtime_stream {
            strategies.push(FetchStrategy::RealtimeStream);
        }

        Self {
            batch_size: settings.batch_size,
            symbol_delay: settings.symbol_delay,
            batch_delay: settings.batch_delay,
            idle: IdleDelays {
                healthy: settings.idle_healthy,
                degraded: settings.idle_degraded,
                failing: settings.idle_failing,
            },
            max_failure_cycles: settings.max_failure_cycles,
            max_symbols_per_cycle: settings.max_symbols_per_cycle,
            priority: settings.priority_symbols.clone(),
            retry: RetryConfig {
                attempts: settings.fetch_attempts,
                delay: settings.retry_delay,
            },
            strategies,
        }
    }
}

/// Reconnect policy settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Attempts per round (0 = unlimited).
    pub max_attempts: u32,
    /// Pause after an exhausted round.
    pub cooldown: Duration,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl From<&ReconnectSettings> for ReconnectConfig {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            cooldown: settings.cooldown,
            ..Self::default()
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Deployment profile.
    pub profile: EnvironmentProfile,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Quote source settings.
    pub source: SourceSettings,
    /// Polling settings.
    pub polling: PollingSettings,
    /// Reconnect settings.
    pub reconnect: ReconnectSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            profile: EnvironmentProfile::Local,
            server: ServerSettings::default(),
            source: SourceSettings::default(),
            polling: PollingSettings::for_profile(EnvironmentProfile::Local),
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`RelayConfig::from_env`].
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = &lookup as &dyn Fn(&str) -> Option<String>;
        let profile = EnvironmentProfile::detect(lookup);

        let default_port = ServerSettings::default().port;
        let port = match lookup("QUOTE_RELAY_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "QUOTE_RELAY_PORT".to_string(),
                    value: raw.clone(),
                })?,
            None => default_port,
        };

        let server = ServerSettings {
            port,
            stale_after: parse_env_duration_secs(
                lookup,
                "QUOTE_STALE_AFTER_SECS",
                ServerSettings::default().stale_after,
            ),
        };

        let source_defaults = SourceSettings::default();
        let source = SourceSettings {
            kind: lookup("QUOTE_SOURCE")
                .map(|s| SourceKind::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            url: lookup("QUOTE_SOURCE_URL")
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            timeout: parse_env_duration_millis(
                lookup,
                "QUOTE_SOURCE_TIMEOUT_MS",
                source_defaults.timeout,
            ),
            credentials: parse_credentials(lookup)?,
            demo_fallback: parse_env_bool(lookup, "DEMO_FALLBACK", source_defaults.demo_fallback),
        };

        let defaults = PollingSettings::for_profile(profile);
        let batch_size = parse_env(lookup, "POLL_BATCH_SIZE", defaults.batch_size);
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "POLL_BATCH_SIZE".to_string(),
                value: "0".to_string(),
            });
        }

        let polling = PollingSettings {
            batch_size,
            symbol_delay: parse_env_duration_millis(
                lookup,
                "POLL_SYMBOL_DELAY_MS",
                defaults.symbol_delay,
            ),
            batch_delay: parse_env_duration_millis(
                lookup,
                "POLL_BATCH_DELAY_MS",
                defaults.batch_delay,
            ),
            idle_healthy: parse_env_duration_secs(
                lookup,
                "POLL_IDLE_HEALTHY_SECS",
                defaults.idle_healthy,
            ),
            idle_degraded: parse_env_duration_secs(
                lookup,
                "POLL_IDLE_DEGRADED_SECS",
                defaults.idle_degraded,
            ),
            idle_failing: parse_env_duration_secs(
                lookup,
                "POLL_IDLE_FAILING_SECS",
                defaults.idle_failing,
            ),
            max_symbols_per_cycle: lookup("POLL_MAX_SYMBOLS_PER_CYCLE")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|cap| *cap > 0),
            priority_symbols: lookup("POLL_PRIORITY_SYMBOLS")
                .map(|list| parse_list(&list))
                .unwrap_or_default(),
            max_failure_cycles: parse_env(
                lookup,
                "POLL_MAX_FAILURE_CYCLES",
                defaults.max_failure_cycles,
            ),
            fetch_attempts: parse_env(lookup, "POLL_FETCH_ATTEMPTS", defaults.fetch_attempts)
                .max(1),
            retry_delay: parse_env_duration_millis(
                lookup,
                "POLL_RETRY_DELAY_MS",
                defaults.retry_delay,
            ),
            realtime_stream: parse_env_bool(
                lookup,
                "ENABLE_REALTIME_STREAM",
                defaults.realtime_stream,
            ),
        };

        let reconnect = ReconnectSettings {
            max_attempts: parse_env(
                lookup,
                "RECONNECT_MAX_ATTEMPTS",
                ReconnectSettings::default().max_attempts,
            ),
            cooldown: parse_env_duration_secs(
                lookup,
                "RECONNECT_COOLDOWN_SECS",
                ReconnectSettings::default().cooldown,
            ),
        };

        Ok(Self {
            profile,
            server,
            source,
            polling,
            reconnect,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be used.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn parse_credentials(
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<Credentials>, ConfigError> {
    match (lookup("BROKER_EMAIL"), lookup("BROKER_PASSWORD")) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::MissingEnvVar("BROKER_PASSWORD".to_string())),
        (None, Some(_)) => Err(ConfigError::MissingEnvVar("BROKER_EMAIL".to_string())),
        (Some(email), Some(password)) => {
            if email.is_empty() {
                return Err(ConfigError::EmptyValue("BROKER_EMAIL".to_string()));
            }
            if password.is_empty() {
                return Err(ConfigError::EmptyValue("BROKER_PASSWORD".to_string()));
            }
            Ok(Some(Credentials::new(email, password)))
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_env<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |v| match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    })
}

fn parse_env_duration_secs(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
