//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    ConfigError, Credentials, EnvironmentProfile, PollingSettings, ReconnectSettings,
    RelayConfig, ServerSettings, SourceKind, SourceSettings,
};
