//! Application Layer - Ports and polling services.
//!
//! This layer contains the quote-source port definitions and the
//! services that drive them: connection management, the price cache and
//! the polling scheduler.

/// Port interfaces for external systems (quote sources).
pub mod ports;

/// Application services for connection, caching and polling.
pub mod services;
