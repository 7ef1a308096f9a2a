//! Domain Layer - Core quote types and the symbol catalog.
//!
//! This layer has no I/O. Everything here is plain data with
//! serialization support and the invariants that go with it.

/// Symbol catalog: canonical symbols and their upstream identifiers.
pub mod catalog;

/// Bounded per-symbol price history and candle aggregation.
pub mod history;

/// Connection state shared between the connection manager and readers.
pub mod connection;

/// Quote records and the derived bid/ask/change fields.
pub mod quote;
