//! Portgate - UPnP IGD port mapping for hosts behind a NAT gateway
//!
//! This library discovers the local Internet Gateway Device, learns its
//! public address and installs or removes forwarding rules, keeping a ledger
//! of the mappings it created so they can be reclaimed on shutdown.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connectivity;

/// Result type alias for Portgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Portgate operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Port mapping or gateway session error
    #[error("Mapping error: {0}")]
    Mapping(#[from] connectivity::MappingError),

    /// Settings could not be read, written or validated
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize the Portgate library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;
