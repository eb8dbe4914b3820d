//! Error types for dnsgate-tun

use std::io;
use thiserror::Error;

/// Result type alias for tunnel engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the tunnel engine and the platform interface
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid IP address
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// The engine or the virtual interface could not be started
    #[error("engine start failed: {0}")]
    EngineStart(String),

    /// A DNS transport could not be built or programmed
    #[error("transport error: {0}")]
    Transport(String),

    /// A DNSCrypt relay operation failed
    #[error("relay error: {0}")]
    Relay(String),

    /// Blocklist filter error
    #[error("filter error: {0}")]
    Filter(String),

    /// Forwarding proxy could not be programmed
    #[error("proxy error: {0}")]
    Proxy(String),

    /// The engine session is gone (disconnected or crashed)
    #[error("engine session closed")]
    Closed,
}

impl Error {
    /// Check if the engine session behind this error is unusable
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
}
