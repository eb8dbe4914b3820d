//! Error types for the DNS transport orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the tunnel's DNS path
#[derive(Debug, Error)]
pub enum Error {
    /// The interface or the engine could not be started
    #[error("engine start failed: {0}")]
    EngineStart(String),

    /// A DNS transport could not be built
    #[error("transport build failed: {0}")]
    TransportBuild(String),

    /// A DNSCrypt relay add/remove/start failed
    #[error("relay operation failed: {0}")]
    RelayOperation(String),

    /// The liveness check itself failed
    #[error("liveness probe failed: {0}")]
    Probe(String),

    /// A step of the mode dispatch failed
    #[error("reconfigure failed: {0}")]
    Reconfigure(String),

    /// No interface has been established
    #[error("tunnel is not established")]
    NotEstablished,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if a later `reconfigure`/`establish` may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::EngineStart(_)
                | Error::TransportBuild(_)
                | Error::RelayOperation(_)
                | Error::Probe(_)
                | Error::Reconfigure(_)
        )
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ConfigParse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(Error::TransportBuild("x".into()).is_recoverable());
        assert!(!Error::NotEstablished.is_recoverable());
        assert!(Error::Config("x".into()).is_config_error());
        assert!(!Error::Probe("x".into()).is_config_error());
    }
}
