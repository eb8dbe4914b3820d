//! Orchestrator events and connection state

use crate::modes::{TransportFamily, TunnelModes};

/// Connection state reported to the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No tunnel
    Disconnected,
    /// Interface and engine are being brought up
    Connecting,
    /// The selected transport is programmed
    Working,
    /// The last establish/reconfigure failed; the host should retry
    Failing,
}

impl ConnectionState {
    /// Check if a tunnel is up, healthy or not
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Working | ConnectionState::Failing
        )
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Working => "Working",
            ConnectionState::Failing => "Failing",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum DnsEvent {
    /// Connection state changed
    StateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },

    /// A new engine session is bound to the interface
    SessionEstablished {
        /// Raw descriptor of the interface
        fd: i32,
        modes: TunnelModes,
    },

    /// The mode triple (and transport) was applied
    TransportChanged {
        modes: TunnelModes,
        family: TransportFamily,
        /// DoH URL programmed, if the family uses one
        url: Option<String>,
    },

    /// The DNSCrypt relay set was started
    RelayStarted {
        /// Status line reported by the engine
        status: String,
    },

    /// A liveness prober task was started
    ProbeScheduled,

    /// The relay reported its reachable servers
    LiveServers { servers: Vec<String> },

    /// DNSCrypt failed and the default DoH endpoint took over
    FallbackActivated {
        /// URL of the DoH endpoint selected, if the store had one
        url: Option<String>,
        /// Why the relay was considered dead
        reason: String,
    },

    /// Message meant for the user
    Notification { message: String },

    /// `establish` or `reconfigure` failed
    ReconfigureFailed { modes: TunnelModes, message: String },

    /// Non-fatal error
    Error { message: String, recoverable: bool },
}

/// Event handler trait for receiving orchestrator events
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event
    async fn on_event(&self, event: DnsEvent);
}

/// Simple event handler that logs events
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_event(&self, event: DnsEvent) {
        match event {
            DnsEvent::StateChanged { old, new } => {
                log::info!("Tunnel state: {} -> {}", old, new);
            }
            DnsEvent::SessionEstablished { fd, modes } => {
                log::info!("Session established: fd={}, {}", fd, modes);
            }
            DnsEvent::TransportChanged { modes, family, url } => match url {
                Some(url) => log::info!("Transport: {} via {} ({})", family, url, modes),
                None => log::info!("Transport: {} ({})", family, modes),
            },
            DnsEvent::RelayStarted { status } => {
                log::info!("DNSCrypt relay started: {}", status);
            }
            DnsEvent::ProbeScheduled => {
                log::debug!("DNSCrypt liveness probe scheduled");
            }
            DnsEvent::LiveServers { servers } => {
                log::debug!("DNSCrypt live servers: {}", servers.join(","));
            }
            DnsEvent::FallbackActivated { url, reason } => {
                log::warn!(
                    "DNSCrypt fallback to {}: {}",
                    url.as_deref().unwrap_or("<no default endpoint>"),
                    reason
                );
            }
            DnsEvent::Notification { message } => {
                log::info!("{}", message);
            }
            DnsEvent::ReconfigureFailed { modes, message } => {
                log::error!("Reconfigure to {} failed: {}", modes, message);
            }
            DnsEvent::Error {
                message,
                recoverable,
            } => {
                if recoverable {
                    log::warn!("Recoverable error: {}", message);
                } else {
                    log::error!("Error: {}", message);
                }
            }
        }
    }
}
