//! Tunnel engine capabilities
//!
//! The packet engine, the platform VPN interface and everything they hand
//! back are modelled as traits so the control plane can be driven by a real
//! engine binding or by the substitutes in [`crate::mock`].
//!
//! # Architecture
//!
//! - [`VpnPlatform`] creates the virtual interface and yields an
//!   [`InterfaceDescriptor`]
//! - [`TunnelEngine`] builds DNS transports and filters, and opens an
//!   [`EngineSession`] over a descriptor
//! - [`EngineSession`] is the live binding: mode, transport, filter, relay
//!   and proxy programming
//! - [`DnsCryptRelay`] is the DNSCrypt relay set owned by a session

use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::InterfaceConfig;
use crate::error::Result;
use crate::mode::{DnsMode, FirewallMode, ProxyMode};

/// Raw descriptor number of a virtual interface
pub type RawFd = i32;

/// Owned handle on a platform virtual interface
///
/// Dropping the handle without calling [`InterfaceDescriptor::close`] leaks
/// the descriptor on platforms that hand out raw numbers.
pub trait InterfaceDescriptor: Send + Sync {
    /// Raw descriptor number passed to the engine
    fn raw_fd(&self) -> RawFd;

    /// Release the descriptor
    ///
    /// Must be safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Platform service that creates virtual interfaces
#[async_trait]
pub trait VpnPlatform: Send + Sync {
    /// Create the interface described by `config`
    async fn establish(&self, config: &InterfaceConfig) -> Result<Box<dyn InterfaceDescriptor>>;
}

/// A DNS transport built by the engine
pub trait DnsTransport: Send + Sync + Debug {
    /// Identifier of this transport, for logs
    ///
    /// Two transports built for the same URL may share an id; callers must
    /// not use it to decide whether a transport was already programmed.
    fn id(&self) -> &str;

    /// Upstream URL the transport resolves against
    fn url(&self) -> &str;
}

/// Where a blocklist filter gets its rules from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Rules downloaded to the device, selected by a stamp
    Local,
    /// Rules evaluated by the upstream resolver
    Remote,
}

/// Content-filtering capability attached to the active transport
pub trait BlocklistFilter: Send + Sync + Debug {
    /// Where the rules live
    fn kind(&self) -> FilterKind;

    /// Currently selected stamp, if any
    fn stamp(&self) -> Option<String>;

    /// Select the ruleset identified by `stamp`
    fn set_stamp(&self, stamp: &str) -> Result<()>;
}

/// Firewall decision callback used by the engine for every new connection
pub trait ConnectionBlocker: Send + Sync {
    /// Return true to drop the connection
    fn block(&self, protocol: u8, uid: u32, source: SocketAddr, destination: SocketAddr) -> bool;
}

/// Blocker that lets every connection through
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl ConnectionBlocker for AllowAll {
    fn block(
        &self,
        _protocol: u8,
        _uid: u32,
        _source: SocketAddr,
        _destination: SocketAddr,
    ) -> bool {
        false
    }
}

/// Credentials of an outbound SOCKS5 proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub ip: String,
    pub port: u16,
}

/// Packet engine factory
#[async_trait]
pub trait TunnelEngine: Send + Sync {
    /// Build a DoH transport for `url`
    ///
    /// `ip_hints` are bootstrap addresses of the upstream host; the engine
    /// resolves the host itself when empty. May block on network resolution.
    async fn new_doh_transport(
        &self,
        url: &str,
        ip_hints: &[IpAddr],
    ) -> Result<Arc<dyn DnsTransport>>;

    /// Load a local blocklist from `dir`
    fn new_local_filter(&self, dir: &Path) -> Result<Arc<dyn BlocklistFilter>>;

    /// Load a remote blocklist description from `filetag`
    fn new_remote_filter(&self, filetag: &Path) -> Result<Arc<dyn BlocklistFilter>>;

    /// Start a session over the interface descriptor `fd`
    async fn open(
        &self,
        fd: RawFd,
        fake_dns: SocketAddr,
        transport: Arc<dyn DnsTransport>,
        blocker: Arc<dyn ConnectionBlocker>,
    ) -> Result<Box<dyn EngineSession>>;
}

/// Live engine session bound to one interface descriptor
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Program the mode triple
    fn set_tun_mode(&self, dns: DnsMode, firewall: FirewallMode, proxy: ProxyMode) -> Result<()>;

    /// Replace the DNS transport
    fn set_dns(&self, transport: Arc<dyn DnsTransport>) -> Result<()>;

    /// Attach or clear the blocklist filter
    fn set_filter(&self, filter: Option<Arc<dyn BlocklistFilter>>) -> Result<()>;

    /// Currently attached filter
    fn filter(&self) -> Option<Arc<dyn BlocklistFilter>>;

    /// Start the DNSCrypt relay set; returns the engine's status line
    ///
    /// `servers` and `routes` are comma-separated stamp lists.
    async fn start_dnscrypt_proxy(&self, servers: &str, routes: &str) -> Result<String>;

    /// The running DNSCrypt relay set, if any
    fn dnscrypt_relay(&self) -> Option<Arc<dyn DnsCryptRelay>>;

    /// Stop the DNSCrypt relay set
    fn stop_dnscrypt_proxy(&self) -> Result<()>;

    /// Forward DNS to a plain DNS proxy endpoint
    fn start_dns_proxy(&self, ip: &str, port: u16) -> Result<()>;

    /// Route traffic through a SOCKS5 proxy
    fn start_proxy(&self, credentials: &ProxyCredentials) -> Result<()>;

    /// Tear the session down
    fn disconnect(&self) -> Result<()>;
}

/// DNSCrypt relay set owned by a session
///
/// Server and route lists are comma-separated strings, as the engine
/// exchanges them.
#[async_trait]
pub trait DnsCryptRelay: Send + Sync {
    /// Servers the relay currently considers reachable
    fn live_servers(&self) -> Result<String>;

    /// Re-check every configured server and return the reachable ones
    ///
    /// This performs network I/O and may take several seconds.
    async fn refresh(&self) -> Result<String>;

    /// Add servers; returns the number added
    fn add_servers(&self, servers: &str) -> Result<u32>;

    /// Remove servers; returns the number removed
    fn remove_servers(&self, servers: &str) -> Result<u32>;

    /// Add relay routes; returns the number added
    fn add_routes(&self, routes: &str) -> Result<u32>;

    /// Remove relay routes; returns the number removed
    fn remove_routes(&self, routes: &str) -> Result<u32>;
}

/// Split a comma-separated engine list, dropping blanks
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_allow_all() {
        let addr: SocketAddr = "10.0.0.1:1234".parse().unwrap();
        assert!(!AllowAll.block(6, 1000, addr, addr));
    }
}
