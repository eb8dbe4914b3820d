//! Tunnel Handle
//!
//! Thin wrapper over a live engine session. Every call goes straight to the
//! engine and can fail on its own; the orchestrator decides what a failure
//! means. The interface descriptor is not owned here.

use std::net::SocketAddr;
use std::sync::Arc;

use dnsgate_tun::{
    BlocklistFilter, ConnectionBlocker, DnsCryptRelay, DnsTransport, EngineSession,
    ProxyCredentials, RawFd, TunnelEngine,
};

use crate::modes::TunnelModes;

/// Live engine binding over one interface descriptor
pub struct TunnelHandle {
    fd: RawFd,
    session: Box<dyn EngineSession>,
}

impl TunnelHandle {
    /// Open an engine session over `fd` with `transport` as the initial resolver
    pub async fn open(
        engine: &dyn TunnelEngine,
        fd: RawFd,
        fake_dns: SocketAddr,
        transport: Arc<dyn DnsTransport>,
        blocker: Arc<dyn ConnectionBlocker>,
    ) -> dnsgate_tun::Result<Self> {
        log::info!("Opening engine session on fd {} (fake DNS {})", fd, fake_dns);
        let session = engine.open(fd, fake_dns, transport, blocker).await?;
        Ok(Self { fd, session })
    }

    /// Raw descriptor the session is bound to
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn set_transport(&self, transport: Arc<dyn DnsTransport>) -> dnsgate_tun::Result<()> {
        log::debug!("Programming transport {} ({})", transport.id(), transport.url());
        self.session.set_dns(transport)
    }

    /// Program the mode triple; Orbot is sent as plain SOCKS5
    pub fn set_mode(&self, modes: TunnelModes) -> dnsgate_tun::Result<()> {
        self.session
            .set_tun_mode(modes.dns, modes.firewall, modes.proxy.engine_mode())
    }

    pub fn set_filter(&self, filter: Option<Arc<dyn BlocklistFilter>>) -> dnsgate_tun::Result<()> {
        self.session.set_filter(filter)
    }

    pub fn filter(&self) -> Option<Arc<dyn BlocklistFilter>> {
        self.session.filter()
    }

    /// Start the DNSCrypt relay set; returns the engine's status line
    pub async fn start_relay(&self, servers: &str, routes: &str) -> dnsgate_tun::Result<String> {
        self.session.start_dnscrypt_proxy(servers, routes).await
    }

    pub fn relay(&self) -> Option<Arc<dyn DnsCryptRelay>> {
        self.session.dnscrypt_relay()
    }

    pub fn stop_relay(&self) -> dnsgate_tun::Result<()> {
        self.session.stop_dnscrypt_proxy()
    }

    pub fn start_dns_proxy(&self, ip: &str, port: u16) -> dnsgate_tun::Result<()> {
        self.session.start_dns_proxy(ip, port)
    }

    pub fn start_proxy(&self, credentials: &ProxyCredentials) -> dnsgate_tun::Result<()> {
        log::debug!("Programming SOCKS5 proxy {}:{}", credentials.ip, credentials.port);
        self.session.start_proxy(credentials)
    }

    /// Tear the engine session down; the descriptor stays open
    pub fn disconnect(&self) -> dnsgate_tun::Result<()> {
        log::info!("Disconnecting engine session on fd {}", self.fd);
        self.session.disconnect()
    }
}
