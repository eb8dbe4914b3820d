//! Mock engine and platform implementations for testing
//!
//! These substitutes record every call made through the capability traits so
//! tests can assert on exactly what the control plane programmed, and expose
//! knobs to simulate engine failures:
//!
//! - [`MockEngine`]: records [`EngineCall`]s, fails transports or session
//!   start on demand, scripts the DNSCrypt relay's live servers
//! - [`MockPlatform`]: hands out [`MockDescriptor`]s and tracks their release
//!
//! # Example
//!
//! ```ignore
//! use dnsgate_tun::mock::{EngineCall, MockEngine};
//!
//! let engine = MockEngine::new();
//! engine.set_live_servers(Some(""));
//! // ... drive the orchestrator ...
//! assert!(engine.calls().contains(&EngineCall::StopDnsCryptProxy));
//! ```

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::config::InterfaceConfig;
use crate::engine::{
    split_list, BlocklistFilter, ConnectionBlocker, DnsCryptRelay, DnsTransport, EngineSession,
    FilterKind, InterfaceDescriptor, ProxyCredentials, RawFd, TunnelEngine, VpnPlatform,
};
use crate::error::{Error, Result};
use crate::mode::{DnsMode, FirewallMode, ProxyMode};

/// A call made through one of the engine traits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    NewDohTransport { url: String, ip_hints: Vec<IpAddr> },
    NewLocalFilter { dir: PathBuf },
    NewRemoteFilter { filetag: PathBuf },
    Open { fd: RawFd, fake_dns: SocketAddr, transport_url: String },
    SetTunMode { dns: DnsMode, firewall: FirewallMode, proxy: ProxyMode },
    SetDns { url: String },
    /// `None` clears the filter; otherwise the kind and stamp at attach time
    SetFilter { filter: Option<(FilterKind, Option<String>)> },
    StartDnsCryptProxy { servers: String, routes: String },
    StopDnsCryptProxy,
    StartDnsProxy { ip: String, port: u16 },
    StartProxy { credentials: ProxyCredentials },
    Disconnect,
    RelayRefresh,
    RelayLiveServers,
    AddServers { servers: String },
    RemoveServers { servers: String },
    AddRoutes { routes: String },
    RemoveRoutes { routes: String },
}

impl EngineCall {
    /// Whether this call touches the DNSCrypt relay set
    pub fn is_relay_operation(&self) -> bool {
        matches!(
            self,
            EngineCall::StartDnsCryptProxy { .. }
                | EngineCall::StopDnsCryptProxy
                | EngineCall::RelayRefresh
                | EngineCall::RelayLiveServers
                | EngineCall::AddServers { .. }
                | EngineCall::RemoveServers { .. }
                | EngineCall::AddRoutes { .. }
                | EngineCall::RemoveRoutes { .. }
        )
    }
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<EngineCall>>,
    next_id: AtomicU64,
    failing_urls: Mutex<HashSet<String>>,
    fail_open: AtomicBool,
    fail_relay_start: AtomicBool,
    fail_refresh: AtomicBool,
    fail_disconnect: AtomicBool,
    fail_dns_proxy: AtomicBool,
    fail_remove_routes: AtomicBool,
    ids_by_url: AtomicBool,
    rejected_stamps: Mutex<HashSet<String>>,
    session_closed: AtomicBool,
    live_override: Mutex<Option<String>>,
    relay: Mutex<Option<Arc<MockRelay>>>,
    filter: Mutex<Option<Arc<dyn BlocklistFilter>>>,
    refresh_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockState {
    fn record(&self, call: EngineCall) {
        log::debug!("mock engine: {:?}", call);
        self.calls.lock().unwrap().push(call);
    }

    fn check_open(&self) -> Result<()> {
        if self.session_closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

/// Recording substitute for the packet engine
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<MockState>,
}

impl MockEngine {
    /// Create a new mock engine
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls recorded so far
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state.calls.lock().unwrap().clear();
    }

    /// Number of recorded calls matching `pred`
    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.state.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Make transports for `url` fail to build
    pub fn fail_transport(&self, url: &str) {
        self.state.failing_urls.lock().unwrap().insert(url.to_string());
    }

    /// Make `open` fail
    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make starting the relay set fail
    pub fn fail_relay_start(&self, fail: bool) {
        self.state.fail_relay_start.store(fail, Ordering::SeqCst);
    }

    /// Make relay refresh fail
    pub fn fail_refresh(&self, fail: bool) {
        self.state.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Make `disconnect` fail (the call is still recorded)
    pub fn fail_disconnect(&self, fail: bool) {
        self.state.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// Make `start_dns_proxy` fail
    pub fn fail_dns_proxy(&self, fail: bool) {
        self.state.fail_dns_proxy.store(fail, Ordering::SeqCst);
    }

    /// Name transports after their URL instead of numbering each build
    pub fn ids_by_url(&self, enabled: bool) {
        self.state.ids_by_url.store(enabled, Ordering::SeqCst);
    }

    /// Make `remove_routes` on the relay fail (the call is still recorded)
    pub fn fail_remove_routes(&self, fail: bool) {
        self.state.fail_remove_routes.store(fail, Ordering::SeqCst);
    }

    /// Make local filters reject `stamp`
    pub fn reject_stamp(&self, stamp: &str) {
        self.state.rejected_stamps.lock().unwrap().insert(stamp.to_string());
    }

    /// Simulate the engine session dying: session calls return [`Error::Closed`]
    pub fn set_session_closed(&self, closed: bool) {
        self.state.session_closed.store(closed, Ordering::SeqCst);
    }

    /// Script the relay's live servers; `None` reports every configured server
    pub fn set_live_servers(&self, live: Option<&str>) {
        *self.state.live_override.lock().unwrap() = live.map(str::to_string);
    }

    /// Block relay refreshes until [`MockEngine::release_refresh`] is called
    pub fn hold_refresh(&self) {
        *self.state.refresh_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `permits` held refreshes proceed and stop holding new ones
    pub fn release_refresh(&self, permits: usize) {
        if let Some(gate) = self.state.refresh_gate.lock().unwrap().take() {
            gate.add_permits(permits);
        }
    }

    /// Servers currently configured on the relay, if one is running
    pub fn relay_servers(&self) -> Option<Vec<String>> {
        self.state
            .relay
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.servers.lock().unwrap().clone())
    }
}

#[async_trait]
impl TunnelEngine for MockEngine {
    async fn new_doh_transport(
        &self,
        url: &str,
        ip_hints: &[IpAddr],
    ) -> Result<Arc<dyn DnsTransport>> {
        self.state.record(EngineCall::NewDohTransport {
            url: url.to_string(),
            ip_hints: ip_hints.to_vec(),
        });

        if self.state.failing_urls.lock().unwrap().contains(url) {
            return Err(Error::Transport(format!("cannot reach {}", url)));
        }

        let id = if self.state.ids_by_url.load(Ordering::SeqCst) {
            url.to_string()
        } else {
            format!("doh-{}", self.state.next_id.fetch_add(1, Ordering::SeqCst))
        };
        Ok(Arc::new(MockTransport {
            id,
            url: url.to_string(),
        }))
    }

    fn new_local_filter(&self, dir: &Path) -> Result<Arc<dyn BlocklistFilter>> {
        self.state.record(EngineCall::NewLocalFilter { dir: dir.to_path_buf() });
        let rejected = self.state.rejected_stamps.lock().unwrap().clone();
        Ok(Arc::new(MockFilter::new(FilterKind::Local).rejecting(rejected)))
    }

    fn new_remote_filter(&self, filetag: &Path) -> Result<Arc<dyn BlocklistFilter>> {
        self.state.record(EngineCall::NewRemoteFilter {
            filetag: filetag.to_path_buf(),
        });
        Ok(Arc::new(MockFilter::new(FilterKind::Remote)))
    }

    async fn open(
        &self,
        fd: RawFd,
        fake_dns: SocketAddr,
        transport: Arc<dyn DnsTransport>,
        _blocker: Arc<dyn ConnectionBlocker>,
    ) -> Result<Box<dyn EngineSession>> {
        self.state.record(EngineCall::Open {
            fd,
            fake_dns,
            transport_url: transport.url().to_string(),
        });

        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(Error::EngineStart("mock engine refused to start".into()));
        }

        *self.state.relay.lock().unwrap() = None;
        *self.state.filter.lock().unwrap() = None;
        Ok(Box::new(MockSession {
            state: self.state.clone(),
        }))
    }
}

/// Session handed out by [`MockEngine::open`]
pub struct MockSession {
    state: Arc<MockState>,
}

#[async_trait]
impl EngineSession for MockSession {
    fn set_tun_mode(&self, dns: DnsMode, firewall: FirewallMode, proxy: ProxyMode) -> Result<()> {
        self.state.check_open()?;
        self.state.record(EngineCall::SetTunMode { dns, firewall, proxy });
        Ok(())
    }

    fn set_dns(&self, transport: Arc<dyn DnsTransport>) -> Result<()> {
        self.state.check_open()?;
        self.state.record(EngineCall::SetDns {
            url: transport.url().to_string(),
        });
        Ok(())
    }

    fn set_filter(&self, filter: Option<Arc<dyn BlocklistFilter>>) -> Result<()> {
        self.state.check_open()?;
        self.state.record(EngineCall::SetFilter {
            filter: filter.as_ref().map(|f| (f.kind(), f.stamp())),
        });
        *self.state.filter.lock().unwrap() = filter;
        Ok(())
    }

    fn filter(&self) -> Option<Arc<dyn BlocklistFilter>> {
        self.state.filter.lock().unwrap().clone()
    }

    async fn start_dnscrypt_proxy(&self, servers: &str, routes: &str) -> Result<String> {
        self.state.check_open()?;
        self.state.record(EngineCall::StartDnsCryptProxy {
            servers: servers.to_string(),
            routes: routes.to_string(),
        });

        if self.state.fail_relay_start.load(Ordering::SeqCst) {
            return Err(Error::Relay("no usable DNSCrypt server".into()));
        }

        let relay = Arc::new(MockRelay {
            state: self.state.clone(),
            servers: Mutex::new(split_list(servers)),
            routes: Mutex::new(split_list(routes)),
        });
        *self.state.relay.lock().unwrap() = Some(relay);
        Ok(format!("started {} servers", split_list(servers).len()))
    }

    fn dnscrypt_relay(&self) -> Option<Arc<dyn DnsCryptRelay>> {
        self.state
            .relay
            .lock()
            .unwrap()
            .clone()
            .map(|r| r as Arc<dyn DnsCryptRelay>)
    }

    fn stop_dnscrypt_proxy(&self) -> Result<()> {
        self.state.check_open()?;
        self.state.record(EngineCall::StopDnsCryptProxy);
        *self.state.relay.lock().unwrap() = None;
        Ok(())
    }

    fn start_dns_proxy(&self, ip: &str, port: u16) -> Result<()> {
        self.state.check_open()?;
        self.state.record(EngineCall::StartDnsProxy {
            ip: ip.to_string(),
            port,
        });
        if self.state.fail_dns_proxy.load(Ordering::SeqCst) {
            return Err(Error::Proxy(format!("cannot reach DNS proxy {}:{}", ip, port)));
        }
        Ok(())
    }

    fn start_proxy(&self, credentials: &ProxyCredentials) -> Result<()> {
        self.state.check_open()?;
        self.state.record(EngineCall::StartProxy {
            credentials: credentials.clone(),
        });
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.state.record(EngineCall::Disconnect);
        *self.state.relay.lock().unwrap() = None;
        if self.state.fail_disconnect.load(Ordering::SeqCst) {
            return Err(Error::EngineStart("disconnect failed".into()));
        }
        Ok(())
    }
}

/// Relay set handed out by [`MockSession::start_dnscrypt_proxy`]
pub struct MockRelay {
    state: Arc<MockState>,
    servers: Mutex<Vec<String>>,
    routes: Mutex<Vec<String>>,
}

impl MockRelay {
    fn live(&self) -> String {
        match self.state.live_override.lock().unwrap().clone() {
            Some(live) => live,
            None => self.servers.lock().unwrap().join(","),
        }
    }
}

#[async_trait]
impl DnsCryptRelay for MockRelay {
    fn live_servers(&self) -> Result<String> {
        self.state.record(EngineCall::RelayLiveServers);
        Ok(self.live())
    }

    async fn refresh(&self) -> Result<String> {
        self.state.record(EngineCall::RelayRefresh);

        let gate = self.state.refresh_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.state.fail_refresh.load(Ordering::SeqCst) {
            return Err(Error::Relay("refresh timed out".into()));
        }
        Ok(self.live())
    }

    fn add_servers(&self, servers: &str) -> Result<u32> {
        self.state.record(EngineCall::AddServers {
            servers: servers.to_string(),
        });
        let mut current = self.servers.lock().unwrap();
        let mut added = 0;
        for server in split_list(servers) {
            if !current.contains(&server) {
                current.push(server);
                added += 1;
            }
        }
        Ok(added)
    }

    fn remove_servers(&self, servers: &str) -> Result<u32> {
        self.state.record(EngineCall::RemoveServers {
            servers: servers.to_string(),
        });
        let remove = split_list(servers);
        let mut current = self.servers.lock().unwrap();
        let before = current.len();
        current.retain(|s| !remove.contains(s));
        Ok((before - current.len()) as u32)
    }

    fn add_routes(&self, routes: &str) -> Result<u32> {
        self.state.record(EngineCall::AddRoutes {
            routes: routes.to_string(),
        });
        let mut current = self.routes.lock().unwrap();
        let mut added = 0;
        for route in split_list(routes) {
            if !current.contains(&route) {
                current.push(route);
                added += 1;
            }
        }
        Ok(added)
    }

    fn remove_routes(&self, routes: &str) -> Result<u32> {
        self.state.record(EngineCall::RemoveRoutes {
            routes: routes.to_string(),
        });
        if self.state.fail_remove_routes.load(Ordering::SeqCst) {
            return Err(Error::Relay(format!("cannot remove routes {}", routes)));
        }
        let remove = split_list(routes);
        let mut current = self.routes.lock().unwrap();
        let before = current.len();
        current.retain(|r| !remove.contains(r));
        Ok((before - current.len()) as u32)
    }
}

/// Transport built by [`MockEngine::new_doh_transport`]
#[derive(Debug)]
pub struct MockTransport {
    id: String,
    url: String,
}

impl DnsTransport for MockTransport {
    fn id(&self) -> &str {
        &self.id
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Filter built by the mock engine
#[derive(Debug)]
pub struct MockFilter {
    kind: FilterKind,
    stamp: Mutex<Option<String>>,
    rejected: HashSet<String>,
}

impl MockFilter {
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            stamp: Mutex::new(None),
            rejected: HashSet::new(),
        }
    }

    /// Refuse the given stamps in `set_stamp`
    pub fn rejecting(mut self, stamps: HashSet<String>) -> Self {
        self.rejected = stamps;
        self
    }
}

impl BlocklistFilter for MockFilter {
    fn kind(&self) -> FilterKind {
        self.kind
    }

    fn stamp(&self) -> Option<String> {
        self.stamp.lock().unwrap().clone()
    }

    fn set_stamp(&self, stamp: &str) -> Result<()> {
        if stamp.is_empty() {
            return Err(Error::Filter("empty stamp".into()));
        }
        if self.rejected.contains(stamp) {
            return Err(Error::Filter(format!("unknown stamp {}", stamp)));
        }
        *self.stamp.lock().unwrap() = Some(stamp.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct PlatformState {
    next_fd: AtomicI32,
    fail_establish: AtomicBool,
    fail_close: AtomicBool,
    established: Mutex<Vec<InterfaceConfig>>,
    closed: Mutex<Vec<RawFd>>,
}

/// Substitute for the platform VPN service
#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<PlatformState>,
}

impl MockPlatform {
    /// Create a new mock platform; descriptors start at 100
    pub fn new() -> Self {
        let platform = Self::default();
        platform.state.next_fd.store(100, Ordering::SeqCst);
        platform
    }

    /// Make interface creation fail
    pub fn fail_establish(&self, fail: bool) {
        self.state.fail_establish.store(fail, Ordering::SeqCst);
    }

    /// Make descriptor release fail (the attempt is still recorded)
    pub fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Configurations of every interface created so far
    pub fn established(&self) -> Vec<InterfaceConfig> {
        self.state.established.lock().unwrap().clone()
    }

    /// Descriptors released so far, in order
    pub fn closed(&self) -> Vec<RawFd> {
        self.state.closed.lock().unwrap().clone()
    }

    /// Descriptors created and not yet released
    pub fn open_descriptors(&self) -> usize {
        self.established().len() - self.closed().len()
    }
}

#[async_trait]
impl VpnPlatform for MockPlatform {
    async fn establish(&self, config: &InterfaceConfig) -> Result<Box<dyn InterfaceDescriptor>> {
        if self.state.fail_establish.load(Ordering::SeqCst) {
            return Err(Error::EngineStart("VPN permission revoked".into()));
        }

        self.state.established.lock().unwrap().push(config.clone());
        let fd = self.state.next_fd.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDescriptor {
            fd,
            released: false,
            state: self.state.clone(),
        }))
    }
}

/// Descriptor handed out by [`MockPlatform`]
pub struct MockDescriptor {
    fd: RawFd,
    released: bool,
    state: Arc<PlatformState>,
}

impl InterfaceDescriptor for MockDescriptor {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn close(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.state.closed.lock().unwrap().push(self.fd);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "bad file descriptor",
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AllowAll;

    #[tokio::test]
    async fn test_engine_records_calls() {
        let engine = MockEngine::new();
        let transport = engine
            .new_doh_transport("https://dns.example/dns-query", &[])
            .await
            .unwrap();
        let session = engine
            .open(7, "10.111.222.3:53".parse().unwrap(), transport, Arc::new(AllowAll))
            .await
            .unwrap();

        session
            .set_tun_mode(DnsMode::Port, FirewallMode::Filter, ProxyMode::None)
            .unwrap();
        session.disconnect().unwrap();

        let calls = engine.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[1], EngineCall::Open { fd: 7, .. }));
        assert_eq!(calls[3], EngineCall::Disconnect);
    }

    #[tokio::test]
    async fn test_failing_transport() {
        let engine = MockEngine::new();
        engine.fail_transport("https://down.example/dns-query");
        assert!(engine
            .new_doh_transport("https://down.example/dns-query", &[])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_relay_live_servers() {
        let engine = MockEngine::new();
        let transport = engine.new_doh_transport("https://a/", &[]).await.unwrap();
        let session = engine
            .open(1, "10.111.222.3:53".parse().unwrap(), transport, Arc::new(AllowAll))
            .await
            .unwrap();

        session.start_dnscrypt_proxy("srvA,srvB", "").await.unwrap();
        let relay = session.dnscrypt_relay().unwrap();
        assert_eq!(relay.refresh().await.unwrap(), "srvA,srvB");

        assert_eq!(relay.remove_servers("srvA").unwrap(), 1);
        assert_eq!(relay.refresh().await.unwrap(), "srvB");

        engine.set_live_servers(Some(""));
        assert_eq!(relay.refresh().await.unwrap(), "");

        session.stop_dnscrypt_proxy().unwrap();
        assert!(session.dnscrypt_relay().is_none());
    }

    #[tokio::test]
    async fn test_closed_session_rejects_calls() {
        let engine = MockEngine::new();
        let transport = engine.new_doh_transport("https://a/", &[]).await.unwrap();
        let session = engine
            .open(1, "10.111.222.3:53".parse().unwrap(), transport, Arc::new(AllowAll))
            .await
            .unwrap();

        engine.set_session_closed(true);
        let err = session
            .set_tun_mode(DnsMode::Port, FirewallMode::None, ProxyMode::None)
            .unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn test_rejected_stamp() {
        let engine = MockEngine::new();
        engine.reject_stamp("BAD");

        let filter = engine.new_local_filter(Path::new("/tmp/bl")).unwrap();
        assert!(filter.set_stamp("BAD").is_err());
        assert!(filter.stamp().is_none());
        filter.set_stamp("1:AAIAgA==").unwrap();
    }

    #[tokio::test]
    async fn test_platform_descriptors() {
        let platform = MockPlatform::new();
        let mut fd = platform.establish(&InterfaceConfig::default()).await.unwrap();
        assert_eq!(fd.raw_fd(), 100);
        assert_eq!(platform.open_descriptors(), 1);

        fd.close().unwrap();
        fd.close().unwrap();
        assert_eq!(platform.closed(), vec![100]);
        assert_eq!(platform.open_descriptors(), 0);
    }
}
