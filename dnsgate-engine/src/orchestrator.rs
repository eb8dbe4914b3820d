//! DNS transport orchestrator
//!
//! This module owns the tunnel session for one VPN interface and decides
//! which DNS transport the engine resolves through. It handles:
//! - Interface and engine session establishment and teardown
//! - Mode dispatch across the DoH, DNS proxy and DNSCrypt families
//! - Blocklist filter selection for DoH
//! - DNSCrypt relay set maintenance and the liveness prober
//! - Fallback from a dead DNSCrypt relay set to the default DoH endpoint
//!
//! `establish`, `reconfigure`, `close` and probe decisions are serialized by
//! a single lock. The prober reads the relay through a separate slot that is
//! only written while that lock is held, and a generation counter lets late
//! probe results be discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as SyncRwLock, Weak};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use dnsgate_tun::{
    split_list, AllowAll, BlocklistFilter, ConnectionBlocker, DnsCryptRelay, DnsMode,
    DnsTransport, InterfaceConfig, InterfaceDescriptor, ProxyMode, RawFd, TunnelEngine,
    VpnPlatform,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{ConnectionState, DnsEvent, EventHandler, LoggingEventHandler};
use crate::factory::TransportFactory;
use crate::handle::TunnelHandle;
use crate::modes::{TransportFamily, TunnelModes};
use crate::prober::{decide, LivenessTarget, ProbeDecision, ProbeOutcome, ProberTask};
use crate::relay::{prepare_servers_to_remove, RelaySet, RelayStatus};
use crate::store::{ConfigStore, ModeChange};

/// Message shown to the user when DNSCrypt is abandoned
pub const DNSCRYPT_FALLBACK_NOTICE: &str = "Error connecting to DNSCrypt server.";

/// Read-only view of the current session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    /// Interface descriptor the engine is bound to
    pub fd: RawFd,
    pub modes: TunnelModes,
    pub family: TransportFamily,
    /// DoH URL in use; `None` while DNSCrypt owns resolution
    pub doh_url: Option<String>,
    pub relay: Option<RelayStatus>,
}

/// A DoH transport selected for programming
struct DohSelection {
    url: String,
    transport: Arc<dyn DnsTransport>,
}

/// One live engine binding
struct TunnelSession {
    handle: TunnelHandle,
    transport: Arc<dyn DnsTransport>,
    modes: TunnelModes,
    doh_url: Option<String>,
    relay: Option<RelaySet>,
}

impl TunnelSession {
    fn status(&self) -> SessionStatus {
        SessionStatus {
            fd: self.handle.fd(),
            modes: self.modes,
            family: self.modes.family(),
            doh_url: self.doh_url.clone(),
            relay: self.relay.as_ref().map(RelaySet::status),
        }
    }
}

/// Everything guarded by the orchestrator lock
#[derive(Default)]
struct TunnelState {
    descriptor: Option<Box<dyn InterfaceDescriptor>>,
    session: Option<TunnelSession>,
}

/// Relay handed to the prober, tagged with the generation it belongs to
#[derive(Clone)]
struct PublishedRelay {
    relay: Option<Arc<dyn DnsCryptRelay>>,
    generation: u64,
}

struct Inner {
    config: Config,
    interface: InterfaceConfig,
    factory: TransportFactory,
    engine: Arc<dyn TunnelEngine>,
    platform: Arc<dyn VpnPlatform>,
    store: Arc<dyn ConfigStore>,
    event_handler: Arc<dyn EventHandler>,
    blocker: Arc<dyn ConnectionBlocker>,

    tunnel: Mutex<TunnelState>,
    state: RwLock<ConnectionState>,

    /// Written only while `tunnel` is locked
    relay_slot: SyncRwLock<Option<PublishedRelay>>,
    generation: AtomicU64,
    probe_flight: Mutex<()>,

    this: Weak<Inner>,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    config: Config,
    engine: Option<Arc<dyn TunnelEngine>>,
    platform: Option<Arc<dyn VpnPlatform>>,
    store: Option<Arc<dyn ConfigStore>>,
    event_handler: Arc<dyn EventHandler>,
    blocker: Arc<dyn ConnectionBlocker>,
}

impl OrchestratorBuilder {
    pub fn engine(mut self, engine: Arc<dyn TunnelEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn VpnPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set a custom event handler
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    /// Firewall callback handed to the engine; defaults to [`AllowAll`]
    pub fn blocker(mut self, blocker: Arc<dyn ConnectionBlocker>) -> Self {
        self.blocker = blocker;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;
        let interface = self.config.interface_config()?;

        let engine = self
            .engine
            .ok_or_else(|| Error::Config("tunnel engine is required".into()))?;
        let platform = self
            .platform
            .ok_or_else(|| Error::Config("VPN platform is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| Error::Config("config store is required".into()))?;

        let factory = TransportFactory::new(
            engine.clone(),
            self.config.transport.clone(),
            self.config.blocklist.clone(),
        );

        let inner = Arc::new_cyclic(|this| Inner {
            config: self.config,
            interface,
            factory,
            engine,
            platform,
            store,
            event_handler: self.event_handler,
            blocker: self.blocker,
            tunnel: Mutex::new(TunnelState::default()),
            state: RwLock::new(ConnectionState::Disconnected),
            relay_slot: SyncRwLock::new(None),
            generation: AtomicU64::new(0),
            probe_flight: Mutex::new(()),
            this: this.clone(),
        });

        Ok(Orchestrator { inner })
    }
}

/// DNS transport orchestrator for one VPN interface
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Start building an orchestrator from `config`
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            engine: None,
            platform: None,
            store: None,
            event_handler: Arc::new(LoggingEventHandler),
            blocker: Arc::new(AllowAll),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Create the interface, open the engine session and apply `modes`
    ///
    /// Returns the current status without touching anything if a session
    /// already exists.
    pub async fn establish(&self, modes: TunnelModes) -> Result<SessionStatus> {
        self.inner.establish(modes).await
    }

    /// Apply a new mode triple to the tunnel
    pub async fn reconfigure(&self, modes: TunnelModes) -> Result<()> {
        let mut tunnel = self.inner.tunnel.lock().await;
        self.inner.reconfigure_locked(&mut tunnel, modes).await
    }

    /// Stop the prober, disconnect the engine and release the interface
    pub async fn close(&self) {
        self.inner.close().await
    }

    /// Snapshot of the current session, if any
    pub async fn status(&self) -> Option<SessionStatus> {
        self.inner.tunnel.lock().await.session.as_ref().map(TunnelSession::status)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    /// Run one liveness cycle now
    ///
    /// Returns `None` when DNSCrypt is not active, another cycle is in
    /// flight, or the result went stale while the relay was refreshing.
    pub async fn check_liveness(&self) -> Result<Option<ProbeDecision>> {
        self.inner.check_liveness().await
    }
}

impl Inner {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    async fn establish(&self, modes: TunnelModes) -> Result<SessionStatus> {
        let mut tunnel = self.tunnel.lock().await;
        if let Some(session) = &tunnel.session {
            log::debug!("Tunnel already established, ignoring establish");
            return Ok(session.status());
        }

        if let Some(mut stale) = tunnel.descriptor.take() {
            log::info!("Releasing retained interface fd {}", stale.raw_fd());
            if let Err(e) = stale.close() {
                log::warn!("Failed to release interface: {}", e);
            }
        }

        self.set_state(ConnectionState::Connecting).await;
        log::info!("Establishing tunnel with {}", modes);

        let result = match self.platform.establish(&self.interface).await {
            Ok(descriptor) => {
                tunnel.descriptor = Some(descriptor);
                self.connect(&mut tunnel, modes).await
            }
            Err(e) => Err(Error::EngineStart(format!("interface: {}", e))),
        };

        match result {
            Ok(status) => {
                self.announce(&status).await;
                self.set_state(ConnectionState::Working).await;
                Ok(status)
            }
            Err(e) => {
                if let Some(mut descriptor) = tunnel.descriptor.take() {
                    if let Err(e) = descriptor.close() {
                        log::warn!("Failed to release interface: {}", e);
                    }
                }
                let err = match e {
                    Error::EngineStart(_) => e,
                    other => Error::EngineStart(other.to_string()),
                };
                self.report_failure(modes, &err).await;
                Err(err)
            }
        }
    }

    async fn close(&self) {
        let mut tunnel = self.tunnel.lock().await;
        self.unpublish_relay();

        let had_tunnel = tunnel.session.is_some() || tunnel.descriptor.is_some();

        if let Some(session) = tunnel.session.take() {
            self.discard_session(session);
        }

        if let Some(mut descriptor) = tunnel.descriptor.take() {
            log::info!("Releasing interface fd {}", descriptor.raw_fd());
            if let Err(e) = descriptor.close() {
                log::warn!("Failed to release interface: {}", e);
            }
        }

        if had_tunnel {
            self.set_state(ConnectionState::Disconnected).await;
        }
    }

    /// Open an engine session over the held descriptor and apply `modes`
    async fn connect(&self, tunnel: &mut TunnelState, modes: TunnelModes) -> Result<SessionStatus> {
        let fd = tunnel
            .descriptor
            .as_ref()
            .map(|d| d.raw_fd())
            .ok_or(Error::NotEstablished)?;

        let doh = self.select_doh().await?;
        let handle = TunnelHandle::open(
            &*self.engine,
            fd,
            self.interface.fake_dns_endpoint(),
            doh.transport.clone(),
            self.blocker.clone(),
        )
        .await
        .map_err(|e| Error::EngineStart(e.to_string()))?;

        let mut session = TunnelSession {
            handle,
            transport: doh.transport.clone(),
            modes,
            doh_url: Some(doh.url.clone()),
            relay: None,
        };

        let doh = (modes.family() != TransportFamily::DnsCrypt).then_some(doh);
        if let Err(e) = self.program(&mut session, modes, doh.as_ref()).await {
            self.discard_session(session);
            return Err(Error::EngineStart(e.to_string()));
        }

        self.emit(DnsEvent::SessionEstablished { fd, modes }).await;
        let status = session.status();
        tunnel.session = Some(session);
        Ok(status)
    }

    /// Stop the prober and disconnect; the descriptor is left alone
    fn discard_session(&self, mut session: TunnelSession) {
        if session.relay.take().is_some() {
            self.unpublish_relay();
        }
        if let Err(e) = session.handle.disconnect() {
            log::warn!("Failed to disconnect engine session: {}", e);
        }
    }

    // ========================================================================
    // Mode dispatch
    // ========================================================================

    async fn reconfigure_locked(&self, tunnel: &mut TunnelState, modes: TunnelModes) -> Result<()> {
        if tunnel.session.is_none() && tunnel.descriptor.is_none() {
            return Err(Error::NotEstablished);
        }

        log::info!("Reconfiguring tunnel to {}", modes);
        let result = if tunnel.session.is_none() {
            self.set_state(ConnectionState::Connecting).await;
            self.connect(tunnel, modes).await
        } else {
            self.apply(tunnel, modes).await
        };

        match result {
            Ok(status) => {
                self.announce(&status).await;
                self.set_state(ConnectionState::Working).await;
                Ok(())
            }
            Err(e) => {
                self.report_failure(modes, &e).await;
                Err(e)
            }
        }
    }

    /// Apply `modes` to the existing session
    async fn apply(&self, tunnel: &mut TunnelState, modes: TunnelModes) -> Result<SessionStatus> {
        let doh = match modes.family() {
            TransportFamily::DnsCrypt => None,
            _ => Some(self.select_doh().await?),
        };

        let programmed = {
            let Some(session) = tunnel.session.as_mut() else {
                return Err(Error::NotEstablished);
            };
            self.program(session, modes, doh.as_ref())
                .await
                .map(|()| session.status())
        };

        match programmed {
            Ok(status) => Ok(status),
            Err(e) if e.is_closed() => {
                log::warn!("Engine session closed; keeping interface for reconnect");
                if let Some(session) = tunnel.session.take() {
                    self.discard_session(session);
                }
                Err(Error::Reconfigure(format!("engine session closed: {}", e)))
            }
            Err(e) => Err(Error::Reconfigure(e.to_string())),
        }
    }

    async fn select_doh(&self) -> Result<DohSelection> {
        let url = self.factory.doh_url(&*self.store);
        let transport = self.factory.build_doh(&url).await?;
        Ok(DohSelection { url, transport })
    }

    /// Program `modes` onto the session
    ///
    /// `doh` is the freshly built transport for the DoH and DNS proxy
    /// families, `None` for DNSCrypt. Session modes change only on success.
    async fn program(
        &self,
        session: &mut TunnelSession,
        modes: TunnelModes,
        doh: Option<&DohSelection>,
    ) -> dnsgate_tun::Result<()> {
        match doh {
            None => {
                let relay_failed = self.apply_relay(session).await;
                session.handle.set_mode(modes)?;
                self.apply_socks(&session.handle, modes.proxy)?;
                self.ensure_prober(session, relay_failed).await;
                session.doh_url = None;
            }
            Some(doh) => {
                if !Arc::ptr_eq(&session.transport, &doh.transport) {
                    session.handle.set_transport(doh.transport.clone())?;
                    session.transport = doh.transport.clone();
                }
                session.handle.set_mode(modes)?;
                self.clear_relay(session);

                let family = modes.family();
                if family == TransportFamily::DnsProxy {
                    self.apply_dns_proxy(&session.handle)?;
                }
                self.apply_socks(&session.handle, modes.proxy)?;
                if family == TransportFamily::Doh {
                    self.apply_filter(&session.handle, &doh.url);
                }
                session.doh_url = Some(doh.url.clone());
            }
        }

        session.modes = modes;
        Ok(())
    }

    fn apply_dns_proxy(&self, handle: &TunnelHandle) -> dnsgate_tun::Result<()> {
        match self.store.dns_proxy_endpoint() {
            Some(endpoint) => {
                log::info!(
                    "Forwarding DNS to {} ({}:{})",
                    endpoint.name,
                    endpoint.ip,
                    endpoint.port
                );
                handle.start_dns_proxy(&endpoint.ip, endpoint.port)
            }
            None => {
                log::warn!("No DNS proxy endpoint selected");
                Ok(())
            }
        }
    }

    fn apply_socks(&self, handle: &TunnelHandle, proxy: ProxyMode) -> dnsgate_tun::Result<()> {
        if !proxy.uses_socks() {
            return Ok(());
        }

        let credentials = match proxy {
            ProxyMode::Orbot => self.store.orbot_proxy(),
            _ => self.store.socks5_proxy(),
        };
        match credentials {
            Some(credentials) => handle.start_proxy(&credentials),
            None => {
                log::warn!("Proxy mode {} selected without proxy settings", proxy);
                Ok(())
            }
        }
    }

    /// Attach the local or remote blocklist; failures are only logged
    ///
    /// A local blocklist that fails to attach falls through to the remote one.
    fn apply_filter(&self, handle: &TunnelHandle, url: &str) {
        let state = self.store.blocklist();

        if state.local_ready() {
            match attach_filter(handle, self.factory.local_filter(&state)) {
                Ok(()) => {
                    log::info!("Local blocklist attached (stamp {})", state.local_stamp);
                    return;
                }
                Err(e) => log::warn!("Failed to attach local blocklist: {}", e),
            }
        }

        if handle.filter().is_some() {
            if let Err(e) = handle.set_filter(None) {
                log::warn!("Failed to clear blocklist: {}", e);
            }
        }

        if self.factory.is_basic_url(url) && state.remote_downloaded {
            match attach_filter(handle, self.factory.remote_filter(&state)) {
                Ok(()) => log::info!("Remote blocklist attached for {}", url),
                Err(e) => log::warn!("Failed to attach remote blocklist: {}", e),
            }
        }
    }

    // ========================================================================
    // DNSCrypt relay set
    // ========================================================================

    /// Start or update the relay set
    ///
    /// Failures are logged and reported as events; returns whether one occurred.
    async fn apply_relay(&self, session: &mut TunnelSession) -> bool {
        let servers = self.store.dnscrypt_servers();
        let routes = self.store.dnscrypt_relays();
        let pending = self.store.dnscrypt_servers_to_remove();

        let (started, result) = match session.handle.relay() {
            None => (true, self.start_relay(&session.handle, &servers, &routes).await),
            Some(relay) => (false, self.update_relay(&*relay, &servers, &routes, &pending)),
        };

        let failed = result.is_err();
        if let Err(e) = result {
            log::warn!("{}", e);
            self.emit(DnsEvent::Error {
                message: e.to_string(),
                recoverable: e.is_recoverable(),
            })
            .await;
        }

        let created = session.relay.is_none();
        let set = session.relay.get_or_insert_with(RelaySet::new);
        set.configure(&servers, &routes, &pending);

        if started || created {
            self.publish_relay(session.handle.relay());
        }
        failed
    }

    async fn start_relay(&self, handle: &TunnelHandle, servers: &str, routes: &str) -> Result<()> {
        log::info!("Starting DNSCrypt relay set: servers=[{}] routes=[{}]", servers, routes);
        let status = handle
            .start_relay(servers, routes)
            .await
            .map_err(|e| Error::RelayOperation(format!("start: {}", e)))?;

        self.emit(DnsEvent::RelayStarted { status }).await;
        Ok(())
    }

    fn update_relay(
        &self,
        relay: &dyn DnsCryptRelay,
        servers: &str,
        routes: &str,
        pending: &str,
    ) -> Result<()> {
        let relay_err =
            |op: &str, e: dnsgate_tun::Error| Error::RelayOperation(format!("{}: {}", op, e));

        let live = relay.live_servers().map_err(|e| relay_err("live servers", e))?;
        let stale = prepare_servers_to_remove(&live, pending);
        let mut removed = 0;
        if !stale.is_empty() {
            removed = relay.remove_servers(&stale).map_err(|e| relay_err("remove servers", e))?;
        }

        let queued = self.store.relays_to_remove();
        let mut routes_removed = 0;
        if !queued.is_empty() {
            routes_removed += relay
                .remove_routes(&queued)
                .map_err(|e| relay_err("remove routes", e))?;
            self.store.clear_relays_to_remove();
        }
        if !routes.is_empty() {
            routes_removed += relay
                .remove_routes(routes)
                .map_err(|e| relay_err("remove routes", e))?;
        }

        let added = relay.add_servers(servers).map_err(|e| relay_err("add servers", e))?;
        if !routes.is_empty() {
            relay.add_routes(routes).map_err(|e| relay_err("add routes", e))?;
        }

        log::info!(
            "DNSCrypt relay set updated: {} servers added, {} removed, {} routes removed",
            added,
            removed,
            routes_removed
        );
        Ok(())
    }

    /// Stop and forget the relay set, if any
    fn clear_relay(&self, session: &mut TunnelSession) {
        if session.handle.relay().is_some() {
            if let Err(e) = session.handle.stop_relay() {
                log::warn!("Failed to stop DNSCrypt relay set: {}", e);
            }
        }
        if session.relay.take().is_some() {
            log::info!("DNSCrypt relay set cleared");
            self.unpublish_relay();
        }
    }

    /// Spawn a prober unless one is running; `restart` replaces a running one
    /// so a check follows the configured delay
    async fn ensure_prober(&self, session: &mut TunnelSession, restart: bool) {
        let Some(set) = session.relay.as_mut() else {
            return;
        };
        if set.servers.is_empty() || (set.prober_running() && !restart) {
            return;
        }

        set.attach_prober(ProberTask::spawn(self.this.clone(), &self.config.probe));
        self.emit(DnsEvent::ProbeScheduled).await;
    }

    fn publish_relay(&self, relay: Option<Arc<dyn DnsCryptRelay>>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut slot = self.relay_slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(PublishedRelay { relay, generation });
    }

    fn unpublish_relay(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.relay_slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    fn published_relay(&self) -> Option<PublishedRelay> {
        self.relay_slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // ========================================================================
    // Liveness
    // ========================================================================

    async fn check_liveness(&self) -> Result<Option<ProbeDecision>> {
        let Ok(_flight) = self.probe_flight.try_lock() else {
            log::debug!("Liveness check already in flight");
            return Ok(None);
        };

        let Some(published) = self.published_relay() else {
            return Ok(None);
        };

        let outcome = match &published.relay {
            None => ProbeOutcome::NoRelay,
            Some(relay) => match relay.refresh().await {
                Ok(live) => ProbeOutcome::Live(split_list(&live)),
                Err(e) => ProbeOutcome::Failed(Error::Probe(e.to_string()).to_string()),
            },
        };

        let mut tunnel = self.tunnel.lock().await;
        if self.generation.load(Ordering::SeqCst) != published.generation {
            log::debug!("Discarding stale liveness result");
            return Ok(None);
        }
        let Some(session) = tunnel.session.as_mut() else {
            return Ok(None);
        };

        let decision = decide(&outcome, self.store.mode_change());
        let live = match outcome {
            ProbeOutcome::Live(live) => live,
            _ => Vec::new(),
        };
        self.store.update_live_servers(&live.join(","));

        match &decision {
            ProbeDecision::Fallback { reason } => {
                log::warn!("DNSCrypt unavailable ({}), falling back to DoH", reason);
                self.fallback(&mut tunnel, reason).await?;
            }
            ProbeDecision::RepairCryptMode | ProbeDecision::Keep => {
                if let Some(set) = session.relay.as_mut() {
                    set.live = live.clone();
                }
                self.emit(DnsEvent::LiveServers { servers: live }).await;

                if decision == ProbeDecision::RepairCryptMode {
                    let modes = session.modes.with_dns(DnsMode::CryptPort);
                    log::info!("DNSCrypt servers live, re-applying {}", modes);
                    self.repair_crypt_mode(&mut tunnel, modes).await?;
                }
            }
        }

        Ok(Some(decision))
    }

    async fn repair_crypt_mode(&self, tunnel: &mut TunnelState, modes: TunnelModes) -> Result<()> {
        let programmed = {
            let Some(session) = tunnel.session.as_mut() else {
                return Ok(());
            };
            let result = session
                .handle
                .set_mode(modes)
                .and_then(|()| self.apply_socks(&session.handle, modes.proxy));
            if result.is_ok() {
                session.modes = modes;
            }
            result
        };

        if let Err(e) = programmed {
            if e.is_closed() {
                if let Some(session) = tunnel.session.take() {
                    self.discard_session(session);
                }
            }
            let err = Error::Reconfigure(e.to_string());
            self.report_failure(modes, &err).await;
            return Err(err);
        }
        Ok(())
    }

    /// Abandon DNSCrypt for the store's default DoH endpoint
    async fn fallback(&self, tunnel: &mut TunnelState, reason: &str) -> Result<()> {
        let Some(session) = tunnel.session.as_mut() else {
            return Ok(());
        };

        if let Err(e) = session.handle.stop_relay() {
            log::warn!("Failed to stop DNSCrypt relay set: {}", e);
        }
        session.relay = None;
        self.unpublish_relay();
        let modes = session.modes.with_dns(DnsMode::Port);

        self.store.mark_dnscrypt_failing();
        let endpoint = self.store.select_default_doh();
        self.store.set_mode_change(ModeChange::Doh);
        if let Some(endpoint) = &endpoint {
            self.store.set_connected_dns(endpoint);
        }

        let result = self.reconfigure_locked(tunnel, modes).await;

        self.emit(DnsEvent::Notification {
            message: DNSCRYPT_FALLBACK_NOTICE.to_string(),
        })
        .await;
        self.emit(DnsEvent::FallbackActivated {
            url: endpoint.map(|e| e.url),
            reason: reason.to_string(),
        })
        .await;

        result
    }

    // ========================================================================
    // State and events
    // ========================================================================

    async fn announce(&self, status: &SessionStatus) {
        self.emit(DnsEvent::TransportChanged {
            modes: status.modes,
            family: status.family,
            url: status.doh_url.clone(),
        })
        .await;
    }

    async fn report_failure(&self, modes: TunnelModes, err: &Error) {
        log::error!("Failed to apply {}: {}", modes, err);
        self.emit(DnsEvent::ReconfigureFailed {
            modes,
            message: err.to_string(),
        })
        .await;
        self.set_state(ConnectionState::Failing).await;
    }

    /// Update state and emit event
    async fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, new_state)
        };

        if old_state != new_state {
            self.emit(DnsEvent::StateChanged {
                old: old_state,
                new: new_state,
            })
            .await;
        }
    }

    async fn emit(&self, event: DnsEvent) {
        self.event_handler.on_event(event).await;
    }
}

fn attach_filter(handle: &TunnelHandle, filter: Result<Arc<dyn BlocklistFilter>>) -> Result<()> {
    handle
        .set_filter(Some(filter?))
        .map_err(|e| Error::Reconfigure(e.to_string()))
}

#[async_trait]
impl LivenessTarget for Inner {
    async fn probe_cycle(&self) {
        if let Err(e) = self.check_liveness().await {
            log::warn!("Liveness check failed: {}", e);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let tunnel = self.tunnel.get_mut();
        if let Some(session) = tunnel.session.take() {
            if let Err(e) = session.handle.disconnect() {
                log::warn!("Failed to disconnect engine session: {}", e);
            }
        }
        if let Some(mut descriptor) = tunnel.descriptor.take() {
            if let Err(e) = descriptor.close() {
                log::warn!("Failed to release interface: {}", e);
            }
        }
    }
}
