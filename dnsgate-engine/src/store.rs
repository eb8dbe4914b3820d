//! Config Store capability
//!
//! Endpoint tables, user preferences and status flags live in the host
//! application's persistent storage. The orchestrator reads and writes them
//! through [`ConfigStore`]; [`MemoryStore`] is an in-process implementation
//! used by tests and by hosts without persistence.

use std::sync::RwLock;

use dnsgate_tun::ProxyCredentials;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A DoH resolver known to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DohEndpoint {
    pub name: String,
    pub url: String,
}

/// A plain DNS proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsProxyEndpoint {
    pub name: String,
    pub ip: String,
    pub port: u16,
}

/// Download and selection state of the blocklists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocklistState {
    /// Local blocklist enabled by the user
    pub local_enabled: bool,
    /// Local blocklist files are on disk
    pub local_downloaded: bool,
    /// Download directory name of the local blocklist
    pub local_download_id: String,
    /// Stamp selecting the local ruleset
    pub local_stamp: String,
    /// Remote blocklist description is on disk
    pub remote_downloaded: bool,
    /// Download directory name of the remote blocklist description
    pub remote_download_id: String,
}

impl BlocklistState {
    /// Check if the local blocklist can be attached
    pub fn local_ready(&self) -> bool {
        self.local_enabled && self.local_downloaded && !self.local_stamp.is_empty()
    }
}

/// Last transport migration requested through the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeChange {
    #[default]
    None,
    /// Switch to a DoH endpoint (also recorded by a DNSCrypt fallback)
    Doh,
    /// Switch to DNSCrypt; pending until the relay set is confirmed live
    DnsCrypt,
}

/// Persistent configuration consumed and produced by the orchestrator
pub trait ConfigStore: Send + Sync {
    /// DoH endpoint currently selected, if any
    fn doh_endpoint(&self) -> Option<DohEndpoint>;

    /// Select the default DoH endpoint and return it
    fn select_default_doh(&self) -> Option<DohEndpoint>;

    /// Comma-separated DNSCrypt server stamps selected by the user
    fn dnscrypt_servers(&self) -> String;

    /// Comma-separated DNSCrypt relay routes selected by the user
    fn dnscrypt_relays(&self) -> String;

    /// Comma-separated ids of servers pending removal from the relay set
    fn dnscrypt_servers_to_remove(&self) -> String;

    /// Comma-separated relay routes queued for removal
    fn relays_to_remove(&self) -> String;

    /// Empty the relay removal queue once the routes are gone
    fn clear_relays_to_remove(&self);

    /// Record the relay's reachable servers
    fn update_live_servers(&self, live: &str);

    /// Mark the selected DNSCrypt servers as failing
    fn mark_dnscrypt_failing(&self);

    /// Connected plain DNS proxy endpoint
    fn dns_proxy_endpoint(&self) -> Option<DnsProxyEndpoint>;

    /// User-configured SOCKS5 proxy
    fn socks5_proxy(&self) -> Option<ProxyCredentials>;

    /// SOCKS5 proxy exposed by Orbot
    fn orbot_proxy(&self) -> Option<ProxyCredentials>;

    /// Blocklist download and selection state
    fn blocklist(&self) -> BlocklistState;

    /// Last requested transport migration
    fn mode_change(&self) -> ModeChange;

    fn set_mode_change(&self, change: ModeChange);

    /// Record the DNS endpoint now serving queries
    fn set_connected_dns(&self, endpoint: &DohEndpoint);
}

/// Serializable contents of a [`MemoryStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    /// Known DoH endpoints; the first one is the default
    pub doh_endpoints: Vec<DohEndpoint>,
    /// Index into `doh_endpoints` of the selected endpoint
    pub selected_doh: Option<usize>,
    pub dnscrypt_servers: String,
    pub dnscrypt_relays: String,
    pub dnscrypt_servers_to_remove: String,
    pub relays_to_remove: String,
    pub live_servers: String,
    pub dnscrypt_failing: bool,
    pub dns_proxy: Option<DnsProxyEndpoint>,
    pub socks5: Option<ProxyCredentials>,
    pub orbot: Option<ProxyCredentials>,
    pub blocklist: BlocklistState,
    pub mode_change: ModeChange,
    pub connected_dns: Option<DohEndpoint>,
}

impl StoreSnapshot {
    /// Parse a snapshot from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// In-memory [`ConfigStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new(snapshot: StoreSnapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> StoreSnapshot {
        self.data.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Mutate the contents in place
    pub fn update(&self, f: impl FnOnce(&mut StoreSnapshot)) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        f(&mut data);
    }

    fn read<T>(&self, f: impl FnOnce(&StoreSnapshot) -> T) -> T {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        f(&data)
    }
}

impl ConfigStore for MemoryStore {
    fn doh_endpoint(&self) -> Option<DohEndpoint> {
        self.read(|d| d.selected_doh.and_then(|i| d.doh_endpoints.get(i).cloned()))
    }

    fn select_default_doh(&self) -> Option<DohEndpoint> {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        let default = data.doh_endpoints.first().cloned();
        data.selected_doh = default.as_ref().map(|_| 0);
        default
    }

    fn dnscrypt_servers(&self) -> String {
        self.read(|d| d.dnscrypt_servers.clone())
    }

    fn dnscrypt_relays(&self) -> String {
        self.read(|d| d.dnscrypt_relays.clone())
    }

    fn dnscrypt_servers_to_remove(&self) -> String {
        self.read(|d| d.dnscrypt_servers_to_remove.clone())
    }

    fn relays_to_remove(&self) -> String {
        self.read(|d| d.relays_to_remove.clone())
    }

    fn clear_relays_to_remove(&self) {
        self.update(|d| d.relays_to_remove.clear());
    }

    fn update_live_servers(&self, live: &str) {
        self.update(|d| d.live_servers = live.to_string());
    }

    fn mark_dnscrypt_failing(&self) {
        self.update(|d| d.dnscrypt_failing = true);
    }

    fn dns_proxy_endpoint(&self) -> Option<DnsProxyEndpoint> {
        self.read(|d| d.dns_proxy.clone())
    }

    fn socks5_proxy(&self) -> Option<ProxyCredentials> {
        self.read(|d| d.socks5.clone())
    }

    fn orbot_proxy(&self) -> Option<ProxyCredentials> {
        self.read(|d| d.orbot.clone())
    }

    fn blocklist(&self) -> BlocklistState {
        self.read(|d| d.blocklist.clone())
    }

    fn mode_change(&self) -> ModeChange {
        self.read(|d| d.mode_change)
    }

    fn set_mode_change(&self, change: ModeChange) {
        self.update(|d| d.mode_change = change);
    }

    fn set_connected_dns(&self, endpoint: &DohEndpoint) {
        self.update(|d| d.connected_dns = Some(endpoint.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Vec<DohEndpoint> {
        vec![
            DohEndpoint {
                name: "Default".into(),
                url: "https://default.example/dns-query".into(),
            },
            DohEndpoint {
                name: "Custom".into(),
                url: "https://custom.example/dns-query".into(),
            },
        ]
    }

    #[test]
    fn test_select_default_doh() {
        let store = MemoryStore::new(StoreSnapshot {
            doh_endpoints: endpoints(),
            selected_doh: Some(1),
            ..Default::default()
        });

        assert_eq!(store.doh_endpoint().unwrap().name, "Custom");
        assert_eq!(store.select_default_doh().unwrap().name, "Default");
        assert_eq!(store.doh_endpoint().unwrap().name, "Default");
    }

    #[test]
    fn test_select_default_without_endpoints() {
        let store = MemoryStore::default();
        assert!(store.select_default_doh().is_none());
        assert!(store.doh_endpoint().is_none());
    }

    #[test]
    fn test_local_blocklist_ready() {
        let mut state = BlocklistState {
            local_enabled: true,
            local_downloaded: true,
            local_stamp: "1:AAIAgA==".into(),
            ..Default::default()
        };
        assert!(state.local_ready());

        state.local_stamp.clear();
        assert!(!state.local_ready());

        state.local_stamp = "1:AAIAgA==".into();
        state.local_downloaded = false;
        assert!(!state.local_ready());
    }

    #[test]
    fn test_relay_removal_queue() {
        let store = MemoryStore::new(StoreSnapshot {
            relays_to_remove: "relayA".into(),
            ..Default::default()
        });

        assert_eq!(store.relays_to_remove(), "relayA");
        assert_eq!(store.relays_to_remove(), "relayA");

        store.clear_relays_to_remove();
        assert_eq!(store.relays_to_remove(), "");
    }

    #[test]
    fn test_snapshot_from_toml() {
        let toml = r#"
dnscrypt_servers = "srvA,srvB"
mode_change = "dns_crypt"
selected_doh = 0

[[doh_endpoints]]
name = "Default"
url = "https://default.example/dns-query"

[socks5]
ip = "127.0.0.1"
port = 1080

[blocklist]
local_enabled = true
local_stamp = "1:AAIAgA=="
"#;

        let snapshot = StoreSnapshot::from_toml(toml).unwrap();
        assert_eq!(snapshot.mode_change, ModeChange::DnsCrypt);
        assert_eq!(snapshot.socks5.as_ref().unwrap().port, 1080);
        assert!(snapshot.socks5.as_ref().unwrap().username.is_empty());
        assert!(snapshot.blocklist.local_enabled);
        assert!(!snapshot.blocklist.local_downloaded);

        let store = MemoryStore::new(snapshot);
        assert_eq!(store.dnscrypt_servers(), "srvA,srvB");
        assert_eq!(store.doh_endpoint().unwrap().name, "Default");
    }
}
