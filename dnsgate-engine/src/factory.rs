//! Transport Factory
//!
//! Pure construction of DoH transports and blocklist filters from the
//! configuration file and the Config Store. Nothing here touches a live
//! session.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use dnsgate_tun::{BlocklistFilter, DnsTransport, TunnelEngine};

use crate::config::{BlocklistConfig, TransportConfig};
use crate::error::{Error, Result};
use crate::store::{BlocklistState, ConfigStore};

/// Builds transports and filters through the engine
pub struct TransportFactory {
    engine: Arc<dyn TunnelEngine>,
    transport: TransportConfig,
    blocklist: BlocklistConfig,
}

impl TransportFactory {
    pub fn new(
        engine: Arc<dyn TunnelEngine>,
        transport: TransportConfig,
        blocklist: BlocklistConfig,
    ) -> Self {
        Self {
            engine,
            transport,
            blocklist,
        }
    }

    /// DoH URL to resolve against: the store's selection, else the configured default
    pub fn doh_url(&self, store: &dyn ConfigStore) -> String {
        store
            .doh_endpoint()
            .map(|endpoint| endpoint.url)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.transport.default_doh_url.clone())
    }

    /// Bootstrap addresses for `url`
    ///
    /// A hint applies when its configured URL contains `url`.
    pub fn ip_hints(&self, url: &str) -> Vec<IpAddr> {
        self.transport
            .ip_hints
            .iter()
            .find(|hint| hint.url.contains(url))
            .map(|hint| hint.ips.clone())
            .unwrap_or_default()
    }

    /// Build a DoH transport for `url`
    pub async fn build_doh(&self, url: &str) -> Result<Arc<dyn DnsTransport>> {
        let hints = self.ip_hints(url);
        log::debug!("Building DoH transport for {} ({} bootstrap addresses)", url, hints.len());

        self.engine
            .new_doh_transport(url, &hints)
            .await
            .map_err(|e| Error::TransportBuild(format!("{}: {}", url, e)))
    }

    /// Whether `url` points at the resolver that evaluates remote blocklists
    pub fn is_basic_url(&self, url: &str) -> bool {
        !self.transport.basic_host.is_empty() && url.contains(&self.transport.basic_host)
    }

    /// Directory holding the local blocklist download
    pub fn local_dir(&self, state: &BlocklistState) -> PathBuf {
        self.blocklist.dir.join(&state.local_download_id)
    }

    /// File describing the remote blocklist download
    pub fn remote_filetag(&self, state: &BlocklistState) -> PathBuf {
        self.blocklist
            .dir
            .join(&state.remote_download_id)
            .join(&self.blocklist.remote_file_tag)
    }

    /// Load the local blocklist and select the stored stamp
    pub fn local_filter(&self, state: &BlocklistState) -> Result<Arc<dyn BlocklistFilter>> {
        let dir = self.local_dir(state);
        let filter = self.engine.new_local_filter(&dir).map_err(|e| {
            Error::TransportBuild(format!("local blocklist {}: {}", dir.display(), e))
        })?;

        filter
            .set_stamp(&state.local_stamp)
            .map_err(|e| Error::TransportBuild(format!("local blocklist stamp: {}", e)))?;

        Ok(filter)
    }

    /// Load the remote blocklist description
    pub fn remote_filter(&self, state: &BlocklistState) -> Result<Arc<dyn BlocklistFilter>> {
        let filetag = self.remote_filetag(state);
        self.engine.new_remote_filter(&filetag).map_err(|e| {
            Error::TransportBuild(format!("remote blocklist {}: {}", filetag.display(), e))
        })
    }
}
