//! Configuration types for the orchestrator

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dnsgate_tun::{InterfaceConfig, TunnelScope};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure
///
/// # Example Configuration
///
/// ```toml
/// log_level = "info"
///
/// [interface]
/// mtu = 1500
/// network = "10.111.222.0/24"
/// scope = "dns_and_firewall"
///
/// [transport]
/// default_doh_url = "https://cloudflare-dns.com/dns-query"
/// basic_host = "basic.rethinkdns.com"
///
/// [[transport.ip_hints]]
/// url = "https://cloudflare-dns.com/dns-query"
/// ips = ["1.1.1.1", "1.0.0.1"]
///
/// [probe]
/// interval_secs = 300
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level requested by the host
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Virtual interface layout
    #[serde(default)]
    pub interface: InterfaceSection,

    /// DoH transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Blocklist artifact locations
    #[serde(default)]
    pub blocklist: BlocklistConfig,

    /// DNSCrypt liveness probing
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            interface: InterfaceSection::default(),
            transport: TransportConfig::default(),
            blocklist: BlocklistConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.interface_config()?;
        self.transport.validate()?;
        Ok(())
    }

    /// Interface configuration handed to the platform
    pub fn interface_config(&self) -> Result<InterfaceConfig> {
        InterfaceConfig::builder()
            .session_name(self.interface.session_name.clone())
            .mtu(self.interface.mtu)
            .network(self.interface.network)
            .scope(self.interface.scope)
            .build()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Generate a sample configuration
    pub fn sample() -> String {
        r#"# dnsgate configuration

# Log level: "error", "warn", "info", "debug", "trace"
log_level = "info"

[interface]
# Session name shown by the platform
session_name = "dnsgate"

# Must match the MTU the engine was built with
mtu = 1500

# Private /24: .1 gateway, .2 router, .3 fake DNS
network = "10.111.222.0/24"

# "dns_only", "firewall_only" or "dns_and_firewall"
scope = "dns_and_firewall"

[transport]
# DoH endpoint used when the store has none selected
default_doh_url = "https://cloudflare-dns.com/dns-query"

# DoH URLs containing this host get the remote blocklist attached
basic_host = "basic.rethinkdns.com"

# Bootstrap addresses for DoH hosts (optional)
# [[transport.ip_hints]]
# url = "https://cloudflare-dns.com/dns-query"
# ips = ["1.1.1.1", "1.0.0.1"]

[blocklist]
# Directory holding downloaded blocklists, one sub-directory per download
dir = "blocklists"

# File describing a remote blocklist inside a download directory
remote_file_tag = "filetag.json"

[probe]
# Delay before the first DNSCrypt liveness check
initial_delay_ms = 0

# Seconds between checks (0 = check once per relay activation)
interval_secs = 300
"#
        .to_string()
    }
}

/// Virtual interface section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceSection {
    #[serde(default = "default_session_name")]
    pub session_name: String,

    #[serde(default = "default_mtu")]
    pub mtu: u16,

    #[serde(default = "default_network")]
    pub network: Ipv4Net,

    #[serde(default)]
    pub scope: TunnelScope,
}

impl Default for InterfaceSection {
    fn default() -> Self {
        Self {
            session_name: default_session_name(),
            mtu: default_mtu(),
            network: default_network(),
            scope: TunnelScope::default(),
        }
    }
}

/// Bootstrap addresses for a DoH host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpHint {
    pub url: String,
    #[serde(default)]
    pub ips: Vec<IpAddr>,
}

/// DoH transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// DoH endpoint used when the store has none selected
    #[serde(default = "default_doh_url")]
    pub default_doh_url: String,

    /// Host marking a DoH URL as the "basic" filtering resolver
    #[serde(default = "default_basic_host")]
    pub basic_host: String,

    /// Bootstrap address table
    #[serde(default)]
    pub ip_hints: Vec<IpHint>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_doh_url: default_doh_url(),
            basic_host: default_basic_host(),
            ip_hints: Vec::new(),
        }
    }
}

impl TransportConfig {
    fn validate(&self) -> Result<()> {
        if !self.default_doh_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "default_doh_url must be an https:// URL, got '{}'",
                self.default_doh_url
            )));
        }

        for hint in &self.ip_hints {
            if hint.url.is_empty() {
                return Err(Error::Config("ip_hints entry with empty url".into()));
            }
        }

        Ok(())
    }
}

/// Blocklist artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistConfig {
    #[serde(default = "default_blocklist_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_remote_file_tag")]
    pub remote_file_tag: String,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            dir: default_blocklist_dir(),
            remote_file_tag: default_remote_file_tag(),
        }
    }
}

/// DNSCrypt liveness probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Seconds between checks; 0 checks once per relay activation
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            interval_secs: default_probe_interval(),
        }
    }
}

impl ProbeConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Interval between checks, `None` for a single check
    pub fn interval(&self) -> Option<Duration> {
        match self.interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_session_name() -> String {
    dnsgate_tun::config::DEFAULT_SESSION_NAME.to_string()
}

fn default_mtu() -> u16 {
    dnsgate_tun::DEFAULT_MTU
}

fn default_network() -> Ipv4Net {
    Ipv4Net::new_assert(std::net::Ipv4Addr::new(10, 111, 222, 0), 24)
}

fn default_doh_url() -> String {
    "https://cloudflare-dns.com/dns-query".to_string()
}

fn default_basic_host() -> String {
    "basic.rethinkdns.com".to_string()
}

fn default_blocklist_dir() -> PathBuf {
    PathBuf::from("blocklists")
}

fn default_remote_file_tag() -> String {
    "filetag.json".to_string()
}

fn default_probe_interval() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.interface.mtu, 1500);
        assert_eq!(config.probe.interval(), Some(Duration::from_secs(300)));

        let iface = config.interface_config().unwrap();
        assert_eq!(iface.dns(), Ipv4Addr::new(10, 111, 222, 3));
        assert_eq!(iface.scope, TunnelScope::DnsAndFirewall);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
log_level = "debug"

[interface]
mtu = 1400
network = "10.8.0.0/24"
scope = "dns_only"

[transport]
default_doh_url = "https://dns.example/dns-query"
basic_host = "basic.example"

[[transport.ip_hints]]
url = "https://dns.example/dns-query"
ips = ["192.0.2.1", "2001:db8::1"]

[blocklist]
dir = "/data/blocklists"

[probe]
initial_delay_ms = 250
interval_secs = 0
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.interface.scope, TunnelScope::DnsOnly);
        assert_eq!(config.transport.ip_hints.len(), 1);
        assert_eq!(config.transport.ip_hints[0].ips.len(), 2);
        assert_eq!(config.blocklist.dir, PathBuf::from("/data/blocklists"));
        assert_eq!(config.blocklist.remote_file_tag, "filetag.json");
        assert_eq!(config.probe.initial_delay(), Duration::from_millis(250));
        assert_eq!(config.probe.interval(), None);
    }

    #[test]
    fn test_rejects_plain_http_default() {
        let toml = r#"
[transport]
default_doh_url = "http://dns.example/dns-query"
"#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_rejects_small_mtu() {
        let toml = r#"
[interface]
mtu = 100
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_sample_parses() {
        let config = Config::from_toml(&Config::sample()).unwrap();
        assert_eq!(config.transport.basic_host, "basic.rethinkdns.com");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("dnsgate-config-{}.toml", std::process::id()));
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.log_level, "warn");

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Io(_))));
    }
}
