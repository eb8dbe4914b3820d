//! Mode triple and transport families

use dnsgate_tun::{DnsMode, FirewallMode, ProxyMode};
use serde::{Deserialize, Serialize};

/// Transport family that owns DNS resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFamily {
    /// Encrypted HTTP resolver, optionally filtered
    Doh,
    /// Plain DNS proxy endpoint
    DnsProxy,
    /// DNSCrypt relay set
    DnsCrypt,
}

impl TransportFamily {
    /// Resolve the family selected by a DNS mode
    pub fn of(mode: DnsMode) -> Self {
        match mode {
            DnsMode::None | DnsMode::Ip | DnsMode::Port => TransportFamily::Doh,
            DnsMode::ProxyIp | DnsMode::ProxyPort => TransportFamily::DnsProxy,
            DnsMode::CryptIp | DnsMode::CryptPort => TransportFamily::DnsCrypt,
        }
    }
}

impl std::fmt::Display for TransportFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportFamily::Doh => write!(f, "DoH"),
            TransportFamily::DnsProxy => write!(f, "DNS proxy"),
            TransportFamily::DnsCrypt => write!(f, "DNSCrypt"),
        }
    }
}

/// The three orthogonal axes the engine is programmed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelModes {
    pub dns: DnsMode,
    pub firewall: FirewallMode,
    pub proxy: ProxyMode,
}

impl TunnelModes {
    pub fn new(dns: DnsMode, firewall: FirewallMode, proxy: ProxyMode) -> Self {
        Self { dns, firewall, proxy }
    }

    /// Family selected by the DNS mode
    pub fn family(&self) -> TransportFamily {
        TransportFamily::of(self.dns)
    }

    /// Same firewall and proxy axes with another DNS mode
    pub fn with_dns(self, dns: DnsMode) -> Self {
        Self { dns, ..self }
    }
}

impl std::fmt::Display for TunnelModes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dns={} firewall={} proxy={}",
            self.dns, self.firewall, self.proxy
        )
    }
}
