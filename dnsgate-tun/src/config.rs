//! Virtual interface configuration
//!
//! The platform VPN interface and the tunnel engine must agree on the layout
//! of the private network. By convention the final octet of an address in the
//! /24 identifies its role: `.1` is the gateway (the interface address), `.2`
//! the router and `.3` the fake DNS server the engine answers on.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{DEFAULT_MTU, DNS_DEFAULT_PORT};

/// Default private network of the tunnel
pub const DEFAULT_NETWORK: &str = "10.111.222.0/24";

/// Default session name shown by the platform
pub const DEFAULT_SESSION_NAME: &str = "dnsgate";

/// Which traffic the platform should route into the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelScope {
    /// Only DNS queries to the fake DNS address
    DnsOnly,
    /// All traffic, DNS left to the system resolver
    FirewallOnly,
    /// All traffic, with DNS pointed at the fake DNS address
    #[default]
    DnsAndFirewall,
}

/// Configuration handed to the platform when creating the interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    /// Session name shown by the platform
    pub session_name: String,
    /// Maximum transmission unit; must match the engine
    pub mtu: u16,
    /// Private /24 the interface lives in
    pub network: Ipv4Net,
    /// Routing scope
    pub scope: TunnelScope,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            session_name: DEFAULT_SESSION_NAME.to_string(),
            mtu: DEFAULT_MTU,
            network: Ipv4Net::new_assert(Ipv4Addr::new(10, 111, 222, 0), 24),
            scope: TunnelScope::default(),
        }
    }
}

impl InterfaceConfig {
    /// Create a new configuration builder
    pub fn builder() -> InterfaceConfigBuilder {
        InterfaceConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.network.prefix_len() > 29 {
            return Err(Error::Config(format!(
                "network {} is too small to hold gateway, router and DNS addresses",
                self.network
            )));
        }

        if self.mtu < 576 {
            return Err(Error::Config(format!(
                "MTU {} is too small (minimum 576)",
                self.mtu
            )));
        }

        if self.session_name.is_empty() {
            return Err(Error::Config("session name must not be empty".into()));
        }

        Ok(())
    }

    /// Address assigned to the interface
    pub fn gateway(&self) -> Ipv4Addr {
        self.host(1)
    }

    /// Router address inside the tunnel
    pub fn router(&self) -> Ipv4Addr {
        self.host(2)
    }

    /// Fake DNS server address answered by the engine
    pub fn dns(&self) -> Ipv4Addr {
        self.host(3)
    }

    /// Endpoint the engine listens on for captured DNS queries
    pub fn fake_dns_endpoint(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.dns(), DNS_DEFAULT_PORT))
    }

    /// Routes to install on the interface
    pub fn routes(&self) -> Vec<Ipv4Net> {
        match self.scope {
            TunnelScope::DnsOnly => vec![Ipv4Net::new_assert(self.dns(), 32)],
            TunnelScope::FirewallOnly | TunnelScope::DnsAndFirewall => {
                vec![Ipv4Net::new_assert(Ipv4Addr::UNSPECIFIED, 0)]
            }
        }
    }

    /// DNS servers to announce on the interface
    pub fn dns_servers(&self) -> Vec<Ipv4Addr> {
        match self.scope {
            TunnelScope::FirewallOnly => Vec::new(),
            TunnelScope::DnsOnly | TunnelScope::DnsAndFirewall => vec![self.dns()],
        }
    }

    fn host(&self, last: u32) -> Ipv4Addr {
        let base: u32 = self.network.network().into();
        Ipv4Addr::from(base + last)
    }
}

/// Builder for InterfaceConfig
#[derive(Debug, Default)]
pub struct InterfaceConfigBuilder {
    config: InterfaceConfig,
}

impl InterfaceConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session name
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.config.session_name = name.into();
        self
    }

    /// Set the MTU
    pub fn mtu(mut self, mtu: u16) -> Self {
        self.config.mtu = mtu;
        self
    }

    /// Set the private network
    pub fn network(mut self, network: Ipv4Net) -> Self {
        self.config.network = network;
        self
    }

    /// Set the private network from a CIDR string (e.g., "10.111.222.0/24")
    pub fn network_str(self, cidr: &str) -> Result<Self> {
        let net: Ipv4Net = cidr
            .parse()
            .map_err(|_| Error::InvalidAddress(cidr.to_string()))?;
        Ok(self.network(net))
    }

    /// Set the routing scope
    pub fn scope(mut self, scope: TunnelScope) -> Self {
        self.config.scope = scope;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<InterfaceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = InterfaceConfig::default();
        assert_eq!(config.network.to_string(), DEFAULT_NETWORK);
        assert_eq!(config.mtu, 1500);
        assert_eq!(config.gateway(), Ipv4Addr::new(10, 111, 222, 1));
        assert_eq!(config.router(), Ipv4Addr::new(10, 111, 222, 2));
        assert_eq!(config.dns(), Ipv4Addr::new(10, 111, 222, 3));
        assert_eq!(
            config.fake_dns_endpoint(),
            "10.111.222.3:53".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_dns_only_scope() {
        let config = InterfaceConfig::builder()
            .scope(TunnelScope::DnsOnly)
            .build()
            .unwrap();

        assert_eq!(config.routes(), vec!["10.111.222.3/32".parse::<Ipv4Net>().unwrap()]);
        assert_eq!(config.dns_servers(), vec![Ipv4Addr::new(10, 111, 222, 3)]);
    }

    #[test]
    fn test_firewall_only_scope() {
        let config = InterfaceConfig::builder()
            .scope(TunnelScope::FirewallOnly)
            .build()
            .unwrap();

        assert_eq!(config.routes(), vec!["0.0.0.0/0".parse::<Ipv4Net>().unwrap()]);
        assert!(config.dns_servers().is_empty());
    }

    #[test]
    fn test_custom_network() {
        let config = InterfaceConfig::builder()
            .network_str("192.168.50.0/24")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.dns(), Ipv4Addr::new(192, 168, 50, 3));
    }

    #[test]
    fn test_validation() {
        assert!(InterfaceConfig::builder().mtu(100).build().is_err());
        assert!(InterfaceConfig::builder().session_name("").build().is_err());
        assert!(InterfaceConfig::builder()
            .network_str("10.0.0.0/30")
            .unwrap()
            .build()
            .is_err());
        assert!(InterfaceConfig::builder().network_str("not-a-cidr").is_err());
    }
}
