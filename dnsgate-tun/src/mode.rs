//! Mode vocabulary shared with the tunnel engine
//!
//! The engine is programmed with three orthogonal axes: how DNS is resolved,
//! how the firewall treats connections, and whether traffic goes through an
//! outbound proxy. Each variant carries the integer code the engine expects.

use serde::{Deserialize, Serialize};

/// How DNS queries captured by the tunnel are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsMode {
    /// DNS is not intercepted
    None,
    /// Intercept DNS by destination IP, resolve over DoH
    Ip,
    /// Intercept DNS by destination port, resolve over DoH
    Port,
    /// Intercept by IP, forward to a DNS proxy endpoint
    ProxyIp,
    /// Intercept by port, forward to a DNS proxy endpoint
    ProxyPort,
    /// Intercept by IP, resolve through DNSCrypt relays
    CryptIp,
    /// Intercept by port, resolve through DNSCrypt relays
    CryptPort,
}

impl DnsMode {
    /// Engine code for this mode
    pub fn code(self) -> i32 {
        match self {
            DnsMode::None => 0,
            DnsMode::Ip => 1,
            DnsMode::Port => 2,
            DnsMode::ProxyIp => 3,
            DnsMode::ProxyPort => 4,
            DnsMode::CryptIp => 5,
            DnsMode::CryptPort => 6,
        }
    }

    /// Parse an engine code
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => DnsMode::None,
            1 => DnsMode::Ip,
            2 => DnsMode::Port,
            3 => DnsMode::ProxyIp,
            4 => DnsMode::ProxyPort,
            5 => DnsMode::CryptIp,
            6 => DnsMode::CryptPort,
            _ => return None,
        })
    }

    /// DNSCrypt owns resolution exclusively in these modes
    pub fn is_crypt(self) -> bool {
        matches!(self, DnsMode::CryptIp | DnsMode::CryptPort)
    }

    /// Queries are forwarded to a dedicated DNS proxy in these modes
    pub fn is_proxy(self) -> bool {
        matches!(self, DnsMode::ProxyIp | DnsMode::ProxyPort)
    }
}

impl std::fmt::Display for DnsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DnsMode::None => "none",
            DnsMode::Ip => "ip",
            DnsMode::Port => "port",
            DnsMode::ProxyIp => "proxy-ip",
            DnsMode::ProxyPort => "proxy-port",
            DnsMode::CryptIp => "crypt-ip",
            DnsMode::CryptPort => "crypt-port",
        };
        write!(f, "{}", name)
    }
}

/// Firewall behaviour of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirewallMode {
    None,
    Filter,
    Sink,
    FilterProc,
}

impl FirewallMode {
    /// Engine code for this mode
    pub fn code(self) -> i32 {
        match self {
            FirewallMode::None => 0,
            FirewallMode::Filter => 1,
            FirewallMode::Sink => 2,
            FirewallMode::FilterProc => 3,
        }
    }
}

impl std::fmt::Display for FirewallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Outbound proxy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    None,
    Socks5,
    Https,
    /// SOCKS5 proxy provided by Orbot
    Orbot,
}

impl ProxyMode {
    /// Engine code for this mode
    ///
    /// The engine has no notion of Orbot; it is driven as a plain SOCKS5 proxy.
    pub fn code(self) -> i32 {
        self.engine_mode().raw_code()
    }

    /// The mode the engine should actually be programmed with
    pub fn engine_mode(self) -> ProxyMode {
        match self {
            ProxyMode::Orbot => ProxyMode::Socks5,
            other => other,
        }
    }

    /// Whether SOCKS5 credentials must be programmed for this mode
    pub fn uses_socks(self) -> bool {
        matches!(self, ProxyMode::Socks5 | ProxyMode::Orbot)
    }

    fn raw_code(self) -> i32 {
        match self {
            ProxyMode::None => 0,
            ProxyMode::Socks5 => 1,
            ProxyMode::Https => 2,
            ProxyMode::Orbot => 10,
        }
    }
}

impl std::fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyMode::None => write!(f, "none"),
            ProxyMode::Socks5 => write!(f, "socks5"),
            ProxyMode::Https => write!(f, "https"),
            ProxyMode::Orbot => write!(f, "orbot-socks5"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_mode_codes() {
        for code in 0..=6 {
            let mode = DnsMode::from_code(code).unwrap();
            assert_eq!(mode.code(), code);
        }
        assert!(DnsMode::from_code(7).is_none());
    }

    #[test]
    fn test_crypt_and_proxy_classes() {
        assert!(DnsMode::CryptIp.is_crypt());
        assert!(DnsMode::CryptPort.is_crypt());
        assert!(!DnsMode::Port.is_crypt());
        assert!(DnsMode::ProxyPort.is_proxy());
        assert!(!DnsMode::CryptPort.is_proxy());
    }

    #[test]
    fn test_orbot_is_programmed_as_socks5() {
        assert_eq!(ProxyMode::Orbot.engine_mode(), ProxyMode::Socks5);
        assert_eq!(ProxyMode::Orbot.code(), ProxyMode::Socks5.code());
        assert!(ProxyMode::Orbot.uses_socks());
        assert!(!ProxyMode::Https.uses_socks());
    }
}
