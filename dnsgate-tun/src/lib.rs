//! Tunnel engine capabilities for dnsgate
//!
//! This crate describes everything the DNS control plane needs from the
//! outside world, without implementing any of it:
//!
//! - **Interface configuration**: layout of the private network shared by the
//!   platform VPN interface and the packet engine
//! - **Engine capabilities**: traits for the packet engine, its sessions,
//!   DNS transports, blocklist filters and the DNSCrypt relay set
//! - **Mode vocabulary**: DNS, firewall and proxy modes with their engine codes
//! - **Mocks**: recording substitutes for tests
//!
//! # Example
//!
//! ```ignore
//! use dnsgate_tun::{InterfaceConfig, TunnelScope};
//!
//! let config = InterfaceConfig::builder()
//!     .scope(TunnelScope::DnsOnly)
//!     .build()?;
//!
//! let fd = platform.establish(&config).await?;
//! let session = engine
//!     .open(fd.raw_fd(), config.fake_dns_endpoint(), transport, blocker)
//!     .await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod mock;
pub mod mode;

pub use config::{InterfaceConfig, InterfaceConfigBuilder, TunnelScope};
pub use engine::{
    split_list, AllowAll, BlocklistFilter, ConnectionBlocker, DnsCryptRelay, DnsTransport,
    EngineSession, FilterKind, InterfaceDescriptor, ProxyCredentials, RawFd, TunnelEngine,
    VpnPlatform,
};
pub use error::{Error, Result};
pub use mode::{DnsMode, FirewallMode, ProxyMode};

/// MTU of the virtual interface; the engine is built with the same value
pub const DEFAULT_MTU: u16 = 1500;

/// Port the fake DNS server listens on
pub const DNS_DEFAULT_PORT: u16 = 53;
