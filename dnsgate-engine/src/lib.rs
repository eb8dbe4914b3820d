//! dnsgate engine
//!
//! Control plane of the DNS path of a VPN tunnel. It decides which transport
//! resolves the queries captured by the tunnel (DoH, a plain DNS proxy or a
//! DNSCrypt relay set), keeps the engine programmed accordingly, watches the
//! relay set and falls back to DoH when it dies.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Host application                         │
//! │        modes, Config Store, VPN platform, events            │
//! └───────────────────────────┬─────────────────────────────────┘
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    dnsgate-engine                           │
//! │  - Orchestrator (establish / reconfigure / close)           │
//! │  - TransportFactory, TunnelHandle                           │
//! │  - Liveness prober and DoH fallback                         │
//! │  - Config (TOML), events                                    │
//! └───────────────────────────┬─────────────────────────────────┘
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    dnsgate-tun                              │
//! │  - Engine, session, relay and platform traits               │
//! │  - Interface layout, mode codes, mocks                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dnsgate_engine::{Config, MemoryStore, Orchestrator, TunnelModes};
//! use dnsgate_tun::{DnsMode, FirewallMode, ProxyMode};
//!
//! let orchestrator = Orchestrator::builder(Config::load("dnsgate.toml")?)
//!     .engine(engine)
//!     .platform(platform)
//!     .store(Arc::new(MemoryStore::default()))
//!     .build()?;
//!
//! orchestrator
//!     .establish(TunnelModes::new(DnsMode::Port, FirewallMode::Filter, ProxyMode::None))
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod factory;
pub mod handle;
pub mod modes;
pub mod orchestrator;
pub mod prober;
pub mod relay;
pub mod store;

pub use config::{BlocklistConfig, Config, IpHint, ProbeConfig, TransportConfig};
pub use error::{Error, Result};
pub use event::{ConnectionState, DnsEvent, EventHandler, LoggingEventHandler};
pub use factory::TransportFactory;
pub use handle::TunnelHandle;
pub use modes::{TransportFamily, TunnelModes};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SessionStatus, DNSCRYPT_FALLBACK_NOTICE};
pub use prober::{ProbeDecision, ProbeOutcome};
pub use relay::RelayStatus;
pub use store::{
    BlocklistState, ConfigStore, DnsProxyEndpoint, DohEndpoint, MemoryStore, ModeChange,
    StoreSnapshot,
};
