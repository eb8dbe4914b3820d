//! Integration tests for dnsgate-tun
//!
//! These run against the mock engine and platform; no privileges are needed.

use std::sync::Arc;

use dnsgate_tun::mock::{EngineCall, MockEngine, MockPlatform};
use dnsgate_tun::{
    AllowAll, BlocklistFilter, DnsMode, EngineSession, FilterKind, FirewallMode, InterfaceConfig,
    InterfaceDescriptor, ProxyCredentials, ProxyMode, TunnelEngine, TunnelScope, VpnPlatform,
};

/// A full session lifecycle as the control plane drives it
#[tokio::test]
async fn test_session_lifecycle() {
    let platform = MockPlatform::new();
    let engine = MockEngine::new();

    let config = InterfaceConfig::builder()
        .scope(TunnelScope::DnsAndFirewall)
        .build()
        .unwrap();
    let mut fd = platform.establish(&config).await.unwrap();

    let transport = engine
        .new_doh_transport("https://dns.example/dns-query", &["1.1.1.1".parse().unwrap()])
        .await
        .unwrap();
    let session = engine
        .open(fd.raw_fd(), config.fake_dns_endpoint(), transport, Arc::new(AllowAll))
        .await
        .unwrap();

    session
        .set_tun_mode(DnsMode::Port, FirewallMode::Filter, ProxyMode::Orbot.engine_mode())
        .unwrap();
    session
        .start_proxy(&ProxyCredentials {
            username: String::new(),
            password: String::new(),
            ip: "127.0.0.1".into(),
            port: 9050,
        })
        .unwrap();

    let filter = engine.new_local_filter("/tmp/blocklists/1".as_ref()).unwrap();
    filter.set_stamp("1:AAIAgA==").unwrap();
    session.set_filter(Some(filter)).unwrap();
    assert_eq!(session.filter().unwrap().stamp().as_deref(), Some("1:AAIAgA=="));

    session.disconnect().unwrap();
    fd.close().unwrap();

    let calls = engine.calls();
    assert!(calls.contains(&EngineCall::SetTunMode {
        dns: DnsMode::Port,
        firewall: FirewallMode::Filter,
        proxy: ProxyMode::Socks5,
    }));
    assert!(calls.contains(&EngineCall::SetFilter {
        filter: Some((FilterKind::Local, Some("1:AAIAgA==".into()))),
    }));
    assert_eq!(calls.last(), Some(&EngineCall::Disconnect));
    assert_eq!(platform.open_descriptors(), 0);
}

/// Open failures do not leave a relay or filter behind
#[tokio::test]
async fn test_open_failure() {
    let engine = MockEngine::new();
    engine.fail_open(true);

    let transport = engine.new_doh_transport("https://a/", &[]).await.unwrap();
    let result = engine
        .open(3, "10.111.222.3:53".parse().unwrap(), transport, Arc::new(AllowAll))
        .await;

    assert!(result.is_err());
    assert!(engine.relay_servers().is_none());
}

/// Platform refusal surfaces as an error
#[tokio::test]
async fn test_platform_refusal() {
    let platform = MockPlatform::new();
    platform.fail_establish(true);

    assert!(platform.establish(&InterfaceConfig::default()).await.is_err());
    assert!(platform.established().is_empty());
}
