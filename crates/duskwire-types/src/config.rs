//! Startup configuration (§6 "Environment / startup").
//!
//! This is the boundary struct the daemon shell parses from TOML and hands
//! to the core; save-file format and the CLI shell itself are out of scope
//! (§1) but the config struct crossing that boundary is part of the
//! external interface and is shared here.

use serde::{Deserialize, Serialize};

/// Outbound proxy configuration for TCP relay connections (§4.4, §6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyConfig {
    None,
    Http { addr: String, port: u16 },
    Socks5 { addr: String, port: u16 },
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig::None
    }
}

/// Default UDP/TCP bind-scan range (§6 "Port ranges").
pub const DEFAULT_START_PORT: u16 = 33445;
pub const DEFAULT_END_PORT: u16 = 33545;

/// One bootstrap seed node, as carried across the config boundary (§4.2
/// "joining the network"). Kept here rather than in `duskwire-dht` so the
/// config struct doesn't pull in a DHT dependency; the daemon converts this
/// into `duskwire_dht::bootstrap::SeedNode` at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedNodeConfig {
    /// `host:port`, parsed by the daemon at startup.
    pub addr: String,
    /// Hex-encoded DHT public key.
    pub dht_public_key: String,
}

/// Top-level startup configuration (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DuskwireConfig {
    pub udp_enabled: bool,
    pub ipv6_enabled: bool,
    pub local_discovery_enabled: bool,
    pub dht_announcements_enabled: bool,
    pub start_port: u16,
    pub end_port: u16,
    /// 0 disables the TCP relay server.
    pub tcp_port: u16,
    pub proxy: ProxyConfig,
    pub dns_enabled: bool,
    /// Opaque save-file bytes; parsing/writing them is out of scope (§1) —
    /// the core only round-trips this boundary value.
    pub savedata: Option<Vec<u8>>,
    /// Bootstrap seed nodes to contact on startup (§4.2). Empty means skip
    /// bootstrap entirely and rely on local/LAN discovery only.
    pub seed_nodes: Vec<SeedNodeConfig>,
}

impl Default for DuskwireConfig {
    fn default() -> Self {
        Self {
            udp_enabled: true,
            ipv6_enabled: true,
            local_discovery_enabled: true,
            dht_announcements_enabled: true,
            start_port: DEFAULT_START_PORT,
            end_port: DEFAULT_END_PORT,
            tcp_port: 0,
            proxy: ProxyConfig::None,
            dns_enabled: true,
            savedata: None,
            seed_nodes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_port_range() {
        let cfg = DuskwireConfig::default();
        assert!(cfg.start_port <= cfg.end_port);
        assert_eq!(cfg.proxy, ProxyConfig::None);
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = DuskwireConfig::default();
        let text = toml::to_string(&cfg).expect("serialize");
        let restored: DuskwireConfig = toml::from_str(&text).expect("deserialize");
        assert_eq!(cfg.start_port, restored.start_port);
        assert_eq!(cfg.tcp_port, restored.tcp_port);
    }
}
