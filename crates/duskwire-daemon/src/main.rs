//! duskwire-daemon: the runnable driver binary.
//!
//! Single OS process running a Tokio runtime. A CLI shell, IPC surface and
//! save-file format are explicit non-goals; this binary exists so the core
//! transport/routing stack is runnable end to end with nothing more than a
//! TOML config file. It owns the one UDP socket, classifies inbound
//! datagrams by their first byte, and drives each component's step on a
//! fixed tick — the "single periodic driver" the component design assumes.

mod bootstrap_transport;
mod config;
mod orchestrator;

use std::sync::Arc;
use std::time::Duration;

use duskwire_crypto::clock::{Clock, SystemClock};
use duskwire_crypto::secretbox::SecretKey;
use duskwire_dht::bootstrap::{BootstrapConfig, SeedNode};
use duskwire_dht::routing::RoutingTable;
use duskwire_transport::dispatch::Dispatcher;
use duskwire_transport::lan_discovery;
use duskwire_transport::socket::{UdpTransport, MAX_UDP_PACKET_SIZE};
use duskwire_types::packet::{
    COOKIE_RESPONSE, CRYPTO_HANDSHAKE, NODES_REQUEST, NODES_RESPONSE, ONION_ANNOUNCE_RESPONSE_LEGACY,
    ONION_DATA_RESPONSE, PING_REQUEST, PING_RESPONSE,
};
use tracing::{debug, info, warn};

use bootstrap_transport::UdpBootstrapTransport;
use duskwire_friend::FriendEvent;
use orchestrator::{DhtHandler, NetCryptoHandler, OnionHandler, SharedState};

/// Cadence at which component `step()`s fire (§5, driven by the daemon
/// rather than each component sleeping independently).
const TICK_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("duskwire=info".parse()?),
        )
        .init();

    info!("duskwire daemon starting");

    let config_path = config::default_config_path();
    let cfg = config::load(&config_path)?;
    info!(?config_path, "loaded configuration");

    let identity = SecretKey::generate();
    info!(public_key = %hex::encode(identity.public_key().to_bytes()), "node identity");

    let transport = if cfg.udp_enabled {
        Some(UdpTransport::bind_in_range(cfg.start_port, cfg.end_port, cfg.ipv6_enabled).await?)
    } else {
        None
    };
    if let Some(t) = &transport {
        info!(port = t.bound_port(), "UDP socket bound");
    } else {
        warn!("UDP disabled by config; daemon will idle with no transport");
    }

    let mut routing_table = RoutingTable::new(identity.public_key().to_bytes());
    if let (Some(t), false) = (&transport, cfg.seed_nodes.is_empty()) {
        run_bootstrap(&cfg.seed_nodes, &mut routing_table, t).await;
    }

    let state = Arc::new(SharedState::new(identity, routing_table));

    let (outgoing_tx, mut outgoing_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new();
    for tag in [PING_REQUEST, PING_RESPONSE, NODES_REQUEST, NODES_RESPONSE] {
        dispatcher.register(
            tag,
            Box::new(DhtHandler {
                state: state.clone(),
                outgoing: outgoing_tx.clone(),
            }),
        );
    }
    for tag in [COOKIE_RESPONSE, CRYPTO_HANDSHAKE] {
        dispatcher.register(
            tag,
            Box::new(NetCryptoHandler {
                state: state.clone(),
                outgoing: outgoing_tx.clone(),
            }),
        );
    }
    for tag in [ONION_ANNOUNCE_RESPONSE_LEGACY, ONION_DATA_RESPONSE] {
        dispatcher.register(tag, Box::new(OnionHandler { state: state.clone() }));
    }

    let mut recv_buf = vec![0u8; MAX_UDP_PACKET_SIZE];
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let mut lan_announcer = tokio::time::interval(lan_discovery::LAN_DISCOVERY_INTERVAL);
    let clock = SystemClock;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ms = clock.now_ms();
                if let Some(t) = &transport {
                    orchestrator::send_due_pings(&state, t, now_ms).await;
                }

                let events = state.friends.lock().expect("friends lock poisoned").step(now_ms);
                for event in events {
                    match event {
                        FriendEvent::OutgoingPacket { friend_pk, payload } => {
                            if let Some(t) = &transport {
                                orchestrator::send_friend_payload(&state, t, friend_pk, payload, now_ms).await;
                            }
                        }
                        other => debug!(?other, "friend connection event"),
                    }
                }

                if let Some(t) = &transport {
                    orchestrator::drive_friend_connections(&state, t, now_ms).await;
                }
            }
            _ = lan_announcer.tick(), if cfg.local_discovery_enabled || cfg.dht_announcements_enabled => {
                if let Some(t) = &transport {
                    let dht_pk = state.routing_table.lock().expect("routing table lock poisoned").self_key().to_owned();
                    lan_discovery::broadcast_once(t, &dht_pk).await;
                }
            }
            Some((packet, dest)) = outgoing_rx.recv() => {
                if let Some(t) = &transport {
                    t.send_to(&packet, dest).await;
                }
            }
            result = recv_packet(transport.as_ref(), &mut recv_buf), if transport.is_some() => {
                match result {
                    Some(Ok((len, from))) => {
                        dispatcher.dispatch(&recv_buf[..len], from);
                    }
                    Some(Err(err)) => {
                        warn!(%err, "UDP receive failed");
                    }
                    None => unreachable!("guarded by transport.is_some()"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                break;
            }
        }
    }

    info!("duskwire daemon stopped");
    Ok(())
}

/// Contacts the configured seed nodes before the dispatcher takes over the
/// socket (§4.2). Bootstrap failure is logged and swallowed — the daemon
/// still starts and falls back to LAN discovery / whatever it later learns.
async fn run_bootstrap(seeds: &[duskwire_types::config::SeedNodeConfig], routing_table: &mut RoutingTable, transport: &UdpTransport) {
    let mut seed_nodes = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let addr = match seed.addr.parse() {
            Ok(addr) => addr,
            Err(err) => {
                warn!(addr = %seed.addr, %err, "skipping malformed seed node address");
                continue;
            }
        };
        let dht_public_key = match hex::decode(&seed.dht_public_key) {
            Ok(bytes) if bytes.len() == 32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                key
            }
            _ => {
                warn!(addr = %seed.addr, "skipping seed node with malformed public key");
                continue;
            }
        };
        seed_nodes.push(SeedNode { addr, dht_public_key });
    }
    if seed_nodes.is_empty() {
        return;
    }

    let config = BootstrapConfig::new(seed_nodes);
    let bootstrap_transport = UdpBootstrapTransport::new(transport);
    match duskwire_dht::bootstrap::bootstrap(&config, routing_table, &bootstrap_transport).await {
        Ok(result) => info!(
            responsive_seeds = result.responsive_seeds,
            peers_discovered = result.peers_discovered,
            "bootstrap finished"
        ),
        Err(err) => warn!(%err, "bootstrap failed, continuing without it"),
    }
}

async fn recv_packet(
    transport: Option<&UdpTransport>,
    buf: &mut [u8],
) -> Option<duskwire_transport::Result<(usize, std::net::SocketAddr)>> {
    let transport = transport?;
    Some(transport.recv_from(buf).await)
}
