//! Synthetic TCP addressing and the per-friend multi-relay mux (§4.4
//! "Multi-relay mux (TCP_Connections)").
//!
//! Upper layers address a TCP-routed peer through the same [`IpPort`]
//! abstraction as a UDP one, by encoding a relay-connection index into the
//! address bytes of the `TcpClient`/`TcpServer` synthetic families.

use tracing::debug;

use duskwire_types::addr::{Family, IpPort};
use duskwire_types::relay::{
    TcpConnectionStatus, MAX_FRIEND_TCP_CONNECTIONS, RECOMMENDED_FRIEND_TCP_CONNECTIONS,
};

use crate::{RelayError, Result};

/// Pack a `tcp_connections_number` into the synthetic TCP address family: a
/// little-endian `u32` left-padded with zero bytes to the 16-byte `addr` field.
pub fn tcp_connections_number_to_ip_port(number: u32, as_server: bool) -> IpPort {
    let mut addr = [0u8; 16];
    addr[..4].copy_from_slice(&number.to_le_bytes());
    IpPort {
        family: if as_server { Family::TcpServer } else { Family::TcpClient },
        addr,
        port: 0,
    }
}

/// Recover the `tcp_connections_number` packed by
/// [`tcp_connections_number_to_ip_port`], or `None` if `ip_port` isn't one of
/// the synthetic TCP families.
pub fn ip_port_to_tcp_connections_number(ip_port: &IpPort) -> Option<u32> {
    if !matches!(ip_port.family, Family::TcpClient | Family::TcpServer) {
        return None;
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&ip_port.addr[..4]);
    Some(u32::from_le_bytes(bytes))
}

/// One relay connection slot held on behalf of a friend.
#[derive(Clone, Debug)]
pub struct RelaySlot {
    pub relay_dht_public_key: [u8; 32],
    pub ip_port: IpPort,
    pub status: TcpConnectionStatus,
    /// Number of outstanding reasons this relay must stay awake (e.g. "the
    /// friend using it is still being searched for"). A connection sleeps
    /// once this reaches zero and stays there past the grace period.
    lock_count: u32,
    /// When `lock_count` last reached zero, for sleep-grace timing.
    zero_since_ms: Option<u64>,
}

impl RelaySlot {
    fn new(relay_dht_public_key: [u8; 32], ip_port: IpPort) -> Self {
        Self {
            relay_dht_public_key,
            ip_port,
            status: TcpConnectionStatus::None,
            lock_count: 0,
            zero_since_ms: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TcpConnectionStatus::Confirmed)
    }
}

/// Per-friend mux over up to [`MAX_FRIEND_TCP_CONNECTIONS`] relay slots.
/// Invariant: at most [`RECOMMENDED_FRIEND_TCP_CONNECTIONS`] are kept active
/// at once; idle slots past the sleep grace period are put to sleep rather
/// than dropped, so a remembered endpoint can be woken again cheaply.
pub struct TcpConnections {
    slots: Vec<RelaySlot>,
    sleep_grace_ms: u64,
}

impl TcpConnections {
    pub fn new(sleep_grace_ms: u64) -> Self {
        Self {
            slots: Vec::new(),
            sleep_grace_ms,
        }
    }

    /// Register a new relay slot for this friend. Fails once
    /// [`MAX_FRIEND_TCP_CONNECTIONS`] are already held.
    pub fn add_relay(&mut self, relay_dht_public_key: [u8; 32], ip_port: IpPort) -> Result<usize> {
        if self.slots.len() >= MAX_FRIEND_TCP_CONNECTIONS {
            return Err(RelayError::ResourceExhausted(format!(
                "already holding {MAX_FRIEND_TCP_CONNECTIONS} relay connections"
            )));
        }
        self.slots.push(RelaySlot::new(relay_dht_public_key, ip_port));
        Ok(self.slots.len() - 1)
    }

    pub fn slot(&self, index: usize) -> Option<&RelaySlot> {
        self.slots.get(index)
    }

    pub fn set_status(&mut self, index: usize, status: TcpConnectionStatus, now_ms: u64) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| RelayError::NotFound(format!("relay slot {index}")))?;
        slot.status = status;
        if matches!(status, TcpConnectionStatus::Confirmed) {
            slot.zero_since_ms = None;
        }
        let _ = now_ms;
        Ok(())
    }

    /// Add a reason this relay must stay awake (e.g. a pending lookup).
    pub fn lock(&mut self, index: usize) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| RelayError::NotFound(format!("relay slot {index}")))?;
        slot.lock_count += 1;
        slot.zero_since_ms = None;
        Ok(())
    }

    /// Release a reason this relay must stay awake, per §4.4's "when
    /// lock_count == 0 for longer than the sleep grace period".
    pub fn unlock(&mut self, index: usize, now_ms: u64) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| RelayError::NotFound(format!("relay slot {index}")))?;
        slot.lock_count = slot.lock_count.saturating_sub(1);
        if slot.lock_count == 0 {
            slot.zero_since_ms = Some(now_ms);
        }
        Ok(())
    }

    /// Put any slot whose lock count has been zero for longer than the
    /// sleep grace period to sleep: remembered (endpoint and key kept) but
    /// no longer counted as active.
    pub fn step(&mut self, now_ms: u64) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.lock_count == 0
                && slot.status == TcpConnectionStatus::Confirmed
                && slot
                    .zero_since_ms
                    .is_some_and(|since| now_ms.saturating_sub(since) > self.sleep_grace_ms)
            {
                debug!(slot = i, "relay idle past grace period, sleeping");
                slot.status = TcpConnectionStatus::Sleeping;
            }
        }
    }

    /// Wake a sleeping slot for reuse (§4.4: "it is unslept on next use").
    /// Reconnection itself is the caller's job; this only clears the status
    /// so a fresh connection attempt can begin.
    pub fn unsleep(&mut self, index: usize) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| RelayError::NotFound(format!("relay slot {index}")))?;
        if slot.status == TcpConnectionStatus::Sleeping {
            slot.status = TcpConnectionStatus::None;
        }
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    /// Whether more relay connections should be opened to reach the
    /// recommended steady-state count (§4.4: "recommended ≤ 3 active").
    pub fn needs_more_active(&self) -> bool {
        self.active_count() < RECOMMENDED_FRIEND_TCP_CONNECTIONS
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
