//! Client-side TCP relay connection state machine (§4.4 "Client").
//!
//! `connecting → (proxy handshake)* → unconfirmed → confirmed → disconnected`.
//! The handshake reuses `duskwire-crypto`'s box primitives for the session
//! ephemeral keypair exchanged over the TCP link, the same way a net-crypto
//! session does for UDP — this is a second, independent encrypted channel,
//! not a tunnel for one.

use tracing::{debug, info, warn};

use duskwire_crypto::secretbox::{PublicKey, SecretKey};
use duskwire_types::relay::{ProxyHandshake, TcpConnectionStatus, MAX_TCP_MUX_CONNECTIONS, TCP_CONNECTION_TIMEOUT_SECS};

use crate::{RelayError, Result};

/// What we send at socket-open: our long-term key, a fresh session ephemeral,
/// and a nonce (§4.4).
pub struct ClientHello {
    pub long_term_pk: [u8; 32],
    pub session_public: [u8; 32],
    pub nonce: [u8; 24],
}

/// One client-side connection to a relay, plus its peer-routing registrations.
pub struct ClientConnection {
    status: TcpConnectionStatus,
    opened_at_ms: u64,
    long_term_pk: [u8; 32],
    session_secret: SecretKey,
    our_nonce: [u8; 24],
    server_session_public: Option<PublicKey>,
    server_nonce: Option<[u8; 24]>,
    /// `registrations[connection_id as usize]` is the peer this connection_id
    /// routes to, or `None` if free (§4.4: up to 240 registrations).
    registrations: Vec<Option<[u8; 32]>>,
}

impl ClientConnection {
    pub fn new(long_term_pk: [u8; 32], nonce: [u8; 24], now_ms: u64) -> Self {
        Self {
            status: TcpConnectionStatus::None,
            opened_at_ms: now_ms,
            long_term_pk,
            session_secret: SecretKey::generate(),
            our_nonce: nonce,
            server_session_public: None,
            server_nonce: None,
            registrations: vec![None; MAX_TCP_MUX_CONNECTIONS],
        }
    }

    pub fn status(&self) -> TcpConnectionStatus {
        self.status
    }

    /// Begin the connection: optionally through a proxy first.
    pub fn begin_connect(&mut self, proxy: ProxyHandshake) {
        self.status = TcpConnectionStatus::Connecting(proxy);
        debug!(?proxy, "opening relay connection");
    }

    /// A configured proxy rejected the CONNECT/SOCKS5 handshake.
    pub fn proxy_handshake_failed(&mut self, reason: &str) {
        warn!(reason, "proxy handshake failed");
        self.status = TcpConnectionStatus::Disconnected;
    }

    /// Proxy handshake (if any) succeeded, or none was configured: send our
    /// hello and move to `unconfirmed`.
    pub fn send_hello(&mut self) -> ClientHello {
        self.status = TcpConnectionStatus::Unconfirmed;
        ClientHello {
            long_term_pk: self.long_term_pk,
            session_public: self.session_secret.public_key().to_bytes(),
            nonce: self.our_nonce,
        }
    }

    /// Record the server's half of the handshake.
    pub fn receive_server_hello(
        &mut self,
        server_session_public: [u8; 32],
        server_nonce: [u8; 24],
    ) -> Result<()> {
        if self.status != TcpConnectionStatus::Unconfirmed {
            return Err(RelayError::InvalidArgument(
                "server hello received outside unconfirmed state".into(),
            ));
        }
        self.server_session_public = Some(PublicKey::from_bytes(server_session_public));
        self.server_nonce = Some(server_nonce);
        Ok(())
    }

    /// The server's authenticated "connected" signal arrived.
    pub fn mark_confirmed(&mut self) -> Result<()> {
        if self.server_session_public.is_none() {
            return Err(RelayError::InvalidArgument(
                "confirmed before server hello was received".into(),
            ));
        }
        self.status = TcpConnectionStatus::Confirmed;
        info!("relay connection confirmed");
        Ok(())
    }

    /// Drop the connection to `disconnected` if `TCP_CONNECTION_TIMEOUT` has
    /// elapsed without reaching `confirmed`.
    pub fn check_timeout(&mut self, now_ms: u64) {
        let in_flight = matches!(
            self.status,
            TcpConnectionStatus::Connecting(_) | TcpConnectionStatus::Unconfirmed
        );
        if in_flight && now_ms.saturating_sub(self.opened_at_ms) > TCP_CONNECTION_TIMEOUT_SECS * 1000 {
            warn!("relay connection timed out before confirmation");
            self.status = TcpConnectionStatus::Disconnected;
        }
    }

    /// Register a peer public key for routing, returning its `connection_id`.
    pub fn register_peer(&mut self, peer_pk: [u8; 32]) -> Result<u8> {
        if let Some(existing) = self.registrations.iter().position(|slot| slot == &Some(peer_pk)) {
            return Ok(existing as u8);
        }
        let free = self
            .registrations
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                RelayError::ResourceExhausted(format!(
                    "{MAX_TCP_MUX_CONNECTIONS} registrations already in use"
                ))
            })?;
        self.registrations[free] = Some(peer_pk);
        Ok(free as u8)
    }

    pub fn unregister_peer(&mut self, connection_id: u8) -> Result<()> {
        let slot = self
            .registrations
            .get_mut(connection_id as usize)
            .ok_or_else(|| RelayError::NotFound(format!("connection_id {connection_id}")))?;
        *slot = None;
        Ok(())
    }

    pub fn peer_for(&self, connection_id: u8) -> Option<[u8; 32]> {
        self.registrations.get(connection_id as usize).copied().flatten()
    }

    pub fn connection_id_for(&self, peer_pk: &[u8; 32]) -> Option<u8> {
        self.registrations
            .iter()
            .position(|slot| slot.as_ref() == Some(peer_pk))
            .map(|i| i as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_handshake_reaches_confirmed() {
        let mut conn = ClientConnection::new([1u8; 32], [0u8; 24], 0);
        conn.begin_connect(ProxyHandshake::Direct);
        let _hello = conn.send_hello();
        conn.receive_server_hello([2u8; 32], [9u8; 24]).expect("server hello");
        conn.mark_confirmed().expect("confirm");
        assert_eq!(conn.status(), TcpConnectionStatus::Confirmed);
    }

    #[test]
    fn confirm_before_server_hello_fails() {
        let mut conn = ClientConnection::new([1u8; 32], [0u8; 24], 0);
        conn.begin_connect(ProxyHandshake::Direct);
        let _ = conn.send_hello();
        assert!(conn.mark_confirmed().is_err());
    }

    #[test]
    fn timeout_without_confirmation_disconnects() {
        let mut conn = ClientConnection::new([1u8; 32], [0u8; 24], 0);
        conn.begin_connect(ProxyHandshake::Direct);
        let _ = conn.send_hello();
        conn.check_timeout(TCP_CONNECTION_TIMEOUT_SECS * 1000 + 1);
        assert_eq!(conn.status(), TcpConnectionStatus::Disconnected);
    }

    #[test]
    fn proxy_failure_disconnects() {
        let mut conn = ClientConnection::new([1u8; 32], [0u8; 24], 0);
        conn.begin_connect(ProxyHandshake::Socks5);
        conn.proxy_handshake_failed("connection refused");
        assert_eq!(conn.status(), TcpConnectionStatus::Disconnected);
    }

    #[test]
    fn register_and_lookup_peer() {
        let mut conn = ClientConnection::new([1u8; 32], [0u8; 24], 0);
        let id = conn.register_peer([7u8; 32]).expect("register");
        assert_eq!(conn.peer_for(id), Some([7u8; 32]));
        assert_eq!(conn.connection_id_for(&[7u8; 32]), Some(id));

        // Re-registering the same peer returns the same id, not a new one.
        let again = conn.register_peer([7u8; 32]).expect("register again");
        assert_eq!(again, id);
    }

    #[test]
    fn registrations_exhaust_at_max() {
        let mut conn = ClientConnection::new([1u8; 32], [0u8; 24], 0);
        for i in 0..MAX_TCP_MUX_CONNECTIONS {
            conn.register_peer([i as u8; 32]).expect("register");
        }
        assert!(conn.register_peer([255u8; 32]).is_err());
    }
}
