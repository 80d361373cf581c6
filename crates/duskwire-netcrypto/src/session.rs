//! The net-crypto session state machine (§3 "Net-crypto session", §4.5).
//!
//! `None → cookie-requesting → handshake-sent → not-confirmed → confirmed`,
//! driven from either end: [`NetCryptoSession::begin`] starts an outbound
//! session; [`NetCryptoSession::handle_handshake_as_responder`] answers one
//! opened at us. Once both sides hold `shared_session_key`, data packets
//! flow through [`NetCryptoSession::send_lossless`] /
//! [`NetCryptoSession::send_lossy`] / [`NetCryptoSession::receive`].

use rand::RngCore;
use tracing::{debug, warn};

use duskwire_crypto::nonce::{ReplayWindow, NONCE_SIZE};
use duskwire_crypto::secretbox::{PrecomputedKey, PublicKey, SecretKey};
use duskwire_crypto::sha2_hmac::sha256;
use duskwire_types::netcrypto::NetCryptoStatus;
use duskwire_types::packet::CRYPTO_DATA;

use crate::congestion::CongestionControl;
use crate::cookie::{CookieSecretKey, COOKIE_SIZE};
use crate::reliable::{decode_sub_payload, encode_sub_payload, RecvWindow, SendWindow, ACK_BITMASK_BYTES};
use crate::session_nonce::{RecvNonceWindow, SendNonceCounter};
use crate::wire::{self, CookieRequest, HandshakePayload};
use crate::{NetCryptoError, Result};

const CHANNEL_LOSSLESS_DATA: u8 = 0;
const CHANNEL_LOSSY: u8 = 1;
const CHANNEL_LOSSLESS_ACK: u8 = 2;

const SESSION_PK_HASH_LEN: usize = 2;

fn session_pk_hash(pk: &PublicKey) -> [u8; SESSION_PK_HASH_LEN] {
    let digest = sha256(pk.as_bytes());
    [digest[0], digest[1]]
}

/// A decrypted and de-duplicated payload delivered out of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    /// In-order reliable payload(s), possibly more than one if an earlier
    /// arrival was buffered waiting for this one to fill the gap.
    Lossless(Vec<u8>),
    /// An unreliable side-channel payload.
    Lossy(Vec<u8>),
}

/// One end of a net-crypto session (§3).
pub struct NetCryptoSession {
    peer_real_pk: PublicKey,
    peer_dht_pk: PublicKey,
    my_long_term_secret: SecretKey,
    my_dht_secret: SecretKey,

    status: NetCryptoStatus,
    session_secret: SecretKey,
    send_base_nonce: [u8; NONCE_SIZE],
    shared_session_key: Option<PrecomputedKey>,
    peer_session_pk_hash: Option<[u8; SESSION_PK_HASH_LEN]>,

    pending_echo_id: Option<u64>,
    pending_cookie: Option<[u8; COOKIE_SIZE]>,

    send_nonce: Option<SendNonceCounter>,
    recv_nonce: Option<RecvNonceWindow>,

    send_window: SendWindow,
    recv_window: RecvWindow,
    lossy_send_counter: u32,
    lossy_recv_replay: ReplayWindow,

    congestion: CongestionControl,
    last_recv_ms: u64,
}

impl NetCryptoSession {
    pub fn new(
        my_long_term_secret: SecretKey,
        my_dht_secret: SecretKey,
        peer_real_pk: PublicKey,
        peer_dht_pk: PublicKey,
        now_ms: u64,
    ) -> Self {
        let mut send_base_nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut send_base_nonce);
        Self {
            peer_real_pk,
            peer_dht_pk,
            my_long_term_secret,
            my_dht_secret,
            status: NetCryptoStatus::None,
            session_secret: SecretKey::generate(),
            send_base_nonce,
            shared_session_key: None,
            peer_session_pk_hash: None,
            pending_echo_id: None,
            pending_cookie: None,
            send_nonce: None,
            recv_nonce: None,
            send_window: SendWindow::new(),
            recv_window: RecvWindow::new(),
            lossy_send_counter: 0,
            lossy_recv_replay: ReplayWindow::new(),
            congestion: CongestionControl::new(),
            last_recv_ms: now_ms,
        }
    }

    pub fn status(&self) -> NetCryptoStatus {
        self.status
    }

    pub fn rate_pps(&self) -> f64 {
        self.congestion.rate_pps()
    }

    pub fn rtt_ms(&self) -> Option<f64> {
        self.congestion.rtt_ms()
    }

    /// How many packets the congestion controller currently allows sending;
    /// callers should call [`NetCryptoSession::consume_allowance`] with
    /// however many they actually sent.
    pub fn congestion_allowance(&mut self, now_ms: u64) -> usize {
        self.congestion.allowance(now_ms)
    }

    pub fn consume_allowance(&mut self, count: usize) {
        self.congestion.consume(count);
    }

    /// Last time a validated packet arrived from the peer, for
    /// [`duskwire_types::netcrypto::FRIEND_CONNECTION_TIMEOUT_SECS`] liveness checks.
    pub fn last_recv_ms(&self) -> u64 {
        self.last_recv_ms
    }

    /// Start an outbound session: build the cookie request.
    pub fn begin(&mut self) -> Vec<u8> {
        let echo_id = rand::rngs::OsRng.next_u64();
        self.pending_echo_id = Some(echo_id);
        self.status = NetCryptoStatus::CookieRequesting;
        let req = CookieRequest {
            sender_long_term_pk: self.my_long_term_secret.public_key().to_bytes(),
            sender_dht_pk: self.my_dht_secret.public_key().to_bytes(),
            echo_id,
        };
        debug!("sending cookie request");
        wire::encode_cookie_request(&self.my_dht_secret, &self.peer_dht_pk, &req)
    }

    /// A cookie response arrived: validate it matches our pending request
    /// and build the handshake.
    pub fn handle_cookie_response(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if self.status != NetCryptoStatus::CookieRequesting {
            return Err(NetCryptoError::InvalidArgument("cookie response outside cookie-requesting state".into()));
        }
        let (cookie, echo_id) = wire::decode_cookie_response(&self.my_dht_secret, &self.peer_dht_pk, data)?;
        if Some(echo_id) != self.pending_echo_id {
            warn!("cookie response echo_id mismatch, dropping");
            return Err(NetCryptoError::AuthenticationFailed);
        }
        self.pending_cookie = Some(cookie);

        let payload = HandshakePayload {
            cookie,
            session_pk: self.session_secret.public_key().to_bytes(),
            base_nonce: self.send_base_nonce,
        };
        self.status = NetCryptoStatus::HandshakeSent;
        debug!("sending handshake");
        Ok(wire::encode_handshake(
            &self.my_long_term_secret,
            &self.peer_real_pk,
            &self.my_long_term_secret.public_key().to_bytes(),
            &payload,
        ))
    }

    /// The initiator's handshake arrived at us: verify its cookie, adopt the
    /// shared session key, and build our own handshake reply.
    pub fn handle_handshake_as_responder(
        &mut self,
        cookie_secret: &CookieSecretKey,
        data: &[u8],
        now_secs: u64,
    ) -> Result<Vec<u8>> {
        let (sender_long_term_pk, payload) = wire::decode_handshake(&self.my_long_term_secret, data)?;
        if sender_long_term_pk != self.peer_real_pk.to_bytes() {
            return Err(NetCryptoError::AuthenticationFailed);
        }
        let (cookie_real_pk, cookie_dht_pk) = cookie_secret.verify(&payload.cookie, now_secs)?;
        if cookie_real_pk != sender_long_term_pk || cookie_dht_pk != self.peer_dht_pk.to_bytes() {
            return Err(NetCryptoError::AuthenticationFailed);
        }

        self.adopt_peer_session(&payload)?;
        self.status = NetCryptoStatus::NotConfirmed;

        let response = HandshakePayload {
            cookie: payload.cookie,
            session_pk: self.session_secret.public_key().to_bytes(),
            base_nonce: self.send_base_nonce,
        };
        debug!("responding to handshake");
        Ok(wire::encode_handshake(
            &self.my_long_term_secret,
            &self.peer_real_pk,
            &self.my_long_term_secret.public_key().to_bytes(),
            &response,
        ))
    }

    /// The responder's handshake came back to the initiator: adopt the
    /// shared session key. No further packet is produced here.
    pub fn handle_handshake_as_initiator(&mut self, data: &[u8]) -> Result<()> {
        if self.status != NetCryptoStatus::HandshakeSent {
            return Err(NetCryptoError::InvalidArgument("handshake reply outside handshake-sent state".into()));
        }
        let (sender_long_term_pk, payload) = wire::decode_handshake(&self.my_long_term_secret, data)?;
        if sender_long_term_pk != self.peer_real_pk.to_bytes() {
            return Err(NetCryptoError::AuthenticationFailed);
        }
        if Some(payload.cookie) != self.pending_cookie {
            warn!("handshake reply echoes an unexpected cookie, dropping");
            return Err(NetCryptoError::AuthenticationFailed);
        }

        self.adopt_peer_session(&payload)?;
        self.status = NetCryptoStatus::NotConfirmed;
        Ok(())
    }

    fn adopt_peer_session(&mut self, payload: &HandshakePayload) -> Result<()> {
        let peer_session_pk = PublicKey::from_bytes(payload.session_pk);
        self.shared_session_key = Some(self.session_secret.precompute(&peer_session_pk));
        self.peer_session_pk_hash = Some(session_pk_hash(&peer_session_pk));
        self.send_nonce = Some(SendNonceCounter::new(self.send_base_nonce));
        self.recv_nonce = Some(RecvNonceWindow::new(payload.base_nonce));
        Ok(())
    }

    fn shared_key(&self) -> Result<&PrecomputedKey> {
        self.shared_session_key
            .as_ref()
            .ok_or(NetCryptoError::InvalidArgument("no session key established yet".into()))
    }

    fn encode_data_packet(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let pk_hash = self
            .peer_session_pk_hash
            .ok_or(NetCryptoError::InvalidArgument("no session key established yet".into()))?;
        let send_nonce = self
            .send_nonce
            .as_mut()
            .ok_or(NetCryptoError::InvalidArgument("no session key established yet".into()))?;
        let (_, nonce, low_word) = send_nonce.next();
        let ciphertext = self.shared_key()?.encrypt(&nonce, plaintext)?;

        let mut out = Vec::with_capacity(1 + SESSION_PK_HASH_LEN + 2 + ciphertext.len());
        out.push(CRYPTO_DATA);
        out.extend_from_slice(&pk_hash);
        out.extend_from_slice(&low_word);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Queue `payload` on the reliable channel and return the packet to send.
    pub fn send_lossless(&mut self, payload: Vec<u8>, now_ms: u64) -> Result<Vec<u8>> {
        let sub_payload = self.send_window.push(payload, now_ms)?;
        let ack = self.recv_window.ack_bitmask();
        let next_expected = self.recv_window.next_expected();
        let mut plaintext = Vec::with_capacity(1 + 4 + ACK_BITMASK_BYTES + sub_payload.len());
        plaintext.push(CHANNEL_LOSSLESS_DATA);
        plaintext.extend_from_slice(&next_expected.to_be_bytes());
        plaintext.extend_from_slice(&ack);
        plaintext.extend_from_slice(&sub_payload);
        self.encode_data_packet(&plaintext)
    }

    /// Emit a standalone ack for data we've received, carrying no new payload.
    pub fn send_ack_only(&mut self) -> Result<Vec<u8>> {
        let ack = self.recv_window.ack_bitmask();
        let next_expected = self.recv_window.next_expected();
        let mut plaintext = Vec::with_capacity(1 + 4 + ACK_BITMASK_BYTES);
        plaintext.push(CHANNEL_LOSSLESS_ACK);
        plaintext.extend_from_slice(&next_expected.to_be_bytes());
        plaintext.extend_from_slice(&ack);
        self.encode_data_packet(&plaintext)
    }

    /// Send on the unreliable side channel: no retransmission, no reordering.
    pub fn send_lossy(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let counter = self.lossy_send_counter;
        self.lossy_send_counter = self.lossy_send_counter.wrapping_add(1);
        let sub = encode_sub_payload(counter, payload);
        let mut plaintext = Vec::with_capacity(1 + sub.len());
        plaintext.push(CHANNEL_LOSSY);
        plaintext.extend_from_slice(&sub);
        self.encode_data_packet(&plaintext)
    }

    /// Packets whose retransmission deadline has elapsed, alongside their
    /// original application payload. Pass each through
    /// [`NetCryptoSession::encode_retransmit`] to get the packet bytes to
    /// resend.
    pub fn due_for_retransmit(&mut self, now_ms: u64, rto_ms: u64) -> Vec<(u32, Vec<u8>)> {
        let due: Vec<(u32, Vec<u8>)> = self
            .send_window
            .due_for_retransmit(now_ms, rto_ms)
            .into_iter()
            .map(|(n, payload)| (n, payload.to_vec()))
            .collect();
        for (packet_number, _) in &due {
            self.send_window.mark_retransmitted(*packet_number, now_ms);
        }
        if !due.is_empty() {
            self.congestion.on_loss();
        }
        due
    }

    /// Re-encode a packet reported by [`NetCryptoSession::due_for_retransmit`]
    /// under its original `packet_number`, carried by a fresh nonce. Unlike
    /// [`NetCryptoSession::send_lossless`], this never allocates a new packet
    /// number or touches the send window — the packet is already in flight.
    pub fn encode_retransmit(&mut self, packet_number: u32, payload: &[u8]) -> Result<Vec<u8>> {
        let sub_payload = encode_sub_payload(packet_number, payload);
        let ack = self.recv_window.ack_bitmask();
        let next_expected = self.recv_window.next_expected();
        let mut plaintext = Vec::with_capacity(1 + 4 + ACK_BITMASK_BYTES + sub_payload.len());
        plaintext.push(CHANNEL_LOSSLESS_DATA);
        plaintext.extend_from_slice(&next_expected.to_be_bytes());
        plaintext.extend_from_slice(&ack);
        plaintext.extend_from_slice(&sub_payload);
        self.encode_data_packet(&plaintext)
    }

    /// Decrypt and process one inbound data packet, yielding whatever
    /// became deliverable as a result. Auth/replay failures are dropped
    /// silently (§4.7: "a decryption failure is always fatal for the
    /// packet, never for the session") by returning an empty `Vec`.
    pub fn receive(&mut self, data: &[u8], now_ms: u64) -> Vec<Delivered> {
        match self.try_receive(data, now_ms) {
            Ok(delivered) => delivered,
            Err(err) => {
                warn!(%err, "dropping undecryptable or replayed data packet");
                Vec::new()
            }
        }
    }

    fn try_receive(&mut self, data: &[u8], now_ms: u64) -> Result<Vec<Delivered>> {
        if data.first() != Some(&CRYPTO_DATA) {
            return Err(NetCryptoError::InvalidArgument("not a data packet".into()));
        }
        if data.len() < 1 + SESSION_PK_HASH_LEN + 2 {
            return Err(NetCryptoError::InvalidArgument("data packet too short".into()));
        }
        let pk_hash = self
            .peer_session_pk_hash
            .ok_or(NetCryptoError::InvalidArgument("no session key established yet".into()))?;
        if data[1..1 + SESSION_PK_HASH_LEN] != pk_hash {
            return Err(NetCryptoError::InvalidArgument("data packet addressed to a different session".into()));
        }
        let low_word: [u8; 2] = data[1 + SESSION_PK_HASH_LEN..1 + SESSION_PK_HASH_LEN + 2]
            .try_into()
            .expect("checked length above");
        let ciphertext = &data[1 + SESSION_PK_HASH_LEN + 2..];

        let recv_nonce = self
            .recv_nonce
            .as_mut()
            .ok_or(NetCryptoError::InvalidArgument("no session key established yet".into()))?;
        let (_, nonce) = recv_nonce.accept(low_word).ok_or(NetCryptoError::AuthenticationFailed)?;
        let plaintext = self.shared_key()?.decrypt(&nonce, ciphertext)?;

        self.last_recv_ms = now_ms;
        if self.status == NetCryptoStatus::NotConfirmed {
            self.status = NetCryptoStatus::Confirmed;
            debug!("session confirmed by first data packet");
        }

        self.deliver(&plaintext, now_ms)
    }

    fn deliver(&mut self, plaintext: &[u8], now_ms: u64) -> Result<Vec<Delivered>> {
        let (&channel, rest) = plaintext
            .split_first()
            .ok_or(NetCryptoError::InvalidArgument("empty data packet plaintext".into()))?;

        match channel {
            CHANNEL_LOSSLESS_DATA | CHANNEL_LOSSLESS_ACK => {
                if rest.len() < 4 + ACK_BITMASK_BYTES {
                    return Err(NetCryptoError::InvalidArgument("malformed ack header".into()));
                }
                let next_expected = u32::from_be_bytes(rest[..4].try_into().expect("checked length above"));
                let bitmask: [u8; ACK_BITMASK_BYTES] =
                    rest[4..4 + ACK_BITMASK_BYTES].try_into().expect("checked length above");
                let rtt_samples = self.send_window.apply_ack(next_expected, &bitmask, now_ms);
                for sample in rtt_samples {
                    self.congestion.on_rtt_sample(sample, now_ms);
                }

                if channel == CHANNEL_LOSSLESS_ACK {
                    return Ok(Vec::new());
                }
                let sub_payload = &rest[4 + ACK_BITMASK_BYTES..];
                let (packet_number, payload) = decode_sub_payload(sub_payload)?;
                self.recv_window.receive(packet_number, payload.to_vec());
                Ok(self.recv_window.drain_ready().into_iter().map(Delivered::Lossless).collect())
            }
            CHANNEL_LOSSY => {
                let (packet_number, payload) = decode_sub_payload(rest)?;
                if !self.lossy_recv_replay.check_and_record(packet_number as u64) {
                    return Ok(Vec::new());
                }
                Ok(vec![Delivered::Lossy(payload.to_vec())])
            }
            other => Err(NetCryptoError::InvalidArgument(format!("unknown data channel {other}"))),
        }
    }
}
