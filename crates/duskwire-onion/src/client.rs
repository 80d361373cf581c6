//! Client side of onion discovery (§4.3): building announce and lookup
//! requests, decoding what comes back, and rotating the send path they ride
//! on before it goes stale or a hop on it stops answering.
//!
//! The node side ([`crate::announce`]) only reacts to what lands on it; this
//! module is what actually sends something there.

use tracing::debug;

use duskwire_types::addr::IpPort;
use duskwire_types::dht::DhtNodeEntry;
use duskwire_types::onion::{OnionPath, SEND_PATH_LIFETIME_MS};
use duskwire_types::packet::{ONION_ANNOUNCE_REQUEST_LEGACY, ONION_DATA_REQUEST};

use crate::packets::{decode_ip_port_19, encode_ip_port_19, wrap_forward};
use crate::path::{select_hops, ClientPath};
use crate::{OnionError, Result};

/// What a client sends to announce itself at `data_public_key`, or (with an
/// all-zero `ping_id`) to request the challenge it must echo back before a
/// real announce can succeed (§4.3, §8 anti-amplification).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub ping_id: [u8; 32],
    pub data_public_key: [u8; 32],
    /// Opaque value the client attaches and gets back verbatim in the
    /// response, to match replies to outstanding requests without keeping
    /// per-request server state.
    pub sendback_data: [u8; 8],
}

const ANNOUNCE_REQUEST_LEN: usize = 32 + 32 + 8;

impl AnnounceRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ANNOUNCE_REQUEST_LEN);
        out.extend_from_slice(&self.ping_id);
        out.extend_from_slice(&self.data_public_key);
        out.extend_from_slice(&self.sendback_data);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ANNOUNCE_REQUEST_LEN {
            return Err(OnionError::MalformedPacket(format!(
                "announce request is {} bytes, expected {ANNOUNCE_REQUEST_LEN}",
                bytes.len()
            )));
        }
        let mut ping_id = [0u8; 32];
        ping_id.copy_from_slice(&bytes[0..32]);
        let mut data_public_key = [0u8; 32];
        data_public_key.copy_from_slice(&bytes[32..64]);
        let mut sendback_data = [0u8; 8];
        sendback_data.copy_from_slice(&bytes[64..72]);
        Ok(Self {
            ping_id,
            data_public_key,
            sendback_data,
        })
    }
}

/// What the node side replies with: either a fresh `ping_id` challenge to
/// retry with, or (`is_stored`) confirmation the announce landed, plus
/// whatever node is currently stored at that key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub sendback_data: [u8; 8],
    pub ping_id_or_confirmation: [u8; 32],
    pub is_stored: bool,
    pub found_node_ip_port: Option<IpPort>,
}

impl AnnounceResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 32 + 1 + 1 + 19);
        out.extend_from_slice(&self.sendback_data);
        out.extend_from_slice(&self.ping_id_or_confirmation);
        out.push(self.is_stored as u8);
        match &self.found_node_ip_port {
            Some(ip_port) => {
                out.push(1);
                out.extend_from_slice(&encode_ip_port_19(ip_port));
            }
            None => out.push(0),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 41 {
            return Err(OnionError::MalformedPacket("announce response truncated".into()));
        }
        let mut sendback_data = [0u8; 8];
        sendback_data.copy_from_slice(&bytes[0..8]);
        let mut ping_id_or_confirmation = [0u8; 32];
        ping_id_or_confirmation.copy_from_slice(&bytes[8..40]);
        let is_stored = bytes[40] != 0;
        let found_node_ip_port = match bytes.get(41) {
            Some(1) => {
                let field = bytes
                    .get(42..61)
                    .ok_or_else(|| OnionError::MalformedPacket("announce response missing ip_port".into()))?;
                Some(decode_ip_port_19(field)?)
            }
            _ => None,
        };
        Ok(Self {
            sendback_data,
            ping_id_or_confirmation,
            is_stored,
            found_node_ip_port,
        })
    }
}

/// A read-only probe of whatever is stored at `data_public_key`, with no
/// `ping_id` challenge since nothing gets written (§4.3 "Lookup protocol").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub data_public_key: [u8; 32],
    pub sendback_data: [u8; 8],
}

const LOOKUP_REQUEST_LEN: usize = 32 + 8;

impl LookupRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LOOKUP_REQUEST_LEN);
        out.extend_from_slice(&self.data_public_key);
        out.extend_from_slice(&self.sendback_data);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != LOOKUP_REQUEST_LEN {
            return Err(OnionError::MalformedPacket(format!(
                "lookup request is {} bytes, expected {LOOKUP_REQUEST_LEN}",
                bytes.len()
            )));
        }
        let mut data_public_key = [0u8; 32];
        data_public_key.copy_from_slice(&bytes[0..32]);
        let mut sendback_data = [0u8; 8];
        sendback_data.copy_from_slice(&bytes[32..40]);
        Ok(Self {
            data_public_key,
            sendback_data,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResponse {
    pub sendback_data: [u8; 8],
    pub found_node_ip_port: Option<IpPort>,
}

impl LookupResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 1 + 19);
        out.extend_from_slice(&self.sendback_data);
        match &self.found_node_ip_port {
            Some(ip_port) => {
                out.push(1);
                out.extend_from_slice(&encode_ip_port_19(ip_port));
            }
            None => out.push(0),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 9 {
            return Err(OnionError::MalformedPacket("lookup response truncated".into()));
        }
        let mut sendback_data = [0u8; 8];
        sendback_data.copy_from_slice(&bytes[0..8]);
        let found_node_ip_port = match bytes.get(8) {
            Some(1) => {
                let field = bytes
                    .get(9..28)
                    .ok_or_else(|| OnionError::MalformedPacket("lookup response missing ip_port".into()))?;
                Some(decode_ip_port_19(field)?)
            }
            _ => None,
        };
        Ok(Self {
            sendback_data,
            found_node_ip_port,
        })
    }
}

/// Drives one node's client-side use of onion discovery: keeps its current
/// send path fresh, and remembers the `ping_id` challenge an announce round
/// needs to echo back next time (§4.3).
pub struct AnnounceClient {
    path: Option<ClientPath>,
    last_ping_id: Option<[u8; 32]>,
    announced: bool,
}

impl Default for AnnounceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnounceClient {
    pub fn new() -> Self {
        Self {
            path: None,
            last_ping_id: None,
            announced: false,
        }
    }

    /// Rebuild the send path if none exists yet or the current one has
    /// outlived [`SEND_PATH_LIFETIME_MS`]. Returns whether it rotated.
    pub fn maybe_rotate_path(&mut self, candidates: &[DhtNodeEntry], now_ms: u64) -> Result<bool> {
        let needs_rotation = match &self.path {
            None => true,
            Some(client_path) => client_path.path.is_expired(now_ms, SEND_PATH_LIFETIME_MS),
        };
        if !needs_rotation {
            return Ok(false);
        }
        let hops = select_hops(candidates)?;
        self.path = Some(ClientPath::build(&hops, now_ms)?);
        self.announced = false;
        debug!(now_ms, "onion client rotated its send path");
        Ok(true)
    }

    /// Forces the next [`Self::maybe_rotate_path`] call to rebuild even if
    /// the current path hasn't aged out yet (§4.3 "or earlier if a path
    /// fails").
    pub fn mark_path_failed(&mut self) {
        self.path = None;
    }

    pub fn path(&self) -> Option<&OnionPath> {
        self.path.as_ref().map(|client_path| &client_path.path)
    }

    pub fn is_announced(&self) -> bool {
        self.announced
    }

    /// Build the onion-wrapped announce request for `data_public_key`,
    /// echoing back whatever `ping_id` the last response carried (all-zero
    /// on the very first attempt).
    pub fn build_announce_packet(&self, data_public_key: [u8; 32], sendback_data: [u8; 8]) -> Result<Vec<u8>> {
        let client_path = self
            .path
            .as_ref()
            .ok_or_else(|| OnionError::PathConstruction("no send path established yet".into()))?;
        let request = AnnounceRequest {
            ping_id: self.last_ping_id.unwrap_or([0u8; 32]),
            data_public_key,
            sendback_data,
        };
        wrap_forward(client_path, ONION_ANNOUNCE_REQUEST_LEGACY, &request.encode())
    }

    /// Record an announce round's outcome: the `ping_id` to echo back next
    /// time, and whether the announce is now live.
    pub fn handle_announce_response(&mut self, response: &AnnounceResponse) {
        self.last_ping_id = Some(response.ping_id_or_confirmation);
        self.announced = response.is_stored;
    }

    /// Build the onion-wrapped lookup request for `data_public_key`.
    pub fn build_lookup_packet(&self, data_public_key: [u8; 32], sendback_data: [u8; 8]) -> Result<Vec<u8>> {
        let client_path = self
            .path
            .as_ref()
            .ok_or_else(|| OnionError::PathConstruction("no send path established yet".into()))?;
        let request = LookupRequest {
            data_public_key,
            sendback_data,
        };
        wrap_forward(client_path, ONION_DATA_REQUEST, &request.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::ClientPath as TestClientPath;
    use crate::packets::peel_one_hop;
    use duskwire_crypto::secretbox::SecretKey as BoxSecretKey;
    use duskwire_types::addr::Family;
    use std::net::Ipv4Addr;

    fn node(byte: u8) -> DhtNodeEntry {
        let mut n = DhtNodeEntry::new([byte; 32]);
        n.ip_port_v4 = Some(IpPort::from_v4(Ipv4Addr::LOCALHOST, 33445 + byte as u16));
        n
    }

    #[test]
    fn announce_request_roundtrips() {
        let request = AnnounceRequest {
            ping_id: [1u8; 32],
            data_public_key: [2u8; 32],
            sendback_data: [3u8; 8],
        };
        assert_eq!(AnnounceRequest::decode(&request.encode()).expect("decode"), request);
    }

    #[test]
    fn announce_response_roundtrips_with_and_without_found_node() {
        let with_node = AnnounceResponse {
            sendback_data: [1u8; 8],
            ping_id_or_confirmation: [2u8; 32],
            is_stored: true,
            found_node_ip_port: Some(IpPort::from_v4(Ipv4Addr::new(10, 0, 0, 1), 33445)),
        };
        assert_eq!(AnnounceResponse::decode(&with_node.encode()).expect("decode"), with_node);

        let without_node = AnnounceResponse {
            sendback_data: [1u8; 8],
            ping_id_or_confirmation: [2u8; 32],
            is_stored: false,
            found_node_ip_port: None,
        };
        assert_eq!(
            AnnounceResponse::decode(&without_node.encode()).expect("decode"),
            without_node
        );
    }

    #[test]
    fn lookup_request_and_response_roundtrip() {
        let request = LookupRequest {
            data_public_key: [4u8; 32],
            sendback_data: [5u8; 8],
        };
        assert_eq!(LookupRequest::decode(&request.encode()).expect("decode"), request);

        let response = LookupResponse {
            sendback_data: [5u8; 8],
            found_node_ip_port: Some(IpPort::from_v4(Ipv4Addr::LOCALHOST, 1)),
        };
        assert_eq!(LookupResponse::decode(&response.encode()).expect("decode"), response);
    }

    #[test]
    fn client_has_no_path_until_the_first_rotation() {
        let client = AnnounceClient::new();
        assert!(client.path().is_none());
        assert!(client.build_announce_packet([0u8; 32], [0u8; 8]).is_err());
    }

    #[test]
    fn maybe_rotate_path_builds_once_then_leaves_a_fresh_path_alone() {
        let mut client = AnnounceClient::new();
        let candidates = vec![node(1), node(2), node(3)];

        assert!(client.maybe_rotate_path(&candidates, 0).expect("first rotation"));
        let first_created_at = client.path().expect("path exists").created_at_ms;

        assert!(!client
            .maybe_rotate_path(&candidates, SEND_PATH_LIFETIME_MS - 1)
            .expect("still fresh"));
        assert_eq!(client.path().expect("path exists").created_at_ms, first_created_at);
    }

    #[test]
    fn maybe_rotate_path_rebuilds_once_the_lifetime_elapses() {
        let mut client = AnnounceClient::new();
        let candidates = vec![node(1), node(2), node(3)];
        client.maybe_rotate_path(&candidates, 0).expect("first rotation");

        assert!(client
            .maybe_rotate_path(&candidates, SEND_PATH_LIFETIME_MS + 1)
            .expect("rotated after expiry"));
    }

    #[test]
    fn mark_path_failed_forces_rotation_even_when_still_fresh() {
        let mut client = AnnounceClient::new();
        let candidates = vec![node(1), node(2), node(3)];
        client.maybe_rotate_path(&candidates, 0).expect("first rotation");

        client.mark_path_failed();
        assert!(client.path().is_none());
        assert!(client
            .maybe_rotate_path(&candidates, 1_000)
            .expect("rebuilds after a marked failure"));
    }

    #[test]
    fn handle_announce_response_updates_ping_id_and_announced_flag() {
        let mut client = AnnounceClient::new();
        let response = AnnounceResponse {
            sendback_data: [0u8; 8],
            ping_id_or_confirmation: [9u8; 32],
            is_stored: true,
            found_node_ip_port: None,
        };
        client.handle_announce_response(&response);
        assert!(client.is_announced());

        let candidates = vec![node(1), node(2), node(3)];
        client.maybe_rotate_path(&candidates, 0).expect("rotation");
        let packet = client
            .build_announce_packet([1u8; 32], [7u8; 8])
            .expect("build announce packet");
        assert!(!packet.is_empty());
    }

    #[test]
    fn announce_packet_reaches_the_exit_hop_intact() {
        let hop1_identity = BoxSecretKey::generate();
        let hop2_identity = BoxSecretKey::generate();
        let hop3_identity = BoxSecretKey::generate();

        let mut hop1 = node(1);
        hop1.public_key = hop1_identity.public_key().to_bytes();
        let mut hop2 = node(2);
        hop2.public_key = hop2_identity.public_key().to_bytes();
        let mut hop3 = node(3);
        hop3.public_key = hop3_identity.public_key().to_bytes();

        let hops = vec![hop1.clone(), hop2.clone(), hop3.clone()];
        let client_path = TestClientPath::build(&hops, 0).expect("build path");

        let request = AnnounceRequest {
            ping_id: [0u8; 32],
            data_public_key: [9u8; 32],
            sendback_data: [1u8; 8],
        };
        let packet = wrap_forward(&client_path, ONION_ANNOUNCE_REQUEST_LEGACY, &request.encode()).expect("wrap");

        let client_addr = IpPort {
            family: Family::Ipv4,
            addr: [0u8; 16],
            port: 9999,
        };
        let at_hop1 = peel_one_hop(&hop1_identity, &packet, 0, &client_addr, true).expect("peel hop1");
        let at_hop2 = peel_one_hop(
            &hop2_identity,
            &at_hop1.forward_packet,
            1,
            &hop1.ip_port_v4.expect("addr"),
            true,
        )
        .expect("peel hop2");
        let at_hop3 = peel_one_hop(
            &hop3_identity,
            &at_hop2.forward_packet,
            2,
            &hop2.ip_port_v4.expect("addr"),
            false,
        )
        .expect("peel exit hop");

        // The exit's forward_packet is the request followed by the return
        // stubs it needs to route a response back; only the front is the
        // request itself.
        let decoded = AnnounceRequest::decode(&at_hop3.forward_packet[..ANNOUNCE_REQUEST_LEN]).expect("decode at exit");
        assert_eq!(decoded, request);
    }
}
