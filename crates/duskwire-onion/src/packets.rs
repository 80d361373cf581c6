//! Onion wire format: nested layers and return-path stubs (§6, §4.3).
//!
//! Each layer is `[type:1][sender_session_pk:32][nonce:24][encrypted_payload]
//! [return_stub:59 per prior hop]`. A return stub is `[nonce:24 (cleartext)]
//! [encrypt(self_key, nonce, ip_port:19)]` — a hop encrypts the address it
//! received the packet from to itself and appends it before forwarding, so a
//! later reply can be routed back hop by hop without any hop keeping
//! per-circuit state.

use tracing::trace;

use duskwire_crypto::secretbox::{self, PublicKey as BoxPublicKey, SecretKey as BoxSecretKey};
use duskwire_types::addr::{Family, IpPort};
use duskwire_types::packet::{ONION_END, ONION_START};

use crate::path::ClientPath;
use crate::{OnionError, Result};

/// Size of one return-path stub: `nonce(24) + encrypt(ip_port(19)) + mac(16)`.
pub const RETURN_STUB_SIZE: usize = 24 + 19 + 16;

pub(crate) fn encode_ip_port_19(ip_port: &IpPort) -> [u8; 19] {
    let mut out = [0u8; 19];
    out[0] = match ip_port.family {
        Family::Ipv4 => 2,
        Family::Ipv6 => 10,
        Family::TcpIpv4 => 130,
        Family::TcpIpv6 => 138,
        Family::TcpClient => 254,
        Family::TcpServer => 255,
    };
    out[1..17].copy_from_slice(&ip_port.addr);
    out[17..19].copy_from_slice(&ip_port.port.to_be_bytes());
    out
}

pub(crate) fn decode_ip_port_19(bytes: &[u8]) -> Result<IpPort> {
    if bytes.len() != 19 {
        return Err(OnionError::MalformedPacket("ip_port field is not 19 bytes".into()));
    }
    let family = match bytes[0] {
        2 => Family::Ipv4,
        10 => Family::Ipv6,
        130 => Family::TcpIpv4,
        138 => Family::TcpIpv6,
        254 => Family::TcpClient,
        255 => Family::TcpServer,
        other => {
            return Err(OnionError::MalformedPacket(format!(
                "unknown address family byte {other}"
            )))
        }
    };
    let mut addr = [0u8; 16];
    addr.copy_from_slice(&bytes[1..17]);
    let port = u16::from_be_bytes([bytes[17], bytes[18]]);
    Ok(IpPort { family, addr, port })
}

/// Mint a return stub: encrypt `prev_ip_port` to this node's own key, so only
/// this node can later recover it from an accumulated return packet.
pub fn mint_return_stub(node_identity_secret: &BoxSecretKey, prev_ip_port: &IpPort) -> [u8; RETURN_STUB_SIZE] {
    let nonce = secretbox::generate_nonce();
    let self_key = node_identity_secret.precompute(&node_identity_secret.public_key());
    let plaintext = encode_ip_port_19(prev_ip_port);
    let ciphertext = self_key
        .encrypt(&nonce, &plaintext)
        .expect("encryption to self cannot fail");

    let mut stub = [0u8; RETURN_STUB_SIZE];
    stub[..24].copy_from_slice(&nonce);
    stub[24..].copy_from_slice(&ciphertext);
    stub
}

/// Recover the address a return stub this node minted was protecting.
pub fn open_return_stub(node_identity_secret: &BoxSecretKey, stub: &[u8]) -> Result<IpPort> {
    if stub.len() != RETURN_STUB_SIZE {
        return Err(OnionError::MalformedPacket(format!(
            "return stub is {} bytes, expected {RETURN_STUB_SIZE}",
            stub.len()
        )));
    }
    let nonce: [u8; 24] = stub[..24].try_into().expect("24 bytes");
    let self_key = node_identity_secret.precompute(&node_identity_secret.public_key());
    let plaintext = self_key
        .decrypt(&nonce, &stub[24..])
        .map_err(|_| OnionError::MalformedPacket("return stub failed to decrypt".into()))?;
    decode_ip_port_19(&plaintext)
}

/// One forward-encrypted onion layer plus whatever return stubs earlier hops
/// on this path have already appended to the packet.
pub struct OnionLayer {
    pub tag: u8,
    pub sender_session_pk: [u8; 32],
    pub nonce: [u8; 24],
    pub encrypted_body: Vec<u8>,
    pub trailing_stubs: Vec<[u8; RETURN_STUB_SIZE]>,
}

impl OnionLayer {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            1 + 32 + 24 + self.encrypted_body.len() + self.trailing_stubs.len() * RETURN_STUB_SIZE,
        );
        out.push(self.tag);
        out.extend_from_slice(&self.sender_session_pk);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.encrypted_body);
        for stub in &self.trailing_stubs {
            out.extend_from_slice(stub);
        }
        out
    }

    /// Decode a layer, given how many return stubs earlier hops have already
    /// appended (0 for the entry hop, incrementing by one per hop since).
    pub fn decode(data: &[u8], num_prior_stubs: usize) -> Result<Self> {
        let header_len = 1 + 32 + 24;
        let trailing_len = num_prior_stubs * RETURN_STUB_SIZE;
        if data.len() < header_len + trailing_len {
            return Err(OnionError::MalformedPacket("onion layer truncated".into()));
        }
        let tag = data[0];
        if !(ONION_START..=ONION_END).contains(&tag) {
            return Err(OnionError::MalformedPacket(format!(
                "tag {tag:#x} outside onion range"
            )));
        }
        let mut sender_session_pk = [0u8; 32];
        sender_session_pk.copy_from_slice(&data[1..33]);
        let mut nonce = [0u8; 24];
        nonce.copy_from_slice(&data[33..57]);

        let split_at = data.len() - trailing_len;
        let encrypted_body = data[header_len..split_at].to_vec();
        let trailing_stubs = data[split_at..]
            .chunks_exact(RETURN_STUB_SIZE)
            .map(|chunk| chunk.try_into().expect("chunk is RETURN_STUB_SIZE"))
            .collect();

        Ok(Self {
            tag,
            sender_session_pk,
            nonce,
            encrypted_body,
            trailing_stubs,
        })
    }
}

/// Build the forward-encrypted onion packet a client sends into its first
/// hop: the payload wrapped once per hop from exit back to entry. No return
/// stubs are present yet — each hop mints its own as it forwards.
pub fn wrap_forward(client_path: &ClientPath, tag: u8, inner_payload: &[u8]) -> Result<Vec<u8>> {
    let hops = &client_path.path.hops;
    if hops.len() != 3 {
        return Err(OnionError::PathConstruction(
            "forward wrapping assumes a 3-hop path".into(),
        ));
    }

    // Layer 3 (innermost, decrypted by the exit hop): just the payload.
    let exit_secret = client_path.hop_secret(2);
    let exit_pk = BoxPublicKey::from_bytes(hops[2].node_public_key);
    let nonce3 = secretbox::generate_nonce();
    let layer3_body = exit_secret.precompute(&exit_pk).encrypt(&nonce3, inner_payload)?;
    let layer3 = OnionLayer {
        tag,
        sender_session_pk: exit_secret.public_key().to_bytes(),
        nonce: nonce3,
        encrypted_body: layer3_body,
        trailing_stubs: Vec::new(),
    }
    .encode();

    // Layer 2: encrypted to hop 2, prefixed with hop 3's address so hop 2
    // knows where to forward it.
    let middle_secret = client_path.hop_secret(1);
    let middle_pk = BoxPublicKey::from_bytes(hops[1].node_public_key);
    let nonce2 = secretbox::generate_nonce();
    let mut layer2_plain = encode_ip_port_19(&hops[2].node_ip_port).to_vec();
    layer2_plain.extend_from_slice(&layer3);
    let layer2_body = middle_secret.precompute(&middle_pk).encrypt(&nonce2, &layer2_plain)?;
    let layer2 = OnionLayer {
        tag,
        sender_session_pk: middle_secret.public_key().to_bytes(),
        nonce: nonce2,
        encrypted_body: layer2_body,
        trailing_stubs: Vec::new(),
    }
    .encode();

    // Layer 1: encrypted to hop 1, prefixed with hop 2's address.
    let entry_secret = client_path.hop_secret(0);
    let entry_pk = BoxPublicKey::from_bytes(hops[0].node_public_key);
    let nonce1 = secretbox::generate_nonce();
    let mut layer1_plain = encode_ip_port_19(&hops[1].node_ip_port).to_vec();
    layer1_plain.extend_from_slice(&layer2);
    let layer1_body = entry_secret.precompute(&entry_pk).encrypt(&nonce1, &layer1_plain)?;

    Ok(OnionLayer {
        tag,
        sender_session_pk: entry_secret.public_key().to_bytes(),
        nonce: nonce1,
        encrypted_body: layer1_body,
        trailing_stubs: Vec::new(),
    }
    .encode())
}

/// Outcome of a hop peeling its layer off a forwarded onion packet.
pub struct PeelResult {
    pub tag: u8,
    /// Where to forward `forward_packet`, or `None` if this hop is the exit.
    pub next_hop: Option<IpPort>,
    /// The packet to send onward: the next layer plus this hop's own return
    /// stub appended after whatever stubs were already accumulated.
    pub forward_packet: Vec<u8>,
}

/// What a relay node does on receiving a forward-onion packet: decrypt its
/// layer with its own identity key, mint its own return stub for the address
/// the packet arrived from, and hand back what to forward and to where.
///
/// `has_next_hop` is `false` only for the exit hop, which has no onward
/// address to read — its decrypted body is the original payload.
pub fn peel_one_hop(
    node_identity_secret: &BoxSecretKey,
    packet: &[u8],
    num_prior_stubs: usize,
    prev_ip_port: &IpPort,
    has_next_hop: bool,
) -> Result<PeelResult> {
    let layer = OnionLayer::decode(packet, num_prior_stubs)?;
    let their_pk = BoxPublicKey::from_bytes(layer.sender_session_pk);
    let plaintext = node_identity_secret
        .precompute(&their_pk)
        .decrypt(&layer.nonce, &layer.encrypted_body)
        .map_err(|_| OnionError::MalformedPacket("onion layer failed to decrypt".into()))?;

    let (next_hop, inner) = if has_next_hop {
        if plaintext.len() < 19 {
            return Err(OnionError::MalformedPacket(
                "onion layer missing next-hop address".into(),
            ));
        }
        (Some(decode_ip_port_19(&plaintext[..19])?), plaintext[19..].to_vec())
    } else {
        (None, plaintext)
    };

    let mut forward_packet = inner;
    for stub in &layer.trailing_stubs {
        forward_packet.extend_from_slice(stub);
    }
    forward_packet.extend_from_slice(&mint_return_stub(node_identity_secret, prev_ip_port));

    trace!(
        tag = layer.tag,
        has_next_hop,
        stub_count = layer.trailing_stubs.len() + 1,
        "peeled onion layer"
    );

    Ok(PeelResult {
        tag: layer.tag,
        next_hop,
        forward_packet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use duskwire_types::dht::DhtNodeEntry;
    use std::net::Ipv4Addr;

    fn node(byte: u8) -> DhtNodeEntry {
        let mut n = DhtNodeEntry::new([byte; 32]);
        n.ip_port_v4 = Some(IpPort::from_v4(Ipv4Addr::LOCALHOST, 33445 + byte as u16));
        n
    }

    #[test]
    fn return_stub_roundtrip() {
        let node_secret = BoxSecretKey::generate();
        let addr = IpPort::from_v4(Ipv4Addr::new(10, 0, 0, 1), 12345);
        let stub = mint_return_stub(&node_secret, &addr);
        assert_eq!(stub.len(), RETURN_STUB_SIZE);
        let recovered = open_return_stub(&node_secret, &stub).expect("open");
        assert_eq!(recovered, addr);
    }

    #[test]
    fn return_stub_wrong_node_fails() {
        let minted_by = BoxSecretKey::generate();
        let opened_by = BoxSecretKey::generate();
        let addr = IpPort::from_v4(Ipv4Addr::new(10, 0, 0, 1), 12345);
        let stub = mint_return_stub(&minted_by, &addr);
        assert!(open_return_stub(&opened_by, &stub).is_err());
    }

    #[test]
    fn onion_layer_roundtrip_encoding_with_no_prior_stubs() {
        let layer = OnionLayer {
            tag: ONION_START,
            sender_session_pk: [1u8; 32],
            nonce: [2u8; 24],
            encrypted_body: vec![9, 9, 9],
            trailing_stubs: Vec::new(),
        };
        let encoded = layer.encode();
        let decoded = OnionLayer::decode(&encoded, 0).expect("decode");
        assert_eq!(decoded.tag, ONION_START);
        assert_eq!(decoded.sender_session_pk, [1u8; 32]);
        assert_eq!(decoded.encrypted_body, vec![9, 9, 9]);
        assert!(decoded.trailing_stubs.is_empty());
    }

    #[test]
    fn onion_layer_roundtrip_with_accumulated_stub() {
        let stub = mint_return_stub(&BoxSecretKey::generate(), &IpPort::from_v4(Ipv4Addr::LOCALHOST, 1));
        let layer = OnionLayer {
            tag: ONION_START,
            sender_session_pk: [1u8; 32],
            nonce: [2u8; 24],
            encrypted_body: vec![1, 2, 3, 4],
            trailing_stubs: vec![stub],
        };
        let encoded = layer.encode();
        let decoded = OnionLayer::decode(&encoded, 1).expect("decode");
        assert_eq!(decoded.encrypted_body, vec![1, 2, 3, 4]);
        assert_eq!(decoded.trailing_stubs.len(), 1);
    }

    #[test]
    fn full_path_forward_and_peel_recovers_payload_at_exit() {
        // Each relay has its own long-lived identity box key; the client
        // learns only the public half via the DHT node entry.
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
        let client_path = ClientPath::build(&hops, 0).expect("build path");

        let packet = wrap_forward(&client_path, ONION_START, b"hello exit").expect("wrap");

        let client_addr = IpPort::from_v4(Ipv4Addr::new(127, 0, 0, 1), 9999);
        let at_hop1 = peel_one_hop(&hop1_identity, &packet, 0, &client_addr, true).expect("peel hop1");
        assert_eq!(at_hop1.next_hop, Some(hop2.ip_port_v4.expect("addr")));

        let at_hop2 = peel_one_hop(
            &hop2_identity,
            &at_hop1.forward_packet,
            1,
            &hop1.ip_port_v4.expect("addr"),
            true,
        )
        .expect("peel hop2");
        assert_eq!(at_hop2.next_hop, Some(hop3.ip_port_v4.expect("addr")));

        let at_hop3 = peel_one_hop(
            &hop3_identity,
            &at_hop2.forward_packet,
            2,
            &hop2.ip_port_v4.expect("addr"),
            false,
        )
        .expect("peel hop3 (exit)");
        assert!(at_hop3.next_hop.is_none());
        assert_eq!(at_hop3.forward_packet, b"hello exit");
    }
}
