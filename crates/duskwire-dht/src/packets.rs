//! DHT wire packets: ping request/response, nodes request/response (§6).
//!
//! Layouts (before the outer `[tag:1][sender_dht_pk:32][nonce:24]` the
//! caller has already stripped):
//! - ping request/response body (plaintext, pre-encryption): `{ping_id:8}`
//! - nodes request body: `{target_pk:32, ping_id:8}`
//! - nodes response body: `{nodes_count:1, packed_nodes…, ping_id:8}`

use duskwire_types::addr::{Family, IpPort, PackedNode};

use crate::{DhtError, Result};

/// Encode a packed node: `[family:1][ip:4 or 16][port:2][pk:32]` (§6).
pub fn encode_packed_node(node: &PackedNode) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 16 + 2 + 32);
    out.push(family_byte(node.ip_port.family));
    let len = node.ip_port.wire_addr_len();
    out.extend_from_slice(&node.ip_port.addr[..len]);
    out.extend_from_slice(&node.ip_port.port.to_be_bytes());
    out.extend_from_slice(&node.public_key);
    out
}

/// Decode one packed node from the front of `data`, returning the node and
/// the number of bytes consumed.
pub fn decode_packed_node(data: &[u8]) -> Result<(PackedNode, usize)> {
    let family = data
        .first()
        .copied()
        .and_then(family_from_byte)
        .ok_or_else(|| DhtError::MalformedPacket("missing/invalid family byte".into()))?;
    let addr_len = match family {
        Family::Ipv4 | Family::TcpIpv4 => 4,
        Family::Ipv6 | Family::TcpIpv6 | Family::TcpClient | Family::TcpServer => 16,
    };
    let needed = 1 + addr_len + 2 + 32;
    if data.len() < needed {
        return Err(DhtError::MalformedPacket("packed node truncated".into()));
    }
    let mut addr_bytes = [0u8; 16];
    addr_bytes[..addr_len].copy_from_slice(&data[1..1 + addr_len]);
    let port = u16::from_be_bytes([data[1 + addr_len], data[2 + addr_len]]);
    let mut pk = [0u8; 32];
    pk.copy_from_slice(&data[3 + addr_len..needed]);

    Ok((
        PackedNode {
            ip_port: IpPort {
                family,
                addr: addr_bytes,
                port,
            },
            public_key: pk,
        },
        needed,
    ))
}

fn family_byte(family: Family) -> u8 {
    match family {
        Family::Ipv4 => 2,
        Family::Ipv6 => 10,
        Family::TcpIpv4 => 130,
        Family::TcpIpv6 => 138,
        Family::TcpClient => 254,
        Family::TcpServer => 255,
    }
}

fn family_from_byte(b: u8) -> Option<Family> {
    Some(match b {
        2 => Family::Ipv4,
        10 => Family::Ipv6,
        130 => Family::TcpIpv4,
        138 => Family::TcpIpv6,
        254 => Family::TcpClient,
        255 => Family::TcpServer,
        _ => return None,
    })
}

/// Plaintext body of a ping request/response, pre-encryption (§6: `{ping_id:8}`).
pub fn encode_ping_id(ping_id: u64) -> [u8; 8] {
    ping_id.to_be_bytes()
}

pub fn decode_ping_id(body: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = body
        .get(..8)
        .ok_or_else(|| DhtError::MalformedPacket("ping body too short".into()))?
        .try_into()
        .expect("slice is exactly 8 bytes");
    Ok(u64::from_be_bytes(bytes))
}

/// Plaintext body of a nodes request, pre-encryption: `{target_pk:32, ping_id:8}`.
pub fn encode_nodes_request(target_pk: &[u8; 32], ping_id: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(40);
    out.extend_from_slice(target_pk);
    out.extend_from_slice(&ping_id.to_be_bytes());
    out
}

pub fn decode_nodes_request(body: &[u8]) -> Result<([u8; 32], u64)> {
    if body.len() < 40 {
        return Err(DhtError::MalformedPacket("nodes request too short".into()));
    }
    let mut target_pk = [0u8; 32];
    target_pk.copy_from_slice(&body[..32]);
    let ping_id = u64::from_be_bytes(body[32..40].try_into().expect("8 bytes"));
    Ok((target_pk, ping_id))
}

/// Plaintext body of a nodes response: `{nodes_count:1, packed_nodes…, ping_id:8}`.
pub fn encode_nodes_response(nodes: &[PackedNode], ping_id: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + nodes.len() * 51 + 8);
    out.push(nodes.len() as u8);
    for node in nodes {
        out.extend_from_slice(&encode_packed_node(node));
    }
    out.extend_from_slice(&ping_id.to_be_bytes());
    out
}

pub fn decode_nodes_response(body: &[u8]) -> Result<(Vec<PackedNode>, u64)> {
    let count = *body
        .first()
        .ok_or_else(|| DhtError::MalformedPacket("nodes response empty".into()))? as usize;
    let mut cursor = 1;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let (node, consumed) = decode_packed_node(&body[cursor..])?;
        nodes.push(node);
        cursor += consumed;
    }
    if body.len() < cursor + 8 {
        return Err(DhtError::MalformedPacket(
            "nodes response missing ping_id".into(),
        ));
    }
    let ping_id = u64::from_be_bytes(body[cursor..cursor + 8].try_into().expect("8 bytes"));
    Ok((nodes, ping_id))
}
