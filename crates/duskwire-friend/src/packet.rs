//! Payload codecs for the three packet tags this layer carries over an
//! already-confirmed net-crypto session (§4.6): `PACKET_ID_ALIVE`,
//! `PACKET_ID_SHARE_RELAYS`, `PACKET_ID_FRIEND_REQUESTS`. Net-crypto frames
//! the channel; this module frames what rides inside it.

use duskwire_types::friend::{PACKET_ID_ALIVE, PACKET_ID_FRIEND_REQUESTS, PACKET_ID_SHARE_RELAYS};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("unknown friend-layer packet id {0}")]
    UnknownId(u8),
    #[error("malformed share-relays payload")]
    MalformedRelays,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FriendPacket {
    Alive,
    ShareRelays(Vec<[u8; 32]>),
    FriendRequestRelay(Vec<u8>),
}

pub fn encode(packet: &FriendPacket) -> Vec<u8> {
    match packet {
        FriendPacket::Alive => vec![PACKET_ID_ALIVE],
        FriendPacket::ShareRelays(relays) => {
            let mut out = Vec::with_capacity(1 + relays.len() * 32);
            out.push(PACKET_ID_SHARE_RELAYS);
            for relay in relays {
                out.extend_from_slice(relay);
            }
            out
        }
        FriendPacket::FriendRequestRelay(payload) => {
            let mut out = Vec::with_capacity(1 + payload.len());
            out.push(PACKET_ID_FRIEND_REQUESTS);
            out.extend_from_slice(payload);
            out
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<FriendPacket, PacketError> {
    let (&id, rest) = bytes.split_first().ok_or(PacketError::Empty)?;
    match id {
        PACKET_ID_ALIVE => Ok(FriendPacket::Alive),
        PACKET_ID_SHARE_RELAYS => {
            if rest.len() % 32 != 0 {
                return Err(PacketError::MalformedRelays);
            }
            let relays = rest
                .chunks_exact(32)
                .map(|chunk| {
                    let mut pk = [0u8; 32];
                    pk.copy_from_slice(chunk);
                    pk
                })
                .collect();
            Ok(FriendPacket::ShareRelays(relays))
        }
        PACKET_ID_FRIEND_REQUESTS => Ok(FriendPacket::FriendRequestRelay(rest.to_vec())),
        other => Err(PacketError::UnknownId(other)),
    }
}
