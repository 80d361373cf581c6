//! On-wire packet type tags (§3 "Packet").
//!
//! Every UDP packet and every net-crypto/TCP-relay-decrypted payload begins
//! with a one-byte tag. Tags are partitioned by layer and no two layers
//! share one; an unrecognized tag is dropped without reply (§7, anti-amplification).

/// DHT ping request.
pub const PING_REQUEST: u8 = 0x00;
/// DHT ping response.
pub const PING_RESPONSE: u8 = 0x01;
/// DHT nodes request.
pub const NODES_REQUEST: u8 = 0x02;
/// Legacy/deprecated DHT request variant, kept for interop (§9 open question).
pub const DHT_RESERVED_03: u8 = 0x03;
/// DHT nodes response.
pub const NODES_RESPONSE: u8 = 0x04;

/// Net-crypto cookie request.
pub const COOKIE_REQUEST: u8 = 0x18;
/// Net-crypto cookie response.
pub const COOKIE_RESPONSE: u8 = 0x19;
/// Net-crypto handshake.
pub const CRYPTO_HANDSHAKE: u8 = 0x1a;
/// Net-crypto data packet.
pub const CRYPTO_DATA: u8 = 0x1b;
/// Reserved crypto tag.
pub const CRYPTO_RESERVED_20: u8 = 0x20;

/// LAN discovery broadcast.
pub const LAN_DISCOVERY: u8 = 0x21;

/// Group chat packet range, start inclusive.
pub const GROUP_CHAT_START: u8 = 0x5a;
/// Group chat packet range, end inclusive.
pub const GROUP_CHAT_END: u8 = 0x5c;

/// Onion packet range, start inclusive (forward-wrapped layers and returns).
pub const ONION_START: u8 = 0x80;
/// Onion packet range, end inclusive.
pub const ONION_END: u8 = 0x92;
/// Legacy onion announce request tag, deprecated but required for interop
/// with older peers (§9 open question — supported via the same announce
/// types, not a separate code path).
pub const ONION_ANNOUNCE_REQUEST_LEGACY: u8 = 0x83;
/// Legacy onion announce response tag, deprecated but required for interop.
pub const ONION_ANNOUNCE_RESPONSE_LEGACY: u8 = 0x84;

/// Data search/retrieve/announce range, start inclusive.
pub const DATA_ANNOUNCE_START: u8 = 0x93;
/// Data search/retrieve/announce range, end inclusive.
pub const DATA_ANNOUNCE_END: u8 = 0x98;
/// Onion-routed lookup query for whatever is stored at a data key, carried
/// the same way an announce request is (§4.3 "Lookup protocol").
pub const ONION_DATA_REQUEST: u8 = 0x93;
/// Reply to [`ONION_DATA_REQUEST`].
pub const ONION_DATA_RESPONSE: u8 = 0x94;

/// Bootstrap-info request/response.
pub const BOOTSTRAP_INFO: u8 = 0xf0;

/// Classification of a tag into its owning layer, for dispatch-table construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketLayer {
    Dht,
    NetCrypto,
    LanDiscovery,
    GroupChat,
    Onion,
    DataAnnounce,
    BootstrapInfo,
    Unknown,
}

/// Classify a wire tag byte into its layer, per the §3 tag partition table.
pub fn classify(tag: u8) -> PacketLayer {
    match tag {
        PING_REQUEST | PING_RESPONSE | NODES_REQUEST | DHT_RESERVED_03 | NODES_RESPONSE => {
            PacketLayer::Dht
        }
        COOKIE_REQUEST | COOKIE_RESPONSE | CRYPTO_HANDSHAKE | CRYPTO_DATA | CRYPTO_RESERVED_20 => {
            PacketLayer::NetCrypto
        }
        LAN_DISCOVERY => PacketLayer::LanDiscovery,
        GROUP_CHAT_START..=GROUP_CHAT_END => PacketLayer::GroupChat,
        ONION_START..=ONION_END => PacketLayer::Onion,
        DATA_ANNOUNCE_START..=DATA_ANNOUNCE_END => PacketLayer::DataAnnounce,
        BOOTSTRAP_INFO => PacketLayer::BootstrapInfo,
        _ => PacketLayer::Unknown,
    }
}

/// TCP relay frame type, carried as the first byte of a length-prefixed
/// frame's decrypted payload (§6). Values ≥16 are not in this enum: they are
/// `connection_id` values addressing routed data directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TcpFrameKind {
    RoutingRequest,
    RoutingResponse,
    ConnectNotification,
    DisconnectNotification,
    Ping,
    Pong,
    OobSend,
    OobRecv,
    OnionRequest,
    OnionResponse,
    /// Routed data addressed to/from `connection_id`.
    Data(u8),
}

impl TcpFrameKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => TcpFrameKind::RoutingRequest,
            1 => TcpFrameKind::RoutingResponse,
            2 => TcpFrameKind::ConnectNotification,
            3 => TcpFrameKind::DisconnectNotification,
            4 => TcpFrameKind::Ping,
            5 => TcpFrameKind::Pong,
            6 => TcpFrameKind::OobSend,
            7 => TcpFrameKind::OobRecv,
            8 => TcpFrameKind::OnionRequest,
            9 => TcpFrameKind::OnionResponse,
            16..=255 => TcpFrameKind::Data(b),
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            TcpFrameKind::RoutingRequest => 0,
            TcpFrameKind::RoutingResponse => 1,
            TcpFrameKind::ConnectNotification => 2,
            TcpFrameKind::DisconnectNotification => 3,
            TcpFrameKind::Ping => 4,
            TcpFrameKind::Pong => 5,
            TcpFrameKind::OobSend => 6,
            TcpFrameKind::OobRecv => 7,
            TcpFrameKind::OnionRequest => 8,
            TcpFrameKind::OnionResponse => 9,
            TcpFrameKind::Data(id) => id,
        }
    }
}
