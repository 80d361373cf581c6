//! # duskwire-types
//!
//! Shared domain types used across the duskwire workspace. These mirror the
//! data model laid out in §3 of the core transport specification: node
//! identity, addressing, the wire packet tag partition, and the per-component
//! entry shapes (DHT, onion/announce, TCP relay, net-crypto, friend
//! connection). Component logic (bucket eviction, path construction, session
//! state machines) lives in the crate that owns that component; this crate
//! only holds the data they all need to agree on.

pub mod addr;
pub mod config;
pub mod dht;
pub mod error;
pub mod friend;
pub mod netcrypto;
pub mod onion;
pub mod packet;
pub mod relay;

/// A node's long-term identity: its X25519 public key doubles as its DHT key (§3).
pub type PublicKey = [u8; 32];

/// 24-byte nonce used throughout the secretbox/net-crypto layer.
pub type Nonce = [u8; 24];

/// 4-byte nospam tag appended to an advertised ID (glossary).
pub type Nospam = [u8; 4];
