//! Friend requests: nospam-filtered unsolicited introductions.
//!
//! Unlike the other payloads this crate carries, a friend request has no
//! net-crypto session to ride on yet — it is handed to the onion client for
//! delivery to a not-yet-connected peer's announced path, and arrives back
//! the same way. This module only owns the wire shape and the nospam
//! filter; actual onion delivery is composed by the daemon layer.

use duskwire_types::Nospam;

/// Requests larger than this are rejected before nospam/dedup checks, so a
/// hostile introduction can't be used to smuggle an oversized payload.
pub const MAX_FRIEND_REQUEST_MESSAGE_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRequest {
    pub sender_pk: [u8; 32],
    pub nospam: Nospam,
    pub message: Vec<u8>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FriendRequestError {
    #[error("friend request message too long: {0} bytes")]
    MessageTooLong(usize),
    #[error("truncated friend request payload")]
    Truncated,
}

/// Wire layout: `[nospam:4][message]`. The sender's public key is not part
/// of the payload; it comes from whatever return-path metadata the onion
/// layer attaches to the delivery.
pub fn encode(nospam: &Nospam, message: &[u8]) -> Result<Vec<u8>, FriendRequestError> {
    if message.len() > MAX_FRIEND_REQUEST_MESSAGE_LEN {
        return Err(FriendRequestError::MessageTooLong(message.len()));
    }
    let mut out = Vec::with_capacity(4 + message.len());
    out.extend_from_slice(nospam);
    out.extend_from_slice(message);
    Ok(out)
}

pub fn decode(sender_pk: [u8; 32], payload: &[u8]) -> Result<FriendRequest, FriendRequestError> {
    if payload.len() < 4 {
        return Err(FriendRequestError::Truncated);
    }
    let (nospam_bytes, message) = payload.split_at(4);
    if message.len() > MAX_FRIEND_REQUEST_MESSAGE_LEN {
        return Err(FriendRequestError::MessageTooLong(message.len()));
    }
    let mut nospam = [0u8; 4];
    nospam.copy_from_slice(nospam_bytes);
    Ok(FriendRequest {
        sender_pk,
        nospam,
        message: message.to_vec(),
    })
}

/// Tracks the nospam value this node currently accepts requests under, and a
/// small set of already-seen (sender, nospam) pairs to drop duplicates
/// without surfacing them to the application layer repeatedly.
pub struct NospamFilter {
    current: Nospam,
    seen: std::collections::HashSet<([u8; 32], Nospam)>,
}

impl NospamFilter {
    pub fn new(current: Nospam) -> Self {
        Self {
            current,
            seen: std::collections::HashSet::new(),
        }
    }

    pub fn set_nospam(&mut self, nospam: Nospam) {
        self.current = nospam;
        self.seen.clear();
    }

    pub fn nospam(&self) -> Nospam {
        self.current
    }

    /// Returns `true` the first time a request with the current nospam value
    /// arrives from a given sender; `false` for a stale nospam or a repeat.
    pub fn accept(&mut self, request: &FriendRequest) -> bool {
        if request.nospam != self.current {
            return false;
        }
        self.seen.insert((request.sender_pk, request.nospam))
    }
}
