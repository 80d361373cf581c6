//! Length-prefixed TCP frame codec (§6 "TCP frames").
//!
//! Every frame on the wire is `[length:2 big-endian][encrypted_payload]`.
//! `length` counts only the payload, not itself. The payload, once
//! decrypted by the caller, begins with a [`duskwire_types::packet::TcpFrameKind`]
//! tag byte — framing and encryption are this module's job; payload meaning
//! is the caller's.

use crate::{RelayError, Result};

/// Largest payload a frame's 2-byte length field can address.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Encode one frame: `[length:2][payload]`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(RelayError::InvalidArgument(format!(
            "frame payload {} exceeds max {MAX_FRAME_PAYLOAD}",
            payload.len()
        )));
    }
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Incremental frame decoder for a TCP byte stream: feed it bytes as they
/// arrive, and pull complete frames out as they become available. Handles
/// partial reads and multiple frames landing in one `feed` call.
#[derive(Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-read bytes from the socket.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame's payload, if one has fully arrived.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < 2 {
            return None;
        }
        let len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
        if self.buf.len() < 2 + len {
            return None;
        }
        let payload = self.buf[2..2 + len].to_vec();
        self.buf.drain(..2 + len);
        Some(payload)
    }

    /// Bytes buffered but not yet forming a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}
