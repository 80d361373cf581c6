//! The reliable (lossless) channel within a net-crypto session (§4.5).
//!
//! Decrypted data-packet bodies that aren't lossy carry `{packet_number:4B
//! BE, sub_payload}`. The sender keeps unacked packets in a bounded window
//! for retransmission; the receiver buffers arrivals that are ahead of the
//! next expected number and reports them back via a piggyback ack —
//! `{next_expected_packet_number, bitmask of received-ahead}` — sized to
//! exactly [`CRYPTO_RECV_WINDOW`] bits so every packet the window can hold
//! has a bit to report it in.

use std::collections::VecDeque;

use duskwire_types::netcrypto::{CRYPTO_RECV_WINDOW, CRYPTO_SEND_WINDOW};

use crate::{NetCryptoError, Result};

/// Bytes needed to carry one bit per slot in the receive window.
pub const ACK_BITMASK_BYTES: usize = CRYPTO_RECV_WINDOW / 8;

/// Encode `{packet_number, sub_payload}` for the plaintext inside a reliable
/// data packet.
pub fn encode_sub_payload(packet_number: u32, sub_payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + sub_payload.len());
    out.extend_from_slice(&packet_number.to_be_bytes());
    out.extend_from_slice(sub_payload);
    out
}

pub fn decode_sub_payload(plaintext: &[u8]) -> Result<(u32, &[u8])> {
    if plaintext.len() < 4 {
        return Err(NetCryptoError::InvalidArgument("reliable payload missing packet_number".into()));
    }
    let packet_number = u32::from_be_bytes(plaintext[..4].try_into().expect("checked length above"));
    Ok((packet_number, &plaintext[4..]))
}

struct InFlight {
    packet_number: u32,
    payload: Vec<u8>,
    sent_at_ms: u64,
}

/// Sender-side unacked-packet window (§3 `send_array[SEND_WINDOW]`).
pub struct SendWindow {
    next_packet_number: u32,
    in_flight: VecDeque<InFlight>,
}

impl Default for SendWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SendWindow {
    pub fn new() -> Self {
        Self {
            next_packet_number: 0,
            in_flight: VecDeque::new(),
        }
    }

    /// Queue `payload` for transmission, returning its encoded sub-payload.
    /// Fails once [`CRYPTO_SEND_WINDOW`] packets are outstanding.
    pub fn push(&mut self, payload: Vec<u8>, now_ms: u64) -> Result<Vec<u8>> {
        if self.in_flight.len() >= CRYPTO_SEND_WINDOW {
            return Err(NetCryptoError::Busy);
        }
        let packet_number = self.next_packet_number;
        self.next_packet_number = self.next_packet_number.wrapping_add(1);
        let encoded = encode_sub_payload(packet_number, &payload);
        self.in_flight.push_back(InFlight {
            packet_number,
            payload,
            sent_at_ms: now_ms,
        });
        Ok(encoded)
    }

    /// Apply a peer's ack, dropping everything it confirms as received.
    /// Returns the RTT samples obtained (one per packet dropped as directly
    /// acked by `next_expected`, since those are the ones whose round trip
    /// just completed).
    pub fn apply_ack(&mut self, next_expected: u32, bitmask: &[u8; ACK_BITMASK_BYTES], now_ms: u64) -> Vec<u64> {
        let mut rtt_samples = Vec::new();
        self.in_flight.retain(|pkt| {
            let acked = sequence_before(pkt.packet_number, next_expected)
                || bit_set(bitmask, pkt.packet_number.wrapping_sub(next_expected));
            if acked {
                rtt_samples.push(now_ms.saturating_sub(pkt.sent_at_ms));
            }
            !acked
        });
        rtt_samples
    }

    /// Packets whose retransmission deadline (`rto_ms` after send) has
    /// passed, oldest first.
    pub fn due_for_retransmit(&self, now_ms: u64, rto_ms: u64) -> Vec<(u32, &[u8])> {
        self.in_flight
            .iter()
            .filter(|pkt| now_ms.saturating_sub(pkt.sent_at_ms) >= rto_ms)
            .map(|pkt| (pkt.packet_number, pkt.payload.as_slice()))
            .collect()
    }

    pub fn mark_retransmitted(&mut self, packet_number: u32, now_ms: u64) {
        if let Some(pkt) = self.in_flight.iter_mut().find(|p| p.packet_number == packet_number) {
            pkt.sent_at_ms = now_ms;
        }
    }

    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }
}

fn bit_set(bitmask: &[u8; ACK_BITMASK_BYTES], offset: u32) -> bool {
    let offset = offset as usize;
    if offset == 0 || offset > CRYPTO_RECV_WINDOW {
        return false;
    }
    let bit = offset - 1;
    bitmask[bit / 8] & (1 << (bit % 8)) != 0
}

/// Whether `a` precedes `b` on a wrapping `u32` sequence, treating the
/// smaller half of the ring as "before".
fn sequence_before(a: u32, b: u32) -> bool {
    a.wrapping_sub(b) > u32::MAX / 2
}

/// Receiver-side reorder buffer (§3 `recv_array[RECV_WINDOW]`).
pub struct RecvWindow {
    next_expected: u32,
    received_ahead: Vec<Option<Vec<u8>>>,
}

impl Default for RecvWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl RecvWindow {
    pub fn new() -> Self {
        Self {
            next_expected: 0,
            received_ahead: vec![None; CRYPTO_RECV_WINDOW],
        }
    }

    /// Record an arrival. Invariant (§4.5c): a duplicate `packet_number` is
    /// silently dropped, never an error.
    pub fn receive(&mut self, packet_number: u32, payload: Vec<u8>) {
        if packet_number == self.next_expected {
            self.received_ahead[0] = Some(payload);
            return;
        }
        if sequence_before(packet_number, self.next_expected) {
            return; // already delivered or before the window: duplicate
        }
        let offset = packet_number.wrapping_sub(self.next_expected) as usize;
        if offset == 0 || offset > CRYPTO_RECV_WINDOW {
            return; // ahead of the window: drop rather than grow unbounded
        }
        self.received_ahead[offset] = Some(payload);
    }

    /// Drain every payload now ready for in-order delivery.
    pub fn drain_ready(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(payload) = self.received_ahead[0].take() {
            out.push(payload);
            self.next_expected = self.next_expected.wrapping_add(1);
            self.received_ahead.rotate_left(1);
            *self.received_ahead.last_mut().expect("window is non-empty") = None;
        }
        out
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    /// The ack to report back: `next_expected` plus a bitmask of which
    /// further slots in the window already hold an out-of-order arrival.
    pub fn ack_bitmask(&self) -> [u8; ACK_BITMASK_BYTES] {
        let mut bitmask = [0u8; ACK_BITMASK_BYTES];
        for (offset, slot) in self.received_ahead.iter().enumerate().skip(1) {
            if slot.is_some() {
                let bit = offset - 1;
                bitmask[bit / 8] |= 1 << (bit % 8);
            }
        }
        bitmask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_window_push_and_ack_drops_acked() {
        let mut window = SendWindow::new();
        window.push(b"a".to_vec(), 0).expect("push");
        window.push(b"b".to_vec(), 0).expect("push");
        assert_eq!(window.outstanding(), 2);
        window.apply_ack(2, &[0u8; ACK_BITMASK_BYTES], 100);
        assert_eq!(window.outstanding(), 0);
    }

    #[test]
    fn send_window_full_rejects_push() {
        let mut window = SendWindow::new();
        for i in 0..CRYPTO_SEND_WINDOW {
            window.push(vec![i as u8], 0).expect("push");
        }
        assert!(window.push(vec![0], 0).is_err());
    }

    #[test]
    fn retransmit_after_rto_elapses() {
        let mut window = SendWindow::new();
        window.push(b"a".to_vec(), 0).expect("push");
        assert!(window.due_for_retransmit(50, 100).is_empty());
        assert_eq!(window.due_for_retransmit(150, 100).len(), 1);
    }

    #[test]
    fn recv_window_delivers_in_order_after_reorder() {
        let mut recv = RecvWindow::new();
        recv.receive(1, b"second".to_vec());
        assert!(recv.drain_ready().is_empty());
        recv.receive(0, b"first".to_vec());
        let ready = recv.drain_ready();
        assert_eq!(ready, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(recv.next_expected(), 2);
    }

    #[test]
    fn recv_window_duplicate_dropped() {
        let mut recv = RecvWindow::new();
        recv.receive(0, b"first".to_vec());
        recv.drain_ready();
        recv.receive(0, b"replay".to_vec());
        assert!(recv.drain_ready().is_empty());
    }

    #[test]
    fn ack_bitmask_reflects_out_of_order_arrivals() {
        let mut recv = RecvWindow::new();
        recv.receive(2, b"third".to_vec());
        let bitmask = recv.ack_bitmask();
        assert!(bit_set(&bitmask, 2));
        assert!(!bit_set(&bitmask, 1));
    }
}
