//! Per-direction nonce accounting for net-crypto data packets (§4.5).
//!
//! Each direction of a session has its own 24-byte base nonce, fixed at
//! handshake time, and a monotonically increasing packet counter. Only the
//! counter's low 16 bits travel on the wire; the full counter — and hence
//! the full nonce — is reconstructed on the receive side against the
//! highest counter seen so far, the same rollover-disambiguation trick used
//! to extend a 16-bit RTP sequence number. Duplicate/replayed counters are
//! caught by [`duskwire_crypto::nonce::ReplayWindow`].

use duskwire_crypto::nonce::{ReplayWindow, NONCE_SIZE};

/// Derive the full 24-byte nonce for `counter` by adding it to `base_nonce`
/// as a big-endian 192-bit integer, the same arithmetic
/// `increment_nonce_number` uses but generalized to a 64-bit increment.
pub fn nonce_for_counter(base_nonce: &[u8; NONCE_SIZE], counter: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *base_nonce;
    let mut carry = counter;
    for byte in nonce.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = *byte as u64 + (carry & 0xff);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    nonce
}

/// Recover the full counter whose low 16 bits are `low_word`, choosing
/// whichever of the neighboring rollover epochs lands closest to `highest`.
fn reconstruct_counter(highest: u64, low_word: u16) -> u64 {
    let epoch = highest >> 16;
    let candidates = [epoch.saturating_sub(1), epoch, epoch + 1];
    candidates
        .into_iter()
        .map(|e| e * 0x1_0000 + low_word as u64)
        .min_by_key(|&candidate| candidate.abs_diff(highest))
        .expect("candidates is non-empty")
}

/// Send-side counter: hands out the next value and the nonce it encodes.
#[derive(Debug, Clone)]
pub struct SendNonceCounter {
    base_nonce: [u8; NONCE_SIZE],
    next: u64,
}

impl SendNonceCounter {
    pub fn new(base_nonce: [u8; NONCE_SIZE]) -> Self {
        Self { base_nonce, next: 0 }
    }

    /// Allocate the next counter/nonce pair and the 2-byte wire encoding of
    /// its low word.
    pub fn next(&mut self) -> (u64, [u8; NONCE_SIZE], [u8; 2]) {
        let counter = self.next;
        self.next += 1;
        let nonce = nonce_for_counter(&self.base_nonce, counter);
        let low_word = (counter & 0xffff) as u16;
        (counter, nonce, low_word.to_be_bytes())
    }
}

/// Receive-side counter/replay tracking for one direction.
#[derive(Debug, Clone)]
pub struct RecvNonceWindow {
    base_nonce: [u8; NONCE_SIZE],
    window: ReplayWindow,
}

impl RecvNonceWindow {
    pub fn new(base_nonce: [u8; NONCE_SIZE]) -> Self {
        Self {
            base_nonce,
            window: ReplayWindow::new(),
        }
    }

    /// Reconstruct the nonce for an incoming packet's 2-byte low word and
    /// check it for replay, recording it if accepted. Returns `None` for a
    /// replay or out-of-window counter.
    pub fn accept(&mut self, low_word_bytes: [u8; 2]) -> Option<(u64, [u8; NONCE_SIZE])> {
        let low_word = u16::from_be_bytes(low_word_bytes);
        let counter = match self.window.highest() {
            Some(highest) => reconstruct_counter(highest, low_word),
            None => low_word as u64,
        };
        if !self.window.check_and_record(counter) {
            return None;
        }
        Some((counter, nonce_for_counter(&self.base_nonce, counter)))
    }
}
