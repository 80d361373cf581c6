//! Anti-amplification queue for newly-heard, unauthenticated nodes (§4.2).
//!
//! A node heard from an unsolicited or unauthenticated source (e.g. inside
//! someone else's nodes-response) is not admitted straight into a close
//! list: it's queued here, pinged at `TIME_TO_PING` cadence, and only
//! promoted to a close list once it returns a verified pong.

use duskwire_crypto::blake3::xor_distance;

/// Bound on the anti-amplification queue (arbitrary but finite, per §4.2:
/// "bounded; when full, the entry farthest from self is replaced").
pub const TO_PING_CAPACITY: usize = 64;

/// Minimum spacing between pings to the same queued candidate.
pub const TIME_TO_PING_MS: u64 = 2_000;

struct QueuedNode {
    public_key: [u8; 32],
    ip_port_hint: duskwire_types::addr::IpPort,
    queued_at_ms: u64,
    last_pinged_ms: Option<u64>,
}

/// Bounded FIFO-ish queue of unverified candidates awaiting a pong.
pub struct PingQueue {
    self_key: [u8; 32],
    entries: Vec<QueuedNode>,
}

impl PingQueue {
    pub fn new(self_key: [u8; 32]) -> Self {
        Self {
            self_key,
            entries: Vec::with_capacity(TO_PING_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue a candidate heard about but not yet verified. When full, the
    /// entry farthest from `self_key` is replaced if the candidate is closer.
    pub fn push(
        &mut self,
        public_key: [u8; 32],
        ip_port_hint: duskwire_types::addr::IpPort,
        now_ms: u64,
    ) {
        if self.entries.iter().any(|e| e.public_key == public_key) {
            return;
        }

        let node = QueuedNode {
            public_key,
            ip_port_hint,
            queued_at_ms: now_ms,
            last_pinged_ms: None,
        };

        if self.entries.len() < TO_PING_CAPACITY {
            self.entries.push(node);
            return;
        }

        let candidate_distance = xor_distance(&self.self_key, &public_key);
        if let Some((idx, farthest_distance)) = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, xor_distance(&self.self_key, &e.public_key)))
            .max_by_key(|(_, d)| *d)
        {
            if candidate_distance < farthest_distance {
                self.entries[idx] = node;
            }
        }
    }

    /// Candidates due for a ping at `TIME_TO_PING` cadence, marking them pinged.
    pub fn due_for_ping(&mut self, now_ms: u64) -> Vec<([u8; 32], duskwire_types::addr::IpPort)> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            let should_ping = match entry.last_pinged_ms {
                None => true,
                Some(last) => now_ms.saturating_sub(last) >= TIME_TO_PING_MS,
            };
            if should_ping {
                entry.last_pinged_ms = Some(now_ms);
                due.push((entry.public_key, entry.ip_port_hint));
            }
        }
        due
    }

    /// Remove and return a candidate that has returned a verified pong, so
    /// the caller can promote it into a close list.
    pub fn take_verified(&mut self, public_key: &[u8; 32]) -> Option<duskwire_types::addr::IpPort> {
        let idx = self.entries.iter().position(|e| &e.public_key == public_key)?;
        Some(self.entries.remove(idx).ip_port_hint)
    }

    #[cfg(test)]
    fn queued_at(&self, public_key: &[u8; 32]) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| &e.public_key == public_key)
            .map(|e| e.queued_at_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn hint() -> duskwire_types::addr::IpPort {
        duskwire_types::addr::IpPort::from_v4(Ipv4Addr::LOCALHOST, 33445)
    }

    #[test]
    fn push_and_promote() {
        let mut q = PingQueue::new([0u8; 32]);
        q.push([1u8; 32], hint(), 0);
        assert_eq!(q.len(), 1);
        assert!(q.take_verified(&[1u8; 32]).is_some());
        assert!(q.is_empty());
    }

    #[test]
    fn duplicate_push_ignored() {
        let mut q = PingQueue::new([0u8; 32]);
        q.push([1u8; 32], hint(), 0);
        q.push([1u8; 32], hint(), 10);
        assert_eq!(q.len(), 1);
        assert_eq!(q.queued_at(&[1u8; 32]), Some(0));
    }

    #[test]
    fn due_for_ping_respects_cadence() {
        let mut q = PingQueue::new([0u8; 32]);
        q.push([1u8; 32], hint(), 0);
        let due1 = q.due_for_ping(0);
        assert_eq!(due1.len(), 1);
        let due2 = q.due_for_ping(100);
        assert!(due2.is_empty());
        let due3 = q.due_for_ping(TIME_TO_PING_MS);
        assert_eq!(due3.len(), 1);
    }

    #[test]
    fn full_queue_replaces_farther_entry() {
        let mut q = PingQueue::new([0u8; 32]);
        for i in 0..TO_PING_CAPACITY as u8 {
            let mut pk = [0xffu8; 32];
            pk[0] = i;
            q.push(pk, hint(), 0);
        }
        assert_eq!(q.len(), TO_PING_CAPACITY);
        q.push([0x01u8; 32], hint(), 0);
        assert_eq!(q.len(), TO_PING_CAPACITY);
        assert!(q.take_verified(&[0x01u8; 32]).is_some());
    }
}
