//! K-bucket / "close list" (§3 "K-bucket (client list)", §4.2).
//!
//! Unlike classic Kademlia's 256 prefix-length buckets, each close list here
//! is a single fixed-capacity list sorted by XOR distance to one target key.
//! The DHT keeps one such list toward its own key (for being findable) and
//! one per friend (for reaching that friend) — see [`crate::routing`].

use duskwire_crypto::blake3::xor_distance;
use duskwire_types::dht::DhtNodeEntry;

/// Fixed capacity of a close list (§3).
pub const CLOSE_LIST_CAPACITY: usize = 8;

/// Outcome of attempting to insert a candidate into a close list.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Inserted with room to spare.
    Inserted,
    /// An existing entry for this key was refreshed in place.
    Updated,
    /// Inserted by evicting the named bad (timed-out) entry.
    EvictedBad([u8; 32]),
    /// Inserted by evicting the named entry, which was farther from the
    /// target than the candidate.
    EvictedFarther([u8; 32]),
    /// List is full and the candidate is farther from target than every
    /// existing entry; candidate dropped.
    Dropped,
}

/// A fixed-capacity list of nodes sorted by closeness to `target`.
pub struct CloseList {
    target: [u8; 32],
    entries: Vec<DhtNodeEntry>,
}

impl CloseList {
    pub fn new(target: [u8; 32]) -> Self {
        Self {
            target,
            entries: Vec::with_capacity(CLOSE_LIST_CAPACITY),
        }
    }

    pub fn target(&self) -> &[u8; 32] {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DhtNodeEntry> {
        self.entries.iter()
    }

    fn distance_to_target(&self, pk: &[u8; 32]) -> [u8; 32] {
        xor_distance(&self.target, pk)
    }

    fn position_of(&self, pk: &[u8; 32]) -> Option<usize> {
        self.entries.iter().position(|e| &e.public_key == pk)
    }

    fn sort(&mut self) {
        let target = self.target;
        self.entries.sort_by(|a, b| {
            xor_distance(&target, &a.public_key).cmp(&xor_distance(&target, &b.public_key))
        });
    }

    /// Try to insert or refresh `candidate`, applying the §4.2 eviction rule:
    /// replace the worst bad entry if any exists; else replace the entry
    /// farthest from target if the candidate is closer; else, if the list
    /// still has room, insert; else drop.
    pub fn insert(&mut self, candidate: DhtNodeEntry, now_ms: u64) -> InsertOutcome {
        if let Some(idx) = self.position_of(&candidate.public_key) {
            self.entries[idx] = candidate;
            self.sort();
            return InsertOutcome::Updated;
        }

        if self.entries.len() < CLOSE_LIST_CAPACITY {
            self.entries.push(candidate);
            self.sort();
            return InsertOutcome::Inserted;
        }

        // Full: find the worst (farthest) bad entry, if any.
        let worst_bad = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_bad(now_ms))
            .max_by_key(|(_, e)| self.distance_to_target(&e.public_key));

        if let Some((idx, _)) = worst_bad {
            let evicted = self.entries[idx].public_key;
            self.entries[idx] = candidate;
            self.sort();
            return InsertOutcome::EvictedBad(evicted);
        }

        // No bad entries: replace farthest if candidate is closer.
        let candidate_distance = self.distance_to_target(&candidate.public_key);
        let farthest_idx = self
            .entries
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| self.distance_to_target(&e.public_key))
            .map(|(idx, _)| idx)
            .expect("list is full, at least one entry exists");

        let farthest_distance = self.distance_to_target(&self.entries[farthest_idx].public_key);
        if candidate_distance < farthest_distance {
            let evicted = self.entries[farthest_idx].public_key;
            self.entries[farthest_idx] = candidate;
            self.sort();
            InsertOutcome::EvictedFarther(evicted)
        } else {
            InsertOutcome::Dropped
        }
    }

    pub fn remove(&mut self, pk: &[u8; 32]) -> Option<DhtNodeEntry> {
        let idx = self.position_of(pk)?;
        Some(self.entries.remove(idx))
    }

    /// Up to `count` entries closest to `target`, already sorted.
    pub fn closest(&self, count: usize) -> Vec<&DhtNodeEntry> {
        self.entries.iter().take(count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(byte: u8, last_seen_ms: Option<u64>) -> DhtNodeEntry {
        let mut e = DhtNodeEntry::new([byte; 32]);
        e.last_seen_v4_ms = last_seen_ms;
        e
    }

    #[test]
    fn inserts_up_to_capacity() {
        let mut list = CloseList::new([0u8; 32]);
        for i in 1..=CLOSE_LIST_CAPACITY as u8 {
            let outcome = list.insert(entry(i, Some(0)), 0);
            assert_eq!(outcome, InsertOutcome::Inserted);
        }
        assert_eq!(list.len(), CLOSE_LIST_CAPACITY);
    }

    #[test]
    fn duplicate_key_updates_in_place() {
        let mut list = CloseList::new([0u8; 32]);
        list.insert(entry(1, Some(0)), 0);
        let outcome = list.insert(entry(1, Some(100)), 100);
        assert_eq!(outcome, InsertOutcome::Updated);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn full_list_evicts_bad_entry_first() {
        let mut list = CloseList::new([0u8; 32]);
        for i in 1..=CLOSE_LIST_CAPACITY as u8 {
            list.insert(entry(i, Some(0)), 0);
        }
        // Age entry 1 far past BAD_NODE_TIMEOUT.
        let now = duskwire_types::dht::BAD_NODE_TIMEOUT_MS + 1;
        let outcome = list.insert(entry(200, Some(now)), now);
        assert!(matches!(outcome, InsertOutcome::EvictedBad(pk) if pk == [1u8; 32]));
        assert_eq!(list.len(), CLOSE_LIST_CAPACITY);
    }

    #[test]
    fn full_list_with_no_bad_entries_evicts_farther_only_if_closer() {
        let target = [0u8; 32];
        let mut list = CloseList::new(target);
        // Fill with entries far from target (high first byte), all fresh.
        for i in 0..CLOSE_LIST_CAPACITY as u8 {
            let mut pk = [0xffu8; 32];
            pk[0] = 0xf0 + i;
            let mut e = DhtNodeEntry::new(pk);
            e.last_seen_v4_ms = Some(0);
            list.insert(e, 0);
        }
        // A much closer candidate should evict the farthest entry.
        let mut closer = DhtNodeEntry::new([0x01u8; 32]);
        closer.last_seen_v4_ms = Some(0);
        let outcome = list.insert(closer, 0);
        assert!(matches!(outcome, InsertOutcome::EvictedFarther(_)));

        // A farther candidate than everything present is dropped.
        let mut farther = DhtNodeEntry::new([0xffu8; 32]);
        farther.last_seen_v4_ms = Some(0);
        let outcome2 = list.insert(farther, 0);
        assert_eq!(outcome2, InsertOutcome::Dropped);
    }

    #[test]
    fn closest_returns_sorted_order() {
        let mut list = CloseList::new([0u8; 32]);
        list.insert(entry(0x10, Some(0)), 0);
        list.insert(entry(0x01, Some(0)), 0);
        list.insert(entry(0x80, Some(0)), 0);
        let closest = list.closest(3);
        assert_eq!(closest[0].public_key[0], 0x01);
        assert_eq!(closest[2].public_key[0], 0x80);
    }
}
