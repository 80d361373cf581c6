//! Cache of precomputed X25519 shared keys, since key generation is the
//! dominant CPU cost of DHT packet processing (§4.1).
//!
//! Structure: 256 slots keyed by the first byte of the peer's public key;
//! each slot holds `keys_per_slot` entries with last-use timestamps. Lookup
//! is a linear scan of the slot; on miss the shared key is computed and
//! inserted, evicting the least-recently-used entry if the slot is full.
//! Entries older than `timeout` are treated as absent. The cache is bound to
//! a single self secret key fixed at construction.

use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::secretbox::{PrecomputedKey, PublicKey, SecretKey};

const SLOT_COUNT: usize = 256;

struct Entry {
    public_key: [u8; 32],
    shared_key: Arc<PrecomputedKey>,
    last_used_ms: u64,
}

/// LRU-ish cache of precomputed shared keys, bound to one secret key.
pub struct SharedKeyCache {
    secret_key: SecretKey,
    clock: Arc<dyn Clock>,
    timeout_ms: u64,
    keys_per_slot: usize,
    slots: Mutex<Vec<Vec<Entry>>>,
}

impl SharedKeyCache {
    /// Create a new cache.
    ///
    /// * `secret_key` — our secret key; must not change during the cache's lifetime.
    /// * `timeout_ms` — milliseconds after which a cached key is evicted as stale.
    /// * `keys_per_slot` — entries retained per first-byte slot.
    pub fn new(secret_key: SecretKey, clock: Arc<dyn Clock>, timeout_ms: u64, keys_per_slot: usize) -> Self {
        let mut slots = Vec::with_capacity(SLOT_COUNT);
        slots.resize_with(SLOT_COUNT, Vec::new);
        Self {
            secret_key,
            clock,
            timeout_ms,
            keys_per_slot,
            slots: Mutex::new(slots),
        }
    }

    /// Look up (or compute and insert) the shared key for `public_key`.
    pub fn lookup(&self, public_key: &PublicKey) -> Arc<PrecomputedKey> {
        let bytes = public_key.to_bytes();
        let slot_idx = bytes[0] as usize;
        let now = self.clock.now_ms();

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = &mut slots[slot_idx];

        if let Some(pos) = slot.iter().position(|e| e.public_key == bytes) {
            if now.saturating_sub(slot[pos].last_used_ms) <= self.timeout_ms {
                slot[pos].last_used_ms = now;
                return Arc::clone(&slot[pos].shared_key);
            }
            slot.remove(pos);
        }

        let shared_key = Arc::new(self.secret_key.precompute(public_key));
        if slot.len() >= self.keys_per_slot {
            // Evict least-recently-used.
            if let Some((lru_pos, _)) = slot
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used_ms)
            {
                slot.remove(lru_pos);
            }
        }
        slot.push(Entry {
            public_key: bytes,
            shared_key: Arc::clone(&shared_key),
            last_used_ms: now,
        });
        shared_key
    }

    /// Number of currently cached entries across all slots.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;

    fn make_cache(timeout_ms: u64, keys_per_slot: usize) -> (SharedKeyCache, Arc<FrozenClock>) {
        let clock = Arc::new(FrozenClock::new(0));
        let cache = SharedKeyCache::new(SecretKey::generate(), clock.clone(), timeout_ms, keys_per_slot);
        (cache, clock)
    }

    #[test]
    fn test_lookup_computes_on_miss() {
        let (cache, _clock) = make_cache(60_000, 4);
        let peer = SecretKey::generate().public_key();
        assert_eq!(cache.len(), 0);
        cache.lookup(&peer);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lookup_reuses_cached_entry() {
        let (cache, _clock) = make_cache(60_000, 4);
        let peer = SecretKey::generate().public_key();
        let k1 = cache.lookup(&peer);
        let k2 = cache.lookup(&peer);
        assert!(Arc::ptr_eq(&k1, &k2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stale_entry_recomputed() {
        let (cache, clock) = make_cache(1_000, 4);
        let peer = SecretKey::generate().public_key();
        let k1 = cache.lookup(&peer);
        clock.advance_ms(2_000);
        let k2 = cache.lookup(&peer);
        assert!(!Arc::ptr_eq(&k1, &k2));
    }

    #[test]
    fn test_eviction_when_slot_full() {
        let (cache, _clock) = make_cache(60_000, 2);
        // Force 3 entries into the same slot by fixing the first key byte.
        let mut peers = Vec::new();
        loop {
            let candidate = SecretKey::generate().public_key();
            if peers.is_empty() || candidate.to_bytes()[0] == peers[0] {
                peers.push(candidate.to_bytes()[0]);
            }
            if peers.len() >= 3 {
                break;
            }
            if peers.len() > 50 {
                break; // pragmatic bound for a probabilistic test
            }
        }
        // Regardless of collisions, inserting more than keys_per_slot distinct
        // keys into one slot never grows that slot's entry count past the cap.
        let fixed_byte = 0x42u8;
        for i in 0..5u8 {
            let mut bytes = [0u8; 32];
            bytes[0] = fixed_byte;
            bytes[1] = i;
            let pk = PublicKey::from_bytes(bytes);
            cache.lookup(&pk);
        }
        assert!(cache.len() <= 2);
    }
}
