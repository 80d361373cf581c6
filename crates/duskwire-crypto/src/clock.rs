//! Injectable monotonic clock (`Mono_Time` equivalent).
//!
//! Every timeout in the stack — DHT node staleness, cookie freshness, onion
//! path rotation, net-crypto connection timeout — is expressed as a delta
//! from this clock rather than a raw `Instant::now()` call, so tests can
//! freeze and advance time deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of monotonically non-decreasing milliseconds.
///
/// Implementations are not required to track wall-clock time; they only need
/// to be non-decreasing for the lifetime of the process using them.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since an implementation-defined epoch.
    fn now_ms(&self) -> u64;

    /// Current time in seconds, truncating.
    fn now_secs(&self) -> u64 {
        self.now_ms() / 1000
    }
}

/// The real system clock, backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only advances when told to. Used by tests to assert timeout
/// behavior without sleeping.
#[derive(Debug, Default)]
pub struct FrozenClock {
    millis: AtomicU64,
}

impl FrozenClock {
    /// Create a frozen clock starting at the given time.
    pub fn new(start_ms: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_ms),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Advance the clock by the given number of seconds.
    pub fn advance_secs(&self, delta_secs: u64) {
        self.advance_ms(delta_secs * 1000);
    }

    /// Set the clock to an absolute time.
    pub fn set_ms(&self, ms: u64) {
        self.millis.store(ms, Ordering::SeqCst);
    }
}

impl Clock for FrozenClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_nonzero() {
        let clock = SystemClock;
        assert!(clock.now_ms() > 0);
    }

    #[test]
    fn test_frozen_clock_advances() {
        let clock = FrozenClock::new(1000);
        assert_eq!(clock.now_ms(), 1000);
        clock.advance_secs(5);
        assert_eq!(clock.now_ms(), 6000);
        assert_eq!(clock.now_secs(), 6);
    }

    #[test]
    fn test_frozen_clock_set() {
        let clock = FrozenClock::new(0);
        clock.set_ms(42);
        assert_eq!(clock.now_ms(), 42);
    }
}
