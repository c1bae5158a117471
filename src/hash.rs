//! Content hashing and staleness detection.
//!
//! Every stateful render object derives a content hash from its observable
//! fields ([`ContentHash`]) and remembers the hash that was current the last
//! time a render pass consumed it ([`HashSlot`]). An object is *stale* when
//! the two differ. This is the only change-detection mechanism in the
//! pipeline — there are no hand-maintained dirty flags on render objects.
//!
//! The render loop calls [`HashSlot::commit`] exactly once per pass that
//! consumes an object's current state.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHasher;

/// Hash seed for freshly created slots. Chosen so an object is stale until
/// its first commit even when its content hash happens to be zero.
const UNCOMMITTED: u64 = u64::MAX;

/// Computes a content hash over anything `Hash`.
pub fn fx_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Contract for objects that participate in staleness detection.
///
/// `content_hash` must be a pure function of the object's observable fields:
/// two calls with no mutation in between return the same value.
pub trait ContentHash {
    /// Hash of the current observable state.
    fn content_hash(&self) -> u64;
}

/// Stores the hash that was last committed by a render pass.
///
/// Lock-free so the render loop can commit while the event thread queries
/// staleness.
#[derive(Debug)]
pub struct HashSlot {
    last: AtomicU64,
}

impl Default for HashSlot {
    fn default() -> Self {
        Self {
            last: AtomicU64::new(UNCOMMITTED),
        }
    }
}

impl HashSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `hash` as the state a render pass has now consumed.
    pub fn commit(&self, hash: u64) {
        self.last.store(hash, Ordering::Release);
    }

    /// True when `current` differs from the last committed hash.
    pub fn is_stale(&self, current: u64) -> bool {
        self.last.load(Ordering::Acquire) != current
    }

    /// The last committed hash, or `None` before the first commit.
    pub fn committed(&self) -> Option<u64> {
        match self.last.load(Ordering::Acquire) {
            UNCOMMITTED => None,
            h => Some(h),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Hash)]
    struct Sample {
        text: String,
        size: u32,
    }

    impl ContentHash for Sample {
        fn content_hash(&self) -> u64 {
            fx_hash(self)
        }
    }

    #[test]
    fn hashing_is_idempotent() {
        let s = Sample { text: "Hi".into(), size: 12 };
        assert_eq!(s.content_hash(), s.content_hash());
    }

    #[test]
    fn fresh_slot_is_stale() {
        let s = Sample { text: "Hi".into(), size: 12 };
        let slot = HashSlot::new();
        assert!(slot.is_stale(s.content_hash()));
        assert_eq!(slot.committed(), None);
    }

    #[test]
    fn commit_clears_staleness_until_mutation() {
        let mut s = Sample { text: "Hi".into(), size: 12 };
        let slot = HashSlot::new();

        slot.commit(s.content_hash());
        assert!(!slot.is_stale(s.content_hash()));

        // any observable change flips staleness exactly once
        s.size = 13;
        assert!(slot.is_stale(s.content_hash()));

        slot.commit(s.content_hash());
        assert!(!slot.is_stale(s.content_hash()));
    }

    #[test]
    fn distinct_states_hash_differently() {
        let a = Sample { text: "Hi".into(), size: 12 };
        let b = Sample { text: "Ho".into(), size: 12 };
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
