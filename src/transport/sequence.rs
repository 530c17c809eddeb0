use std::sync::atomic::{AtomicI32, Ordering};

use rand::Rng;

const SEED_RANGE: std::ops::Range<i32> = 0x10000..0x20000;

/// Hands out request sequence numbers.
#[derive(Debug)]
pub struct SequenceAllocator {
    next: AtomicI32,
}

impl SequenceAllocator {
    /// Seeded from a random point in `[0x10000, 0x20000)`.
    pub fn new() -> Self {
        Self::starting_at(rand::thread_rng().gen_range(SEED_RANGE))
    }

    pub fn starting_at(seed: i32) -> Self {
        Self {
            next: AtomicI32::new(seed),
        }
    }

    /// Returns the current value and advances, wrapping at `i32::MAX`.
    pub fn next(&self) -> i32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}
