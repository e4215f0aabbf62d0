//! Process-wide unique identifier allocation.
//!
//! Every connection, message, and room identifier comes out of one
//! [`IdAllocator`]. An identifier packs the wall clock and a sequence
//! counter into a single 64-bit value: `(millis_since_epoch << 16) | counter`.
//! The packed layout keeps identifiers strictly increasing and lets callers
//! recover a coarse timestamp without a lookup.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::time::now_millis;

/// Number of low bits reserved for the per-millisecond counter.
const COUNTER_BITS: u32 = 16;

/// Lock-free allocator of strictly increasing 64-bit identifiers.
#[derive(Debug, Default)]
pub struct IdAllocator {
    /// Last issued identifier, packed as `(millis << 16) | counter`.
    state: AtomicU64,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
        }
    }

    /// Issue the next identifier.
    ///
    /// When the wall clock has advanced past the stored millisecond the
    /// counter restarts at zero; otherwise the packed state is bumped by one,
    /// which exhausts the 16-bit counter space before borrowing from the next
    /// millisecond. A wall clock that jumps backwards is ignored entirely,
    /// so identifiers never decrease.
    pub fn next(&self) -> u64 {
        let mut last = self.state.load(Ordering::Relaxed);
        loop {
            let wall = (now_millis() as u64) << COUNTER_BITS;
            let candidate = if wall > last { wall } else { last + 1 };
            match self.state.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => last = observed,
            }
        }
    }

    /// Recover the millisecond timestamp embedded in an identifier.
    pub fn timestamp_of(id: u64) -> i64 {
        (id >> COUNTER_BITS) as i64
    }
}
