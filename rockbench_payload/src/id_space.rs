//! The document id address space.
//!
//! [`IdSpace`] owns two numbers: `counter`, the next sequential id to hand
//! out, and `bound`, the exclusive upper limit of ids known to exist in the
//! destination. Updates and patches target `[0, bound)`. Both are touched by
//! every generation call and generation may happen from many tasks at once,
//! so both are atomics and every mutation is a single read-modify-write.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Width of the zero-padded decimal form of a numeric id.
pub const ID_WIDTH: usize = 24;

/// Render a numeric id in its fixed-width decimal form.
#[must_use]
pub fn format_id(id: u64) -> String {
    format!("{id:0width$}", width = ID_WIDTH)
}

/// Shared id allocation state for one run.
#[derive(Debug, Default)]
pub struct IdSpace {
    counter: AtomicU64,
    bound: AtomicU64,
}

impl IdSpace {
    /// Create an empty id space: no ids issued, none known to exist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next sequential id.
    pub fn next_sequential(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel)
    }

    /// Claim the next sequential id in its fixed-width form.
    pub fn next_sequential_id(&self) -> String {
        format_id(self.next_sequential())
    }

    /// Declare that ids `[0, n)` exist.
    ///
    /// The counter is raised to at least `n` before the bound is published,
    /// so a caller that observes the new bound also observes `counter >= n`
    /// and sequential ids never collide with seeded ones.
    pub fn set_bound(&self, n: u64) {
        self.counter.fetch_max(n, Ordering::AcqRel);
        self.bound.store(n, Ordering::Release);
    }

    /// The exclusive upper limit of addressable ids.
    pub fn bound(&self) -> u64 {
        self.bound.load(Ordering::Acquire)
    }

    /// The next id [`IdSpace::next_sequential`] will return.
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Choose an id for a mixed-mode document.
    ///
    /// With probability `update_percentage / 100` an existing id is drawn
    /// uniformly from `[0, bound)` and `false` is returned. Otherwise `bound`
    /// is claimed as a brand-new id, the bound advances by one and `true` is
    /// returned. An empty space always inserts.
    ///
    /// The counter follows the bound only after the insert is claimed, so
    /// mixed runs must not also draw sequential ids.
    pub fn mixed_mode_id<R>(&self, rng: &mut R, update_percentage: u8) -> (u64, bool)
    where
        R: Rng + ?Sized,
    {
        let bound = self.bound();
        let update = bound > 0
            && update_percentage > 0
            && rng.random_range(0..100u8) < update_percentage.min(100);
        if update {
            return (rng.random_range(0..bound), false);
        }

        let id = self.bound.fetch_add(1, Ordering::AcqRel);
        self.counter.fetch_max(id + 1, Ordering::AcqRel);
        (id, true)
    }
}
