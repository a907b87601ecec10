//! Thread-local scratch buffers for the per-region subproblems.
//!
//! The worst-case redistribution runs once per source region per outer
//! iteration; reusing its sort and value buffers avoids an allocation
//! storm in the parallel sweeps. Buffers live in thread-local storage,
//! are reset before each use, and never cross thread boundaries.

use std::cell::RefCell;

thread_local! {
    static SCRATCH: RefCell<SynthScratch> = RefCell::new(SynthScratch::default());
}

/// Reusable buffers for one worker thread.
#[derive(Debug, Default)]
pub struct SynthScratch {
    /// Entry indices, sorted by value during the greedy fill.
    pub order: Vec<usize>,
    /// Logical indices of the active column entries.
    pub idx: Vec<usize>,
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
    pub val: Vec<f64>,
}

impl SynthScratch {
    /// Empty all buffers, keeping their capacity.
    pub fn reset(&mut self) {
        self.order.clear();
        self.idx.clear();
        self.lo.clear();
        self.hi.clear();
        self.val.clear();
    }
}

/// Run `f` with this thread's scratch space, reset beforehand.
pub fn with_scratch<R>(f: impl FnOnce(&mut SynthScratch) -> R) -> R {
    SCRATCH.with(|cell| {
        let mut scratch = cell.borrow_mut();
        scratch.reset();
        f(&mut scratch)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_is_reset_between_uses() {
        with_scratch(|s| {
            s.idx.push(7);
            s.lo.push(0.5);
        });
        with_scratch(|s| {
            assert!(s.idx.is_empty());
            assert!(s.lo.is_empty());
        });
    }

    #[test]
    fn test_scratch_keeps_capacity() {
        with_scratch(|s| {
            s.val.reserve(1024);
        });
        with_scratch(|s| {
            assert!(s.val.capacity() >= 1024);
        });
    }
}
