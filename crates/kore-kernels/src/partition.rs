//! Deterministic split of an element count across worker threads.
//!
//! Each thread gets `element_count / thread_count` elements, and the
//! first `element_count % thread_count` threads take one extra element
//! each. Ranges are contiguous, ordered by thread index, and their sizes
//! differ by at most one.

use std::num::NonZeroUsize;
use std::ops::Range;

/// Per-thread work split for one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    element_count: usize,
    thread_count: NonZeroUsize,
    elements_per_thread: usize,
    remainder_elements: usize,
}

impl Partition {
    pub fn new(element_count: usize, thread_count: NonZeroUsize) -> Self {
        let threads = thread_count.get();
        Self {
            element_count,
            thread_count,
            elements_per_thread: element_count / threads,
            remainder_elements: element_count % threads,
        }
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count.get()
    }

    pub fn elements_per_thread(&self) -> usize {
        self.elements_per_thread
    }

    pub fn remainder_elements(&self) -> usize {
        self.remainder_elements
    }

    /// Half-open element range assigned to `thread`.
    ///
    /// Panics if `thread >= thread_count`.
    pub fn range(&self, thread: usize) -> Range<usize> {
        assert!(
            thread < self.thread_count(),
            "thread {} out of {} threads",
            thread,
            self.thread_count()
        );
        let start = thread * self.elements_per_thread + thread.min(self.remainder_elements);
        let len = self.elements_per_thread + usize::from(thread < self.remainder_elements);
        start..start + len
    }

    /// All thread ranges in thread order; empty ranges included.
    pub fn ranges(&self) -> impl ExactSizeIterator<Item = Range<usize>> + '_ {
        (0..self.thread_count()).map(move |t| self.range(t))
    }
}
