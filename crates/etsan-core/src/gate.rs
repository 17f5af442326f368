//! Concurrency gate: access checks are skipped while only one thread runs.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Count of forked-but-not-joined threads.
#[derive(Debug, Default)]
pub struct ConcurrencyGate {
    active: AtomicUsize,
}

impl ConcurrencyGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
        }
    }

    /// A thread was forked. Returns the new count.
    pub fn open(&self) -> usize {
        self.active.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// A thread was joined. Floors at zero; returns `false` on underflow.
    pub fn close(&self) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.count() > 0
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}
