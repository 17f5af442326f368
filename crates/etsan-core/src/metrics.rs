//! Event counters.
//!
//! Relaxed ordering throughout: the counters are advisory and never used for
//! synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-detector event counters.
#[derive(Debug)]
pub struct DetectorMetrics {
    /// Read transitions run.
    pub reads: AtomicU64,
    /// Write transitions run.
    pub writes: AtomicU64,
    /// Accesses skipped while only one thread was running.
    pub gated_accesses: AtomicU64,
    /// Accesses that flagged a location racy.
    pub races: AtomicU64,
    pub forks: AtomicU64,
    pub joins: AtomicU64,
    pub acquires: AtomicU64,
    pub releases: AtomicU64,
    /// Diagnostics emitted (call-stack mismatches, unimplemented hooks, ...).
    pub diagnostics: AtomicU64,
}

impl DetectorMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            gated_accesses: AtomicU64::new(0),
            races: AtomicU64::new(0),
            forks: AtomicU64::new(0),
            joins: AtomicU64::new(0),
            acquires: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            diagnostics: AtomicU64::new(0),
        }
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads: Self::get(&self.reads),
            writes: Self::get(&self.writes),
            gated_accesses: Self::get(&self.gated_accesses),
            races: Self::get(&self.races),
            forks: Self::get(&self.forks),
            joins: Self::get(&self.joins),
            acquires: Self::get(&self.acquires),
            releases: Self::get(&self.releases),
            diagnostics: Self::get(&self.diagnostics),
        }
    }
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`DetectorMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub gated_accesses: u64,
    pub races: u64,
    pub forks: u64,
    pub joins: u64,
    pub acquires: u64,
    pub releases: u64,
    pub diagnostics: u64,
}
