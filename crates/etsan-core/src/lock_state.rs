//! Per-lock release clocks.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::clock::VectorClock;
use crate::var_state::Address;

/// Clock of the last release of a lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockState {
    pub(crate) clock: VectorClock,
}

impl LockState {
    /// All-zero clock covering `threads` threads.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            clock: VectorClock::with_len(threads),
        }
    }

    #[must_use]
    pub fn with_clock(clock: VectorClock) -> Self {
        Self { clock }
    }

    #[must_use]
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }
}

/// Registry of every lock used so far.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<Address, LockState>>,
}

impl LockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the lock at `addr`, creating it with a zero clock sized to
    /// `threads` on first use.
    pub fn with_lock<R>(
        &self,
        addr: Address,
        threads: usize,
        f: impl FnOnce(&mut LockState) -> R,
    ) -> R {
        let mut locks = self.locks.lock();
        let state = locks.entry(addr).or_insert_with(|| LockState::new(threads));
        f(state)
    }

    #[must_use]
    pub fn get(&self, addr: Address) -> Option<LockState> {
        self.locks.lock().get(&addr).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
