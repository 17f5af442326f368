//! Per-address access history and its registry.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::clock::{Epoch, VectorClock};

/// Address of a monitored memory location.
pub type Address = usize;

/// Read history of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Reads since the last write are totally ordered; this is the latest.
    Exclusive(Epoch),
    /// Unordered readers exist; see [`VarState::shared_reads`].
    Shared,
}

/// FastTrack state of one memory location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarState {
    pub(crate) write: Epoch,
    pub(crate) read: ReadState,
    pub(crate) shared: Option<VectorClock>,
    pub(crate) racy: bool,
}

impl VarState {
    /// State created by the first access to a location.
    ///
    /// Both epochs start at the creator's zero epoch; the one matching the
    /// triggering access then takes the creator's real epoch.
    #[must_use]
    pub fn first_access(creator: Epoch, is_write: bool) -> Self {
        let zero = Epoch::zero(creator.owner());
        let (write, read) = if is_write { (creator, zero) } else { (zero, creator) };
        Self {
            write,
            read: ReadState::Exclusive(read),
            shared: None,
            racy: false,
        }
    }

    /// State with explicit epochs, for driving transitions directly.
    #[must_use]
    pub fn from_parts(write: Epoch, read: ReadState, shared: Option<VectorClock>) -> Self {
        Self {
            write,
            read,
            shared,
            racy: false,
        }
    }

    #[must_use]
    pub fn last_write(&self) -> Epoch {
        self.write
    }

    #[must_use]
    pub fn last_read(&self) -> ReadState {
        self.read
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.read == ReadState::Shared
    }

    /// Per-thread read epochs; allocated on the first switch to shared mode.
    #[must_use]
    pub fn shared_reads(&self) -> Option<&VectorClock> {
        self.shared.as_ref()
    }

    /// Once set, the location is never checked again.
    #[must_use]
    pub fn is_racy(&self) -> bool {
        self.racy
    }

    pub fn mark_racy(&mut self) {
        self.racy = true;
    }
}

/// Registry of every monitored location, guarded by a single lock.
#[derive(Debug, Default)]
pub struct VarRegistry {
    vars: Mutex<HashMap<Address, VarState>>,
}

impl VarRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the state of `addr` under the registry lock, creating it
    /// from `creator`'s epoch on first access. Lookup, creation and the
    /// transition form one critical section.
    pub fn with_var<R>(
        &self,
        addr: Address,
        creator: Epoch,
        is_write: bool,
        f: impl FnOnce(&mut VarState) -> R,
    ) -> R {
        let mut vars = self.vars.lock();
        let state = vars
            .entry(addr)
            .or_insert_with(|| VarState::first_access(creator, is_write));
        f(state)
    }

    #[must_use]
    pub fn get(&self, addr: Address) -> Option<VarState> {
        self.vars.lock().get(&addr).cloned()
    }

    /// Number of distinct locations seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of locations flagged racy.
    #[must_use]
    pub fn racy_count(&self) -> usize {
        self.vars.lock().values().filter(|v| v.racy).count()
    }
}
