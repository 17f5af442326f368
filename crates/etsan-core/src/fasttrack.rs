//! FastTrack transitions.
//!
//! Pure functions over already-locked state; callers provide the critical
//! sections. Access transitions return the finding that flagged the location
//! racy, or `None`.
//!
//! | event | fast path | slow path |
//! |---|---|---|
//! | read | same epoch as last read | exclusive -> shared promotion |
//! | write | same epoch as last write | scan of the shared read clock |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::{Epoch, ThreadId, VectorClock};
use crate::lock_state::LockState;
use crate::thread_state::ThreadState;
use crate::var_state::{ReadState, VarState};

/// Which ordering check decided a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RaceKind {
    /// Read not ordered after the last write.
    WriteRead,
    /// Write not ordered after the last write.
    WriteWrite,
    /// Write not ordered after the exclusive last read.
    ReadWrite,
    /// Write not ordered after one of several unordered reads.
    SharedReadWrite,
}

impl RaceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WriteRead => "write-read",
            Self::WriteWrite => "write-write",
            Self::ReadWrite => "read-write",
            Self::SharedReadWrite => "shared-read-write",
        }
    }
}

impl fmt::Display for RaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected happens-before violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceFinding {
    pub kind: RaceKind,
    /// Owner of the prior access the current one is unordered with.
    pub conflict: ThreadId,
}

/// True when `prior` came from another thread and `t` has not observed it.
fn unordered(prior: Epoch, t: &ThreadState) -> bool {
    prior.owner() != t.tid() && !t.clock().dominates(prior)
}

/// Read of `x` by `t`.
pub fn read(x: &mut VarState, t: &ThreadState) -> Option<RaceFinding> {
    if x.racy {
        return None;
    }
    if x.read == ReadState::Exclusive(t.epoch()) {
        return None;
    }

    let finding = unordered(x.write, t).then_some(RaceFinding {
        kind: RaceKind::WriteRead,
        conflict: x.write.owner(),
    });

    match x.read {
        ReadState::Shared => {
            x.shared
                .get_or_insert_with(|| VectorClock::with_len(t.clock().len()))
                .set(t.epoch());
        }
        ReadState::Exclusive(prev) if t.clock().dominates(prev) => {
            x.read = ReadState::Exclusive(t.epoch());
        }
        ReadState::Exclusive(prev) => {
            let shared = x
                .shared
                .get_or_insert_with(|| VectorClock::with_len(t.clock().len()));
            shared.set(prev);
            shared.set(t.epoch());
            x.read = ReadState::Shared;
        }
    }

    if finding.is_some() {
        x.racy = true;
    }
    finding
}

/// Write of `x` by `t`.
pub fn write(x: &mut VarState, t: &ThreadState) -> Option<RaceFinding> {
    if x.racy {
        return None;
    }
    if x.write == t.epoch() {
        return None;
    }

    let mut finding = unordered(x.write, t).then_some(RaceFinding {
        kind: RaceKind::WriteWrite,
        conflict: x.write.owner(),
    });

    match x.read {
        ReadState::Exclusive(prev) => {
            if finding.is_none() && unordered(prev, t) {
                finding = Some(RaceFinding {
                    kind: RaceKind::ReadWrite,
                    conflict: prev.owner(),
                });
            }
        }
        ReadState::Shared => {
            if let Some(shared) = x.shared.as_mut() {
                let span = shared.len().min(t.clock().len());
                let stale = shared.as_slice()[..span]
                    .iter()
                    .find(|reader| reader.clock() > t.clock().clock_of(reader.owner()));
                if finding.is_none()
                    && let Some(reader) = stale
                {
                    finding = Some(RaceFinding {
                        kind: RaceKind::SharedReadWrite,
                        conflict: reader.owner(),
                    });
                }
                shared.reset();
            }
            // The read history collapses to the writer's zero epoch, not its
            // current one.
            x.read = ReadState::Exclusive(Epoch::zero(t.tid()));
        }
    }

    x.write = t.epoch();

    if finding.is_some() {
        x.racy = true;
    }
    finding
}

/// `t` acquires `lock`: `C_t := C_t join L`.
pub fn acquire(t: &mut ThreadState, lock: &mut LockState) {
    VectorClock::extend_pair(&mut t.clock, &mut lock.clock);
    t.clock.join(&lock.clock);
    t.refresh_epoch();
}

/// `t` releases `lock`: `L := C_t`, then `t` ticks.
pub fn release(t: &mut ThreadState, lock: &mut LockState) {
    VectorClock::extend_pair(&mut t.clock, &mut lock.clock);
    lock.clock.copy_from(&t.clock);
    t.increment();
}

/// `parent` starts `child`: `C_child := C_child join C_parent`, then the
/// parent ticks.
pub fn fork(parent: &mut ThreadState, child: &mut ThreadState) {
    VectorClock::extend_pair(&mut parent.clock, &mut child.clock);
    child.clock.join(&parent.clock);
    child.refresh_epoch();
    parent.increment();
}

/// `parent` joins `child`: `C_parent := C_parent join C_child`, then the child
/// ticks so a reused thread id is ordered after the join.
pub fn join(parent: &mut ThreadState, child: &mut ThreadState) {
    VectorClock::extend_pair(&mut parent.clock, &mut child.clock);
    parent.clock.join(&child.clock);
    parent.refresh_epoch();
    child.increment();
}
