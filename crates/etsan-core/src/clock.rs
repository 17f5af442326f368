//! Epochs and vector clocks.
//!
//! An [`Epoch`] names "thread `owner`'s `clock`-th logical event". A
//! [`VectorClock`] holds one epoch per known thread; slot `i` is always owned
//! by thread `i`, so comparisons inside a clock reduce to comparing the clock
//! component. Clocks only grow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical clock component of an epoch.
pub type Clock = u32;

/// Sequential internal thread index, assigned on first observation.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// Slot index of this thread inside a vector clock.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `(owner, clock)` timestamp.
///
/// Two epochs are only ordered against each other when they share an owner;
/// anything else goes through a [`VectorClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Epoch {
    owner: ThreadId,
    clock: Clock,
}

impl Epoch {
    #[must_use]
    pub const fn new(owner: ThreadId, clock: Clock) -> Self {
        Self { owner, clock }
    }

    /// The epoch `(owner, 0)`: nothing has happened on `owner` yet.
    #[must_use]
    pub const fn zero(owner: ThreadId) -> Self {
        Self { owner, clock: 0 }
    }

    #[must_use]
    pub const fn owner(self) -> ThreadId {
        self.owner
    }

    #[must_use]
    pub const fn clock(self) -> Clock {
        self.clock
    }

    /// Next event of the same owner. Saturates instead of wrapping.
    #[must_use]
    pub const fn tick(self) -> Self {
        Self {
            owner: self.owner,
            clock: self.clock.saturating_add(1),
        }
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.clock, self.owner)
    }
}

/// Ordered per-thread knowledge: slot `i` holds the latest epoch of thread `i`
/// that the clock's holder has observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    slots: Vec<Epoch>,
}

impl VectorClock {
    /// Empty clock covering no threads.
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Fresh clock covering `len` threads, every slot at its zero epoch.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        let mut clock = Self::new();
        clock.extend(len);
        clock
    }

    /// Builds a clock from raw clock values, slot `i` owned by thread `i`.
    #[must_use]
    pub fn from_clocks(clocks: &[Clock]) -> Self {
        Self {
            slots: clocks
                .iter()
                .enumerate()
                .map(|(i, &c)| Epoch::new(ThreadId::from_index(i), c))
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Epoch stored for `tid`. Slots past the end read as `(tid, 0)`.
    #[must_use]
    pub fn get(&self, tid: ThreadId) -> Epoch {
        self.slots
            .get(tid.index())
            .copied()
            .unwrap_or(Epoch::zero(tid))
    }

    /// Clock component stored for `tid`.
    #[must_use]
    pub fn clock_of(&self, tid: ThreadId) -> Clock {
        self.get(tid).clock()
    }

    /// Stores `epoch` in its owner's slot, growing the clock if needed.
    pub fn set(&mut self, epoch: Epoch) {
        let idx = epoch.owner().index();
        self.extend(idx + 1);
        self.slots[idx] = epoch;
    }

    /// Appends zero epochs for indices `len() .. n`. No-op when `n <= len()`.
    pub fn extend(&mut self, n: usize) {
        let start = self.slots.len();
        if n <= start {
            return;
        }
        self.slots.reserve(n - start);
        self.slots
            .extend((start..n).map(|i| Epoch::zero(ThreadId::from_index(i))));
    }

    /// Grows both clocks to the longer of the two lengths.
    pub fn extend_pair(a: &mut Self, b: &mut Self) {
        let len = a.len().max(b.len());
        a.extend(len);
        b.extend(len);
    }

    /// Elementwise max over the common range: `self[i] = max(self[i], other[i])`.
    pub fn join(&mut self, other: &Self) {
        for (mine, theirs) in self.slots.iter_mut().zip(&other.slots) {
            if theirs.clock() > mine.clock() {
                *mine = *theirs;
            }
        }
    }

    /// Overwrites every slot with `other`'s, taking its length too.
    pub fn copy_from(&mut self, other: &Self) {
        self.slots.clone_from(&other.slots);
    }

    /// Advances `tid`'s slot by one and returns the new epoch.
    pub fn increment(&mut self, tid: ThreadId) -> Epoch {
        let next = self.get(tid).tick();
        self.set(next);
        next
    }

    /// Happens-before test: `epoch` is dominated when this clock's knowledge of
    /// the epoch's owner is at least as new.
    #[must_use]
    pub fn dominates(&self, epoch: Epoch) -> bool {
        epoch.clock() <= self.clock_of(epoch.owner())
    }

    /// Resets every slot to its zero epoch, keeping the length.
    pub fn reset(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            *slot = Epoch::zero(ThreadId::from_index(i));
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Epoch] {
        &self.slots
    }

    /// Clock components in slot order.
    pub fn clocks(&self) -> impl Iterator<Item = Clock> + '_ {
        self.slots.iter().map(|e| e.clock())
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        for (i, epoch) in self.slots.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{epoch}")?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(i: u32) -> ThreadId {
        ThreadId(i)
    }

    #[test]
    fn fresh_clock_slots_are_zero_epochs_of_their_index() {
        let vc = VectorClock::with_len(5);
        assert_eq!(vc.len(), 5);
        for (i, epoch) in vc.as_slice().iter().enumerate() {
            assert_eq!(*epoch, Epoch::zero(ThreadId::from_index(i)));
        }
    }

    #[test]
    fn extend_is_noop_when_not_larger() {
        let mut vc = VectorClock::from_clocks(&[3, 4, 5]);
        let before = vc.clone();
        vc.extend(2);
        assert_eq!(vc, before);
        vc.extend(3);
        assert_eq!(vc, before);
    }

    #[test]
    fn extend_appends_zero_epochs_exactly_to_n() {
        let mut vc = VectorClock::from_clocks(&[3, 4]);
        vc.extend(6);
        assert_eq!(vc.len(), 6);
        assert_eq!(vc.get(t(0)).clock(), 3);
        assert_eq!(vc.get(t(1)).clock(), 4);
        for i in 2..6 {
            assert_eq!(vc.as_slice()[i], Epoch::zero(t(i as u32)));
        }
    }

    #[test]
    fn extend_pair_equalizes_lengths() {
        let mut a = VectorClock::with_len(5);
        let mut b = VectorClock::with_len(4);
        VectorClock::extend_pair(&mut b, &mut a);
        assert_eq!(a.len(), 5);
        assert_eq!(b.len(), 5);
        assert_eq!(b.get(t(4)), Epoch::zero(t(4)));
    }

    #[test]
    fn join_takes_slotwise_max() {
        let mut a = VectorClock::from_clocks(&[1, 7, 0]);
        let b = VectorClock::from_clocks(&[4, 2, 9]);
        a.join(&b);
        assert_eq!(a.clocks().collect::<Vec<_>>(), vec![4, 7, 9]);
        for (i, epoch) in a.as_slice().iter().enumerate() {
            assert_eq!(epoch.owner().index(), i);
        }
    }

    #[test]
    fn get_past_end_reads_zero() {
        let vc = VectorClock::with_len(2);
        assert_eq!(vc.get(t(7)), Epoch::zero(t(7)));
    }

    #[test]
    fn set_grows_clock_to_cover_owner() {
        let mut vc = VectorClock::new();
        vc.set(Epoch::new(t(3), 2));
        assert_eq!(vc.len(), 4);
        assert_eq!(vc.clock_of(t(3)), 2);
        assert_eq!(vc.clock_of(t(1)), 0);
    }

    #[test]
    fn dominance_compares_owner_slot() {
        let vc = VectorClock::from_clocks(&[0, 5, 2]);
        assert!(vc.dominates(Epoch::new(t(1), 5)));
        assert!(vc.dominates(Epoch::new(t(1), 4)));
        assert!(!vc.dominates(Epoch::new(t(1), 6)));
        assert!(vc.dominates(Epoch::zero(t(9))));
        assert!(!vc.dominates(Epoch::new(t(9), 1)));
    }

    #[test]
    fn increment_ticks_only_own_slot() {
        let mut vc = VectorClock::from_clocks(&[1, 1, 1]);
        let next = vc.increment(t(1));
        assert_eq!(next, Epoch::new(t(1), 2));
        assert_eq!(vc.clocks().collect::<Vec<_>>(), vec![1, 2, 1]);
    }

    #[test]
    fn tick_saturates() {
        let e = Epoch::new(t(0), Clock::MAX);
        assert_eq!(e.tick().clock(), Clock::MAX);
    }

    #[test]
    fn display_uses_clock_at_owner() {
        let vc = VectorClock::from_clocks(&[2, 0]);
        assert_eq!(vc.to_string(), "<2@0,0@1>");
    }
}
