//! Per-thread happens-before state and its registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::clock::{Epoch, ThreadId, VectorClock};

/// External thread identity as seen by the monitored program (e.g. a
/// `pthread_t`). Never used as a clock index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadKey(pub u64);

/// Clock state of one thread.
///
/// Invariant: `epoch == clock[tid]` outside of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadState {
    tid: ThreadId,
    pub(crate) clock: VectorClock,
    epoch: Epoch,
}

impl ThreadState {
    /// State of a thread registered when `known` threads exist (itself
    /// included). Its own first tick is 1.
    fn registered(tid: ThreadId, known: usize) -> Self {
        let mut clock = VectorClock::with_len(known);
        let epoch = Epoch::new(tid, 1);
        clock.set(epoch);
        Self { tid, clock, epoch }
    }

    /// State with an explicit clock. The clock is grown to cover `tid`.
    #[must_use]
    pub fn with_clock(tid: ThreadId, mut clock: VectorClock) -> Self {
        clock.extend(tid.index() + 1);
        let epoch = clock.get(tid);
        Self { tid, clock, epoch }
    }

    #[must_use]
    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    #[must_use]
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Re-reads the cached epoch from the clock.
    pub fn refresh_epoch(&mut self) {
        self.epoch = self.clock.get(self.tid);
    }

    /// Advances this thread's own slot by one.
    pub fn increment(&mut self) {
        self.epoch = self.clock.increment(self.tid);
    }
}

/// Shared handle to a registered thread.
///
/// Identity fields are readable without taking the state lock.
#[derive(Debug, Clone)]
pub struct ThreadHandle {
    key: ThreadKey,
    tid: ThreadId,
    state: Arc<Mutex<ThreadState>>,
}

impl ThreadHandle {
    #[must_use]
    pub fn key(&self) -> ThreadKey {
        self.key
    }

    #[must_use]
    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    /// Locks the thread's clock state.
    pub fn lock(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ThreadState {
        self.state.lock().clone()
    }

    /// True when both handles refer to the same registered thread.
    #[must_use]
    pub fn same_thread(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[derive(Debug, Default)]
struct ThreadTable {
    by_key: HashMap<ThreadKey, ThreadId>,
    handles: Vec<ThreadHandle>,
}

impl ThreadTable {
    fn get_or_register(&mut self, key: ThreadKey) -> ThreadHandle {
        if let Some(tid) = self.by_key.get(&key) {
            return self.handles[tid.index()].clone();
        }

        let tid = ThreadId::from_index(self.handles.len());
        let known = self.handles.len() + 1;
        for handle in &self.handles {
            handle.lock().clock.extend(known);
        }

        let handle = ThreadHandle {
            key,
            tid,
            state: Arc::new(Mutex::new(ThreadState::registered(tid, known))),
        };
        self.handles.push(handle.clone());
        self.by_key.insert(key, tid);
        tracing::debug!(target: "etsan", key = key.0, tid = tid.0, "thread registered");
        handle
    }
}

/// Registry of every thread observed so far.
///
/// Lock order: the table lock is taken before any thread state lock; thread
/// state locks are taken in ascending `ThreadId` order.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    table: Mutex<ThreadTable>,
}

impl ThreadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `key`, registering the thread on first use.
    ///
    /// Registration assigns the next sequential id and grows every existing
    /// thread clock to cover the new thread.
    pub fn get_or_create(&self, key: ThreadKey) -> ThreadHandle {
        self.table.lock().get_or_register(key)
    }

    /// Returns the handle for `key` without registering it.
    #[must_use]
    pub fn lookup(&self, key: ThreadKey) -> Option<ThreadHandle> {
        let table = self.table.lock();
        table
            .by_key
            .get(&key)
            .map(|tid| table.handles[tid.index()].clone())
    }

    /// Number of registered threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` on two distinct threads while holding the registry lock for
    /// the whole transition. Both threads are registered if absent.
    ///
    /// Returns `None` when `first` and `second` name the same thread.
    pub fn with_pair<R>(
        &self,
        first: ThreadKey,
        second: ThreadKey,
        f: impl FnOnce(&mut ThreadState, &mut ThreadState) -> R,
    ) -> Option<R> {
        let mut table = self.table.lock();
        let a = table.get_or_register(first);
        let b = table.get_or_register(second);
        if a.tid == b.tid {
            return None;
        }

        let mut a_guard;
        let mut b_guard;
        if a.tid < b.tid {
            a_guard = a.state.lock();
            b_guard = b.state.lock();
        } else {
            b_guard = b.state.lock();
            a_guard = a.state.lock();
        }
        let result = f(&mut a_guard, &mut b_guard);
        drop(a_guard);
        drop(b_guard);
        drop(table);
        Some(result)
    }

    /// Copies of every thread state, in id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ThreadState> {
        let table = self.table.lock();
        table.handles.iter().map(ThreadHandle::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_thread_starts_at_clock_one() {
        let registry = ThreadRegistry::new();
        let h = registry.get_or_create(ThreadKey(77));
        let st = h.snapshot();
        assert_eq!(st.tid(), ThreadId(0));
        assert_eq!(st.epoch(), Epoch::new(ThreadId(0), 1));
        assert_eq!(st.clock().len(), 1);
    }

    #[test]
    fn registration_grows_every_clock() {
        let registry = ThreadRegistry::new();
        let keys = [ThreadKey(1), ThreadKey(10), ThreadKey(3), ThreadKey(42)];
        for key in keys {
            registry.get_or_create(key);
        }
        assert_eq!(registry.len(), keys.len());

        for st in registry.snapshot() {
            assert_eq!(st.clock().len(), keys.len());
            for epoch in st.clock().as_slice() {
                if epoch.owner() == st.tid() {
                    assert_eq!(epoch.clock(), 1);
                } else {
                    assert_eq!(epoch.clock(), 0);
                }
            }
            assert_eq!(st.epoch(), st.clock().get(st.tid()));
        }
    }

    #[test]
    fn existing_key_returns_same_state() {
        let registry = ThreadRegistry::new();
        let a = registry.get_or_create(ThreadKey(5));
        let b = registry.get_or_create(ThreadKey(5));
        assert!(a.same_thread(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_does_not_register() {
        let registry = ThreadRegistry::new();
        assert!(registry.lookup(ThreadKey(9)).is_none());
        assert!(registry.is_empty());
        registry.get_or_create(ThreadKey(9));
        assert_eq!(registry.lookup(ThreadKey(9)).map(|h| h.tid()), Some(ThreadId(0)));
    }

    #[test]
    fn with_pair_registers_and_rejects_self() {
        let registry = ThreadRegistry::new();
        let seen = registry.with_pair(ThreadKey(1), ThreadKey(2), |a, b| (a.tid(), b.tid()));
        assert_eq!(seen, Some((ThreadId(0), ThreadId(1))));
        assert!(registry.with_pair(ThreadKey(1), ThreadKey(1), |_, _| ()).is_none());
    }

    #[test]
    fn with_pair_hands_out_arguments_in_call_order() {
        let registry = ThreadRegistry::new();
        registry.get_or_create(ThreadKey(1));
        registry.get_or_create(ThreadKey(2));
        let seen = registry.with_pair(ThreadKey(2), ThreadKey(1), |a, b| (a.tid(), b.tid()));
        assert_eq!(seen, Some((ThreadId(1), ThreadId(0))));
    }

    #[test]
    fn increment_and_refresh_keep_epoch_invariant() {
        let mut st = ThreadState::with_clock(ThreadId(1), VectorClock::from_clocks(&[0, 0]));
        st.increment();
        assert_eq!(st.epoch(), Epoch::new(ThreadId(1), 1));
        assert_eq!(st.clock().clock_of(ThreadId(1)), 1);

        st.clock.set(Epoch::new(ThreadId(1), 42));
        st.refresh_epoch();
        assert_eq!(st.epoch(), st.clock().get(st.tid()));
    }
}
