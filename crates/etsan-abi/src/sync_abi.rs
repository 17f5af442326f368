//! Synchronization hooks: thread create/join and lock acquire/release.

use std::ffi::c_void;

use crate::macros::abi_fn;
use crate::runtime;
use crate::util;

abi_fn! {
    /// The calling thread created a thread; `child_id` points at the new
    /// `pthread_t`, as filled in by `pthread_create`.
    fn __tsan_thread_create(child_id: *mut c_void) {
        if child_id.is_null() {
            return;
        }
        let child = util::thread_key(child_id.cast::<libc::pthread_t>().read_unaligned());
        runtime::with_current(|ctx, parent| ctx.fork(parent, child));
    }
}

abi_fn! {
    /// The calling thread joined the thread whose `pthread_t` is passed by
    /// value.
    fn __tsan_thread_join(child_id: *mut c_void) {
        let child = util::thread_key(child_id as libc::pthread_t);
        runtime::with_current(|ctx, parent| ctx.join(parent, child));
    }
}

abi_fn! {
    /// The calling thread acquired the lock at `lock`.
    fn __tsan_thread_lock(lock: *mut c_void) {
        runtime::with_current(|ctx, thread| ctx.acquire(thread, lock as usize));
    }
}

abi_fn! {
    /// The calling thread is releasing the lock at `lock`.
    fn __tsan_thread_unlock(lock: *mut c_void) {
        runtime::with_current(|ctx, thread| ctx.release(thread, lock as usize));
    }
}
