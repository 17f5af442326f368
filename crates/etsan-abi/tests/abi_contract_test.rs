//! Integration tests for the `__tsan_*` hook contract.
//!
//! All tests share the process-wide detector, so they serialize on
//! `TEST_LOCK` and use disjoint addresses.

use std::ffi::{CString, c_char, c_int, c_void};
use std::os::unix::thread::JoinHandleExt;
use std::ptr;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use etsan_abi::access_abi::{
    __tsan_read1, __tsan_read2, __tsan_read4, __tsan_read8, __tsan_read16,
    __tsan_unaligned_read2, __tsan_unaligned_read4, __tsan_unaligned_read8,
    __tsan_unaligned_read16, __tsan_unaligned_write2, __tsan_unaligned_write4,
    __tsan_unaligned_write8, __tsan_unaligned_write16, __tsan_vptr_read, __tsan_vptr_update,
    __tsan_write1, __tsan_write2, __tsan_write4, __tsan_write8, __tsan_write16,
};
use etsan_abi::atomic_abi::{
    __tsan_atomic8_fetch_add, __tsan_atomic8_load, __tsan_atomic16_fetch_add,
    __tsan_atomic16_load, __tsan_atomic32_fetch_add, __tsan_atomic32_load,
    __tsan_atomic64_fetch_add, __tsan_atomic64_load,
};
use etsan_abi::func_abi::{__tsan_func_entry, __tsan_func_exit};
use etsan_abi::runtime;
use etsan_abi::startup_abi::{__tsan_fini, __tsan_init, finished};
use etsan_abi::sync_abi::{
    __tsan_thread_create, __tsan_thread_join, __tsan_thread_lock, __tsan_thread_unlock,
};
use etsan_core::{AccessKind, DetectorContext};

static TEST_LOCK: Mutex<()> = Mutex::new(());
static NEXT_ADDR: AtomicUsize = AtomicUsize::new(0x7000_0000);

type AccessHook = unsafe extern "C" fn(*mut c_void, c_int, *const c_char, *const c_char);

fn detector() -> &'static DetectorContext {
    loop {
        if let Some(ctx) = runtime::context() {
            return ctx;
        }
        thread::yield_now();
    }
}

fn fresh_addr() -> *mut c_void {
    NEXT_ADDR.fetch_add(64, std::sync::atomic::Ordering::Relaxed) as *mut c_void
}

/// Spawns a worker announced through `__tsan_thread_create`, lets it run
/// `body` once `go` is released, then joins it through `__tsan_thread_join`.
fn run_worker<F>(before: impl FnOnce(), body: F)
where
    F: FnOnce() + Send + 'static,
{
    let go = Arc::new(Barrier::new(2));
    let worker_go = Arc::clone(&go);
    let handle = thread::spawn(move || {
        worker_go.wait();
        body();
    });
    let mut id = handle.as_pthread_t();
    unsafe { __tsan_thread_create((&raw mut id).cast()) };
    before();
    go.wait();
    handle.join().unwrap();
    unsafe { __tsan_thread_join(id as *mut c_void) };
}

#[test]
fn every_hook_tolerates_null_handles() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ctx = detector();
    let addr = fresh_addr();
    let hooks: [AccessHook; 18] = [
        __tsan_read1,
        __tsan_read2,
        __tsan_read4,
        __tsan_read8,
        __tsan_read16,
        __tsan_write1,
        __tsan_write2,
        __tsan_write4,
        __tsan_write8,
        __tsan_write16,
        __tsan_unaligned_read2,
        __tsan_unaligned_read4,
        __tsan_unaligned_read8,
        __tsan_unaligned_read16,
        __tsan_unaligned_write2,
        __tsan_unaligned_write4,
        __tsan_unaligned_write8,
        __tsan_unaligned_write16,
    ];
    for hook in hooks {
        unsafe { hook(addr, 1, ptr::null(), ptr::null()) };
    }
    unsafe {
        __tsan_vptr_read(addr.cast(), 2, ptr::null(), ptr::null());
        __tsan_vptr_update(addr.cast(), ptr::null_mut(), 3, ptr::null(), ptr::null());
        __tsan_func_entry(ptr::null());
        __tsan_func_exit(ptr::null());
        __tsan_thread_create(ptr::null_mut());
        __tsan_thread_lock(ptr::null_mut());
        __tsan_thread_unlock(ptr::null_mut());
    }
    assert_eq!(ctx.gate().count(), 0);
}

#[test]
fn unsynchronized_hook_writes_report_decoded_site() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ctx = detector();
    let addr = fresh_addr() as usize;
    let obj = CString::new("shared_counter").unwrap();
    let file = CString::new("abi_contract.c").unwrap();

    let worker_obj = obj.clone();
    let worker_file = file.clone();
    run_worker(
        || unsafe { __tsan_write4(addr as *mut c_void, 10, obj.as_ptr(), file.as_ptr()) },
        move || unsafe {
            __tsan_write4(addr as *mut c_void, 12, worker_obj.as_ptr(), worker_file.as_ptr());
        },
    );

    assert!(ctx.var_state(addr).is_some_and(|v| v.is_racy()));
    let race = ctx
        .races()
        .into_iter()
        .find(|r| r.file.as_str() == "abi_contract.c")
        .expect("race recorded for the hook site");
    assert_eq!(race.line, 12);
    assert_eq!(race.access, AccessKind::Write);
    assert_eq!(race.object.as_str(), "shared_counter");
}

#[test]
fn lock_hooks_order_accesses() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ctx = detector();
    let addr = fresh_addr() as usize;
    let lock = fresh_addr() as usize;
    let file = CString::new("abi_lock.c").unwrap();
    let worker_file = file.clone();

    run_worker(
        || unsafe {
            __tsan_thread_lock(lock as *mut c_void);
            __tsan_write8(addr as *mut c_void, 20, ptr::null(), file.as_ptr());
            __tsan_thread_unlock(lock as *mut c_void);
        },
        move || unsafe {
            __tsan_thread_lock(lock as *mut c_void);
            __tsan_read8(addr as *mut c_void, 21, ptr::null(), worker_file.as_ptr());
            __tsan_write8(addr as *mut c_void, 22, ptr::null(), worker_file.as_ptr());
            __tsan_thread_unlock(lock as *mut c_void);
        },
    );

    assert!(ctx.var_state(addr).is_some_and(|v| !v.is_racy()));
    assert!(ctx.races().iter().all(|r| r.file.as_str() != "abi_lock.c"));
}

#[test]
fn func_exit_mismatch_is_diagnosed_not_popped() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ctx = detector();
    let outer = CString::new("function_1").unwrap();
    let inner = CString::new("function_2").unwrap();

    thread::spawn(move || {
        let me = runtime::current_thread(ctx);
        let before = ctx.metrics().snapshot().diagnostics;
        unsafe {
            __tsan_func_entry(outer.as_ptr());
            __tsan_func_entry(inner.as_ptr());
            __tsan_func_exit(outer.as_ptr());
        }
        assert_eq!(ctx.call_trace(&me).len(), 2);
        assert!(ctx.metrics().snapshot().diagnostics > before);

        unsafe {
            __tsan_func_exit(inner.as_ptr());
            __tsan_func_exit(outer.as_ptr());
        }
        assert!(ctx.call_trace(&me).is_empty());
    })
    .join()
    .unwrap();
}

#[test]
fn atomic_hooks_perform_the_operation() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ctx = detector();
    let before = ctx.metrics().snapshot().diagnostics;

    let mut a8: u8 = 1;
    let mut a16: u16 = 2;
    let mut a32: u32 = 3;
    let mut a64: u64 = 4;
    unsafe {
        assert_eq!(__tsan_atomic8_fetch_add(&raw mut a8, 5, 5), 1);
        assert_eq!(__tsan_atomic8_load(&raw const a8, 5), 6);
        assert_eq!(__tsan_atomic16_fetch_add(&raw mut a16, 5, 5), 2);
        assert_eq!(__tsan_atomic16_load(&raw const a16, 5), 7);
        assert_eq!(__tsan_atomic32_fetch_add(&raw mut a32, 5, 5), 3);
        assert_eq!(__tsan_atomic32_load(&raw const a32, 5), 8);
        assert_eq!(__tsan_atomic64_fetch_add(&raw mut a64, 5, 5), 4);
        assert_eq!(__tsan_atomic64_load(&raw const a64, 5), 9);

        assert_eq!(__tsan_atomic32_load(ptr::null(), 5), 0);
        assert_eq!(__tsan_atomic64_fetch_add(ptr::null_mut(), 1, 5), 0);
    }

    // One diagnostic per hook, however often it is called.
    let after = ctx.metrics().snapshot().diagnostics;
    assert!(after - before <= 8);
    unsafe { __tsan_atomic32_load(&raw const a32, 5) };
    assert_eq!(ctx.metrics().snapshot().diagnostics, after);
}

#[test]
fn fini_tears_down_once() {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    unsafe {
        __tsan_init();
        __tsan_fini();
    }
    assert!(finished());
    assert!(etsan_abi::startup_abi::finish_once().is_none());
    unsafe { __tsan_fini() };
}
