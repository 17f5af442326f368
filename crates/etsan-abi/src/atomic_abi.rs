//! Atomic operation hooks.
//!
//! Atomics are not modelled by the detector. Each hook reports itself once
//! as unimplemented, then performs the operation sequentially consistently so
//! the instrumented program keeps its semantics. Null addresses yield 0. The
//! memory-order argument is ignored.

use std::ffi::c_int;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU32, AtomicU64, Ordering};

use etsan_core::Diagnostic;

use crate::macros::abi_fn;
use crate::runtime;

/// Memory-order argument of the atomic hooks.
pub type MemoryOrder = c_int;

/// Reports `hook` as unimplemented the first time `seen` is tripped.
fn note_unimplemented(seen: &AtomicBool, hook: &'static str) {
    if !seen.swap(true, Ordering::Relaxed)
        && let Some(ctx) = runtime::context()
    {
        ctx.diagnose(Diagnostic::Unimplemented { hook });
    }
}

macro_rules! atomic_hooks {
    ($($load:ident, $fetch_add:ident: $int:ty => $atomic:ty;)*) => {
        $(
            abi_fn! {
                fn $load(addr: *const $int, order: MemoryOrder) -> $int {
                    static SEEN: AtomicBool = AtomicBool::new(false);
                    let _ = order;
                    note_unimplemented(&SEEN, stringify!($load));
                    if addr.is_null() {
                        return 0;
                    }
                    <$atomic>::from_ptr(addr.cast_mut()).load(Ordering::SeqCst)
                }
            }

            abi_fn! {
                fn $fetch_add(addr: *mut $int, val: $int, order: MemoryOrder) -> $int {
                    static SEEN: AtomicBool = AtomicBool::new(false);
                    let _ = order;
                    note_unimplemented(&SEEN, stringify!($fetch_add));
                    if addr.is_null() {
                        return 0;
                    }
                    <$atomic>::from_ptr(addr).fetch_add(val, Ordering::SeqCst)
                }
            }
        )*
    };
}

atomic_hooks! {
    __tsan_atomic8_load, __tsan_atomic8_fetch_add: u8 => AtomicU8;
    __tsan_atomic16_load, __tsan_atomic16_fetch_add: u16 => AtomicU16;
    __tsan_atomic32_load, __tsan_atomic32_fetch_add: u32 => AtomicU32;
    __tsan_atomic64_load, __tsan_atomic64_fetch_add: u64 => AtomicU64;
}
