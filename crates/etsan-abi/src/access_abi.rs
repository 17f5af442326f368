//! Memory access hooks: `__tsan_{read,write}N`, their unaligned variants
//! and the virtual-pointer hooks.
//!
//! Every access hook takes `(addr, line, obj, file)`; `obj` and `file` are
//! NUL-terminated names and are only decoded when the access races. The
//! access width does not affect detection: each address is tracked on its
//! own.

use std::ffi::{c_char, c_int, c_void};

use etsan_core::AccessKind;

use crate::macros::abi_fn;
use crate::runtime;
use crate::util;

/// Shared body of all access hooks. Returns `true` when the access raced.
///
/// # Safety
///
/// `obj` and `file` are null or readable NUL-terminated strings.
pub unsafe fn on_access(
    addr: *const c_void,
    kind: AccessKind,
    line: c_int,
    obj: *const c_char,
    file: *const c_char,
) -> bool {
    runtime::with_current(|ctx, thread| {
        ctx.access(thread, addr as usize, kind, || unsafe {
            util::access_site(line, obj, file)
        })
    })
    .unwrap_or(false)
}

macro_rules! access_hooks {
    ($($name:ident => $kind:expr;)*) => {
        $(
            abi_fn! {
                fn $name(addr: *mut c_void, line: c_int, obj: *const c_char, file: *const c_char) {
                    on_access(addr, $kind, line, obj, file);
                }
            }
        )*
    };
}

access_hooks! {
    __tsan_read1 => AccessKind::Read;
    __tsan_read2 => AccessKind::Read;
    __tsan_read4 => AccessKind::Read;
    __tsan_read8 => AccessKind::Read;
    __tsan_read16 => AccessKind::Read;
    __tsan_write1 => AccessKind::Write;
    __tsan_write2 => AccessKind::Write;
    __tsan_write4 => AccessKind::Write;
    __tsan_write8 => AccessKind::Write;
    __tsan_write16 => AccessKind::Write;
    __tsan_unaligned_read2 => AccessKind::Read;
    __tsan_unaligned_read4 => AccessKind::Read;
    __tsan_unaligned_read8 => AccessKind::Read;
    __tsan_unaligned_read16 => AccessKind::Read;
    __tsan_unaligned_write2 => AccessKind::Write;
    __tsan_unaligned_write4 => AccessKind::Write;
    __tsan_unaligned_write8 => AccessKind::Write;
    __tsan_unaligned_write16 => AccessKind::Write;
}

abi_fn! {
    /// Read of the virtual-table pointer stored at `vptr_p`.
    fn __tsan_vptr_read(
        vptr_p: *mut *mut c_void,
        line: c_int,
        obj: *const c_char,
        file: *const c_char,
    ) {
        on_access(vptr_p.cast_const().cast(), AccessKind::Read, line, obj, file);
    }
}

abi_fn! {
    /// Store of `new_val` into the virtual-table pointer at `vptr_p`; checked
    /// as a write. The store itself is done by the instrumented code.
    fn __tsan_vptr_update(
        vptr_p: *mut *mut c_void,
        new_val: *mut c_void,
        line: c_int,
        obj: *const c_char,
        file: *const c_char,
    ) {
        let _ = new_val;
        on_access(vptr_p.cast_const().cast(), AccessKind::Write, line, obj, file);
    }
}
