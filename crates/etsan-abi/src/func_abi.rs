//! Function entry/exit hooks feeding the per-thread call stacks.

use std::ffi::c_char;

use crate::macros::abi_fn;
use crate::runtime;
use crate::util::{self, UNKNOWN_NAME};

abi_fn! {
    /// Entry into the function named `name`.
    fn __tsan_func_entry(name: *const c_char) {
        let name = util::decode_name(name, UNKNOWN_NAME);
        runtime::with_current(|ctx, thread| ctx.enter_function(thread, &name));
    }
}

abi_fn! {
    /// Exit from the function named `name`. A name other than the innermost
    /// entered function is reported and ignored.
    fn __tsan_func_exit(name: *const c_char) {
        let name = util::decode_name(name, UNKNOWN_NAME);
        runtime::with_current(|ctx, thread| ctx.exit_function(thread, &name));
    }
}
