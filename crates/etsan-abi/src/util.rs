//! Decoding of raw handles passed by instrumented code.

use std::borrow::Cow;
use std::ffi::c_char;

use etsan_core::{AccessSite, ThreadKey};

/// Longest name read from a handle; longer names are truncated.
pub const MAX_NAME_LEN: usize = 4096;

/// Placeholder for a missing object or function name.
pub const UNKNOWN_NAME: &str = "unknown";
/// Placeholder for a missing file name.
pub const UNKNOWN_FILE: &str = "Unknown";

/// Length of the C string at `ptr`, reading at most `bound` bytes.
///
/// Returns `(len, terminated)`; `terminated` is false when no NUL was found
/// within `bound` and `len == bound`.
///
/// # Safety
///
/// `ptr` must be readable up to the first NUL or `bound` bytes.
pub unsafe fn scan_c_string(ptr: *const c_char, bound: usize) -> (usize, bool) {
    (0..bound)
        .find(|&i| unsafe { *ptr.add(i) } == 0)
        .map_or((bound, false), |len| (len, true))
}

/// Decode a name handle, replacing invalid UTF-8 and mapping null to
/// `fallback`.
///
/// # Safety
///
/// A non-null `ptr` must be readable up to the first NUL or
/// [`MAX_NAME_LEN`] bytes, and stay valid for `'a`.
pub unsafe fn decode_name<'a>(ptr: *const c_char, fallback: &'static str) -> Cow<'a, str> {
    if ptr.is_null() {
        return Cow::Borrowed(fallback);
    }
    let (len, _) = unsafe { scan_c_string(ptr, MAX_NAME_LEN) };
    // SAFETY: the scan above read these `len` bytes.
    let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
    String::from_utf8_lossy(bytes)
}

/// Source site of an access hook.
///
/// # Safety
///
/// Same contract as [`decode_name`] for `obj` and `file`.
pub unsafe fn access_site<'a>(
    line: i32,
    obj: *const c_char,
    file: *const c_char,
) -> AccessSite<'a> {
    AccessSite {
        line,
        object: unsafe { decode_name(obj, UNKNOWN_NAME) },
        file: unsafe { decode_name(file, UNKNOWN_FILE) },
    }
}

/// Detector key of a `pthread_t`.
#[must_use]
pub fn thread_key(id: libc::pthread_t) -> ThreadKey {
    ThreadKey(id as u64)
}
