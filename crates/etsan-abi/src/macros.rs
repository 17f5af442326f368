//! Helper macros for hook generation.
//!
//! `abi_fn!` generates `#[unsafe(no_mangle)] pub unsafe extern "C" fn`
//! wrappers. Every hook body is total: it must return normally for any
//! argument, including null pointers.

/// Generate an exported `extern "C"` hook.
///
/// ```ignore
/// abi_fn! {
///     /// Doc comment for the hook.
///     fn __tsan_example(addr: *mut c_void) {
///         // body
///     }
/// }
/// ```
macro_rules! abi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) -> $ret {
            unsafe { $body }
        }
    };

    // Variant without return type (returns ())
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? )
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) {
            unsafe { $body }
        }
    };
}

pub(crate) use abi_fn;
