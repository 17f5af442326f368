//! Process lifecycle hooks.
//!
//! `__tsan_init` builds the detector and registers an exit handler;
//! `__tsan_fini` (or that handler) prints pending race reports and the
//! end-of-run summary. The teardown runs at most once per process.

use std::sync::atomic::{AtomicBool, Ordering};

use etsan_core::DetectorSummary;

use crate::macros::abi_fn;
use crate::runtime;

static EXIT_HANDLER_REGISTERED: AtomicBool = AtomicBool::new(false);
static FINISHED: AtomicBool = AtomicBool::new(false);

extern "C" fn finish_at_exit() {
    finish_once();
}

/// Flushes reports and prints the summary unless that already happened.
///
/// Returns the summary when this call did the teardown.
pub fn finish_once() -> Option<DetectorSummary> {
    if FINISHED.swap(true, Ordering::AcqRel) {
        return None;
    }
    let ctx = runtime::context()?;
    let summary = ctx.finish();
    tracing::info!(
        target: "etsan",
        threads = summary.threads,
        races = summary.race_sites,
        "detector finished"
    );
    Some(summary)
}

/// True once the teardown has run.
#[must_use]
pub fn finished() -> bool {
    FINISHED.load(Ordering::Acquire)
}

abi_fn! {
    /// Process start: builds the detector, registers the calling thread and
    /// arranges for `__tsan_fini` to run at exit.
    fn __tsan_init() {
        let Some(ctx) = runtime::context() else {
            return;
        };
        let main = runtime::current_thread(ctx);
        if !EXIT_HANDLER_REGISTERED.swap(true, Ordering::AcqRel)
            && libc::atexit(finish_at_exit) != 0
        {
            tracing::warn!(target: "etsan", "could not register exit handler");
        }
        tracing::debug!(target: "etsan", tid = main.tid().0, "init");
    }
}

abi_fn! {
    /// Normal termination of the instrumented program.
    fn __tsan_fini() {
        finish_once();
    }
}
