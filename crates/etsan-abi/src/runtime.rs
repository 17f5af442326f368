//! Process-wide detector bootstrap for hook entrypoints.
//!
//! The detector is created on first use and lives for the rest of the
//! process. Initialization runs through an atomic state machine rather than
//! `OnceLock`: a hook arriving on another thread (or reentrantly) while the
//! detector is being built sees `None` and the access goes unchecked.

use std::cell::RefCell;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use etsan_core::{DetectorConfig, DetectorContext, ThreadHandle, ThreadKey};

const STATE_UNINIT: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_READY: u8 = 2;

static CONTEXT_STATE: AtomicU8 = AtomicU8::new(STATE_UNINIT);
static CONTEXT_PTR: AtomicPtr<DetectorContext> = AtomicPtr::new(std::ptr::null_mut());

thread_local! {
    static CURRENT: RefCell<Option<ThreadHandle>> = const { RefCell::new(None) };
}

fn ready() -> Option<&'static DetectorContext> {
    let ptr = CONTEXT_PTR.load(Ordering::Acquire);
    // SAFETY: once READY, CONTEXT_PTR points at a leaked box that is never
    // freed or replaced.
    (!ptr.is_null()).then(|| unsafe { &*ptr })
}

/// The process detector, built from the environment on first call.
///
/// Returns `None` while another caller is still initializing it.
pub fn context() -> Option<&'static DetectorContext> {
    match CONTEXT_STATE.load(Ordering::Acquire) {
        STATE_READY => return ready(),
        STATE_INITIALIZING => return None,
        _ => {}
    }

    if CONTEXT_STATE
        .compare_exchange(
            STATE_UNINIT,
            STATE_INITIALIZING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        return if CONTEXT_STATE.load(Ordering::Acquire) == STATE_READY {
            ready()
        } else {
            None
        };
    }

    let config = DetectorConfig::from_env();
    install_logging(&config);
    let ptr = Box::into_raw(Box::new(DetectorContext::new(config)));
    CONTEXT_PTR.store(ptr, Ordering::Release);
    CONTEXT_STATE.store(STATE_READY, Ordering::Release);
    tracing::debug!(target: "etsan", ?config, "detector ready");
    ready()
}

/// Installs a stderr diagnostics subscriber when `ETSAN_LOG` asks for one.
/// An already installed global subscriber is kept.
fn install_logging(config: &DetectorConfig) {
    let Some(level) = config.log_level else {
        return;
    };
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok();
    if !installed {
        tracing::debug!(target: "etsan", "host subscriber kept");
    }
}

/// Detector key of the calling thread.
#[must_use]
pub fn current_key() -> ThreadKey {
    // SAFETY: pthread_self has no preconditions.
    crate::util::thread_key(unsafe { libc::pthread_self() })
}

/// Handle of the calling thread in `ctx`, cached per OS thread.
pub fn current_thread(ctx: &DetectorContext) -> ThreadHandle {
    let lookup = |cell: &RefCell<Option<ThreadHandle>>| {
        let mut slot = cell.borrow_mut();
        slot.get_or_insert_with(|| ctx.thread(current_key())).clone()
    };
    // During thread teardown the cache is gone; fall back to the registry.
    CURRENT
        .try_with(lookup)
        .unwrap_or_else(|_| ctx.thread(current_key()))
}

/// Runs `f` with the detector and the calling thread's handle, if the
/// detector is available.
pub fn with_current<R>(f: impl FnOnce(&'static DetectorContext, &ThreadHandle) -> R) -> Option<R> {
    let ctx = context()?;
    let thread = current_thread(ctx);
    Some(f(ctx, &thread))
}
