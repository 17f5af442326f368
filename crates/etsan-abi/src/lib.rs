// All extern "C" hooks accept raw pointers from instrumented code and treat
// null as "unknown", so per-function safety docs would be redundant
// boilerplate.
#![allow(clippy::missing_safety_doc)]
//! # etsan-abi
//!
//! `extern "C"` callback boundary for etsan.
//!
//! This crate produces a `cdylib` exposing the `__tsan_*` hooks that an
//! instrumentation pass inserts around memory accesses, lock operations,
//! thread creation/joining and function entry/exit. Each hook resolves the
//! calling thread and forwards to the process-wide
//! [`etsan_core::DetectorContext`].
//!
//! ```text
//! instrumented code -> __tsan_* hook (this crate) -> DetectorContext -> race log
//! ```
//!
//! No hook ever fails or panics: null handles decode to placeholder names,
//! and hooks arriving while the detector is being built are ignored.

mod macros;

pub mod runtime;
pub mod util;

pub mod access_abi;
pub mod atomic_abi;
pub mod func_abi;
pub mod startup_abi;
pub mod sync_abi;
