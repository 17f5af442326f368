//! # etsan-harness
//!
//! Built-in scenario programs for the etsan detector.
//!
//! Each scenario reproduces a small multithreaded program (readers sharing a
//! value, a lock-protected counter, unsynchronized writers, ...) and drives
//! the detector through [`etsan_core::DetectorContext`] from real
//! `std::thread` workers, exactly as instrumented code would through the
//! `__tsan_*` hooks. Runs can be recorded as JSONL through
//! [`structured_log`].

#![forbid(unsafe_code)]

pub mod error;
pub mod runner;
pub mod scenarios;
pub mod structured_log;

pub use error::HarnessError;
pub use runner::{ScenarioOutcome, ScenarioRunner};
pub use scenarios::Scenario;
