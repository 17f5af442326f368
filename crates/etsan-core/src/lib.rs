//! FastTrack happens-before race detection for etsan.
//!
//! Instrumented programs report every memory access, lock operation, thread
//! create/join and function entry/exit. The detector keeps a vector clock per
//! thread and per lock, and compact epoch state per memory location, and
//! flags a location racy the first time two accesses to it (at least one a
//! write) are not ordered by happens-before.
//!
//! # Architecture
//!
//! - **Clocks** (`clock`): thread ids, epochs and vector clocks
//! - **Thread registry** (`thread_state`): external thread key to clock state
//! - **Variable registry** (`var_state`): per-address read/write history
//! - **Lock registry** (`lock_state`): per-lock release clocks
//! - **FastTrack** (`fasttrack`): the read/write/acquire/release/fork/join
//!   transitions
//! - **Concurrency gate** (`gate`): skips checks while only one thread runs
//! - **Call stacks** (`callstack`): per-thread active function names
//! - **Race log** (`race`, `race_log`): deduplicated reports and their text
//! - **Symbols** (`symbol`): interned names
//! - **Configuration** (`config`): environment-driven settings
//! - **Metrics** (`metrics`): atomic event counters
//! - **Diagnostics** (`diag`): non-fatal instrumentation problems
//! - **Context** (`context`): the detector tying all of the above together

#![deny(unsafe_code)]

pub mod callstack;
pub mod clock;
pub mod config;
pub mod context;
pub mod diag;
pub mod fasttrack;
pub mod gate;
pub mod lock_state;
pub mod metrics;
pub mod race;
pub mod race_log;
pub mod symbol;
pub mod thread_state;
pub mod var_state;

pub use clock::{Clock, Epoch, ThreadId, VectorClock};
pub use config::{ColorMode, ConfigError, DetectorConfig, ReportMode, ReportStream, SummaryFormat};
pub use context::{AccessSite, DetectorContext, DetectorSummary};
pub use diag::Diagnostic;
pub use fasttrack::{RaceFinding, RaceKind};
pub use metrics::{DetectorMetrics, MetricsSnapshot};
pub use race::{AccessKind, RaceRecord, ReportStyle};
pub use symbol::Symbol;
pub use thread_state::{ThreadHandle, ThreadKey};
pub use var_state::Address;
