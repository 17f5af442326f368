//! The detector: every registry plus the entry points instrumented code
//! drives.
//!
//! Lock order: thread table, then thread states (ascending id), then one of
//! the variable, lock or bookkeeping registries. No two of the last group are
//! ever held together.

use std::borrow::Cow;
use std::io::{self, Write};

use parking_lot::Mutex;
use serde::Serialize;

use crate::callstack::{CallStacks, ExitOutcome};
use crate::config::{DetectorConfig, ReportMode, ReportStream, SummaryFormat};
use crate::diag::Diagnostic;
use crate::fasttrack::{self, RaceFinding};
use crate::gate::ConcurrencyGate;
use crate::lock_state::{LockRegistry, LockState};
use crate::metrics::{DetectorMetrics, MetricsSnapshot};
use crate::race::{AccessKind, RaceRecord, ReportStyle};
use crate::race_log::RaceLog;
use crate::symbol::{Symbol, SymbolTable};
use crate::thread_state::{ThreadHandle, ThreadKey, ThreadRegistry};
use crate::var_state::{Address, VarRegistry, VarState};

/// Source location of an access, resolved only when a race is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSite<'a> {
    pub line: i32,
    pub object: Cow<'a, str>,
    pub file: Cow<'a, str>,
}

impl<'a> AccessSite<'a> {
    #[must_use]
    pub fn new(line: i32, object: impl Into<Cow<'a, str>>, file: impl Into<Cow<'a, str>>) -> Self {
        Self {
            line,
            object: object.into(),
            file: file.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Bookkeeping {
    stacks: CallStacks,
    races: RaceLog,
}

/// End-of-run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectorSummary {
    pub threads: usize,
    pub addresses: usize,
    pub locks: usize,
    pub reads: u64,
    pub writes: u64,
    /// Locations flagged racy.
    pub racy_addresses: usize,
    /// Distinct `(file, line, access)` race sites.
    pub race_sites: usize,
    /// Distinct source files with a race.
    pub race_files: usize,
    pub metrics: MetricsSnapshot,
}

impl DetectorSummary {
    /// Plain-text rendering, one counter per line.
    #[must_use]
    pub fn to_text(&self) -> String {
        format!(
            "Threads: {}\nAddresses: {}\nLocks: {}\nReads: {}\nWrites: {}\nRaces: {}\n",
            self.threads, self.addresses, self.locks, self.reads, self.writes, self.racy_addresses
        )
    }
}

/// Process-wide detector state.
#[derive(Debug)]
pub struct DetectorContext {
    config: DetectorConfig,
    style: ReportStyle,
    threads: ThreadRegistry,
    vars: VarRegistry,
    locks: LockRegistry,
    symbols: SymbolTable,
    gate: ConcurrencyGate,
    metrics: DetectorMetrics,
    book: Mutex<Bookkeeping>,
}

impl Default for DetectorContext {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl DetectorContext {
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            style: config.report_style(),
            config,
            threads: ThreadRegistry::new(),
            vars: VarRegistry::new(),
            locks: LockRegistry::new(),
            symbols: SymbolTable::new(),
            gate: ConcurrencyGate::new(),
            metrics: DetectorMetrics::new(),
            book: Mutex::new(Bookkeeping::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    #[must_use]
    pub fn report_style(&self) -> ReportStyle {
        self.style
    }

    #[must_use]
    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    #[must_use]
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    #[must_use]
    pub fn metrics(&self) -> &DetectorMetrics {
        &self.metrics
    }

    /// Handle of the thread identified by `key`, registered on first use.
    pub fn thread(&self, key: ThreadKey) -> ThreadHandle {
        self.threads.get_or_create(key)
    }

    pub fn intern(&self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    // ---- accesses ----------------------------------------------------------

    /// Read of `addr` by `thread`. Returns `true` when the read was racy.
    pub fn read<'s>(
        &self,
        thread: &ThreadHandle,
        addr: Address,
        site: impl FnOnce() -> AccessSite<'s>,
    ) -> bool {
        self.access(thread, addr, AccessKind::Read, site)
    }

    /// Write of `addr` by `thread`. Returns `true` when the write was racy.
    pub fn write<'s>(
        &self,
        thread: &ThreadHandle,
        addr: Address,
        site: impl FnOnce() -> AccessSite<'s>,
    ) -> bool {
        self.access(thread, addr, AccessKind::Write, site)
    }

    /// Runs the FastTrack transition for one access. `site` is only called
    /// when a race has to be recorded.
    pub fn access<'s>(
        &self,
        thread: &ThreadHandle,
        addr: Address,
        access: AccessKind,
        site: impl FnOnce() -> AccessSite<'s>,
    ) -> bool {
        if !self.gate.is_open() {
            DetectorMetrics::inc(&self.metrics.gated_accesses);
            return false;
        }

        let finding = {
            let state = thread.lock();
            self.vars
                .with_var(addr, state.epoch(), access.is_write(), |x| match access {
                    AccessKind::Read => fasttrack::read(x, &state),
                    AccessKind::Write => fasttrack::write(x, &state),
                })
        };
        match access {
            AccessKind::Read => DetectorMetrics::inc(&self.metrics.reads),
            AccessKind::Write => DetectorMetrics::inc(&self.metrics.writes),
        }

        match finding {
            None => false,
            Some(finding) => {
                self.record_race(thread, access, finding, site());
                true
            }
        }
    }

    fn record_race(
        &self,
        thread: &ThreadHandle,
        access: AccessKind,
        finding: RaceFinding,
        site: AccessSite<'_>,
    ) {
        DetectorMetrics::inc(&self.metrics.races);
        let object = self.symbols.intern(&site.object);
        let file = self.symbols.intern(&site.file);
        tracing::info!(
            target: "etsan",
            tid = thread.tid().0,
            conflict = finding.conflict.0,
            kind = %finding.kind,
            %access,
            file = %file,
            line = site.line,
            "race detected"
        );

        let mut book = self.book.lock();
        let trace = book.stacks.trace(thread.key());
        let record = RaceRecord::new(
            thread.tid(),
            site.line,
            access,
            object,
            file,
            trace,
            finding.kind,
            finding.conflict,
        );
        let insertion = book.races.insert(record);
        if insertion.is_new() && self.config.report_mode == ReportMode::Immediate
        {
            let result = with_stream(self.config.report_stream, |out| {
                book.races.flush(self.style, out)
            });
            drop(book);
            if let Err(err) = result {
                self.diagnose(Diagnostic::ReportWrite {
                    error: err.to_string(),
                });
            }
        }
    }

    // ---- synchronization ---------------------------------------------------

    /// `thread` acquired the lock at `lock`.
    pub fn acquire(&self, thread: &ThreadHandle, lock: Address) {
        let mut state = thread.lock();
        let len = state.clock().len();
        self.locks
            .with_lock(lock, len, |l| fasttrack::acquire(&mut state, l));
        DetectorMetrics::inc(&self.metrics.acquires);
    }

    /// `thread` released the lock at `lock`.
    pub fn release(&self, thread: &ThreadHandle, lock: Address) {
        let mut state = thread.lock();
        let len = state.clock().len();
        self.locks
            .with_lock(lock, len, |l| fasttrack::release(&mut state, l));
        DetectorMetrics::inc(&self.metrics.releases);
    }

    /// `parent` created the thread identified by `child`. Returns `false`
    /// when both name the same thread.
    pub fn fork(&self, parent: &ThreadHandle, child: ThreadKey) -> bool {
        if self
            .threads
            .with_pair(parent.key(), child, fasttrack::fork)
            .is_none()
        {
            self.diagnose(Diagnostic::SelfFork {
                thread: parent.tid(),
            });
            return false;
        }
        let active = self.gate.open();
        DetectorMetrics::inc(&self.metrics.forks);
        tracing::debug!(target: "etsan", parent = parent.tid().0, child = child.0, active, "fork");
        true
    }

    /// `parent` joined the thread identified by `child`. Returns `false`
    /// when both name the same thread.
    pub fn join(&self, parent: &ThreadHandle, child: ThreadKey) -> bool {
        if self
            .threads
            .with_pair(parent.key(), child, fasttrack::join)
            .is_none()
        {
            self.diagnose(Diagnostic::SelfJoin {
                thread: parent.tid(),
            });
            return false;
        }
        if !self.gate.close() {
            self.diagnose(Diagnostic::GateUnderflow {
                thread: parent.tid(),
            });
        }
        DetectorMetrics::inc(&self.metrics.joins);
        tracing::debug!(
            target: "etsan",
            parent = parent.tid().0,
            child = child.0,
            active = self.gate.count(),
            "join"
        );
        true
    }

    // ---- call stacks -------------------------------------------------------

    pub fn enter_function(&self, thread: &ThreadHandle, name: &str) {
        let name = self.symbols.intern(name);
        self.book.lock().stacks.enter(thread.key(), name);
    }

    /// Pops `name` from the call stack of `thread`. Anything but a matching
    /// innermost frame is a diagnostic and leaves the stack as is.
    pub fn exit_function(&self, thread: &ThreadHandle, name: &str) -> ExitOutcome {
        let outcome = self.book.lock().stacks.exit(thread.key(), name);
        match &outcome {
            ExitOutcome::Popped => {}
            ExitOutcome::Mismatch { top } => self.diagnose(Diagnostic::CallStackMismatch {
                thread: thread.tid(),
                exited: name.to_owned(),
                top: top.clone(),
            }),
            ExitOutcome::Underflow => self.diagnose(Diagnostic::CallStackUnderflow {
                thread: thread.tid(),
                exited: name.to_owned(),
            }),
        }
        outcome
    }

    #[must_use]
    pub fn call_trace(&self, thread: &ThreadHandle) -> Vec<Symbol> {
        self.book.lock().stacks.trace(thread.key())
    }

    // ---- diagnostics and reporting -----------------------------------------

    /// Emits a diagnostic and counts it.
    pub fn diagnose(&self, diagnostic: Diagnostic) {
        DetectorMetrics::inc(&self.metrics.diagnostics);
        tracing::warn!(target: "etsan", diagnostic = diagnostic.name(), "{diagnostic}");
    }

    #[must_use]
    pub fn var_state(&self, addr: Address) -> Option<VarState> {
        self.vars.get(addr)
    }

    #[must_use]
    pub fn lock_state(&self, addr: Address) -> Option<LockState> {
        self.locks.get(addr)
    }

    /// Copy of every logged race record, in insertion order.
    #[must_use]
    pub fn races(&self) -> Vec<RaceRecord> {
        self.book.lock().races.records().to_vec()
    }

    #[must_use]
    pub fn race_sites(&self) -> usize {
        self.book.lock().races.len()
    }

    /// Prints not-yet-printed race reports to `out`.
    pub fn flush_reports_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<usize> {
        self.book.lock().races.flush(self.style, out)
    }

    /// Prints not-yet-printed race reports to the configured stream.
    pub fn flush_reports(&self) -> usize {
        let result = {
            let mut book = self.book.lock();
            with_stream(self.config.report_stream, |out| {
                book.races.flush(self.style, out)
            })
        };
        match result {
            Ok(n) => n,
            Err(err) => {
                self.diagnose(Diagnostic::ReportWrite {
                    error: err.to_string(),
                });
                0
            }
        }
    }

    #[must_use]
    pub fn summary(&self) -> DetectorSummary {
        let (race_sites, race_files) = {
            let book = self.book.lock();
            (book.races.len(), book.races.distinct_files())
        };
        let metrics = self.metrics.snapshot();
        DetectorSummary {
            threads: self.threads.len(),
            addresses: self.vars.len(),
            locks: self.locks.len(),
            reads: metrics.reads,
            writes: metrics.writes,
            racy_addresses: self.vars.racy_count(),
            race_sites,
            race_files,
            metrics,
        }
    }

    /// Writes the summary in `format`; nothing for [`SummaryFormat::Off`].
    pub fn write_summary<W: Write>(&self, format: SummaryFormat, out: &mut W) -> io::Result<()> {
        let summary = self.summary();
        match format {
            SummaryFormat::Off => Ok(()),
            SummaryFormat::Text => out.write_all(summary.to_text().as_bytes()),
            SummaryFormat::Json => {
                serde_json::to_writer(&mut *out, &summary).map_err(io::Error::other)?;
                out.write_all(b"\n")
            }
        }
    }

    /// End of the monitored program: flush reports, then print the summary
    /// to stderr as configured.
    pub fn finish(&self) -> DetectorSummary {
        let printed = self.flush_reports();
        let summary = self.summary();
        let mut err = io::stderr().lock();
        if let Err(error) = self.write_summary(self.config.summary, &mut err) {
            drop(err);
            self.diagnose(Diagnostic::ReportWrite {
                error: error.to_string(),
            });
        }
        tracing::debug!(target: "etsan", printed, races = summary.race_sites, "finished");
        summary
    }
}

fn with_stream<R>(stream: ReportStream, f: impl FnOnce(&mut dyn Write) -> R) -> R {
    match stream {
        ReportStream::Stdout => f(&mut io::stdout().lock()),
        ReportStream::Stderr => f(&mut io::stderr().lock()),
    }
}
