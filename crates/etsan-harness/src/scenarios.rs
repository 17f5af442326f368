//! Built-in scenario programs.
//!
//! A scenario is a tiny multithreaded program. It performs its real work on
//! shared Rust data and reports every access, lock operation and thread
//! create/join to the detector, the same sequence of events the `__tsan_*`
//! hooks would see for the equivalent instrumented C program.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread::{self, JoinHandle};

use etsan_core::{AccessSite, Address, DetectorContext, ThreadHandle, ThreadKey};

use crate::error::HarnessError;

/// Key of the scenario's main thread.
pub const MAIN_THREAD: ThreadKey = ThreadKey(1);

/// Upper bound for `--threads`.
pub const MAX_THREADS: usize = 64;

const VALUE: Address = 0x1000;
const COUNTER: Address = 0x2000;
const COUNTER_LOCK: Address = 0x3000;
const DATA: Address = 0x4000;

/// Static description of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Source file named in race reports.
    pub file: &'static str,
    pub default_threads: usize,
    pub min_threads: usize,
    /// Distinct race sites a correct detector reports.
    pub expected_races: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    MultipleReads,
    LockCounter,
    UnsynchronizedWrites,
    SharedReadWrite,
    ForkJoinHandoff,
}

impl Scenario {
    pub const ALL: [Self; 5] = [
        Self::MultipleReads,
        Self::LockCounter,
        Self::UnsynchronizedWrites,
        Self::SharedReadWrite,
        Self::ForkJoinHandoff,
    ];

    #[must_use]
    pub const fn spec(self) -> ScenarioSpec {
        match self {
            Self::MultipleReads => ScenarioSpec {
                name: "multiple-reads",
                description: "threads read a value the main thread initialized",
                file: "multiple_reads.c",
                default_threads: 4,
                min_threads: 1,
                expected_races: 0,
            },
            Self::LockCounter => ScenarioSpec {
                name: "lock-counter",
                description: "threads increment a counter under one lock",
                file: "lock_counter.c",
                default_threads: 4,
                min_threads: 1,
                expected_races: 0,
            },
            Self::UnsynchronizedWrites => ScenarioSpec {
                name: "unsynchronized-writes",
                description: "threads write one location without synchronization",
                file: "unsynchronized_writes.c",
                default_threads: 2,
                min_threads: 2,
                expected_races: 1,
            },
            Self::SharedReadWrite => ScenarioSpec {
                name: "shared-read-write",
                description: "concurrent readers, then a writer ordered by nothing",
                file: "shared_read_write.c",
                default_threads: 3,
                min_threads: 3,
                expected_races: 1,
            },
            Self::ForkJoinHandoff => ScenarioSpec {
                name: "fork-join-handoff",
                description: "data handed to a child at create and back at join",
                file: "fork_join_handoff.c",
                default_threads: 2,
                min_threads: 2,
                expected_races: 0,
            },
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        self.spec().name
    }

    /// Looks a scenario up by its CLI name.
    pub fn from_name(name: &str) -> Result<Self, HarnessError> {
        let wanted = name.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| HarnessError::UnknownScenario(name.to_owned()))
    }

    /// Thread count actually used for a request of `requested` threads.
    #[must_use]
    pub fn thread_count(self, requested: Option<usize>) -> usize {
        let spec = self.spec();
        requested
            .unwrap_or(spec.default_threads)
            .clamp(spec.min_threads, MAX_THREADS)
    }

    /// Runs the program against `ctx` with `threads` threads, the main thread
    /// excluded.
    pub fn run(self, ctx: &Arc<DetectorContext>, threads: usize) {
        let file = self.spec().file;
        let mut program = Program::new(ctx, file);
        match self {
            Self::MultipleReads => multiple_reads(&mut program, threads),
            Self::LockCounter => lock_counter(&mut program, threads),
            Self::UnsynchronizedWrites => unsynchronized_writes(&mut program, threads),
            Self::SharedReadWrite => shared_read_write(&mut program, threads),
            Self::ForkJoinHandoff => fork_join_handoff(&mut program),
        }
        program.finish();
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Program scaffolding
// ---------------------------------------------------------------------------

/// Context handed to a worker body.
struct Worker {
    ctx: Arc<DetectorContext>,
    me: ThreadHandle,
    file: &'static str,
}

impl Worker {
    fn read(&self, addr: Address, line: i32, object: &'static str) -> bool {
        self.ctx
            .read(&self.me, addr, || AccessSite::new(line, object, self.file))
    }

    fn write(&self, addr: Address, line: i32, object: &'static str) -> bool {
        self.ctx
            .write(&self.me, addr, || AccessSite::new(line, object, self.file))
    }

    fn lock(&self, lock: Address) {
        self.ctx.acquire(&self.me, lock);
    }

    fn unlock(&self, lock: Address) {
        self.ctx.release(&self.me, lock);
    }
}

/// The main thread plus the workers it has created and not yet joined.
struct Program {
    main: Worker,
    next_key: u64,
    running: Vec<(ThreadKey, JoinHandle<()>)>,
}

impl Program {
    fn new(ctx: &Arc<DetectorContext>, file: &'static str) -> Self {
        let me = ctx.thread(MAIN_THREAD);
        ctx.enter_function(&me, "main");
        Self {
            main: Worker {
                ctx: Arc::clone(ctx),
                me,
                file,
            },
            next_key: MAIN_THREAD.0 + 1,
            running: Vec::new(),
        }
    }

    /// Creates a worker running `body` inside function `function`.
    fn spawn<F>(&mut self, function: &'static str, body: F) -> ThreadKey
    where
        F: FnOnce(&Worker) + Send + 'static,
    {
        let key = ThreadKey(self.next_key);
        self.next_key += 1;
        let ctx = Arc::clone(&self.main.ctx);
        let file = self.main.file;

        ctx.fork(&self.main.me, key);
        let handle = thread::spawn(move || {
            let me = ctx.thread(key);
            ctx.enter_function(&me, function);
            let worker = Worker { ctx, me, file };
            body(&worker);
            worker.ctx.exit_function(&worker.me, function);
        });
        self.running.push((key, handle));
        key
    }

    /// Waits for the worker `key` and reports the join.
    fn join(&mut self, key: ThreadKey) {
        if let Some(pos) = self.running.iter().position(|(k, _)| *k == key) {
            let (key, handle) = self.running.remove(pos);
            self.reap(key, handle);
        }
    }

    fn join_all(&mut self) {
        for (key, handle) in std::mem::take(&mut self.running) {
            self.reap(key, handle);
        }
    }

    fn reap(&self, key: ThreadKey, handle: JoinHandle<()>) {
        if handle.join().is_err() {
            tracing::warn!(target: "etsan", thread = key.0, "scenario worker panicked");
        }
        self.main.ctx.join(&self.main.me, key);
    }

    fn finish(mut self) {
        self.join_all();
        self.main.ctx.exit_function(&self.main.me, "main");
    }
}

// ---------------------------------------------------------------------------
// Programs
// ---------------------------------------------------------------------------

fn multiple_reads(program: &mut Program, threads: usize) {
    let value = Arc::new(AtomicU64::new(0));
    value.store(42, Ordering::Relaxed);
    program.main.write(VALUE, 8, "value");

    let start = Arc::new(Barrier::new(threads));
    for _ in 0..threads {
        let value = Arc::clone(&value);
        let start = Arc::clone(&start);
        program.spawn("reader", move |w| {
            start.wait();
            let seen = value.load(Ordering::Relaxed);
            w.read(VALUE, 14, "value");
            tracing::trace!(target: "etsan", seen, "reader done");
        });
    }
    program.join_all();
    program.main.read(VALUE, 22, "value");
}

fn lock_counter(program: &mut Program, threads: usize) {
    const ITERATIONS: usize = 100;
    let counter = Arc::new(Mutex::new(0_u64));

    for _ in 0..threads {
        let counter = Arc::clone(&counter);
        program.spawn("increment", move |w| {
            for _ in 0..ITERATIONS {
                let mut guard = counter.lock().unwrap_or_else(|e| e.into_inner());
                w.lock(COUNTER_LOCK);
                w.read(COUNTER, 11, "counter");
                *guard += 1;
                w.write(COUNTER, 11, "counter");
                w.unlock(COUNTER_LOCK);
            }
        });
    }
    program.join_all();
    program.main.read(COUNTER, 24, "counter");
}

fn unsynchronized_writes(program: &mut Program, threads: usize) {
    let counter = Arc::new(AtomicU64::new(0));
    let start = Arc::new(Barrier::new(threads));

    for _ in 0..threads {
        let counter = Arc::clone(&counter);
        let start = Arc::clone(&start);
        program.spawn("increment", move |w| {
            start.wait();
            // Load and store separately: the lost-update pattern of `x++`.
            let old = counter.load(Ordering::Relaxed);
            counter.store(old + 1, Ordering::Relaxed);
            w.write(COUNTER, 9, "counter");
        });
    }
}

fn shared_read_write(program: &mut Program, threads: usize) {
    let readers = threads - 1;
    let value = Arc::new(AtomicU64::new(7));
    let start = Arc::new(Barrier::new(readers));
    // Tells the writer the readers are done. The detector does not see it.
    let (done_tx, done_rx) = mpsc::channel::<()>();

    for _ in 0..readers {
        let value = Arc::clone(&value);
        let start = Arc::clone(&start);
        let done = done_tx.clone();
        program.spawn("reader", move |w| {
            start.wait();
            let _ = value.load(Ordering::Relaxed);
            w.read(VALUE, 12, "value");
            let _ = done.send(());
        });
    }
    drop(done_tx);

    let value = Arc::clone(&value);
    program.spawn("writer", move |w| {
        for _ in 0..readers {
            if done_rx.recv().is_err() {
                break;
            }
        }
        value.store(8, Ordering::Relaxed);
        w.write(VALUE, 19, "value");
    });
}

fn fork_join_handoff(program: &mut Program) {
    // A bystander keeps the program multithreaded, so the main thread's own
    // accesses are checked too.
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    program.spawn("bystander", move |_| {
        let _ = stop_rx.recv();
    });

    let data = Arc::new(Mutex::new(Vec::<u64>::new()));
    if let Ok(mut d) = data.lock() {
        d.push(1);
    }
    program.main.write(DATA, 10, "data");

    let child_data = Arc::clone(&data);
    let child = program.spawn("produce", move |w| {
        w.read(DATA, 15, "data");
        if let Ok(mut d) = child_data.lock() {
            d.push(2);
        }
        w.write(DATA, 16, "data");
    });
    program.join(child);

    program.main.read(DATA, 21, "data");
    program.main.write(DATA, 22, "data");
    let _ = stop_tx.send(());
}
