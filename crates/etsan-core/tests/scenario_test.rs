//! Integration test: detector scenarios with real threads.
//!
//! Each worker thread runs under its own `ThreadKey`; the main thread reports
//! thread create/join around `std::thread` spawn/join the way instrumented
//! code does.
//!
//! Run: cargo test -p etsan-core --test scenario_test

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use etsan_core::{
    AccessKind, AccessSite, ColorMode, DetectorConfig, DetectorContext, RaceKind, SummaryFormat,
    ThreadKey,
};

const MAIN: ThreadKey = ThreadKey(1);
const X: usize = 0x1000;
const COUNTER: usize = 0x2000;
const LOCK: usize = 0x3000;

fn detector() -> Arc<DetectorContext> {
    Arc::new(DetectorContext::new(DetectorConfig {
        color: ColorMode::Never,
        summary: SummaryFormat::Off,
        ..DetectorConfig::default()
    }))
}

fn site(line: i32, object: &'static str) -> impl FnOnce() -> AccessSite<'static> {
    move || AccessSite::new(line, object, "scenario.c")
}

fn worker_key(i: usize) -> ThreadKey {
    ThreadKey(100 + i as u64)
}

// ---------------------------------------------------------------------------
// Lock-protected counter
// ---------------------------------------------------------------------------

#[test]
fn lock_protected_counter_has_no_races() {
    let ctx = detector();
    let main = ctx.thread(MAIN);
    let counter = Arc::new(Mutex::new(0_u64));

    let mut workers = Vec::new();
    for i in 0..4 {
        let key = worker_key(i);
        ctx.fork(&main, key);
        let ctx = Arc::clone(&ctx);
        let counter = Arc::clone(&counter);
        workers.push((
            key,
            thread::spawn(move || {
                let me = ctx.thread(key);
                for _ in 0..50 {
                    let mut guard = counter.lock().unwrap();
                    ctx.acquire(&me, LOCK);
                    ctx.read(&me, COUNTER, site(20, "counter"));
                    *guard += 1;
                    ctx.write(&me, COUNTER, site(21, "counter"));
                    ctx.release(&me, LOCK);
                }
            }),
        ));
    }
    for (key, handle) in workers {
        handle.join().unwrap();
        ctx.join(&main, key);
    }

    assert_eq!(*counter.lock().unwrap(), 200);
    assert!(ctx.races().is_empty());
    let summary = ctx.summary();
    assert_eq!(summary.racy_addresses, 0);
    assert_eq!(summary.threads, 5);
    assert_eq!(summary.metrics.acquires, 200);
    assert_eq!(ctx.gate().count(), 0);
}

// ---------------------------------------------------------------------------
// Unsynchronized writes
// ---------------------------------------------------------------------------

#[test]
fn unsynchronized_writes_report_one_race() {
    let ctx = detector();
    let main = ctx.thread(MAIN);
    let a = worker_key(0);
    let b = worker_key(1);
    ctx.fork(&main, a);
    ctx.fork(&main, b);

    for (key, line) in [(a, 10), (b, 12)] {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            let me = ctx.thread(key);
            ctx.write(&me, X, site(line, "shared"));
        })
        .join()
        .unwrap();
    }
    ctx.join(&main, a);
    ctx.join(&main, b);

    let races = ctx.races();
    assert_eq!(races.len(), 1);
    let race = &races[0];
    assert_eq!(race.access, AccessKind::Write);
    assert!(race.line == 10 || race.line == 12);
    assert_eq!(race.kind, RaceKind::WriteWrite);
    let a_tid = ctx.threads().lookup(a).unwrap().tid();
    let b_tid = ctx.threads().lookup(b).unwrap().tid();
    assert_ne!(race.thread, race.conflict);
    assert!([a_tid, b_tid].contains(&race.thread));
    assert!([a_tid, b_tid].contains(&race.conflict));
}

#[test]
fn concurrent_unsynchronized_writes_report_at_least_one_race() {
    let ctx = detector();
    let main = ctx.thread(MAIN);
    let start = Arc::new(Barrier::new(2));
    let keys = [worker_key(0), worker_key(1)];
    for key in keys {
        ctx.fork(&main, key);
    }

    let handles: Vec<_> = keys
        .into_iter()
        .enumerate()
        .map(|(i, key)| {
            let ctx = Arc::clone(&ctx);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let me = ctx.thread(key);
                start.wait();
                let mut racy = false;
                for _ in 0..100 {
                    racy |= ctx.write(&me, X, site(10 + 2 * i as i32, "shared"));
                }
                racy
            })
        })
        .collect();
    let reported: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(reported.iter().any(|&r| r));
    assert!(ctx.var_state(X).is_some_and(|v| v.is_racy()));
    assert_eq!(ctx.races().len(), 1);
}

// ---------------------------------------------------------------------------
// Shared reads followed by an unordered write
// ---------------------------------------------------------------------------

#[test]
fn write_after_unordered_reads_races_through_shared_path() {
    let ctx = detector();
    let main = ctx.thread(MAIN);
    let keys = [worker_key(0), worker_key(1), worker_key(2)];
    for key in keys {
        ctx.fork(&main, key);
    }

    let run = |key: ThreadKey, access: AccessKind, line: i32| {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            let me = ctx.thread(key);
            ctx.access(&me, X, access, site(line, "value"))
        })
        .join()
        .unwrap()
    };

    assert!(!run(keys[0], AccessKind::Read, 30));
    assert!(!run(keys[1], AccessKind::Read, 31));
    assert!(ctx.var_state(X).is_some_and(|v| v.is_shared()));
    assert!(run(keys[2], AccessKind::Write, 32));

    let races = ctx.races();
    assert_eq!(races.len(), 1);
    assert_eq!(races[0].kind, RaceKind::SharedReadWrite);
    assert_eq!(races[0].access, AccessKind::Write);
    assert_eq!(races[0].line, 32);
}

// ---------------------------------------------------------------------------
// Fork/join handoff
// ---------------------------------------------------------------------------

#[test]
fn fork_join_handoff_is_ordered() {
    let ctx = detector();
    let main = ctx.thread(MAIN);

    // A spectator keeps the gate open so the main thread's accesses are
    // checked as well.
    let spectator = worker_key(9);
    ctx.fork(&main, spectator);

    assert!(!ctx.write(&main, X, site(40, "data")));
    let child = worker_key(0);
    ctx.fork(&main, child);
    {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            let me = ctx.thread(child);
            assert!(!ctx.read(&me, X, site(41, "data")));
            assert!(!ctx.write(&me, X, site(42, "data")));
        })
        .join()
        .unwrap();
    }
    ctx.join(&main, child);
    assert!(!ctx.read(&main, X, site(43, "data")));
    assert!(!ctx.write(&main, X, site(44, "data")));
    ctx.join(&main, spectator);

    assert!(ctx.races().is_empty());
    let metrics = ctx.metrics().snapshot();
    assert_eq!(metrics.writes, 3);
    assert_eq!(metrics.reads, 2);
    assert_eq!(metrics.gated_accesses, 0);
}

#[test]
fn access_after_join_without_handoff_races() {
    let ctx = detector();
    let main = ctx.thread(MAIN);
    let spectator = worker_key(9);
    ctx.fork(&main, spectator);

    let child = worker_key(0);
    ctx.fork(&main, child);
    {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            let me = ctx.thread(child);
            ctx.write(&me, X, site(50, "data"));
        })
        .join()
        .unwrap();
    }
    // No join reported: the main thread has not observed the child's write.
    assert!(ctx.read(&main, X, site(51, "data")));
    assert_eq!(ctx.races()[0].kind, RaceKind::WriteRead);
}

// ---------------------------------------------------------------------------
// Single-threaded access patterns
// ---------------------------------------------------------------------------

#[test]
fn single_thread_is_never_racy() {
    let ctx = detector();
    let main = ctx.thread(MAIN);
    ctx.fork(&main, worker_key(0));

    let mut seed = 0x2545_f491_u32;
    for _ in 0..2_000 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let addr = 0x4000 + (seed as usize % 16) * 8;
        let access = if seed & 0x100 == 0 {
            AccessKind::Read
        } else {
            AccessKind::Write
        };
        if seed & 0x3000 == 0 {
            ctx.acquire(&main, LOCK);
            ctx.release(&main, LOCK);
        }
        assert!(!ctx.access(&main, addr, access, site(60, "local")));
    }

    assert!(ctx.races().is_empty());
    assert_eq!(ctx.summary().racy_addresses, 0);
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[test]
fn flush_prints_each_race_once() {
    let ctx = detector();
    let main = ctx.thread(MAIN);
    let child = worker_key(0);
    ctx.fork(&main, child);
    let me = ctx.thread(child);

    ctx.write(&main, X, site(70, "a"));
    ctx.write(&me, X, site(71, "a"));

    let mut out = Vec::new();
    assert_eq!(ctx.flush_reports_to(&mut out).unwrap(), 1);
    let first = String::from_utf8(out).unwrap();
    assert!(first.starts_with("=============================================\n"));
    assert!(first.contains(" A race detected at: scenario.c\n"));
    assert!(first.contains("  At line number: 71\n"));

    let mut again = Vec::new();
    assert_eq!(ctx.flush_reports_to(&mut again).unwrap(), 0);

    ctx.write(&main, X + 8, site(72, "b"));
    ctx.write(&me, X + 8, site(73, "b"));
    let mut later = Vec::new();
    assert_eq!(ctx.flush_reports_to(&mut later).unwrap(), 1);
    let later = String::from_utf8(later).unwrap();
    assert!(later.contains("  At line number: 73\n"));
    assert!(!later.contains("  At line number: 71\n"));
}
