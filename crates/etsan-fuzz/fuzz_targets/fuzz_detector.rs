#![no_main]
//! Arbitrary single-threaded event sequences: the detector must never panic,
//! and thread clocks must keep `epoch == clock[tid]`.

use etsan_core::{
    AccessKind, AccessSite, ColorMode, DetectorConfig, DetectorContext, ReportStyle,
    SummaryFormat, ThreadKey,
};
use libfuzzer_sys::fuzz_target;

const THREADS: u8 = 6;
const NAMES: [&str; 4] = ["main", "worker", "helper", "unknown"];

fuzz_target!(|data: &[u8]| {
    let ctx = DetectorContext::new(DetectorConfig {
        color: ColorMode::Never,
        summary: SummaryFormat::Off,
        ..DetectorConfig::default()
    });

    for chunk in data.chunks_exact(3) {
        let thread = ctx.thread(ThreadKey(u64::from(chunk[0] % THREADS)));
        let other = ThreadKey(u64::from(chunk[1] % THREADS));
        let addr = 0x1000 + usize::from(chunk[2] % 16) * 8;
        let line = i32::from(chunk[2]);
        let site = || AccessSite::new(line, "x", "fuzz.c");

        match chunk[1] % 8 {
            0 => {
                ctx.access(&thread, addr, AccessKind::Read, site);
            }
            1 => {
                ctx.access(&thread, addr, AccessKind::Write, site);
            }
            2 => ctx.acquire(&thread, addr),
            3 => ctx.release(&thread, addr),
            4 => {
                ctx.fork(&thread, other);
            }
            5 => {
                ctx.join(&thread, other);
            }
            6 => ctx.enter_function(&thread, NAMES[usize::from(chunk[2] % 4)]),
            _ => {
                ctx.exit_function(&thread, NAMES[usize::from(chunk[2] % 4)]);
            }
        }
    }

    for state in ctx.threads().snapshot() {
        assert_eq!(state.epoch(), state.clock().get(state.tid()));
    }
    let mut out = Vec::new();
    let printed = ctx.flush_reports_to(&mut out).unwrap_or(0);
    assert!(printed <= ctx.race_sites());
    for race in ctx.races() {
        assert!(race.render(ReportStyle::PLAIN).contains("A race detected at"));
    }
});
