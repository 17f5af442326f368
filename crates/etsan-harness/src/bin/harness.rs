//! CLI entry point for the etsan scenario harness.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use etsan_core::config::{LOG_ENV, Setting, parse_log_level};
use etsan_core::{ColorMode, DetectorConfig};
use etsan_harness::structured_log::{LogEmitter, LogLevel};
use etsan_harness::{HarnessError, Scenario, ScenarioOutcome, ScenarioRunner};

/// etsan scenario harness.
#[derive(Parser)]
#[command(name = "harness", about = "Runs built-in race detection scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the built-in scenarios.
    List,
    /// Run one scenario and print its race reports.
    Run {
        /// Scenario name (see `harness list`).
        scenario: String,
        /// Worker threads, clamped to what the scenario needs.
        #[arg(long)]
        threads: Option<usize>,
        /// Report coloring: auto, always or never.
        #[arg(long)]
        color: Option<String>,
        /// Write a JSONL record of the run to this file.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Print the outcome as JSON instead of the race banners.
        #[arg(long)]
        json: bool,
    },
    /// Run every scenario and check each against its expected race count.
    RunAll {
        /// Write a JSONL record per scenario to this file.
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    install_logging();
    match dispatch(Cli::parse().command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("harness: {err}");
            ExitCode::from(2)
        }
    }
}

fn install_logging() {
    let Some(level) = std::env::var(LOG_ENV).ok().as_deref().and_then(parse_log_level) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

/// Returns whether every scenario that ran passed.
fn dispatch(command: Command) -> Result<bool, HarnessError> {
    match command {
        Command::List => {
            let mut out = std::io::stdout().lock();
            for scenario in Scenario::ALL {
                let spec = scenario.spec();
                writeln!(
                    out,
                    "{:<24} {} (threads {}, races {})",
                    spec.name, spec.description, spec.default_threads, spec.expected_races
                )?;
            }
            Ok(true)
        }
        Command::Run {
            scenario,
            threads,
            color,
            log,
            json,
        } => {
            let scenario = Scenario::from_name(&scenario)?;
            let mut config = DetectorConfig::from_env();
            if let Some(color) = color {
                config.color = ColorMode::from_str_strict(&color)?;
            }
            let outcome = ScenarioRunner::new(config).run(scenario, threads)?;

            let mut out = std::io::stdout().lock();
            if json {
                serde_json::to_writer_pretty(&mut out, &outcome)?;
                writeln!(out)?;
            } else {
                out.write_all(outcome.report.as_bytes())?;
                out.write_all(outcome.summary.to_text().as_bytes())?;
                writeln!(out, "{}", verdict_line(&outcome))?;
            }
            if let Some(path) = log {
                write_log(&path, std::slice::from_ref(&outcome))?;
            }
            Ok(outcome.passed)
        }
        Command::RunAll { log } => {
            let outcomes = ScenarioRunner::new(DetectorConfig::from_env()).run_all()?;
            let mut out = std::io::stdout().lock();
            for outcome in &outcomes {
                writeln!(out, "{}", verdict_line(outcome))?;
            }
            let failed = outcomes.iter().filter(|o| !o.passed).count();
            writeln!(out, "{} scenarios, {failed} failed", outcomes.len())?;
            if let Some(path) = log {
                write_log(&path, &outcomes)?;
            }
            Ok(failed == 0)
        }
    }
}

fn verdict_line(outcome: &ScenarioOutcome) -> String {
    format!(
        "[{}] {} threads={} races={} expected={}",
        if outcome.passed { "PASS" } else { "FAIL" },
        outcome.scenario,
        outcome.threads,
        outcome.races.len(),
        outcome.expected_races,
    )
}

fn write_log(path: &Path, outcomes: &[ScenarioOutcome]) -> Result<(), HarnessError> {
    let run_id = format!("pid{}", std::process::id());
    let mut emitter = LogEmitter::to_file(path, &run_id)?;
    emitter.emit(LogLevel::Info, "run_start")?;
    for outcome in outcomes {
        emitter.emit_outcome(outcome)?;
    }
    emitter.emit(LogLevel::Info, "run_end")?;
    emitter.flush()?;
    Ok(())
}
