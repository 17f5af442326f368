//! Scenario execution engine.

use std::sync::Arc;
use std::time::Instant;

use etsan_core::{
    DetectorConfig, DetectorContext, DetectorSummary, RaceRecord, ReportMode,
};
use serde::Serialize;

use crate::error::HarnessError;
use crate::scenarios::Scenario;

/// Result of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: &'static str,
    pub threads: usize,
    pub expected_races: usize,
    /// Distinct race sites, in detection order.
    pub races: Vec<RaceRecord>,
    pub summary: DetectorSummary,
    pub passed: bool,
    pub duration_ms: u64,
    /// The race banners exactly as the detector printed them.
    #[serde(skip)]
    pub report: String,
}

/// Runs scenarios, each against a fresh detector.
pub struct ScenarioRunner {
    config: DetectorConfig,
}

impl ScenarioRunner {
    /// Reports are always collected at the end of a run, so an
    /// `immediate` report mode in `config` is ignored.
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config: DetectorConfig {
                report_mode: ReportMode::Deferred,
                ..config
            },
        }
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Runs `scenario` with `threads` worker threads (its default when
    /// `None`).
    pub fn run(
        &self,
        scenario: Scenario,
        threads: Option<usize>,
    ) -> Result<ScenarioOutcome, HarnessError> {
        let spec = scenario.spec();
        let threads = scenario.thread_count(threads);
        let ctx = Arc::new(DetectorContext::new(self.config));

        let started = Instant::now();
        scenario.run(&ctx, threads);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut report = Vec::new();
        ctx.flush_reports_to(&mut report)?;
        let races = ctx.races();
        let passed = races.len() == spec.expected_races;
        tracing::info!(
            target: "etsan",
            scenario = spec.name,
            threads,
            races = races.len(),
            expected = spec.expected_races,
            passed,
            "scenario finished"
        );

        Ok(ScenarioOutcome {
            scenario: spec.name,
            threads,
            expected_races: spec.expected_races,
            races,
            summary: ctx.summary(),
            passed,
            duration_ms,
            report: String::from_utf8_lossy(&report).into_owned(),
        })
    }

    /// Runs every built-in scenario with its default thread count.
    pub fn run_all(&self) -> Result<Vec<ScenarioOutcome>, HarnessError> {
        Scenario::ALL
            .into_iter()
            .map(|scenario| self.run(scenario, None))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etsan_core::{ColorMode, SummaryFormat};

    #[test]
    fn immediate_mode_is_deferred_for_collection() {
        let runner = ScenarioRunner::new(DetectorConfig {
            report_mode: ReportMode::Immediate,
            color: ColorMode::Never,
            summary: SummaryFormat::Off,
            ..DetectorConfig::default()
        });
        assert_eq!(runner.config().report_mode, ReportMode::Deferred);
        assert_eq!(runner.config().color, ColorMode::Never);
    }
}
