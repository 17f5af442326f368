//! Structured JSONL log of harness runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSON object per line with required + optional fields.
//! - [`LogEmitter`]: writes entries to a file or an in-memory buffer.
//! - [`validate_log_line`]: checks a single line against the schema.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::runner::ScenarioOutcome;

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const NAMES: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];
}

/// Scenario verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
}

impl Outcome {
    const NAMES: [&'static str; 3] = ["pass", "fail", "error"];
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    /// Distinct race sites reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub races: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_races: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            scenario: None,
            threads: None,
            races: None,
            expected_races: None,
            summary: None,
            outcome: None,
            duration_ms: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Entry describing a finished scenario run. Race records go to
    /// `details.races`.
    pub fn from_outcome(
        trace_id: impl Into<String>,
        outcome: &ScenarioOutcome,
    ) -> Result<Self, serde_json::Error> {
        let (level, verdict) = if outcome.passed {
            (LogLevel::Info, Outcome::Pass)
        } else {
            (LogLevel::Error, Outcome::Fail)
        };
        let mut entry = Self::new(trace_id, level, "scenario_result")
            .with_scenario(outcome.scenario)
            .with_outcome(verdict)
            .with_details(serde_json::json!({
                "races": serde_json::to_value(&outcome.races)?,
            }));
        entry.threads = Some(outcome.threads);
        entry.races = Some(outcome.races.len());
        entry.expected_races = Some(outcome.expected_races);
        entry.summary = Some(serde_json::to_value(outcome.summary)?);
        entry.duration_ms = Some(outcome.duration_ms);
        Ok(entry)
    }

    /// Serialize to a single JSONL line.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Writes structured JSONL log entries.
pub struct LogEmitter {
    writer: Box<dyn Write>,
    seq: u64,
    run_id: String,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self {
            writer: Box::new(std::io::BufWriter::new(file)),
            seq: 0,
            run_id: run_id.to_string(),
        })
    }

    /// Create an emitter that discards its output after formatting it.
    #[must_use]
    pub fn to_buffer(run_id: &str) -> Self {
        Self {
            writer: Box::new(Vec::new()),
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    /// Trace IDs look like `etsan::<run_id>::<seq>`.
    pub fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("etsan::{}::{:03}", self.run_id, self.seq)
    }

    /// Emit a bare event.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let entry = LogEntry::new(trace_id, level, event);
        self.write_entry(&entry)?;
        Ok(entry)
    }

    /// Emit the result of a scenario run.
    pub fn emit_outcome(&mut self, outcome: &ScenarioOutcome) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let entry = LogEntry::from_outcome(trace_id, outcome).map_err(std::io::Error::other)?;
        self.write_entry(&entry)?;
        Ok(entry)
    }

    fn write_entry(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let error = |field: &str, message: String| LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    };

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Err(vec![error("<json>", format!("invalid JSON: {e}"))]),
    };
    let Some(obj) = value.as_object() else {
        return Err(vec![error("<root>", "expected JSON object".to_string())]);
    };

    let mut errors = Vec::new();
    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(error(field, "required field missing".to_string()));
        }
    }

    if let Some(level) = obj.get("level").and_then(|v| v.as_str())
        && !LogLevel::NAMES.contains(&level)
    {
        errors.push(error("level", format!("invalid level: '{level}'")));
    }

    if let Some(outcome) = obj.get("outcome").and_then(|v| v.as_str())
        && !Outcome::NAMES.contains(&outcome)
    {
        errors.push(error("outcome", format!("invalid outcome: '{outcome}'")));
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && !trace_id.contains("::")
    {
        errors.push(error(
            "trace_id",
            format!("expected '<prefix>::<run>::<seq>', got '{trace_id}'"),
        ));
    }

    if obj.contains_key("scenario") && !obj.contains_key("outcome") {
        errors.push(error(
            "outcome",
            "scenario entries must carry an outcome".to_string(),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    serde_json::from_value(value).map_err(|e| vec![error("<schema>", e.to_string())])
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let (year, month, day) = civil_from_days(secs / 86_400);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60,
        duration.subsec_millis(),
    )
}

/// Gregorian date of a day count since 1970-01-01.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}
