//! Detector configuration.
//!
//! Read from the environment once at startup:
//! - `ETSAN_COLOR` = `auto|always|never` (default `always`): ANSI colors in
//!   race reports.
//! - `ETSAN_REPORT` = `stdout|stderr` (default `stdout`): where reports go.
//! - `ETSAN_REPORT_MODE` = `deferred|immediate` (default `deferred`): reports
//!   are printed at process exit, or additionally right after each new race.
//! - `ETSAN_SUMMARY` = `off|text|json` (default `text`): end-of-run counters.
//! - `ETSAN_LOG` = `off|error|warn|info|debug|trace`: diagnostics level; no
//!   subscriber is installed when unset.
//!
//! Unknown values fall back to the default on the environment path and are
//! errors on the strict path used by command-line flags.

use std::io::IsTerminal;
use std::str::FromStr;

use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::race::ReportStyle;

pub const COLOR_ENV: &str = "ETSAN_COLOR";
pub const REPORT_ENV: &str = "ETSAN_REPORT";
pub const REPORT_MODE_ENV: &str = "ETSAN_REPORT_MODE";
pub const SUMMARY_ENV: &str = "ETSAN_SUMMARY";
pub const LOG_ENV: &str = "ETSAN_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown value {value:?} for {key}")]
    UnknownValue { key: &'static str, value: String },
}

/// A single enumerated setting.
pub trait Setting: Default + Sized {
    /// Environment variable naming this setting.
    const KEY: &'static str;

    /// Case-insensitive parse; `None` for unknown values.
    fn parse(raw: &str) -> Option<Self>;

    /// Unknown values map to the default.
    #[must_use]
    fn from_str_loose(raw: &str) -> Self {
        Self::parse(raw.trim()).unwrap_or_default()
    }

    fn from_str_strict(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw.trim()).ok_or_else(|| ConfigError::UnknownValue {
            key: Self::KEY,
            value: raw.to_owned(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMode {
    /// Color only when the report stream is a terminal.
    Auto,
    #[default]
    Always,
    Never,
}

impl Setting for ColorMode {
    const KEY: &'static str = COLOR_ENV;

    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "auto" | "tty" => Some(Self::Auto),
            "always" | "on" | "yes" | "1" => Some(Self::Always),
            "never" | "off" | "no" | "0" => Some(Self::Never),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportStream {
    #[default]
    Stdout,
    Stderr,
}

impl ReportStream {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Stdout => std::io::stdout().is_terminal(),
            Self::Stderr => std::io::stderr().is_terminal(),
        }
    }
}

impl Setting for ReportStream {
    const KEY: &'static str = REPORT_ENV;

    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "stdout" | "out" | "1" => Some(Self::Stdout),
            "stderr" | "err" | "2" => Some(Self::Stderr),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportMode {
    /// Print at process exit only.
    #[default]
    Deferred,
    /// Also print right after each newly logged race site.
    Immediate,
}

impl Setting for ReportMode {
    const KEY: &'static str = REPORT_MODE_ENV;

    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "deferred" | "exit" | "batch" => Some(Self::Deferred),
            "immediate" | "eager" => Some(Self::Immediate),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryFormat {
    Off,
    #[default]
    Text,
    Json,
}

impl Setting for SummaryFormat {
    const KEY: &'static str = SUMMARY_ENV;

    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "off" | "none" | "0" => Some(Self::Off),
            "text" | "on" | "1" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

macro_rules! impl_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromStr for $ty {
                type Err = ConfigError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Self::from_str_strict(s)
                }
            }
        )*
    };
}

impl_from_str!(ColorMode, ReportStream, ReportMode, SummaryFormat);

/// Parses a diagnostics level; `None` for unknown values.
#[must_use]
pub fn parse_log_level(raw: &str) -> Option<LevelFilter> {
    raw.trim().parse::<LevelFilter>().ok()
}

/// Complete detector configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    pub color: ColorMode,
    pub report_stream: ReportStream,
    pub report_mode: ReportMode,
    pub summary: SummaryFormat,
    /// Diagnostics level; `None` leaves logging to the host.
    pub log_level: Option<LevelFilter>,
}

impl DetectorConfig {
    /// Loose configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn setting<T: Setting>(lookup: &impl Fn(&str) -> Option<String>) -> T {
            lookup(T::KEY)
                .map(|raw| T::from_str_loose(&raw))
                .unwrap_or_default()
        }

        Self {
            color: setting(&lookup),
            report_stream: setting(&lookup),
            report_mode: setting(&lookup),
            summary: setting(&lookup),
            log_level: lookup(LOG_ENV).and_then(|raw| parse_log_level(&raw)),
        }
    }

    /// Strict configuration from an arbitrary key lookup.
    pub fn try_from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn setting<T: Setting>(
            lookup: &impl Fn(&str) -> Option<String>,
        ) -> Result<T, ConfigError> {
            lookup(T::KEY).map_or_else(|| Ok(T::default()), |raw| T::from_str_strict(&raw))
        }

        let log_level = match lookup(LOG_ENV) {
            None => None,
            Some(raw) => Some(parse_log_level(&raw).ok_or(ConfigError::UnknownValue {
                key: LOG_ENV,
                value: raw,
            })?),
        };
        Ok(Self {
            color: setting(&lookup)?,
            report_stream: setting(&lookup)?,
            report_mode: setting(&lookup)?,
            summary: setting(&lookup)?,
            log_level,
        })
    }

    /// Loose configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Style for report text, resolving `auto` against the report stream.
    #[must_use]
    pub fn report_style(&self) -> ReportStyle {
        let color = match self.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => self.report_stream.is_terminal(),
        };
        ReportStyle { color }
    }
}
