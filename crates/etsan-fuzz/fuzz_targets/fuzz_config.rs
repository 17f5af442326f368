#![no_main]
//! Environment parsing never panics, and strict parsing agrees with loose
//! parsing whenever it succeeds.

use etsan_core::config::{Setting, parse_log_level};
use etsan_core::{ColorMode, DetectorConfig, ReportMode, ReportStream, SummaryFormat};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);

    if let Ok(strict) = ColorMode::from_str_strict(&raw) {
        assert_eq!(strict, ColorMode::from_str_loose(&raw));
    }
    if let Ok(strict) = ReportStream::from_str_strict(&raw) {
        assert_eq!(strict, ReportStream::from_str_loose(&raw));
    }
    if let Ok(strict) = ReportMode::from_str_strict(&raw) {
        assert_eq!(strict, ReportMode::from_str_loose(&raw));
    }
    if let Ok(strict) = SummaryFormat::from_str_strict(&raw) {
        assert_eq!(strict, SummaryFormat::from_str_loose(&raw));
    }
    let _ = parse_log_level(&raw);

    let value = raw.to_string();
    let _ = DetectorConfig::from_lookup(|_| Some(value.clone()));
});
