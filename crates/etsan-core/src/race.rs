//! Race records and their report text.

use std::cmp::Ordering;
use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::clock::ThreadId;
use crate::fasttrack::RaceKind;
use crate::symbol::Symbol;

const BORDER: &str = "=============================================\n";
const BLANK: &str = "                                             \n";

/// Kind of the access that triggered a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation options for report text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportStyle {
    /// Wrap the banner, file line and stack header in ANSI colors.
    pub color: bool,
}

impl ReportStyle {
    pub const PLAIN: Self = Self { color: false };
    pub const COLORED: Self = Self { color: true };

    fn paint(self, out: &mut String, code: &str, text: fmt::Arguments<'_>) {
        if self.color {
            let _ = write!(out, "\x1b[{code}m{text}\x1b[m");
        } else {
            let _ = out.write_fmt(text);
        }
    }
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self::COLORED
    }
}

/// Deduplication key of a race site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RaceKey {
    pub file: Symbol,
    pub line: i32,
    pub access: AccessKind,
}

impl Ord for RaceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file
            .as_str()
            .cmp(other.file.as_str())
            .then(self.line.cmp(&other.line))
            .then(self.access.cmp(&other.access))
    }
}

impl PartialOrd for RaceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One detected race.
#[derive(Debug, Clone, Serialize)]
pub struct RaceRecord {
    pub thread: ThreadId,
    pub line: i32,
    pub access: AccessKind,
    pub object: Symbol,
    pub file: Symbol,
    /// Call stack of the reporting thread, innermost last.
    pub trace: Vec<Symbol>,
    pub kind: RaceKind,
    pub conflict: ThreadId,
    /// Detections merged into this record, itself included.
    pub hits: u32,
    #[serde(skip)]
    message: Option<String>,
}

impl RaceRecord {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        thread: ThreadId,
        line: i32,
        access: AccessKind,
        object: Symbol,
        file: Symbol,
        trace: Vec<Symbol>,
        kind: RaceKind,
        conflict: ThreadId,
    ) -> Self {
        Self {
            thread,
            line,
            access,
            object,
            file,
            trace,
            kind,
            conflict,
            hits: 1,
            message: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> RaceKey {
        RaceKey {
            file: self.file.clone(),
            line: self.line,
            access: self.access,
        }
    }

    /// Indented call-stack lines; frame `i` is indented by `1 + 4 * i`.
    #[must_use]
    pub fn render_stack(&self) -> String {
        let mut out = String::new();
        for (i, func) in self.trace.iter().enumerate() {
            let depth = 1 + 4 * i;
            let _ = writeln!(out, "{:depth$} '--->{func}(...)", "");
        }
        out
    }

    /// Full report block for this record.
    #[must_use]
    pub fn render(&self, style: ReportStyle) -> String {
        let mut out = String::with_capacity(256);
        out.push_str(BORDER);
        style.paint(&mut out, "1;32", format_args!("EMBEDSANITIZER Race report"));
        out.push('\n');
        style.paint(
            &mut out,
            "1;31",
            format_args!(" A race detected at: {}", self.file),
        );
        out.push('\n');
        let _ = writeln!(out, "  At line number: {}", self.line);
        let _ = writeln!(
            out,
            "  Thread (tid={}) {} \"{}\"     ",
            self.thread, self.access, self.object
        );
        out.push_str(BLANK);
        style.paint(&mut out, "1;33", format_args!(" Call stack:   "));
        out.push_str("              \n");
        out.push_str(&self.render_stack());
        out.push_str(BORDER);
        out
    }

    /// Builds and caches the report text.
    ///
    /// Returns `true` together with the cached text when it had already been
    /// built by an earlier call.
    pub fn build_message(&mut self, style: ReportStyle) -> (bool, &str) {
        let already = self.message.is_some();
        if !already {
            self.message = Some(self.render(style));
        }
        (already, self.message.as_deref().unwrap_or_default())
    }
}
