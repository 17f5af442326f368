//! Deduplicated, insertion-ordered log of race records.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use crate::race::{RaceKey, RaceRecord, ReportStyle};

/// Outcome of [`RaceLog::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// A new site; the record was appended at this position.
    New(usize),
    /// The site was already logged; the existing record's hit count grew.
    Merged(usize),
}

impl Insertion {
    #[must_use]
    pub const fn is_new(self) -> bool {
        matches!(self, Self::New(_))
    }
}

/// Race records keyed by `(file, line, access)`.
///
/// The first record of a site is kept; later detections of the same site
/// only bump its `hits`.
#[derive(Debug, Default)]
pub struct RaceLog {
    records: Vec<RaceRecord>,
    index: BTreeMap<RaceKey, usize>,
    /// Records before this position reached the output.
    printed: usize,
}

impl RaceLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: RaceRecord) -> Insertion {
        let key = record.key();
        if let Some(&pos) = self.index.get(&key) {
            let existing = &mut self.records[pos];
            existing.hits = existing.hits.saturating_add(1);
            return Insertion::Merged(pos);
        }
        let pos = self.records.len();
        self.records.push(record);
        self.index.insert(key, pos);
        Insertion::New(pos)
    }

    /// Writes every record not printed by an earlier flush, oldest first.
    ///
    /// Records count as printed only once the write and the flush both
    /// succeed; after an error the same records are written again next time.
    /// Returns the number of records written.
    pub fn flush<W: Write + ?Sized>(&mut self, style: ReportStyle, out: &mut W) -> io::Result<usize> {
        let pending = &mut self.records[self.printed..];
        if pending.is_empty() {
            return Ok(0);
        }

        let mut block = String::new();
        for record in pending.iter_mut() {
            block.push_str(record.build_message(style).1);
        }
        out.write_all(block.as_bytes())?;
        out.flush()?;

        let written = pending.len();
        self.printed = self.records.len();
        Ok(written)
    }

    #[must_use]
    pub fn records(&self) -> &[RaceRecord] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, key: &RaceKey) -> Option<&RaceRecord> {
        self.index.get(key).map(|&pos| &self.records[pos])
    }

    /// Number of distinct race sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct source files with at least one race.
    #[must_use]
    pub fn distinct_files(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.file.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Number of records still waiting for a flush.
    #[must_use]
    pub fn unflushed(&self) -> usize {
        self.records.len() - self.printed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ThreadId;
    use crate::fasttrack::RaceKind;
    use crate::race::AccessKind;
    use crate::symbol::Symbol;

    fn record(file: &str, line: i32, access: AccessKind, tid: u32) -> RaceRecord {
        RaceRecord::new(
            ThreadId(tid),
            line,
            access,
            Symbol::from("x"),
            Symbol::from(file),
            Vec::new(),
            RaceKind::WriteWrite,
            ThreadId(0),
        )
    }

    fn flush_to_string(log: &mut RaceLog) -> (usize, String) {
        let mut out = Vec::new();
        let n = log.flush(ReportStyle::PLAIN, &mut out).unwrap();
        (n, String::from_utf8(out).unwrap())
    }

    #[test]
    fn duplicate_site_keeps_first_and_counts_hits() {
        let mut log = RaceLog::new();
        assert_eq!(log.insert(record("a.c", 10, AccessKind::Write, 1)), Insertion::New(0));
        assert_eq!(log.insert(record("a.c", 10, AccessKind::Write, 2)), Insertion::Merged(0));
        assert_eq!(log.len(), 1);
        assert_eq!(log.records()[0].thread, ThreadId(1));
        assert_eq!(log.records()[0].hits, 2);
    }

    #[test]
    fn access_kind_and_line_distinguish_sites() {
        let mut log = RaceLog::new();
        log.insert(record("a.c", 10, AccessKind::Write, 1));
        log.insert(record("a.c", 10, AccessKind::Read, 1));
        log.insert(record("a.c", 11, AccessKind::Write, 1));
        log.insert(record("b.c", 10, AccessKind::Write, 1));
        assert_eq!(log.len(), 4);
        assert_eq!(log.distinct_files(), 2);
    }

    #[test]
    fn flush_prints_each_record_once_in_insertion_order() {
        let mut log = RaceLog::new();
        log.insert(record("b.c", 20, AccessKind::Write, 1));
        log.insert(record("a.c", 10, AccessKind::Write, 2));
        assert_eq!(log.unflushed(), 2);

        let (n, text) = flush_to_string(&mut log);
        assert_eq!(n, 2);
        let b = text.find("b.c").unwrap();
        let a = text.find("a.c").unwrap();
        assert!(b < a);
        assert_eq!(log.unflushed(), 0);

        let (n, text) = flush_to_string(&mut log);
        assert_eq!(n, 0);
        assert!(text.is_empty());
    }

    #[test]
    fn records_added_after_flush_print_next_time() {
        let mut log = RaceLog::new();
        log.insert(record("a.c", 1, AccessKind::Write, 1));
        flush_to_string(&mut log);

        log.insert(record("a.c", 2, AccessKind::Write, 1));
        log.insert(record("a.c", 1, AccessKind::Write, 3));
        let (n, text) = flush_to_string(&mut log);
        assert_eq!(n, 1);
        assert!(text.contains("At line number: 2\n"));
        assert!(!text.contains("At line number: 1\n"));
    }

    /// Fails every write until `failures` runs out.
    struct FlakyWriter {
        failures: usize,
        written: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_write_keeps_records_pending() {
        let mut log = RaceLog::new();
        log.insert(record("a.c", 5, AccessKind::Write, 1));
        log.insert(record("a.c", 6, AccessKind::Read, 2));

        let mut out = FlakyWriter {
            failures: 1,
            written: Vec::new(),
        };
        assert!(log.flush(ReportStyle::PLAIN, &mut out).is_err());
        assert_eq!(log.unflushed(), 2);

        assert_eq!(log.flush(ReportStyle::PLAIN, &mut out).unwrap(), 2);
        let text = String::from_utf8(out.written).unwrap();
        assert!(text.contains("At line number: 5\n"));
        assert!(text.contains("At line number: 6\n"));
        assert_eq!(log.unflushed(), 0);

        let (n, _) = flush_to_string(&mut log);
        assert_eq!(n, 0);
    }
}
