//! Append-only CSV study logs.
//!
//! Two files live under the configured log directory:
//!
//! | File | Columns |
//! |------|---------|
//! | `events.csv` | `timestamp, prolific_id, type, query, target` |
//! | `submissions.csv` | `timestamp, prolific_id, query, word_count, text` |
//!
//! Timestamps are naive UTC ISO-8601 with microseconds. Writes go through a
//! single mutex so concurrent handlers never interleave rows.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Which log file an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Events,
    Submissions,
}

impl LogKind {
    pub fn file_name(self) -> &'static str {
        match self {
            LogKind::Events => "events.csv",
            LogKind::Submissions => "submissions.csv",
        }
    }

    pub fn header(self) -> &'static [&'static str] {
        match self {
            LogKind::Events => &["timestamp", "prolific_id", "type", "query", "target"],
            LogKind::Submissions => &["timestamp", "prolific_id", "query", "word_count", "text"],
        }
    }
}

/// Event types written to `events.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    ProlificSet,
    Search,
    Submit,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ProlificSet => "prolific_set",
            EventType::Search => "search",
            EventType::Submit => "submit",
        }
    }
}

pub struct StudyLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl StudyLog {
    /// Opens the log directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self, kind: LogKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn log_event(
        &self,
        prolific_id: &str,
        event: EventType,
        query: &str,
        target: &str,
    ) -> Result<()> {
        let timestamp = timestamp();
        self.append(
            LogKind::Events,
            &[&timestamp, prolific_id, event.as_str(), query, target],
        )
    }

    pub fn log_submission(
        &self,
        prolific_id: &str,
        query: &str,
        word_count: usize,
        text: &str,
    ) -> Result<()> {
        let timestamp = timestamp();
        let word_count = word_count.to_string();
        self.append(
            LogKind::Submissions,
            &[&timestamp, prolific_id, query, &word_count, text],
        )
    }

    /// Writes the header row if the file is missing or empty.
    pub fn ensure_header(&self, kind: LogKind) -> Result<()> {
        let _guard = self.lock();
        self.ensure_header_locked(kind)
    }

    /// Every row of the file, header included. A missing file has no rows.
    pub fn read_rows(&self, kind: LogKind) -> Result<Vec<Vec<String>>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    /// Resets the file to just its header row.
    pub fn clear(&self, kind: LogKind) -> Result<()> {
        let _guard = self.lock();
        let path = self.path(kind);
        let file = File::create(&path)
            .with_context(|| format!("Failed to truncate {}", path.display()))?;
        write_record(file, kind.header(), &path)
    }

    fn append(&self, kind: LogKind, record: &[&str]) -> Result<()> {
        let _guard = self.lock();
        self.ensure_header_locked(kind)?;
        let path = self.path(kind);
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        write_record(file, record, &path)
    }

    fn ensure_header_locked(&self, kind: LogKind) -> Result<()> {
        let path = self.path(kind);
        let empty = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };
        if !empty {
            return Ok(());
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        write_record(file, kind.header(), &path)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock carries no broken state.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn write_record(file: File, record: &[&str], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(record)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

fn timestamp() -> String {
    Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, StudyLog) {
        let dir = TempDir::new().unwrap();
        let log = StudyLog::new(dir.path().join("logs")).unwrap();
        (dir, log)
    }

    #[test]
    fn creates_directory() {
        let (dir, _log) = open();
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn first_event_writes_header() {
        let (_dir, log) = open();
        log.log_event("P1", EventType::ProlificSet, "", "P1").unwrap();
        log.log_event("P1", EventType::Search, "apple", "[]").unwrap();

        let rows = log.read_rows(LogKind::Events).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], LogKind::Events.header());
        assert_eq!(&rows[1][1..], ["P1", "prolific_set", "", "P1"]);
        assert_eq!(&rows[2][1..], ["P1", "search", "apple", "[]"]);
    }

    #[test]
    fn submission_text_round_trips_with_csv_quoting() {
        let (_dir, log) = open();
        let text = "First line, with comma\nsecond \"quoted\" line";
        log.log_submission("P2", "q", 42, text).unwrap();

        let rows = log.read_rows(LogKind::Submissions).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], "P2");
        assert_eq!(rows[1][3], "42");
        assert_eq!(rows[1][4], text);
    }

    #[test]
    fn timestamp_format() {
        let (_dir, log) = open();
        log.log_event("P", EventType::Submit, "", "100").unwrap();
        let rows = log.read_rows(LogKind::Events).unwrap();
        let ts = &rows[1][0];
        assert!(
            chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.6f").is_ok(),
            "unexpected timestamp: {}",
            ts
        );
        assert_eq!(ts.len(), 26);
    }

    #[test]
    fn missing_file_reads_empty() {
        let (_dir, log) = open();
        assert!(log.read_rows(LogKind::Submissions).unwrap().is_empty());
    }

    #[test]
    fn ensure_header_is_idempotent() {
        let (_dir, log) = open();
        log.ensure_header(LogKind::Submissions).unwrap();
        log.ensure_header(LogKind::Submissions).unwrap();
        let rows = log.read_rows(LogKind::Submissions).unwrap();
        assert_eq!(rows, vec![LogKind::Submissions.header().to_vec()]);
    }

    #[test]
    fn clear_keeps_only_header() {
        let (_dir, log) = open();
        for i in 0..3 {
            log.log_event("P", EventType::Search, &format!("q{}", i), "").unwrap();
        }
        log.clear(LogKind::Events).unwrap();
        let rows = log.read_rows(LogKind::Events).unwrap();
        assert_eq!(rows, vec![LogKind::Events.header().to_vec()]);

        log.log_event("P", EventType::Search, "after", "").unwrap();
        assert_eq!(log.read_rows(LogKind::Events).unwrap().len(), 2);
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let (_dir, log) = open();
        let log = std::sync::Arc::new(log);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        log.log_event(&format!("P{}", t), EventType::Search, &format!("{}", i), "x")
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let rows = log.read_rows(LogKind::Events).unwrap();
        assert_eq!(rows.len(), 1 + 8 * 20);
        assert!(rows.iter().all(|r| r.len() == 5));
    }
}
