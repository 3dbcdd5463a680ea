//! Dead-letter log.
//!
//! Records that exhausted their retries, or failed in a way retrying cannot
//! fix, end up here. Every entry is logged; when a path is configured it is
//! also appended to that file as one JSON line. The most recent entries stay
//! in memory for inspection.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::MetricRecord;

/// Entries kept in memory.
pub const DEFAULT_RETAINED: usize = 256;

/// A record removed from the retry queue for good.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Pipeline the record was collected by.
    pub pipeline: String,
    pub record: MetricRecord,
    pub attempts: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Append-only failure log.
#[derive(Debug)]
pub struct DeadLetterLog {
    pipeline: String,
    file: Option<(PathBuf, File)>,
    recent: VecDeque<DeadLetter>,
    retained: usize,
    total: u64,
}

impl DeadLetterLog {
    /// In-memory log for a pipeline.
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            file: None,
            recent: VecDeque::new(),
            retained: DEFAULT_RETAINED,
            total: 0,
        }
    }

    /// Also append entries to a JSON-lines file.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.file = Some((path, file));
        Ok(self)
    }

    pub fn with_retained(mut self, retained: usize) -> Self {
        self.retained = retained;
        self
    }

    pub fn push(&mut self, entry: DeadLetter) {
        tracing::warn!(
            pipeline = %self.pipeline,
            event_id = %entry.record.event_id,
            attempts = entry.attempts,
            reason = %entry.reason,
            "Record dead-lettered"
        );

        if let Some((path, file)) = self.file.as_mut() {
            let written = serde_json::to_vec(&entry)
                .map_err(std::io::Error::from)
                .and_then(|mut line| {
                    line.push(b'\n');
                    file.write_all(&line)
                });
            if let Err(e) = written {
                tracing::error!(
                    pipeline = %self.pipeline,
                    path = %path.display(),
                    error = %e,
                    "Failed to append dead letter"
                );
            }
        }

        self.total += 1;
        if self.retained == 0 {
            return;
        }
        if self.recent.len() == self.retained {
            self.recent.pop_front();
        }
        self.recent.push_back(entry);
    }

    /// Dead letters written since creation.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Most recent entries, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &DeadLetter> {
        self.recent.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    fn letter(n: u32) -> DeadLetter {
        DeadLetter {
            pipeline: "p".to_string(),
            record: MetricRecord::new("k", RecordType::Custom, n as i64)
                .with_event_id(format!("e{n}")),
            attempts: n,
            reason: "unavailable".to_string(),
            dead_lettered_at: Utc::now(),
        }
    }

    #[test]
    fn test_dead_letter_retention_is_bounded() {
        let mut log = DeadLetterLog::new("p").with_retained(2);
        for n in 0..5 {
            log.push(letter(n));
        }
        assert_eq!(log.total(), 5);
        let ids: Vec<_> = log.recent().map(|d| d.record.event_id.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e4"]);
    }

    #[test]
    fn test_dead_letter_file_is_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead.jsonl");

        let mut log = DeadLetterLog::new("p").with_file(&path).unwrap();
        log.push(letter(1));
        log.push(letter(2));
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<DeadLetter> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].record.event_id, "e2");
        assert_eq!(lines[1].attempts, 2);
    }

    #[test]
    fn test_shared_file_keeps_pipeline_names_apart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead.jsonl");

        let mut host = DeadLetterLog::new("host").with_file(&path).unwrap();
        let mut web = DeadLetterLog::new("web").with_file(&path).unwrap();
        host.push(DeadLetter {
            pipeline: "host".to_string(),
            ..letter(1)
        });
        web.push(DeadLetter {
            pipeline: "web".to_string(),
            ..letter(2)
        });
        drop((host, web));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["pipeline"], "host");
        assert_eq!(lines[0]["record"]["event_id"], "e1");
        assert_eq!(lines[1]["pipeline"], "web");
        assert_eq!(lines[1]["record"]["event_id"], "e2");
    }
}
