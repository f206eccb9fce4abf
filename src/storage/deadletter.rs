// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Dead-letter log for jobs that terminated permanently.
//!
//! Fatal worker errors (decryption failures, vectorizer refusals) and jobs
//! that exhausted their delivery attempts land here as an operator-visible
//! record. Entries are appended to a daily JSONL file; nothing in the
//! pipeline reads them back.

use std::fs::{self, OpenOptions};
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::JobKind;

use super::{StoragePaths, StorageResult};

/// Why a job was dead-lettered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Ciphertext rejected; retrying cannot produce good data.
    DecryptionFailed,
    /// The vectorization capability refused or is unreachable.
    VectorizationUnavailable,
    /// Transient failures exhausted the allowed delivery attempts.
    AttemptsExhausted,
}

/// A dead-lettered job entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub job_id: String,
    pub kind: JobKind,
    pub subject_id: String,
    pub reason: DeadLetterReason,
    pub attempts: u32,
    pub error: String,
}

impl DeadLetterEntry {
    pub fn new(
        job_id: impl Into<String>,
        kind: JobKind,
        subject_id: impl Into<String>,
        reason: DeadLetterReason,
        attempts: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            job_id: job_id.into(),
            kind,
            subject_id: subject_id.into(),
            reason,
            attempts,
            error: error.into(),
        }
    }
}

/// Append-only repository for dead-letter entries.
#[derive(Debug, Clone)]
pub struct DeadLetterLog {
    paths: StoragePaths,
}

impl DeadLetterLog {
    pub fn new(paths: StoragePaths) -> Self {
        Self { paths }
    }

    /// Append an entry to today's JSONL file.
    pub fn append(&self, entry: &DeadLetterEntry) -> StorageResult<()> {
        let date = entry.timestamp.format("%Y-%m-%d").to_string();
        let path = self.paths.deadletter_file(&date);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Read all entries for a given date (operator tooling, tests).
    pub fn entries_for_date(&self, date: &str) -> StorageResult<Vec<DeadLetterEntry>> {
        let path = self.paths.deadletter_file(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = DeadLetterLog::new(StoragePaths::new(dir.path()));

        let entry = DeadLetterEntry::new(
            "job-1",
            JobKind::Voice,
            "subject-1",
            DeadLetterReason::DecryptionFailed,
            1,
            "decryption failed: ciphertext rejected",
        );
        log.append(&entry).unwrap();
        log.append(&DeadLetterEntry::new(
            "job-2",
            JobKind::Face,
            "subject-2",
            DeadLetterReason::AttemptsExhausted,
            5,
            "blob fetch failed",
        ))
        .unwrap();

        let date = entry.timestamp.format("%Y-%m-%d").to_string();
        let entries = log.entries_for_date(&date).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].job_id, "job-1");
        assert_eq!(entries[1].reason, DeadLetterReason::AttemptsExhausted);
    }

    #[test]
    fn missing_date_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = DeadLetterLog::new(StoragePaths::new(dir.path()));
        assert!(log.entries_for_date("1970-01-01").unwrap().is_empty());
    }
}
