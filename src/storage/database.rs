// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded enrollment database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `subjects`: subject_id → serialized Subject
//! - `voice_samples`: subject_id → serialized VoiceSampleRecord
//! - `face_samples`: subject_id → serialized FaceSampleRecord
//! - `voice_prints` / `face_prints`: composite key (subject_id|print_id) → serialized PrintRecord
//! - `enrollment_status`: subject_id → serialized StatusCacheRecord (advisory)
//! - `jobs`: job_id → serialized JobRecord
//!
//! The sample tables are keyed by subject id: the key itself is the
//! one-sample-per-modality-per-subject constraint. Inserts run inside a
//! single write transaction (redb is single-writer), so a concurrent
//! duplicate submission loses deterministically with [`StorageError::Conflict`]
//! instead of racing a check-then-insert.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BlobRef, JobKind, PrefsRequest};

// =============================================================================
// Table Definitions
// =============================================================================

const SUBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("subjects");
const VOICE_SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("voice_samples");
const FACE_SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("face_samples");

/// Print tables use composite keys `subject_id|print_id` so all prints of a
/// subject are adjacent and prefix-scannable.
const VOICE_PRINTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("voice_prints");
const FACE_PRINTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("face_prints");

const ENROLLMENT_STATUS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("enrollment_status");
const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Records
// =============================================================================

/// Identity anchor for an enrolling individual.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    pub subject_id: String,
    pub name: Option<String>,
    pub greeting: Option<String>,
    pub reminder_type: Option<String>,
    /// Enrollment completed and confirmed. Never unset once set.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subject {
    pub fn new() -> Self {
        Self {
            subject_id: Uuid::new_v4().to_string(),
            name: None,
            greeting: None,
            reminder_type: None,
            active: false,
            created_at: Utc::now(),
        }
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self::new()
    }
}

/// One raw voice recording reference per subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceSampleRecord {
    pub sample_id: String,
    pub subject_id: String,
    pub file_ref: BlobRef,
    /// Written by the external transcription subsystem.
    pub transcript_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VoiceSampleRecord {
    pub fn new(subject_id: impl Into<String>, file_ref: BlobRef) -> Self {
        Self {
            sample_id: Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            file_ref,
            transcript_ref: None,
            created_at: Utc::now(),
        }
    }
}

/// One set of three raw face images (front/left/right) per subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaceSampleRecord {
    pub sample_id: String,
    pub subject_id: String,
    pub front_ref: BlobRef,
    pub left_ref: BlobRef,
    pub right_ref: BlobRef,
    /// Set once the worker persists the averaged face print.
    pub embeddings_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FaceSampleRecord {
    pub fn new(
        subject_id: impl Into<String>,
        front_ref: BlobRef,
        left_ref: BlobRef,
        right_ref: BlobRef,
    ) -> Self {
        Self {
            sample_id: Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            front_ref,
            left_ref,
            right_ref,
            embeddings_ref: None,
            created_at: Utc::now(),
        }
    }
}

/// A derived biometric vector. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrintRecord {
    pub print_id: String,
    pub subject_id: String,
    /// Opaque little-endian f32 vector bytes.
    pub vector: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Advisory denormalized projection of sample existence. Status queries
/// recompute from the sample tables; this cache is never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCacheRecord {
    pub subject_id: String,
    pub voice_done: bool,
    pub face_done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Delivery state of a dispatched job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InFlight,
    Failed,
    Dead,
}

/// Durable record of a dispatched vectorization job. This is what makes
/// delivery at-least-once across process restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: String,
    pub kind: JobKind,
    pub subject_id: String,
    pub blob_refs: Vec<BlobRef>,
    pub status: JobStatus,
    /// Number of started delivery attempts.
    pub attempts: u32,
    /// For failed jobs: earliest time the sweep may redeliver.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// For in-flight jobs: past this instant the attempt counts as lost.
    pub deadline_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(kind: JobKind, subject_id: impl Into<String>, blob_refs: Vec<BlobRef>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            kind,
            subject_id: subject_id.into(),
            blob_refs,
            status: JobStatus::Queued,
            attempts: 0,
            next_attempt_at: None,
            deadline_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Composite Key Helpers
// =============================================================================

fn make_print_key(subject_id: &str, print_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(subject_id.len() + 1 + print_id.len());
    key.extend_from_slice(subject_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(print_id.as_bytes());
    key
}

fn make_print_prefix(subject_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(subject_id.len() + 1);
    prefix.extend_from_slice(subject_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Upper bound for a prefix range scan (prefix with 0xFF bytes appended).
fn make_print_prefix_end(subject_id: &str) -> Vec<u8> {
    let mut end = make_print_prefix(subject_id);
    end.extend_from_slice(&[0xFF; 8]);
    end
}

// =============================================================================
// EnrollDatabase
// =============================================================================

/// Embedded ACID database for subjects, samples, prints, and jobs.
pub struct EnrollDatabase {
    db: Database,
}

impl EnrollDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SUBJECTS)?;
            let _ = write_txn.open_table(VOICE_SAMPLES)?;
            let _ = write_txn.open_table(FACE_SAMPLES)?;
            let _ = write_txn.open_table(VOICE_PRINTS)?;
            let _ = write_txn.open_table(FACE_PRINTS)?;
            let _ = write_txn.open_table(ENROLLMENT_STATUS)?;
            let _ = write_txn.open_table(JOBS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Cheap availability probe for health checks.
    pub fn ping(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        read_txn.open_table(SUBJECTS)?;
        Ok(())
    }

    // =========================================================================
    // Subjects
    // =========================================================================

    pub fn create_subject(&self, subject: &Subject) -> StorageResult<()> {
        let json = serde_json::to_vec(subject)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SUBJECTS)?;
            if table.get(subject.subject_id.as_str())?.is_some() {
                // Returning before commit rolls the transaction back.
                return Err(StorageError::Conflict(format!(
                    "subject {} already exists",
                    subject.subject_id
                )));
            }
            table.insert(subject.subject_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_subject(&self, subject_id: &str) -> StorageResult<Option<Subject>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUBJECTS)?;
        match table.get(subject_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Idempotent preference upsert.
    pub fn set_prefs(&self, subject_id: &str, prefs: &PrefsRequest) -> StorageResult<Subject> {
        let write_txn = self.db.begin_write()?;
        let subject = {
            let mut table = write_txn.open_table(SUBJECTS)?;
            let mut subject: Subject = match table.get(subject_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StorageError::NotFound(format!("subject {subject_id}"))),
            };
            subject.name = prefs.name.clone();
            subject.greeting = prefs.greeting.clone();
            subject.reminder_type = prefs.reminder_type.clone();
            let json = serde_json::to_vec(&subject)?;
            table.insert(subject_id, json.as_slice())?;
            subject
        };
        write_txn.commit()?;
        Ok(subject)
    }

    /// Set the active flag. Enrollment state only moves forward: an already
    /// active subject is a conflict, never a re-activation.
    pub fn activate_subject(&self, subject_id: &str) -> StorageResult<Subject> {
        let write_txn = self.db.begin_write()?;
        let subject = {
            let mut table = write_txn.open_table(SUBJECTS)?;
            let mut subject: Subject = match table.get(subject_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StorageError::NotFound(format!("subject {subject_id}"))),
            };
            if subject.active {
                return Err(StorageError::Conflict(format!(
                    "subject {subject_id} is already active"
                )));
            }
            subject.active = true;
            let json = serde_json::to_vec(&subject)?;
            table.insert(subject_id, json.as_slice())?;
            subject
        };
        write_txn.commit()?;
        Ok(subject)
    }

    // =========================================================================
    // Samples
    // =========================================================================

    /// Record a voice sample. The subject-keyed insert is the uniqueness
    /// constraint; the advisory status cache is refreshed in the same
    /// transaction.
    pub fn insert_voice_sample(&self, record: &VoiceSampleRecord) -> StorageResult<()> {
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(VOICE_SAMPLES)?;
            if table.get(record.subject_id.as_str())?.is_some() {
                return Err(StorageError::Conflict(format!(
                    "voice sample already exists for subject {}",
                    record.subject_id
                )));
            }
            table.insert(record.subject_id.as_str(), json.as_slice())?;
        }
        upsert_status_in_txn(&write_txn, &record.subject_id, true, false)?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_voice_sample(&self, subject_id: &str) -> StorageResult<Option<VoiceSampleRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(VOICE_SAMPLES)?;
        match table.get(subject_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn has_voice_sample(&self, subject_id: &str) -> StorageResult<bool> {
        Ok(self.get_voice_sample(subject_id)?.is_some())
    }

    /// Record a face sample; same constraint semantics as voice.
    pub fn insert_face_sample(&self, record: &FaceSampleRecord) -> StorageResult<()> {
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(FACE_SAMPLES)?;
            if table.get(record.subject_id.as_str())?.is_some() {
                return Err(StorageError::Conflict(format!(
                    "face sample already exists for subject {}",
                    record.subject_id
                )));
            }
            table.insert(record.subject_id.as_str(), json.as_slice())?;
        }
        upsert_status_in_txn(&write_txn, &record.subject_id, false, true)?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_face_sample(&self, subject_id: &str) -> StorageResult<Option<FaceSampleRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FACE_SAMPLES)?;
        match table.get(subject_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn has_face_sample(&self, subject_id: &str) -> StorageResult<bool> {
        Ok(self.get_face_sample(subject_id)?.is_some())
    }

    // =========================================================================
    // Prints
    // =========================================================================

    /// Append a voice print. Prints are append-only.
    pub fn append_voice_print(&self, subject_id: &str, vector: &[u8]) -> StorageResult<PrintRecord> {
        let record = PrintRecord {
            print_id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            vector: vector.to_vec(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&record)?;
        let key = make_print_key(subject_id, &record.print_id);

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(VOICE_PRINTS)?;
            table.insert(key.as_slice(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// Append a face print and point the face sample's embeddings reference
    /// at it, in one transaction.
    pub fn append_face_print(&self, subject_id: &str, vector: &[u8]) -> StorageResult<PrintRecord> {
        let record = PrintRecord {
            print_id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            vector: vector.to_vec(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&record)?;
        let key = make_print_key(subject_id, &record.print_id);

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(FACE_PRINTS)?;
            table.insert(key.as_slice(), json.as_slice())?;
        }
        {
            let mut table = write_txn.open_table(FACE_SAMPLES)?;
            let sample: Option<FaceSampleRecord> = match table.get(subject_id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            if let Some(mut sample) = sample {
                sample.embeddings_ref = Some(record.print_id.clone());
                let sample_json = serde_json::to_vec(&sample)?;
                table.insert(subject_id, sample_json.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(record)
    }

    pub fn list_voice_prints(&self, subject_id: &str) -> StorageResult<Vec<PrintRecord>> {
        self.list_prints(VOICE_PRINTS, subject_id)
    }

    pub fn list_face_prints(&self, subject_id: &str) -> StorageResult<Vec<PrintRecord>> {
        self.list_prints(FACE_PRINTS, subject_id)
    }

    fn list_prints(
        &self,
        table_def: TableDefinition<&[u8], &[u8]>,
        subject_id: &str,
    ) -> StorageResult<Vec<PrintRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table_def)?;
        let start = make_print_prefix(subject_id);
        let end = make_print_prefix_end(subject_id);

        let mut prints = Vec::new();
        for item in table.range(start.as_slice()..end.as_slice())? {
            let (_key, value) = item?;
            prints.push(serde_json::from_slice(value.value())?);
        }
        Ok(prints)
    }

    // =========================================================================
    // Status Cache (advisory)
    // =========================================================================

    /// Refresh the advisory cache for one modality, e.g. from a worker
    /// completion callback.
    pub fn mark_modality_done(&self, subject_id: &str, kind: JobKind) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        upsert_status_in_txn(
            &write_txn,
            subject_id,
            matches!(kind, JobKind::Voice),
            matches!(kind, JobKind::Face),
        )?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_status_cache(&self, subject_id: &str) -> StorageResult<Option<StatusCacheRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENROLLMENT_STATUS)?;
        match table.get(subject_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Insert or update a job record.
    pub fn put_job(&self, job: &JobRecord) -> StorageResult<()> {
        let json = serde_json::to_vec(job)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(JOBS)?;
            table.insert(job.job_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> StorageResult<Option<JobRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS)?;
        match table.get(job_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Atomically claim a queued job for processing: flips it to in-flight,
    /// stamps the attempt and its deadline. Returns `None` when the job is
    /// gone or not claimable (a duplicate wakeup loses here).
    pub fn claim_job(
        &self,
        job_id: &str,
        deadline_at: DateTime<Utc>,
    ) -> StorageResult<Option<JobRecord>> {
        let write_txn = self.db.begin_write()?;
        let claimed = {
            let mut table = write_txn.open_table(JOBS)?;
            let job: Option<JobRecord> = match table.get(job_id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            match job {
                Some(mut job) if job.status == JobStatus::Queued => {
                    job.status = JobStatus::InFlight;
                    job.attempts += 1;
                    job.deadline_at = Some(deadline_at);
                    job.next_attempt_at = None;
                    job.updated_at = Utc::now();
                    let json = serde_json::to_vec(&job)?;
                    table.insert(job_id, json.as_slice())?;
                    Some(job)
                }
                _ => None,
            }
        };
        write_txn.commit()?;
        Ok(claimed)
    }

    /// Remove a completed job.
    pub fn delete_job(&self, job_id: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(JOBS)?;
            table.remove(job_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All job records, for the redelivery sweep.
    pub fn list_jobs(&self) -> StorageResult<Vec<JobRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS)?;
        let mut jobs = Vec::new();
        for item in table.iter()? {
            let (_key, value) = item?;
            jobs.push(serde_json::from_slice(value.value())?);
        }
        Ok(jobs)
    }
}

/// Upsert the advisory status cache inside an existing write transaction.
/// Flags only ever move from false to true.
fn upsert_status_in_txn(
    write_txn: &redb::WriteTransaction,
    subject_id: &str,
    voice_done: bool,
    face_done: bool,
) -> StorageResult<()> {
    let mut table = write_txn.open_table(ENROLLMENT_STATUS)?;
    let now = Utc::now();
    let mut record: StatusCacheRecord = match table.get(subject_id)? {
        Some(value) => serde_json::from_slice(value.value())?,
        None => StatusCacheRecord {
            subject_id: subject_id.to_string(),
            voice_done: false,
            face_done: false,
            created_at: now,
            updated_at: now,
        },
    };
    record.voice_done |= voice_done;
    record.face_done |= face_done;
    record.updated_at = now;
    let json = serde_json::to_vec(&record)?;
    table.insert(subject_id, json.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (EnrollDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = EnrollDatabase::open(&dir.path().join("enroll.redb")).unwrap();
        (db, dir)
    }

    fn store_ref(key: &str) -> BlobRef {
        BlobRef::Store { key: key.into() }
    }

    #[test]
    fn subject_round_trip() {
        let (db, _dir) = test_db();
        let subject = Subject::new();
        db.create_subject(&subject).unwrap();
        assert_eq!(db.get_subject(&subject.subject_id).unwrap(), Some(subject));
        assert_eq!(db.get_subject("missing").unwrap(), None);
    }

    #[test]
    fn second_voice_sample_conflicts_and_original_survives() {
        let (db, _dir) = test_db();
        let subject = Subject::new();
        db.create_subject(&subject).unwrap();

        let first = VoiceSampleRecord::new(&subject.subject_id, store_ref("a/voice.wav.enc"));
        db.insert_voice_sample(&first).unwrap();

        let second = VoiceSampleRecord::new(&subject.subject_id, store_ref("b/voice.wav.enc"));
        let err = db.insert_voice_sample(&second).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        // Original row is untouched by the rejected insert.
        assert_eq!(
            db.get_voice_sample(&subject.subject_id).unwrap(),
            Some(first)
        );
    }

    #[test]
    fn second_face_sample_conflicts() {
        let (db, _dir) = test_db();
        let subject = Subject::new();
        db.create_subject(&subject).unwrap();

        let sample = FaceSampleRecord::new(
            &subject.subject_id,
            store_ref("a/front.jpg.enc"),
            store_ref("a/left.jpg.enc"),
            store_ref("a/right.jpg.enc"),
        );
        db.insert_face_sample(&sample).unwrap();
        let err = db.insert_face_sample(&sample).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[test]
    fn activate_twice_conflicts() {
        let (db, _dir) = test_db();
        let subject = Subject::new();
        db.create_subject(&subject).unwrap();

        let activated = db.activate_subject(&subject.subject_id).unwrap();
        assert!(activated.active);

        let err = db.activate_subject(&subject.subject_id).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        // Still active after the rejected call.
        assert!(db.get_subject(&subject.subject_id).unwrap().unwrap().active);
    }

    #[test]
    fn prefs_upsert_is_idempotent() {
        let (db, _dir) = test_db();
        let subject = Subject::new();
        db.create_subject(&subject).unwrap();

        let prefs = PrefsRequest {
            name: Some("Ada".into()),
            greeting: Some("Good morning".into()),
            reminder_type: Some("voice".into()),
        };
        let updated = db.set_prefs(&subject.subject_id, &prefs).unwrap();
        let again = db.set_prefs(&subject.subject_id, &prefs).unwrap();
        assert_eq!(updated.name, again.name);
        assert_eq!(again.greeting.as_deref(), Some("Good morning"));
    }

    #[test]
    fn prints_are_append_only_and_prefix_scanned() {
        let (db, _dir) = test_db();
        let a = Subject::new();
        let b = Subject::new();

        db.append_voice_print(&a.subject_id, &[1, 2, 3, 4]).unwrap();
        db.append_voice_print(&a.subject_id, &[5, 6, 7, 8]).unwrap();
        db.append_voice_print(&b.subject_id, &[9, 9, 9, 9]).unwrap();

        let prints = db.list_voice_prints(&a.subject_id).unwrap();
        assert_eq!(prints.len(), 2);
        assert!(prints.iter().all(|p| p.subject_id == a.subject_id));
        assert_eq!(db.list_voice_prints(&b.subject_id).unwrap().len(), 1);
    }

    #[test]
    fn face_print_updates_embeddings_ref() {
        let (db, _dir) = test_db();
        let subject = Subject::new();
        db.create_subject(&subject).unwrap();
        let sample = FaceSampleRecord::new(
            &subject.subject_id,
            store_ref("s/front.jpg.enc"),
            store_ref("s/left.jpg.enc"),
            store_ref("s/right.jpg.enc"),
        );
        db.insert_face_sample(&sample).unwrap();

        let print = db.append_face_print(&subject.subject_id, &[0, 0, 64, 64]).unwrap();
        let stored = db.get_face_sample(&subject.subject_id).unwrap().unwrap();
        assert_eq!(stored.embeddings_ref, Some(print.print_id));
    }

    #[test]
    fn sample_insert_refreshes_status_cache() {
        let (db, _dir) = test_db();
        let subject = Subject::new();
        db.create_subject(&subject).unwrap();
        assert_eq!(db.get_status_cache(&subject.subject_id).unwrap(), None);

        db.insert_voice_sample(&VoiceSampleRecord::new(
            &subject.subject_id,
            store_ref("s/voice.wav.enc"),
        ))
        .unwrap();

        let cache = db.get_status_cache(&subject.subject_id).unwrap().unwrap();
        assert!(cache.voice_done);
        assert!(!cache.face_done);

        db.mark_modality_done(&subject.subject_id, JobKind::Face).unwrap();
        let cache = db.get_status_cache(&subject.subject_id).unwrap().unwrap();
        assert!(cache.voice_done && cache.face_done);
    }

    #[test]
    fn claim_job_is_single_winner() {
        let (db, _dir) = test_db();
        let job = JobRecord::new(JobKind::Voice, "subject-1", vec![store_ref("s/v.enc")]);
        db.put_job(&job).unwrap();

        let deadline = Utc::now() + chrono::Duration::seconds(300);
        let claimed = db.claim_job(&job.job_id, deadline).unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::InFlight);
        assert_eq!(claimed.attempts, 1);

        // A duplicate wakeup for the same job cannot claim it again.
        assert!(db.claim_job(&job.job_id, deadline).unwrap().is_none());
    }

    #[test]
    fn delete_job_removes_record() {
        let (db, _dir) = test_db();
        let job = JobRecord::new(JobKind::Face, "subject-1", vec![store_ref("s/f.enc")]);
        db.put_job(&job).unwrap();
        assert_eq!(db.list_jobs().unwrap().len(), 1);

        db.delete_job(&job.job_id).unwrap();
        assert!(db.get_job(&job.job_id).unwrap().is_none());
        assert!(db.list_jobs().unwrap().is_empty());
    }
}
