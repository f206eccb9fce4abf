// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Storage Module
//!
//! Two stores share one data directory:
//!
//! - an embedded redb database for subjects, samples, prints, job records,
//!   and the advisory status cache;
//! - a filesystem content store for encrypted raw media (AEAD-encrypted by
//!   the gateway before it is written; see `crate::crypto`).
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   enroll.redb                  # record database
//!   media/{subject_id}/
//!     voice-{uuid}.wav.enc       # encrypted voice recording
//!     front-{uuid}.jpg.enc       # encrypted face images
//!     left-{uuid}.jpg.enc
//!     right-{uuid}.jpg.enc
//!   deadletter/
//!     {date}.jsonl               # permanently failed jobs (operator-visible)
//! ```

pub mod content;
pub mod database;
pub mod deadletter;
pub mod paths;

pub use content::ContentStore;
pub use database::{
    EnrollDatabase, FaceSampleRecord, JobRecord, JobStatus, PrintRecord, StatusCacheRecord,
    StorageError, StorageResult, Subject, VoiceSampleRecord,
};
pub use deadletter::{DeadLetterEntry, DeadLetterLog, DeadLetterReason};
pub use paths::StoragePaths;
