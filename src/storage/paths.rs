// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the persistent storage layout.

use std::path::{Path, PathBuf};

/// Default base directory for all persistent storage.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all persistent data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Media Paths ==========

    /// Directory containing all encrypted raw media.
    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    /// Per-subject media directory.
    pub fn subject_media_dir(&self, subject_id: &str) -> PathBuf {
        self.media_dir().join(subject_id)
    }

    // ========== Database Paths ==========

    /// Path to the embedded record database.
    pub fn database_file(&self) -> PathBuf {
        self.root.join("enroll.redb")
    }

    // ========== Dead-Letter Paths ==========

    /// Directory containing dead-letter logs.
    pub fn deadletter_dir(&self) -> PathBuf {
        self.root.join("deadletter")
    }

    /// Path to a daily dead-letter events file (JSONL format).
    pub fn deadletter_file(&self, date: &str) -> PathBuf {
        self.deadletter_dir().join(format!("{date}.jsonl"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new("/data"));
    }

    #[test]
    fn custom_root_for_testing() {
        let paths = StoragePaths::new("/tmp/test-data");
        assert_eq!(paths.root(), Path::new("/tmp/test-data"));
        assert_eq!(
            paths.subject_media_dir("subject-123"),
            PathBuf::from("/tmp/test-data/media/subject-123")
        );
    }

    #[test]
    fn layout_paths_are_correct() {
        let paths = StoragePaths::default();
        assert_eq!(paths.media_dir(), PathBuf::from("/data/media"));
        assert_eq!(paths.database_file(), PathBuf::from("/data/enroll.redb"));
        assert_eq!(
            paths.deadletter_file("2026-08-06"),
            PathBuf::from("/data/deadletter/2026-08-06.jsonl")
        );
    }
}
