// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! On-disk content store for encrypted raw media.
//!
//! Blobs are keyed `{subject_id}/{file_name}` under the media root and are
//! written already encrypted by the gateway (AEAD, see `crate::crypto`). The
//! store itself never sees plaintext.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use super::{StorageError, StoragePaths, StorageResult};

/// Content store for encrypted media blobs.
#[derive(Debug, Clone)]
pub struct ContentStore {
    paths: StoragePaths,
}

impl ContentStore {
    pub fn new(paths: StoragePaths) -> Self {
        Self { paths }
    }

    /// Create the media root. Safe to call multiple times (idempotent).
    pub fn initialize(&self) -> StorageResult<()> {
        fs::create_dir_all(self.paths.media_dir())?;
        Ok(())
    }

    /// Create the storage namespace for a subject.
    pub fn create_subject_namespace(&self, subject_id: &str) -> StorageResult<()> {
        fs::create_dir_all(self.paths.subject_media_dir(subject_id))?;
        Ok(())
    }

    /// Remove a subject's storage namespace and everything in it.
    pub fn remove_subject_namespace(&self, subject_id: &str) -> StorageResult<()> {
        let dir = self.paths.subject_media_dir(subject_id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// Write an encrypted blob for a subject; returns its store key.
    pub fn write(
        &self,
        subject_id: &str,
        file_name: &str,
        encrypted: &[u8],
    ) -> StorageResult<String> {
        let key = format!("{subject_id}/{file_name}");
        let path = self.resolve(&key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(encrypted)?;
        file.flush()?;
        Ok(key)
    }

    /// Read an encrypted blob by store key.
    pub fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(key)?;
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn exists(&self, key: &str) -> bool {
        match self.resolve(key) {
            Ok(path) => File::open(path).is_ok(),
            Err(_) => false,
        }
    }

    /// Delete a blob. Missing blobs are not an error.
    pub fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a store key to its path, rejecting traversal components.
    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        if key.split('/').any(|part| {
            part.is_empty() || part == "." || part == ".." || part.contains('\\')
        }) {
            return Err(StorageError::NotFound(format!("invalid store key {key}")));
        }
        Ok(self.paths.media_dir().join(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (ContentStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(StoragePaths::new(dir.path()));
        store.initialize().unwrap();
        (store, dir)
    }

    #[test]
    fn write_and_read_round_trip() {
        let (store, _dir) = test_store();
        let key = store
            .write("subject-1", "voice.wav.enc", b"\x00\x01ciphertext")
            .unwrap();
        assert_eq!(key, "subject-1/voice.wav.enc");
        assert_eq!(store.read(&key).unwrap(), b"\x00\x01ciphertext");
        assert!(store.exists(&key));
    }

    #[test]
    fn remove_is_idempotent() {
        let (store, _dir) = test_store();
        let key = store.write("subject-1", "front.jpg.enc", b"data").unwrap();
        store.remove(&key).unwrap();
        assert!(!store.exists(&key));
        store.remove(&key).unwrap();
    }

    #[test]
    fn traversal_keys_are_rejected() {
        let (store, _dir) = test_store();
        assert!(store.read("../outside").is_err());
        assert!(store.read("a/../../b").is_err());
        assert!(!store.exists("..\\x"));
    }

    #[test]
    fn subject_namespace_lifecycle() {
        let (store, dir) = test_store();
        store.create_subject_namespace("subject-9").unwrap();
        assert!(dir.path().join("media/subject-9").exists());

        store.write("subject-9", "voice.wav.enc", b"x").unwrap();
        store.remove_subject_namespace("subject-9").unwrap();
        assert!(!dir.path().join("media/subject-9").exists());
    }
}
