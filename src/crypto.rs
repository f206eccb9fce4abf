// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Media encryption at rest.
//!
//! XChaCha20-Poly1305 with a fresh random 192-bit nonce per call. The nonce
//! is prepended to the ciphertext, so an encrypted blob is self-contained:
//! `nonce (24 bytes) || ciphertext+tag`. Authentication failures never yield
//! partial plaintext.

use std::fs;
use std::path::Path;

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use rand_core::RngCore;
use zeroize::Zeroizing;

/// Length of the XChaCha20-Poly1305 nonce prepended to every blob.
pub const NONCE_LEN: usize = 24;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Bad key, truncated ciphertext, or tampered data. Retrying cannot help.
    #[error("decryption failed: ciphertext rejected")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Symmetric encryption service for media blobs and files.
pub struct EncryptionService {
    key: Zeroizing<[u8; 32]>,
}

impl EncryptionService {
    pub fn new(key: Zeroizing<[u8; 32]>) -> Self {
        Self { key }
    }

    /// Encrypt a byte buffer. Output layout: `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new((&*self.key).into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a `nonce || ciphertext` blob produced by [`encrypt`].
    ///
    /// [`encrypt`]: EncryptionService::encrypt
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < NONCE_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);

        let cipher = XChaCha20Poly1305::new((&*self.key).into());
        let nonce = XNonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Encrypt a file on disk, writing `nonce || ciphertext` to `dest`.
    pub fn encrypt_file(&self, src: &Path, dest: &Path) -> Result<(), CryptoError> {
        let plaintext = fs::read(src)?;
        let blob = self.encrypt(&plaintext)?;
        fs::write(dest, blob)?;
        Ok(())
    }

    /// Decrypt an encrypted file on disk, writing plaintext to `dest`.
    pub fn decrypt_file(&self, src: &Path, dest: &Path) -> Result<(), CryptoError> {
        let blob = fs::read(src)?;
        let plaintext = self.decrypt(&blob)?;
        fs::write(dest, plaintext)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> EncryptionService {
        EncryptionService::new(Zeroizing::new([42u8; 32]))
    }

    #[test]
    fn round_trip_arbitrary_payloads() {
        let svc = service();
        for payload in [
            &b""[..],
            &b"a"[..],
            &b"raw media bytes \x00\x01\x02\xff"[..],
            &[0u8; 4096][..],
        ] {
            let blob = svc.encrypt(payload).unwrap();
            assert_ne!(&blob[NONCE_LEN..], payload);
            assert_eq!(svc.decrypt(&blob).unwrap(), payload);
        }
    }

    #[test]
    fn nonces_are_unique_per_call() {
        let svc = service();
        let a = svc.encrypt(b"same input").unwrap();
        let b = svc.encrypt(b"same input").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let svc = service();
        let mut blob = svc.encrypt(b"sensitive").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(
            svc.decrypt(&blob),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let svc = service();
        let blob = svc.encrypt(b"sensitive").unwrap();
        assert!(matches!(
            svc.decrypt(&blob[..NONCE_LEN - 4]),
            Err(CryptoError::DecryptionFailed)
        ));
        assert!(matches!(
            svc.decrypt(&blob[..NONCE_LEN + 2]),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let blob = service().encrypt(b"sensitive").unwrap();
        let other = EncryptionService::new(Zeroizing::new([43u8; 32]));
        assert!(matches!(
            other.decrypt(&blob),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn file_round_trip() {
        let svc = service();
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("clip.wav");
        let enc = dir.path().join("clip.wav.enc");
        let back = dir.path().join("clip.decrypted.wav");

        fs::write(&src, b"RIFF....WAVEfmt ").unwrap();
        svc.encrypt_file(&src, &enc).unwrap();
        assert_ne!(fs::read(&enc).unwrap(), fs::read(&src).unwrap());

        svc.decrypt_file(&enc, &back).unwrap();
        assert_eq!(fs::read(&back).unwrap(), b"RIFF....WAVEfmt ");
    }
}
