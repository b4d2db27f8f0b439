//! Whole-blob AES-256-GCM encryption/decryption
//!
//! Blob format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! No associated data is bound, so a blob decrypts the same no matter which
//! key it is stored under.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use fers_core::{CryptoError, FersResult};
use rand::RngCore;
use secrecy::SecretString;

use crate::kdf::{derive_key, SecretKey};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Encrypts and decrypts blobs under one shared key.
///
/// Built once and injected into the sync engine; cloning is cheap enough to
/// hand one to each engine under test.
#[derive(Clone)]
pub struct CipherSuite {
    cipher: Aes256Gcm,
}

impl CipherSuite {
    pub fn new(key: &SecretKey) -> FersResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::KeySetup(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn from_passphrase(passphrase: &SecretString) -> FersResult<Self> {
        Self::new(&derive_key(passphrase)?)
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    ///
    /// Returns: `[12-byte nonce][ciphertext][16-byte tag]`
    pub fn encrypt(&self, plaintext: &[u8]) -> FersResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`CipherSuite::encrypt`].
    ///
    /// Fails without returning any plaintext if the blob is truncated, was
    /// encrypted under another key, or has been modified.
    pub fn decrypt(&self, blob: &[u8]) -> FersResult<Vec<u8>> {
        let min = NONCE_SIZE + TAG_SIZE;
        if blob.len() < min {
            return Err(CryptoError::BlobTooShort {
                len: blob.len(),
                min,
            }
            .into());
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Authentication.into())
    }
}

impl std::fmt::Debug for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSuite")
            .field("algorithm", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}
