//! Key derivation: passphrase → SHA-256 → 256-bit key

use fers_core::{CryptoError, FersResult};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit key derived from the operator's passphrase.
///
/// Lives only in memory and is zeroized on drop.
#[derive(Clone)]
pub struct SecretKey {
    bytes: [u8; KEY_SIZE],
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the key as a single unsalted SHA-256 pass over the passphrase.
///
/// Deterministic: the same passphrase always yields the same key, which is
/// what lets a second machine decrypt blobs written by the first.
pub fn derive_key(passphrase: &SecretString) -> FersResult<SecretKey> {
    let passphrase = passphrase.expose_secret();
    if passphrase.is_empty() {
        return Err(CryptoError::KeySetup("passphrase is empty".into()).into());
    }

    let bytes: [u8; KEY_SIZE] = Sha256::digest(passphrase.as_bytes()).into();
    Ok(SecretKey::from_bytes(bytes))
}
