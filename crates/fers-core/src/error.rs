use std::path::PathBuf;

use thiserror::Error;

pub type FersResult<T> = Result<T, FersError>;

#[derive(Debug, Error)]
pub enum FersError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("security error: {0}")]
    Security(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),
}

impl FersError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True only for a store lookup of an absent key. Decryption failures
    /// are never classified as not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }
}

/// Failures of the authenticated cipher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key setup failed: {0}")]
    KeySetup(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("blob too short: {len} bytes (minimum {min})")]
    BlobTooShort { len: usize, min: usize },

    #[error("authentication failed: wrong passphrase or corrupted data")]
    Authentication,
}

/// Failures reported by an object store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("{op} failed for {key:?}: {message}")]
    Backend {
        op: &'static str,
        key: String,
        message: String,
    },
}

impl StoreError {
    pub fn backend(op: &'static str, key: &str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            op,
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}
