//! fers-crypto: authenticated encryption for stored blobs
//!
//! Every object written to the store is a single AES-256-GCM message:
//!
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The 256-bit key is `SHA-256(passphrase)`, computed once per process. There
//! is no salt, no work factor, no per-file key and no rotation: anyone who can
//! guess the passphrase can derive the key offline. Pick a long passphrase.

pub mod cipher;
pub mod kdf;

pub use cipher::CipherSuite;
pub use kdf::{derive_key, SecretKey};

/// Size of the derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
