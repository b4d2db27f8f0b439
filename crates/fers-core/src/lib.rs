//! fers-core: shared types, object keys, config schema, and error taxonomy

pub mod config;
pub mod error;
pub mod types;

pub use error::{CryptoError, FersError, FersResult, StoreError};
pub use types::{KeySet, ObjectKey};
