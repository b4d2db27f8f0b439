//! The object store contract the sync engine is written against

use async_trait::async_trait;
use fers_core::StoreError;

/// Key/value persistence for encrypted blobs.
///
/// Keys are forward-slash relative paths. Implementations own whatever
/// locking they need; callers never wrap calls in their own locks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every key starting with `prefix` (empty prefix lists everything).
    /// Order is unspecified.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Store `data` under `key`, replacing any previous value.
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError>;

    /// Fetch the value under `key`; an absent key is `StoreError::NotFound`.
    async fn download(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Short human-readable backend description for logs.
    fn describe(&self) -> String;
}
