//! Filesystem-rooted object store
//!
//! Each key is a file at `{base}/{key}`. Used for local testing and for
//! syncing against a mounted share. All operations are serialized behind one
//! mutex so a `list` never observes a half-written upload.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fers_core::{FersError, FersResult, ObjectKey, StoreError};
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::ObjectStore;

#[derive(Debug)]
pub struct FsStore {
    base: PathBuf,
    lock: Mutex<()>,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> FersResult<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base).map_err(|e| FersError::io(&base, e))?;
        Ok(Self {
            base,
            lock: Mutex::new(()),
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn key_path(&self, op: &'static str, key: &str) -> Result<PathBuf, StoreError> {
        let key = ObjectKey::parse(key).map_err(|e| StoreError::backend(op, key, e))?;
        Ok(self.base.join(key.to_relative_path()))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut out = Vec::new();
        collect_keys(&self.base, &self.base, prefix, &mut out)
            .map_err(|e| StoreError::backend("list", prefix, e))?;
        Ok(out)
    }

    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let path = self.key_path("upload", key)?;
        let _guard = self.lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::backend("upload", key, e))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| StoreError::backend("upload", key, e))?;
        debug!(key, bytes = data.len(), "fs store: wrote object");
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.key_path("download", key)?;
        let _guard = self.lock.lock().await;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(StoreError::backend("download", key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.key_path("delete", key)?;
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::backend("delete", key, e)),
        }
    }

    fn describe(&self) -> String {
        format!("fs:{}", self.base.display())
    }
}

fn collect_keys(
    base: &Path,
    dir: &Path,
    prefix: &str,
    out: &mut Vec<String>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_keys(base, &path, prefix, out)?;
        } else if file_type.is_file() {
            let Ok(rel) = path.strip_prefix(base) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                out.push(key);
            }
        }
    }
    Ok(())
}
