//! Cloud object store over an OpenDAL operator
//!
//! Keys are stored under a configurable remote work directory: `a.txt` with
//! work dir `backups/laptop` becomes `backups/laptop/a.txt` on write and is
//! stripped back to `a.txt` on list. Consistency is left to the service.

use async_trait::async_trait;
use fers_core::StoreError;
use opendal::{ErrorKind, Operator};
use tracing::debug;

use crate::store::ObjectStore;

#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
    work_dir: String,
}

impl OpendalStore {
    pub fn new(op: Operator, work_dir: &str) -> Self {
        Self {
            op,
            work_dir: normalize_work_dir(work_dir),
        }
    }

    pub fn work_dir(&self) -> &str {
        &self.work_dir
    }

    fn full_path(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if self.work_dir.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.work_dir)
        }
    }

    /// Directory to list for `prefix`: the work dir plus the prefix's
    /// directory part, so the service only returns entries under it.
    fn list_root(&self, prefix: &str) -> String {
        let dir = match prefix.trim_start_matches('/').rfind('/') {
            Some(idx) => &prefix.trim_start_matches('/')[..=idx],
            None => "",
        };
        match (self.work_dir.is_empty(), dir.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => dir.to_string(),
            (false, _) => format!("{}/{dir}", self.work_dir),
        }
    }

    /// Strip the work dir from a listed path; `None` for anything outside it.
    fn strip_work_dir<'a>(&self, path: &'a str) -> Option<&'a str> {
        let path = path.trim_start_matches('/');
        if self.work_dir.is_empty() {
            return Some(path);
        }
        path.strip_prefix(self.work_dir.as_str())?.strip_prefix('/')
    }
}

/// Collapse duplicate slashes and trim leading/trailing ones.
pub fn normalize_work_dir(raw: &str) -> String {
    raw.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ObjectStore for OpendalStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let root = self.list_root(prefix);
        let entries = match self.op.list_with(&root).recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::backend("list", prefix, e)),
        };

        let keys: Vec<String> = entries
            .iter()
            .filter(|entry| entry.metadata().mode().is_file())
            .filter_map(|entry| self.strip_work_dir(entry.path()))
            .filter(|key| !key.is_empty() && !key.ends_with('/'))
            .filter(|key| key.starts_with(prefix))
            .map(str::to_string)
            .collect();

        debug!(root = %root, prefix, count = keys.len(), "listed remote objects");
        Ok(keys)
    }

    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let path = self.full_path(key);
        self.op
            .write(&path, data)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::backend("upload", key, e))
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.full_path(key);
        match self.op.read(&path).await {
            Ok(buf) => Ok(buf.to_vec()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(StoreError::backend("download", key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.full_path(key);
        match self.op.delete(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::backend("delete", key, e)),
        }
    }

    fn describe(&self) -> String {
        let info = self.op.info();
        format!("{}:{}/{}", info.scheme(), info.name(), self.work_dir)
    }
}
