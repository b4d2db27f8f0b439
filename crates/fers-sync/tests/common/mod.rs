//! Shared test utilities for sync engine integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fers_core::StoreError;
use fers_crypto::CipherSuite;
use fers_storage::{ObjectStore, OpendalStore};
use fers_sync::{SyncEngine, WorkingDirectory};
use opendal::Operator;
use secrecy::SecretString;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const PASSPHRASE: &str = "correct horse battery staple";

pub fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

pub fn memory_store() -> Arc<dyn ObjectStore> {
    Arc::new(OpendalStore::new(memory_operator(), "test/work"))
}

pub fn cipher(passphrase: &str) -> CipherSuite {
    CipherSuite::from_passphrase(&SecretString::from(passphrase.to_string())).unwrap()
}

pub fn write_test_file(dir: &Path, rel: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).expect("create parent");
    std::fs::write(&path, content).expect("write test file");
    path
}

/// One machine: a fresh working directory wired to `store`. The temp dir
/// also has room for files outside the working root.
pub struct Machine {
    pub tmp: TempDir,
    pub engine: SyncEngine,
}

impl Machine {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_passphrase(store, PASSPHRASE)
    }

    pub fn with_passphrase(store: Arc<dyn ObjectStore>, passphrase: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("root")).unwrap();
        let workdir = WorkingDirectory::new(tmp.path().join("root")).unwrap();
        let engine = SyncEngine::new(workdir, cipher(passphrase), store);
        Self { tmp, engine }
    }

    /// Rebuild the engine with exclude patterns.
    pub fn excluding(mut self, patterns: &[&str]) -> Self {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        self.engine = self.engine.with_exclude_patterns(&patterns).unwrap();
        self
    }

    pub fn root(&self) -> &Path {
        self.engine.working_dir().root()
    }

    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        write_test_file(self.root(), rel, content)
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.root().join(rel)).expect("read local file")
    }
}

pub async fn remote_keys(store: &dyn ObjectStore) -> Vec<String> {
    let mut keys = store.list("").await.unwrap();
    keys.sort();
    keys
}

/// Store wrapper for failure and cancellation scenarios.
pub struct ScriptedStore {
    inner: Arc<dyn ObjectStore>,
    fail_keys: Vec<String>,
    cancel_after_upload: Option<CancellationToken>,
    cancel_after_download: Option<CancellationToken>,
    pub uploads: AtomicUsize,
}

impl ScriptedStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_keys: Vec::new(),
            cancel_after_upload: None,
            cancel_after_download: None,
            uploads: AtomicUsize::new(0),
        }
    }

    /// Uploads and downloads of these keys fail with a backend error.
    pub fn failing(mut self, keys: &[&str]) -> Self {
        self.fail_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Cancel `token` as soon as the first upload lands.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_after_upload = Some(token);
        self
    }

    /// Cancel `token` as soon as the first download returns.
    pub fn cancelling_downloads(mut self, token: CancellationToken) -> Self {
        self.cancel_after_download = Some(token);
        self
    }

    fn check(&self, op: &'static str, key: &str) -> Result<(), StoreError> {
        if self.fail_keys.iter().any(|k| k == key) {
            return Err(StoreError::backend(op, key, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix).await
    }

    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.check("upload", key)?;
        self.inner.upload(key, data).await?;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_after_upload {
            token.cancel();
        }
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.check("download", key)?;
        let data = self.inner.download(key).await?;
        if let Some(token) = &self.cancel_after_download {
            token.cancel();
        }
        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    fn describe(&self) -> String {
        format!("scripted:{}", self.inner.describe())
    }
}
