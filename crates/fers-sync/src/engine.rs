//! Sync engine: encrypt-then-upload and download-then-decrypt between the
//! working directory and an object store
//!
//! Single-item operations and directory upload stop at the first error.
//! The two reconciliation passes (`sync_download`, `sync_upload`) record a
//! failing key in their report and carry on with the next one; only
//! cancellation or a failure to enumerate either side aborts them.
//!
//! Cancellation is checked before each file or key. An in-flight transfer is
//! allowed to finish.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fers_core::{FersError, FersResult, KeySet, ObjectKey};
use fers_crypto::CipherSuite;
use fers_storage::ObjectStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::guard::WorkingDirectory;
use crate::plan::SyncPlan;
use crate::scan::{scan_keys, FileWalker, ScanFilter, TMP_SUFFIX};

/// Progress callback type (items_done, items_total, message). A total of 0
/// means the total is not known up front.
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Outcome of a reconciliation pass
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Keys transferred successfully, in processing order
    pub transferred: Vec<ObjectKey>,
    /// Keys left alone because something already occupies their local path
    pub skipped: Vec<ObjectKey>,
    /// Keys (or local paths) that failed, with the error
    pub failed: Vec<(String, FersError)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, item: impl Into<String>, err: FersError) {
        let item = item.into();
        warn!(item = %item, "sync item failed: {err}");
        self.failed.push((item, err));
    }
}

pub struct SyncEngine {
    workdir: WorkingDirectory,
    cipher: CipherSuite,
    store: Arc<dyn ObjectStore>,
    filter: ScanFilter,
    progress: Option<ProgressFn>,
}

impl SyncEngine {
    pub fn new(
        workdir: WorkingDirectory,
        cipher: CipherSuite,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            workdir,
            cipher,
            store,
            filter: ScanFilter::default(),
            progress: None,
        }
    }

    /// Exclude files and directories whose name matches any glob pattern.
    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> FersResult<Self> {
        self.filter = ScanFilter::new(patterns)?;
        Ok(self)
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn working_dir(&self) -> &WorkingDirectory {
        &self.workdir
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    fn report_progress(&self, done: u64, total: u64, msg: &str) {
        if let Some(progress) = &self.progress {
            progress(done, total, msg);
        }
    }

    /// Read a local file, encrypt it and store it under `key`.
    /// Returns the plaintext size.
    pub async fn encrypt_and_upload_file(
        &self,
        local_path: impl AsRef<Path>,
        key: &ObjectKey,
    ) -> FersResult<u64> {
        let path = self.workdir.resolve(local_path)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| FersError::io(&path, e))?;
        let blob = self.cipher.encrypt(&data)?;
        self.store.upload(key.as_str(), blob).await?;

        info!(key = %key, path = %path.display(), bytes = data.len(), "uploaded");
        Ok(data.len() as u64)
    }

    /// Upload every file under `root` (inside the working directory), keyed
    /// by its path relative to the working directory. Stops at the first
    /// failure. Returns the number of files uploaded.
    pub async fn encrypt_and_upload_directory(
        &self,
        cancel: &CancellationToken,
        root: impl AsRef<Path>,
    ) -> FersResult<usize> {
        if cancel.is_cancelled() {
            return Err(FersError::Cancelled);
        }
        let root = self.workdir.resolve(root)?;

        let mut uploaded = 0usize;
        for entry in FileWalker::new(&root, &self.filter) {
            if cancel.is_cancelled() {
                info!(uploaded, "directory upload cancelled");
                return Err(FersError::Cancelled);
            }
            let path = entry?;
            let key = self.workdir.key_for(&path)?;
            self.encrypt_and_upload_file(&path, &key).await?;
            uploaded += 1;
            self.report_progress(uploaded as u64, 0, key.as_str());
        }

        info!(root = %root.display(), uploaded, "directory upload complete");
        Ok(uploaded)
    }

    /// Fetch `key`, decrypt it and write the plaintext to `local_path`,
    /// creating parent directories. Nothing touches the filesystem unless
    /// decryption succeeds. Returns the plaintext size.
    pub async fn download_and_decrypt_file(
        &self,
        key: &ObjectKey,
        local_path: impl AsRef<Path>,
    ) -> FersResult<u64> {
        let path = self.workdir.resolve(local_path)?;
        let blob = self.store.download(key.as_str()).await?;
        let plaintext = self.cipher.decrypt(&blob)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FersError::io(parent, e))?;
        }
        write_atomic(&path, &plaintext).await?;

        info!(key = %key, path = %path.display(), bytes = plaintext.len(), "downloaded");
        Ok(plaintext.len() as u64)
    }

    /// Download `key` to its own path under the working directory.
    pub async fn download_specific_file(
        &self,
        cancel: &CancellationToken,
        key: &ObjectKey,
    ) -> FersResult<u64> {
        if cancel.is_cancelled() {
            return Err(FersError::Cancelled);
        }
        let path = self.workdir.path_for(key)?;
        self.download_and_decrypt_file(key, path).await
    }

    /// Download every remote key that has no local file at the same
    /// relative path. Existing local files are never overwritten, including
    /// ones the scan does not see: excluded keys are not downloaded, and a
    /// key whose path is already taken (a symlink, a file behind a
    /// symlinked directory) is skipped.
    pub async fn sync_download(&self, cancel: &CancellationToken) -> FersResult<SyncReport> {
        if cancel.is_cancelled() {
            return Err(FersError::Cancelled);
        }
        let mut report = SyncReport::default();

        let local = scan_keys(&self.workdir, &self.filter)?;
        let remote = self.remote_keys(Some(&mut report)).await?;
        let plan = SyncPlan::compute(&local, &remote);
        let total = plan.to_download.len() as u64;
        debug!(
            local = local.len(),
            remote = remote.len(),
            pending = total,
            "sync down planned"
        );

        for (i, key) in plan.to_download.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(done = report.transferred.len(), "sync down cancelled");
                return Err(FersError::Cancelled);
            }
            let result = match self.local_path_taken(&key).await {
                Ok(true) => {
                    debug!(key = %key, "local path already taken, not downloading");
                    report.skipped.push(key.clone());
                    Ok(None)
                }
                Ok(false) => match self.workdir.path_for(&key) {
                    Ok(path) => self.download_and_decrypt_file(&key, path).await.map(Some),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            match result {
                Ok(Some(_)) => report.transferred.push(key.clone()),
                Ok(None) => {}
                Err(e) => report.fail(key.as_str(), e),
            }
            self.report_progress(i as u64 + 1, total, key.as_str());
        }

        info!(
            downloaded = report.transferred.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "sync down complete"
        );
        Ok(report)
    }

    /// Upload every local file whose key is absent remotely. Remote-only
    /// keys and keys present on both sides are left alone.
    pub async fn sync_upload(&self, cancel: &CancellationToken) -> FersResult<SyncReport> {
        if cancel.is_cancelled() {
            return Err(FersError::Cancelled);
        }
        let mut report = SyncReport::default();
        let remote = self.remote_keys(None).await?;

        let mut seen = 0u64;
        for entry in FileWalker::new(self.workdir.root(), &self.filter) {
            if cancel.is_cancelled() {
                info!(done = report.transferred.len(), "sync up cancelled");
                return Err(FersError::Cancelled);
            }
            let path = entry?;
            seen += 1;

            let key = match self.workdir.key_for(&path) {
                Ok(key) => key,
                Err(e) => {
                    report.fail(path.display().to_string(), e);
                    continue;
                }
            };
            if remote.contains(&key) {
                continue;
            }

            match self.encrypt_and_upload_file(&path, &key).await {
                Ok(_) => report.transferred.push(key.clone()),
                Err(e) => report.fail(key.as_str(), e),
            }
            self.report_progress(seen, 0, key.as_str());
        }

        info!(
            uploaded = report.transferred.len(),
            failed = report.failed.len(),
            "sync up complete"
        );
        Ok(report)
    }

    /// Both directions' pending work, without transferring anything.
    pub async fn plan(&self, cancel: &CancellationToken) -> FersResult<SyncPlan> {
        if cancel.is_cancelled() {
            return Err(FersError::Cancelled);
        }
        let local = scan_keys(&self.workdir, &self.filter)?;
        let remote = self.remote_keys(None).await?;
        Ok(SyncPlan::compute(&local, &remote))
    }

    /// Remote keys starting with `prefix`, sorted. Stored names that are not
    /// valid keys are skipped.
    pub async fn list_remote_files(&self, prefix: &str) -> FersResult<Vec<ObjectKey>> {
        let mut keys: Vec<ObjectKey> = self
            .store
            .list(prefix)
            .await?
            .into_iter()
            .filter_map(|raw| match ObjectKey::parse(&raw) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(key = %raw, "ignoring remote object: {e}");
                    None
                }
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Remove one local file inside the working directory. Directories and
    /// missing files are errors.
    pub async fn delete_local_file(&self, local_path: impl AsRef<Path>) -> FersResult<()> {
        let path = self.workdir.resolve(local_path)?;
        let meta = tokio::fs::symlink_metadata(&path)
            .await
            .map_err(|e| FersError::io(&path, e))?;
        if meta.is_dir() {
            let err = std::io::Error::new(
                std::io::ErrorKind::IsADirectory,
                "refusing to delete a directory",
            );
            return Err(FersError::io(&path, err));
        }
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| FersError::io(&path, e))?;
        info!(path = %path.display(), "deleted local file");
        Ok(())
    }

    /// Remove one object from the store. Absent keys are not an error.
    pub async fn delete_remote_file(&self, key: &ObjectKey) -> FersResult<()> {
        self.store.delete(key.as_str()).await?;
        info!(key = %key, "deleted remote object");
        Ok(())
    }

    /// Whether anything exists at the key's path, looked up both without
    /// following symlinks and after resolving them.
    async fn local_path_taken(&self, key: &ObjectKey) -> FersResult<bool> {
        let literal = self.workdir.root().join(key.to_relative_path());
        if tokio::fs::symlink_metadata(&literal).await.is_ok() {
            return Ok(true);
        }
        let resolved = self.workdir.path_for(key)?;
        Ok(tokio::fs::symlink_metadata(&resolved).await.is_ok())
    }

    /// Enumerate the store as a key set, minus excluded keys. With a report,
    /// invalid stored names are recorded as failures; otherwise they are
    /// skipped with a warning.
    async fn remote_keys(&self, mut report: Option<&mut SyncReport>) -> FersResult<KeySet> {
        let mut keys = KeySet::new();
        for raw in self.store.list("").await? {
            match ObjectKey::parse(&raw) {
                Ok(key) if self.filter.excludes_key(&key) => {
                    debug!(key = %key, "remote object excluded");
                }
                Ok(key) => {
                    keys.insert(key);
                }
                Err(e) => match report.as_deref_mut() {
                    Some(report) => report.fail(raw, e),
                    None => warn!(key = %raw, "ignoring remote object: {e}"),
                },
            }
        }
        Ok(keys)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}{TMP_SUFFIX}"))
}

/// Write to a hidden sibling, then rename over the target.
async fn write_atomic(path: &Path, data: &[u8]) -> FersResult<()> {
    let tmp = tmp_path_for(path);
    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| FersError::io(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(FersError::io(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmp_path_is_hidden_sibling() {
        let tmp = tmp_path_for(Path::new("/work/dir/report.pdf"));
        assert_eq!(tmp, PathBuf::from("/work/dir/.report.pdf.fers-tmp"));
        let name = tmp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(ScanFilter::default().is_excluded(&name));
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_and_cleans_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("out.txt");
        std::fs::write(&target, b"old").unwrap();

        write_atomic(&target, b"new").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert!(!tmp_path_for(&target).exists());
    }

    #[test]
    fn test_report_records_failures() {
        let mut report = SyncReport::default();
        assert!(report.is_clean());
        report.fail("a.txt", FersError::Cancelled);
        assert!(!report.is_clean());
        assert_eq!(report.failed[0].0, "a.txt");
        assert!(report.failed[0].1.is_cancelled());
    }
}
