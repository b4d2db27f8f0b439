//! Local tree walking: which files under a directory take part in a sync

use std::path::{Path, PathBuf};

use fers_core::{FersError, FersResult, KeySet, ObjectKey};
use tracing::warn;

use crate::guard::WorkingDirectory;

/// Suffix of the temporary file a download writes before renaming into place
pub const TMP_SUFFIX: &str = ".fers-tmp";

/// Name-based exclusion applied to both files and directories.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    excludes: Vec<glob::Pattern>,
}

impl ScanFilter {
    pub fn new(patterns: &[String]) -> FersResult<Self> {
        let excludes = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| FersError::Config(format!("invalid exclude pattern {p:?}: {e}")))
            })
            .collect::<FersResult<Vec<_>>>()?;
        Ok(Self { excludes })
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        name.ends_with(TMP_SUFFIX) || self.excludes.iter().any(|p| p.matches(name))
    }

    /// True when any segment of `key` is excluded, i.e. the walker would
    /// never reach the file the key names.
    pub fn excludes_key(&self, key: &ObjectKey) -> bool {
        key.as_str().split('/').any(|segment| self.is_excluded(segment))
    }
}

/// Lazy depth-first walk yielding regular files in sorted order per
/// directory. Symlinks and special files are skipped; the caller can stop
/// between any two files.
pub struct FileWalker<'a> {
    start: Option<PathBuf>,
    stack: Vec<std::vec::IntoIter<PathBuf>>,
    filter: &'a ScanFilter,
}

impl<'a> FileWalker<'a> {
    pub fn new(root: impl Into<PathBuf>, filter: &'a ScanFilter) -> Self {
        Self {
            start: Some(root.into()),
            stack: Vec::new(),
            filter,
        }
    }

    fn push_dir(&mut self, dir: &Path) -> FersResult<()> {
        let mut entries = std::fs::read_dir(dir)
            .map_err(|e| FersError::io(dir, e))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FersError::io(dir, e))?;
        entries.sort(); // deterministic order
        self.stack.push(entries.into_iter());
        Ok(())
    }
}

impl Iterator for FileWalker<'_> {
    type Item = FersResult<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(start) = self.start.take() {
            let meta = match std::fs::symlink_metadata(&start) {
                Ok(m) => m,
                Err(e) => return Some(Err(FersError::io(&start, e))),
            };
            if meta.is_file() {
                return Some(Ok(start));
            }
            if meta.is_dir() {
                if let Err(e) = self.push_dir(&start) {
                    return Some(Err(e));
                }
            }
        }

        loop {
            let path = match self.stack.last_mut()?.next() {
                Some(path) => path,
                None => {
                    self.stack.pop();
                    continue;
                }
            };

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if self.filter.is_excluded(&name) {
                continue;
            }

            let meta = match std::fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => return Some(Err(FersError::io(&path, e))),
            };
            if meta.is_dir() {
                if let Err(e) = self.push_dir(&path) {
                    return Some(Err(e));
                }
            } else if meta.is_file() {
                return Some(Ok(path));
            }
        }
    }
}

/// Key set of every syncable file under the working directory. Files whose
/// names cannot form a key are skipped with a warning.
pub fn scan_keys(workdir: &WorkingDirectory, filter: &ScanFilter) -> FersResult<KeySet> {
    let mut keys = KeySet::new();
    for entry in FileWalker::new(workdir.root(), filter) {
        let path = entry?;
        match workdir.key_for(&path) {
            Ok(key) => {
                keys.insert(key);
            }
            Err(e) => warn!(path = %path.display(), "skipping local file: {e}"),
        }
    }
    Ok(keys)
}
