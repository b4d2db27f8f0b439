//! Working-directory confinement for every local path the engine touches
//!
//! A candidate path is joined onto the root (if relative), cleaned lexically,
//! then canonicalized as far as it exists on disk so a symlink cannot carry
//! it outside. The result must strip to a relative path under the
//! canonical root, compared component by component.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use fers_core::{FersError, FersResult, ObjectKey};

/// The root boundary outside of which no local file operation may act.
#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    root: PathBuf,
}

impl WorkingDirectory {
    /// Canonicalize `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> FersResult<Self> {
        let root = root.as_ref();
        let canonical = std::fs::canonicalize(root).map_err(|e| FersError::io(root, e))?;
        if !canonical.is_dir() {
            let err = io::Error::new(
                io::ErrorKind::NotADirectory,
                "working directory is not a directory",
            );
            return Err(FersError::io(root, err));
        }
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` (relative to the root, or absolute) to a path
    /// inside the root, or fail with `FersError::Security`.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> FersResult<PathBuf> {
        let candidate = candidate.as_ref();
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let resolved = canonicalize_existing(&clean(&joined));
        self.relative_to_root(&resolved).map_err(|_| {
            FersError::Security(format!(
                "{} resolves outside working directory {}",
                candidate.display(),
                self.root.display()
            ))
        })?;
        Ok(resolved)
    }

    /// Object key for a local path inside the root.
    pub fn key_for(&self, path: impl AsRef<Path>) -> FersResult<ObjectKey> {
        let resolved = self.resolve(path)?;
        let rel = self.relative_to_root(&resolved)?;
        ObjectKey::from_relative_path(rel)
    }

    /// Local path for an object key, checked like any other candidate.
    pub fn path_for(&self, key: &ObjectKey) -> FersResult<PathBuf> {
        self.resolve(key.to_relative_path())
    }

    /// Navigate one level up from `current`, never past the root.
    pub fn parent_within(&self, current: impl AsRef<Path>) -> FersResult<PathBuf> {
        let current = self.resolve(current)?;
        if current == self.root {
            return Ok(current);
        }
        match current.parent() {
            Some(parent) if self.relative_to_root(parent).is_ok() => Ok(parent.to_path_buf()),
            _ => Ok(self.root.clone()),
        }
    }

    /// Navigate from `current` into the child directory `name`.
    pub fn enter(&self, current: impl AsRef<Path>, name: impl AsRef<Path>) -> FersResult<PathBuf> {
        let current = self.resolve(current)?;
        let target = self.resolve(current.join(name))?;
        let meta = std::fs::metadata(&target).map_err(|e| FersError::io(&target, e))?;
        if !meta.is_dir() {
            return Err(FersError::io(
                &target,
                io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
            ));
        }
        Ok(target)
    }

    fn relative_to_root<'a>(&self, path: &'a Path) -> FersResult<&'a Path> {
        let rel = path
            .strip_prefix(&self.root)
            .map_err(|_| FersError::Security(format!("{} is outside the root", path.display())))?;
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(FersError::Security(format!(
                "{} is outside the root",
                path.display()
            )));
        }
        Ok(rel)
    }
}

/// Lexical cleanup: drop `.`, fold `name/..`, and clamp `..` at the
/// filesystem root. Leading `..` survives on relative paths.
fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Canonicalize the deepest existing ancestor and re-append the rest.
fn canonicalize_existing(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut tail: Vec<OsString> = Vec::new();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(existing) {
            let mut out = canonical;
            for part in tail.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
