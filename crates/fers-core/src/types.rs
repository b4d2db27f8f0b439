use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FersError, FersResult};

/// Root-relative, forward-slash path naming one file both locally and in
/// the object store.
///
/// Always relative, never empty, and never contains an empty, `.` or `..`
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn parse(raw: &str) -> FersResult<Self> {
        if raw.is_empty() {
            return Err(FersError::InvalidKey("empty key".into()));
        }
        if raw.starts_with('/') {
            return Err(FersError::InvalidKey(format!("absolute key: {raw}")));
        }
        if raw.contains('\\') {
            return Err(FersError::InvalidKey(format!("backslash in key: {raw}")));
        }
        for segment in raw.split('/') {
            match segment {
                "" => return Err(FersError::InvalidKey(format!("empty segment in key: {raw}"))),
                "." | ".." => {
                    return Err(FersError::InvalidKey(format!(
                        "relative segment {segment:?} in key: {raw}"
                    )))
                }
                _ => {}
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// Build a key from a path relative to the working root.
    pub fn from_relative_path(rel: &Path) -> FersResult<Self> {
        let mut segments: Vec<&str> = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| {
                        FersError::InvalidKey(format!("non UTF-8 path: {}", rel.display()))
                    })?;
                    segments.push(part);
                }
                other => {
                    return Err(FersError::InvalidKey(format!(
                        "unexpected component {other:?} in {}",
                        rel.display()
                    )))
                }
            }
        }
        Self::parse(&segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as a native relative path.
    pub fn to_relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = FersError;

    fn try_from(value: String) -> FersResult<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

/// Keys observed on one side of a reconciliation.
pub type KeySet = BTreeSet<ObjectKey>;
