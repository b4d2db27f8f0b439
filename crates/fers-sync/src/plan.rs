//! Reconciliation plan: set difference over full relative keys

use fers_core::{KeySet, ObjectKey};

/// What a bidirectional pass would transfer. Keys present on both sides are
/// left alone regardless of content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Present locally, absent remotely
    pub to_upload: Vec<ObjectKey>,
    /// Present remotely, absent locally
    pub to_download: Vec<ObjectKey>,
}

impl SyncPlan {
    pub fn compute(local: &KeySet, remote: &KeySet) -> Self {
        Self {
            to_upload: local.difference(remote).cloned().collect(),
            to_download: remote.difference(local).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_download.is_empty()
    }
}
