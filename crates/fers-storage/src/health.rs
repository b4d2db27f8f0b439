//! Storage health check

use fers_core::FersResult;
use tracing::debug;

use crate::store::ObjectStore;

/// Verify the store is reachable by listing everything
pub async fn check_health(store: &dyn ObjectStore) -> FersResult<usize> {
    let keys = store.list("").await?;
    debug!(backend = %store.describe(), objects = keys.len(), "store healthy");
    Ok(keys.len())
}

