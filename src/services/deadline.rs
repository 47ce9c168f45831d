use std::future::Future;
use std::time::Duration;

use tracing::error;

use crate::db::{StoreError, StoreResult};
use crate::models::SyncError;

/// Run a storage call with a deadline.
///
/// A call that does not finish in time becomes `PersistenceUnavailable`,
/// so a stalled backend never hangs the session that issued it.
///
/// The deadline covers the whole call, commit included. A call that times
/// out after the backend committed has still taken effect: the caller gets
/// `PersistenceUnavailable` and no relay happens for that write, so peers
/// see the version or comment on their next load, and the next relayed
/// sequence number skips past it.
pub async fn with_deadline<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, SyncError>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(StoreError::NotFound)) => Err(SyncError::NotFound),
        Ok(Err(e)) => {
            error!("{} failed: {}", what, e);
            Err(e.into())
        }
        Err(_) => {
            error!("{} timed out after {:?}", what, limit);
            Err(SyncError::PersistenceUnavailable)
        }
    }
}
