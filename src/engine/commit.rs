//! Status commit protocol
//!
//! The fast path writes the in-memory status as-is. If that fails for any
//! reason the root is re-fetched and the pass's status modifiers are replayed
//! on the fresh copy, up to [`MAX_STATUS_COMMIT_ATTEMPTS`] times. Replaying
//! intent instead of re-running components keeps expensive or side-effecting
//! reconcile calls out of the retry loop.
//!
//! There is no delay between attempts.

use tracing::{debug, info, warn};

use super::modifier::StatusModifier;
use super::RootResource;
use crate::error::{Error, Result};
use crate::store::{ObjectKey, ResourceStore, StoreError, StoreExt};

/// Number of re-fetch/replay cycles after the fast path fails
pub const MAX_STATUS_COMMIT_ATTEMPTS: usize = 5;

/// Persist the status of `root`, replaying `modifiers` on conflict
pub async fn commit_status<K: RootResource>(
    store: &dyn ResourceStore,
    root: &K,
    modifiers: &[StatusModifier<K::Status>],
) -> Result<()> {
    let key = ObjectKey::from_resource(root);

    let mut last_error = match store.update_status_as(root).await {
        Ok(_) => {
            debug!("Status for {} committed on the fast path", key);
            return Ok(());
        }
        Err(e) => {
            debug!("Fast-path status update for {} failed: {}", key, e);
            e
        }
    };

    for attempt in 1..=MAX_STATUS_COMMIT_ATTEMPTS {
        #[cfg(feature = "metrics")]
        crate::metrics::inc_status_commit_retry(K::kind(&()).as_ref());

        let mut fresh: K = match store.get_as::<K>(&key).await {
            Ok(fresh) => fresh,
            Err(e) if e.is_not_found() => {
                info!("{} was deleted before its status could be committed", key);
                return Ok(());
            }
            Err(e) => {
                warn!("Attempt {} to re-fetch {} failed: {}", attempt, key, e);
                last_error = e;
                continue;
            }
        };

        replay(&mut fresh, modifiers);

        match write_status(store, &fresh).await {
            Ok(()) => {
                info!("Status for {} committed after {} replay(s)", key, attempt);
                return Ok(());
            }
            Err(e) => {
                debug!("Replay attempt {} for {} failed: {}", attempt, key, e);
                last_error = e;
            }
        }
    }

    Err(Error::StatusCommitError {
        key: format!("{} {}", K::kind(&()), key),
        attempts: MAX_STATUS_COMMIT_ATTEMPTS,
        source: Box::new(Error::StoreError(last_error)),
    })
}

/// Apply every modifier in order; failures are skipped the same way they are
/// when the modifier is first merged, so replay reproduces the in-memory status
pub(crate) fn replay<K: RootResource>(root: &mut K, modifiers: &[StatusModifier<K::Status>]) {
    for modifier in modifiers {
        if let Err(e) = modifier.apply(root.status_mut()) {
            warn!("Replaying status modifier {} failed: {}", modifier.name(), e);
        }
    }
}

/// Status-subresource write, falling back to a plain update for kinds that
/// have no status subresource
async fn write_status<K: RootResource>(
    store: &dyn ResourceStore,
    root: &K,
) -> std::result::Result<(), StoreError> {
    match store.update_status_as(root).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            debug!("No status subresource, falling back to a full update");
            store.update_as(root).await.map(|_| ())
        }
        Err(e) => Err(e),
    }
}
