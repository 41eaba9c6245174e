//! Background task for enforcing the event retention period.

use backlog_store::{EventId, ParseEventIdError, Store, StoreError};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::time::sleep;

/// Keys collected per write transaction before the pass commits and
/// reopens. Bounds the size of the pruner's transactions.
pub const PRUNE_BATCH_SIZE: usize = 10_000;

/// Errors from a prune pass. Logged by the retention task, never
/// user-visible; the next tick retries.
#[derive(Debug, Error)]
pub enum PruneError {
    /// The store failed mid-pass.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A key in the events map did not parse as an event id.
    #[error("could not parse event id '{key}': {source}")]
    BadKey {
        /// The offending key.
        key: String,
        /// The parse failure.
        source: ParseEventIdError,
    },
}

/// Deletes every event whose embedded timestamp is strictly before
/// `cutoff`, in bounded batches, until a pass finds nothing to delete.
///
/// Keys are time-ordered, so the deletable events are contiguous at the
/// front of the map: the scan runs forward from the smallest key and stops
/// at the first event at or past the cutoff, or at [`PRUNE_BATCH_SIZE`]
/// collected keys. Returns the total number of deleted events.
///
/// # Errors
///
/// Returns `PruneError` if a key fails to parse or the store fails; the
/// pass's uncommitted batch rolls back.
pub fn prune_events(store: &Store, cutoff: SystemTime) -> Result<u64, PruneError> {
    let mut total: u64 = 0;

    loop {
        let deleted = store.write(|tx| {
            let mut to_delete: Vec<String> = Vec::new();
            {
                let mut cur = tx.cursor();
                cur.first()?;
                while let Some(key) = cur.key() {
                    let id: EventId = key.parse().map_err(|source| PruneError::BadKey {
                        key: key.to_string(),
                        source,
                    })?;
                    if id.timestamp() >= cutoff {
                        break;
                    }
                    to_delete.push(key.to_string());
                    if to_delete.len() >= PRUNE_BATCH_SIZE {
                        break;
                    }
                    cur.next()?;
                }
            }

            for key in &to_delete {
                tx.delete(key)?;
            }
            Ok::<_, PruneError>(to_delete.len())
        })?;

        total += deleted as u64;
        if deleted == 0 {
            return Ok(total);
        }
        tracing::info!(count = deleted, "pruned expired events");
    }
}

/// Starts the periodic retention task. Runs indefinitely.
///
/// Every `frequency` the task prunes events older than
/// `now - retention_period` on the blocking pool. Failures are logged and
/// retried on the next tick.
pub async fn start_retention_task(
    store: Arc<Store>,
    retention_period: Duration,
    frequency: Duration,
) {
    tracing::info!(
        retention_period_secs = retention_period.as_secs(),
        frequency_secs = frequency.as_secs(),
        "starting event retention task"
    );

    loop {
        sleep(frequency).await;

        let cutoff = SystemTime::now()
            .checked_sub(retention_period)
            .unwrap_or(UNIX_EPOCH);

        let store = store.clone();
        let result = tokio::task::spawn_blocking(move || prune_events(&store, cutoff)).await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    tracing::info!(count, "retention pass deleted expired events");
                } else {
                    tracing::debug!("no expired events to delete");
                }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "retention pass failed");
            }
            Err(e) => {
                tracing::error!(error = %e, "retention task join error");
            }
        }
    }
}
