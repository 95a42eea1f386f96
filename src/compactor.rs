use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::store::{StoreError, WalStore};

/// Compact the store's WAL if at least `threshold` events were appended since
/// the last compaction. Returns whether a compaction ran.
pub async fn compact_if_due(store: &WalStore, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "WAL compaction not due");
        return Ok(false);
    }
    store.compact().await?;
    Ok(true)
}

/// Background task that periodically compacts the WAL once it has grown past
/// `threshold` appends.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&store, threshold).await {
            // Retried on the next tick.
            warn!("WAL compaction failed: {e}");
        }
    }
}
