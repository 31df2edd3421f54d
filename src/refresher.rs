use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::reconciler::Reconciler;
use crate::store::LocalStore;

/// Background task that periodically re-fetches the store's list.
///
/// A tick is skipped while any mutation is unsettled, so a refresh never
/// races an optimistic entry out of the ledger.
pub async fn run_refresher(reconciler: Arc<Reconciler>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if tick_refresh(&reconciler).await {
            debug!("periodic refresh done");
        }
    }
}

async fn tick_refresh(reconciler: &Reconciler) -> bool {
    let pending = reconciler.in_flight();
    if pending > 0 {
        debug!("refresh skipped, {pending} mutations in flight");
        return false;
    }
    // Failures already alert subscribers; the next tick retries.
    reconciler.refresh().await.is_ok()
}

/// Background task that compacts the journal once enough appends pile up.
pub async fn run_compactor(store: Arc<LocalStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        maybe_compact(&store, threshold).await;
    }
}

async fn maybe_compact(store: &LocalStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!("compacted journal after {appends} appends");
            true
        }
        Err(e) => {
            warn!("journal compaction failed: {e}");
            false
        }
    }
}
