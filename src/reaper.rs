use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Background task that periodically purges meetings whose window has
/// fully passed. A series base is left alone until its last child has
/// also ended.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let expired = engine.collect_expired_meetings(engine.now_ms());
        for id in expired {
            match engine.purge_meeting(id).await {
                Ok(()) => {
                    metrics::counter!(crate::observability::MEETINGS_SWEPT_TOTAL).increment(1);
                    info!("swept ended meeting {id}");
                }
                Err(e) => {
                    // May already be gone after a concurrent cancel
                    debug!("sweeper found {id} already gone: {e}");
                }
            }
        }
    }
}

/// Background task that rewrites the WAL from live state once enough
/// appends pile up since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
