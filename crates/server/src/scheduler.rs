//! Periodic cache cleanup.

use std::sync::Arc;
use std::time::Duration;

use tidecache_core::CacheEngine;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest period; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Run `engine.cleanup()` every `every`, starting one period after spawn.
pub fn spawn_cleanup(engine: Arc<CacheEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = engine.cleanup().await;
            tracing::debug!(?report, "scheduled cleanup");
        }
    })
}
