use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::SyncEngine;

/// Run `sync_now` on a fixed interval. Ticks that land on a running pass
/// collapse into it through the engine's gate.
pub fn spawn_scheduler(engine: Arc<SyncEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = every.as_secs(), "Sync scheduler started");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let result = engine.sync_now().await;
            if result.skipped {
                tracing::debug!("Scheduled sync skipped; a pass is already running");
            }
        }
    })
}
