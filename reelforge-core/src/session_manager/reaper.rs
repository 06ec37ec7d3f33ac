use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::SessionManager;

/// Spawns the stale-session reaper as a long-lived background task. Returns
/// the task handle so the caller can abort it at shutdown.
pub fn spawn_stale_reaper(
    manager: Arc<SessionManager>,
    interval: Duration,
    stale_threshold: chrono::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reaped = manager.reap_stale(stale_threshold).await;
            if !reaped.is_empty() {
                warn!(count = reaped.len(), "reaped stale transcode sessions");
            } else {
                info!("stale session reaper pass: nothing to reap");
            }
        }
    })
}
