//! Cleanup Service (C9): periodic retention sweep over the content store
//! (C2) and session store (C3), plus disk-budget eviction.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use crate::content_store::ContentStore;
use crate::error::Result;
use crate::models::{ContentHash, TranscodeSession};
use crate::repository::TranscodeSessionRepository;

/// Tunables lifted straight from `config.transcoding.*` so the service
/// doesn't need to depend on the whole `Config` type.
#[derive(Debug, Clone, Copy)]
pub struct CleanupPolicy {
    pub standard_retention: ChronoDuration,
    pub extended_retention: ChronoDuration,
    pub large_file_threshold_bytes: u64,
    pub max_disk_usage_bytes: u64,
}

pub struct CleanupService {
    repository: TranscodeSessionRepository,
    content_store: Arc<ContentStore>,
    policy: CleanupPolicy,
}

impl CleanupService {
    #[must_use]
    pub fn new(repository: TranscodeSessionRepository, content_store: Arc<ContentStore>, policy: CleanupPolicy) -> Self {
        Self { repository, content_store, policy }
    }

    /// Runs one full sweep: retention-based deletion, then disk-budget
    /// eviction if still over budget.
    pub async fn run_once(&self) -> Result<()> {
        self.sweep_retention().await?;
        self.enforce_disk_budget().await?;
        Ok(())
    }

    /// Large artifacts (above `large_file_threshold_bytes`) get the longer
    /// extended window; everything else uses the standard window. Rows past
    /// the standard cutoff are only candidates — each is checked against its
    /// on-disk size before the row and directory are actually removed, so a
    /// large artifact that hasn't reached the extended cutoff yet survives.
    async fn sweep_retention(&self) -> Result<()> {
        let candidates = self.repository.list_terminal_older_than(self.policy.standard_retention).await?;
        for session in candidates {
            self.retire(session).await;
        }
        Ok(())
    }

    async fn retire(&self, session: TranscodeSession) {
        let hash = session.content_hash.clone();
        if let Ok(size) = self.content_store.directory_size(&self.content_store.path_for(&hash)).await {
            if size > self.policy.large_file_threshold_bytes {
                let age = chrono::Utc::now() - session.last_accessed;
                if age < self.policy.extended_retention {
                    info!(session_id = %session.id, %hash, "large artifact within extended retention, keeping");
                    return;
                }
            }
        }

        if let Err(err) = self.content_store.remove(&hash).await {
            warn!(session_id = %session.id, %hash, %err, "failed to remove content directory during cleanup");
        }
        if let Err(err) = self.repository.delete(session.id).await {
            warn!(session_id = %session.id, %err, "failed to delete transcode session row during cleanup");
        }
        info!(session_id = %session.id, %hash, "retired expired transcode session");
    }

    /// If total content-store size exceeds the configured budget, evicts
    /// the oldest (by `last_accessed`) sessions until back under budget,
    /// skipping any still `running`/`queued` (a Streaming Server handler may
    /// be serving it).
    async fn enforce_disk_budget(&self) -> Result<()> {
        let mut total = self.content_store.total_size().await?;
        if total <= self.policy.max_disk_usage_bytes {
            return Ok(());
        }

        let candidates = self.content_store.oldest_sessions(256).await?;
        for (hash, metadata) in candidates {
            if total <= self.policy.max_disk_usage_bytes {
                break;
            }
            if matches!(metadata.status.as_str(), "running" | "queued") {
                continue;
            }

            let dir_size = self.content_store.directory_size(&self.content_store.path_for(&hash)).await.unwrap_or(0);
            if let Err(err) = self.content_store.remove(&hash).await {
                warn!(%hash, %err, "failed to evict content directory over disk budget");
                continue;
            }
            self.delete_session_row_for_hash(&hash).await;

            total = total.saturating_sub(dir_size);
            info!(%hash, dir_size, total, "evicted content directory to stay under disk budget");
        }

        Ok(())
    }

    async fn delete_session_row_for_hash(&self, hash: &ContentHash) {
        match self.repository.find_reusable_by_hash(hash).await {
            Ok(Some(session)) => {
                if let Err(err) = self.repository.delete(session.id).await {
                    warn!(session_id = %session.id, %err, "failed to delete evicted session row");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%hash, %err, "failed to look up session row for evicted content directory"),
        }
    }
}

/// Spawns the cleanup loop as a long-lived background task.
pub fn spawn_cleanup_loop(service: Arc<CleanupService>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = service.run_once().await {
                warn!(%err, "cleanup pass failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use tempfile::tempdir;

    fn lazy_pool() -> sqlx::PgPool {
        PgPoolOptions::new().connect_lazy("postgres://localhost/test").unwrap()
    }

    #[tokio::test]
    async fn run_once_is_a_noop_on_an_empty_store() {
        let root = tempdir().unwrap();
        let service = CleanupService::new(
            TranscodeSessionRepository::new(lazy_pool()),
            Arc::new(ContentStore::new(root.path())),
            CleanupPolicy {
                standard_retention: ChronoDuration::hours(24),
                extended_retention: ChronoDuration::hours(72),
                large_file_threshold_bytes: 2_000_000_000,
                max_disk_usage_bytes: 100_000_000_000,
            },
        );
        assert!(service.enforce_disk_budget().await.is_ok());
    }
}
