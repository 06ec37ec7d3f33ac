//! Scanner Job Coordinator (C10): reconciles persisted `ScanJob` rows with
//! the live in-process scanners on startup and on a periodic tick.
//!
//! Two external collaborators are abstracted behind traits so the
//! reconciliation rules stay testable without a filesystem walker or a
//! `libraries` table: [`LibraryExistenceCheck`] answers "does this library
//! still exist", [`ScanWorkers`] starts/stops/enumerates the actual scan
//! tasks (walking a library's filesystem is out of scope here).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{LibraryId, ScanJob, ScanJobId, ScanStatus};
use crate::repository::ScanJobRepository;

/// Whether a `library_id` still exists, queried against whatever owns the
/// library catalog (not this crate).
#[async_trait]
pub trait LibraryExistenceCheck: Send + Sync {
    async fn exists(&self, library_id: &LibraryId) -> Result<bool>;
}

/// Always reports every library as existing. Used when the coordinator runs
/// without the library subsystem present (e.g. a standalone transcode node).
pub struct AlwaysExistsCheck;

#[async_trait]
impl LibraryExistenceCheck for AlwaysExistsCheck {
    async fn exists(&self, _library_id: &LibraryId) -> Result<bool> {
        Ok(true)
    }
}

/// The live, in-process scan workers the coordinator reconciles against.
/// A concrete implementation owns the filesystem walk; this trait only
/// exposes the start/stop/liveness surface the coordinator needs.
#[async_trait]
pub trait ScanWorkers: Send + Sync {
    /// Job ids the caller currently believes are running.
    fn running_job_ids(&self) -> Vec<ScanJobId>;

    fn is_running(&self, job_id: ScanJobId) -> bool;

    /// Starts (or resumes) a scan for `library_id` under `job_id`.
    async fn spawn(&self, library_id: LibraryId, job_id: ScanJobId) -> Result<()>;

    async fn stop(&self, job_id: ScanJobId);
}

pub struct ScannerJobCoordinator {
    repository: ScanJobRepository,
    workers: Arc<dyn ScanWorkers>,
    library_check: Arc<dyn LibraryExistenceCheck>,
    auto_resume_min_files: u64,
    auto_resume_min_percent: f64,
}

impl ScannerJobCoordinator {
    #[must_use]
    pub fn new(
        repository: ScanJobRepository,
        workers: Arc<dyn ScanWorkers>,
        library_check: Arc<dyn LibraryExistenceCheck>,
        auto_resume_min_files: u64,
        auto_resume_min_percent: f64,
    ) -> Self {
        Self { repository, workers, library_check, auto_resume_min_files, auto_resume_min_percent }
    }

    /// One full reconciliation pass (§4.10 rules 1-5), run at startup and on
    /// every periodic tick.
    pub async fn reconcile(&self) -> Result<()> {
        let mut jobs = self.repository.list_non_terminal().await?;

        self.recover_orphaned_rows(&mut jobs).await?;
        self.recover_orphaned_workers(&jobs).await;
        self.dedupe_per_library(&mut jobs).await?;
        self.cancel_jobs_for_missing_libraries(&mut jobs).await?;
        self.resume_significant_paused(&jobs).await?;

        Ok(())
    }

    /// Rule 1: a row claims `running` but no worker is alive for it — the
    /// process must have restarted without a clean shutdown. Demote to
    /// `paused` so rule 5 can pick it back up.
    async fn recover_orphaned_rows(&self, jobs: &mut [ScanJob]) -> Result<()> {
        for job in jobs.iter_mut() {
            if job.status == ScanStatus::Running && !self.workers.is_running(job.id.clone()) {
                warn!(job_id = %job.id, library_id = %job.library_id, "scan job running with no live worker, pausing");
                self.repository.update_status(&job.id, ScanStatus::Paused).await?;
                job.status = ScanStatus::Paused;
            }
        }
        Ok(())
    }

    /// Rule 2: a worker is alive but its row is gone (deleted, or never
    /// persisted) — stop it, there is nothing left to reconcile it against.
    async fn recover_orphaned_workers(&self, jobs: &[ScanJob]) {
        let known: std::collections::HashSet<ScanJobId> = jobs.iter().map(|j| j.id.clone()).collect();
        for worker_id in self.workers.running_job_ids() {
            if !known.contains(&worker_id) {
                warn!(job_id = %worker_id, "live scan worker has no row, stopping");
                self.workers.stop(worker_id).await;
            }
        }
    }

    /// Rule 3: at most one non-terminal row per library. Keep the one with
    /// the greatest progress, mark the rest `completed` and stop their
    /// workers.
    async fn dedupe_per_library(&self, jobs: &mut Vec<ScanJob>) -> Result<()> {
        let mut by_library: HashMap<LibraryId, Vec<ScanJob>> = HashMap::new();
        for job in jobs.drain(..) {
            by_library.entry(job.library_id.clone()).or_default().push(job);
        }

        for (library_id, mut group) in by_library {
            if group.len() > 1 {
                group.sort_by(|a, b| {
                    b.files_processed
                        .max(b.percent_complete() as u64)
                        .cmp(&a.files_processed.max(a.percent_complete() as u64))
                });
                let winner = group.remove(0);
                for loser in &group {
                    info!(job_id = %loser.id, %library_id, "duplicate scan job for library, retiring");
                    self.workers.stop(loser.id.clone()).await;
                    self.repository.update_status(&loser.id, ScanStatus::Completed).await?;
                }
                jobs.push(winner);
            } else {
                jobs.extend(group);
            }
        }
        Ok(())
    }

    /// Rule 4: the library a job points at may no longer exist (deleted
    /// between scans). Stop and fail any job for a missing library.
    async fn cancel_jobs_for_missing_libraries(&self, jobs: &mut Vec<ScanJob>) -> Result<()> {
        let mut survivors = Vec::with_capacity(jobs.len());
        for job in jobs.drain(..) {
            if self.library_check.exists(&job.library_id).await? {
                survivors.push(job);
                continue;
            }
            warn!(job_id = %job.id, library_id = %job.library_id, "library no longer exists, cancelling scan job");
            self.workers.stop(job.id.clone()).await;
            self.repository.update_status(&job.id, ScanStatus::Failed).await?;
        }
        *jobs = survivors;
        Ok(())
    }

    /// Rule 5: a paused job with significant progress gets restarted rather
    /// than left waiting for an explicit resume call.
    async fn resume_significant_paused(&self, jobs: &[ScanJob]) -> Result<()> {
        for job in jobs {
            if job.status == ScanStatus::Paused
                && job.has_significant_progress(self.auto_resume_min_files, self.auto_resume_min_percent)
            {
                info!(job_id = %job.id, library_id = %job.library_id, "auto-resuming scan job with significant progress");
                self.workers.spawn(job.library_id.clone(), job.id.clone()).await?;
                self.repository.update_status(&job.id, ScanStatus::Running).await?;
            }
        }
        Ok(())
    }

    /// Public API (§6.1): pause a library's scan. A library with no
    /// paused/running row gets a fresh paused row rather than an error, per
    /// §4.10: "pause on a library with no paused/running row auto-starts
    /// one."
    pub async fn pause(&self, library_id: LibraryId) -> Result<ScanJob> {
        match self.repository.find_active_for_library(&library_id).await? {
            Some(mut job) => {
                if job.status == ScanStatus::Running {
                    self.workers.stop(job.id.clone()).await;
                }
                self.repository.update_status(&job.id, ScanStatus::Paused).await?;
                job.status = ScanStatus::Paused;
                Ok(job)
            }
            None => {
                let mut job = ScanJob::new(library_id);
                job.status = ScanStatus::Paused;
                self.repository.create(&job).await
            }
        }
    }

    /// Public API (§6.1): resume a library's scan, starting a fresh job if
    /// none exists.
    pub async fn resume(&self, library_id: LibraryId) -> Result<ScanJob> {
        let job = match self.repository.find_active_for_library(&library_id).await? {
            Some(job) if job.status == ScanStatus::Running => return Ok(job),
            Some(job) => job,
            None => self.repository.create(&ScanJob::new(library_id.clone())).await?,
        };

        self.workers.spawn(library_id, job.id.clone()).await?;
        self.repository.update_status(&job.id, ScanStatus::Running).await?;
        Ok(ScanJob { status: ScanStatus::Running, ..job })
    }

    /// Public API (§6.1): current job for a library, if any.
    pub async fn status(&self, library_id: &LibraryId) -> Result<Option<ScanJob>> {
        self.repository.find_active_for_library(library_id).await
    }
}

/// Spawns the periodic reconciliation loop (§4.10: "a 30-second periodic
/// tick").
pub fn spawn_reconciliation_loop(
    coordinator: Arc<ScannerJobCoordinator>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = coordinator.reconcile().await {
                warn!(%err, "scan job reconciliation pass failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sqlx::postgres::PgPoolOptions;
    use std::collections::HashSet as StdHashSet;

    fn lazy_pool() -> sqlx::PgPool {
        PgPoolOptions::new().connect_lazy("postgres://localhost/test").unwrap()
    }

    struct FakeWorkers {
        running: Mutex<StdHashSet<ScanJobId>>,
    }

    impl FakeWorkers {
        fn new() -> Self {
            Self { running: Mutex::new(StdHashSet::new()) }
        }
    }

    #[async_trait]
    impl ScanWorkers for FakeWorkers {
        fn running_job_ids(&self) -> Vec<ScanJobId> {
            self.running.lock().iter().cloned().collect()
        }

        fn is_running(&self, job_id: ScanJobId) -> bool {
            self.running.lock().contains(&job_id)
        }

        async fn spawn(&self, _library_id: LibraryId, job_id: ScanJobId) -> Result<()> {
            self.running.lock().insert(job_id);
            Ok(())
        }

        async fn stop(&self, job_id: ScanJobId) {
            self.running.lock().remove(&job_id);
        }
    }

    #[test]
    fn always_exists_check_is_infallible_true() {
        let check = AlwaysExistsCheck;
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let exists = rt.block_on(check.exists(&LibraryId::from_string("lib-1".to_string())));
        assert!(exists.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn reconcile_pauses_rows_with_no_live_worker() {
        let coordinator = ScannerJobCoordinator::new(
            ScanJobRepository::new(lazy_pool()),
            Arc::new(FakeWorkers::new()),
            Arc::new(AlwaysExistsCheck),
            10,
            1.0,
        );
        let _ = coordinator.reconcile().await;
    }
}
