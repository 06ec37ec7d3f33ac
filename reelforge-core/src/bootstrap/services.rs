//! Service wiring: constructs every long-lived component (C1-C10) from a
//! `PgPool` and `Config`, and spawns the four background loops (stale
//! transcode reaper, cleanup, scanner reconciliation, playback abandon).

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::content_store::ContentStore;
use crate::error::Result;
use crate::media_info::{MediaInfoLookup, NoopMediaInfoLookup};
use crate::models::{LibraryId, ScanJobId};
use crate::process::ProcessManager;
use crate::provider::{ProviderRegistry, SoftwareProvider};
use crate::repository::{PlaybackSessionRepository, ScanJobRepository, TranscodeSessionRepository};
use crate::service::{AlwaysExistsCheck, CleanupPolicy, CleanupService, ScanWorkers, ScannerJobCoordinator, TranscodeService};
use crate::session_manager::SessionManager;
use crate::Config;

/// A `ScanWorkers` implementation for deployments that run the transcoding
/// core without the library-scanning subsystem attached. It reports nothing
/// running and treats spawn/stop as no-ops, so the coordinator's orphan and
/// auto-resume rules degrade to "every non-terminal row is paused" rather
/// than erroring.
struct NoopScanWorkers;

#[async_trait]
impl ScanWorkers for NoopScanWorkers {
    fn running_job_ids(&self) -> Vec<ScanJobId> {
        Vec::new()
    }

    fn is_running(&self, _job_id: ScanJobId) -> bool {
        false
    }

    async fn spawn(&self, _library_id: LibraryId, _job_id: ScanJobId) -> Result<()> {
        Ok(())
    }

    async fn stop(&self, _job_id: ScanJobId) {}
}

/// Every long-lived component the binary needs to hold onto for the
/// lifetime of the process. Background loops are spawned by
/// [`init_services`] and their handles kept here so the caller can abort
/// them at shutdown if desired.
pub struct Services {
    pub transcode_service: Arc<TranscodeService>,
    pub session_manager: Arc<SessionManager>,
    pub content_store: Arc<ContentStore>,
    pub playback_repository: PlaybackSessionRepository,
    pub scanner: Arc<ScannerJobCoordinator>,
    pub cleanup_service: Arc<CleanupService>,
    pub media_info: Arc<dyn MediaInfoLookup>,
    pub background_tasks: Vec<tokio::task::JoinHandle<()>>,
}

/// Builds every component and spawns the background loops. Background
/// tasks are long-lived for the life of the process; the caller is not
/// expected to await them.
pub async fn init_services(pool: PgPool, config: &Config) -> Result<Services> {
    let transcode_repository = TranscodeSessionRepository::new(pool.clone());
    let playback_repository = PlaybackSessionRepository::new(pool.clone());
    let scan_job_repository = ScanJobRepository::new(pool.clone());

    let content_store = Arc::new(ContentStore::new(&config.transcoding.data_dir));

    let process_manager = Arc::new(ProcessManager::new());
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(SoftwareProvider::new(Arc::clone(&process_manager))));
    let providers = Arc::new(providers);

    let session_manager = Arc::new(SessionManager::new(
        transcode_repository.clone(),
        Arc::clone(&providers),
        config.transcoding.max_sessions,
    ));

    let transcode_service = Arc::new(TranscodeService::new(
        transcode_repository.clone(),
        Arc::clone(&content_store),
        Arc::clone(&providers),
        Arc::clone(&session_manager),
    ));

    let cleanup_policy = CleanupPolicy {
        standard_retention: chrono::Duration::hours(i64::try_from(config.transcoding.retention_hours).unwrap_or(24)),
        extended_retention: chrono::Duration::hours(i64::try_from(config.transcoding.extended_hours).unwrap_or(72)),
        large_file_threshold_bytes: config.transcoding.large_file_threshold_mb * 1024 * 1024,
        max_disk_usage_bytes: config.transcoding.max_disk_usage_gb * 1024 * 1024 * 1024,
    };
    let cleanup_service = Arc::new(CleanupService::new(
        transcode_repository,
        Arc::clone(&content_store),
        cleanup_policy,
    ));

    let scanner = Arc::new(ScannerJobCoordinator::new(
        scan_job_repository,
        Arc::new(NoopScanWorkers),
        Arc::new(AlwaysExistsCheck),
        config.scanner.auto_resume_min_files,
        config.scanner.auto_resume_min_percent,
    ));

    info!("running initial scanner reconciliation pass");
    scanner.reconcile().await?;

    let mut background_tasks = Vec::new();

    background_tasks.push(crate::session_manager::spawn_stale_reaper(
        Arc::clone(&session_manager),
        std::time::Duration::from_secs(config.session.cleanup_interval_seconds),
        chrono::Duration::seconds(i64::try_from(config.session.stale_session_timeout_seconds).unwrap_or(1800)),
    ));

    background_tasks.push(crate::service::cleanup::spawn_cleanup_loop(
        Arc::clone(&cleanup_service),
        std::time::Duration::from_secs(config.transcoding.cleanup_interval_seconds),
    ));

    background_tasks.push(crate::service::scanner::spawn_reconciliation_loop(
        Arc::clone(&scanner),
        std::time::Duration::from_secs(config.scanner.state_sync_interval_seconds),
    ));

    background_tasks.push(crate::repository::playback::spawn_abandon_loop(
        playback_repository.clone(),
        std::time::Duration::from_secs(config.session.cleanup_interval_seconds),
        chrono::Duration::seconds(i64::try_from(config.session.stale_session_timeout_seconds).unwrap_or(1800)),
    ));

    info!("services initialized");

    Ok(Services {
        transcode_service,
        session_manager,
        content_store,
        playback_repository,
        scanner,
        cleanup_service,
        media_info: Arc::new(NoopMediaInfoLookup),
        background_tasks,
    })
}
