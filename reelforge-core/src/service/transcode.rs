//! Transcode Service (C5): orchestrates a transcode end to end across the
//! process supervisor (C1), content store (C2), session store (C3),
//! provider registry (C4), and the in-memory session manager (C6).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::cache::SingleFlight;
use crate::content_store::{manifest_file_name, ContentMetadata, ContentStore};
use crate::error::{Error, Result};
use crate::models::{
    ContentHash, TranscodeRequest, TranscodeResult, TranscodeSession, TranscodeStatus,
};
use crate::provider::{ProviderRegistry, TranscodeHandle};
use crate::repository::TranscodeSessionRepository;
use crate::session_manager::SessionManager;

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct TranscodeService {
    repository: TranscodeSessionRepository,
    content_store: Arc<ContentStore>,
    providers: Arc<ProviderRegistry>,
    sessions: Arc<SessionManager>,
    dedup: SingleFlight<String, TranscodeSession, String>,
}

impl TranscodeService {
    #[must_use]
    pub fn new(
        repository: TranscodeSessionRepository,
        content_store: Arc<ContentStore>,
        providers: Arc<ProviderRegistry>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            repository,
            content_store,
            providers,
            sessions,
            dedup: SingleFlight::new(),
        }
    }

    /// Starts (or reuses) a transcode for `request`. Concurrent calls for
    /// the same content hash coalesce onto one in-flight orchestration via
    /// the dedup single-flight group, and a non-failed prior session with a
    /// directory still present short-circuits a fresh launch entirely.
    pub async fn start_transcode(&self, mut request: TranscodeRequest) -> Result<TranscodeSession> {
        if self.sessions.is_at_capacity() {
            return Err(Error::Capacity("max concurrent transcode sessions reached".to_string()));
        }

        let hash = request.content_hash();
        let key = hash.as_str().to_string();

        let session = self
            .dedup
            .do_work(key, async {
                self.create_or_reuse(&mut request, &hash).await.map_err(|err| err.to_string())
            })
            .await
            .map_err(|err| match err {
                crate::cache::SingleFlightError::Inner(msg) => Error::Internal(msg),
                crate::cache::SingleFlightError::WorkerFailed => {
                    Error::Internal("transcode dedup worker failed".to_string())
                }
            })?;

        Ok(session)
    }

    async fn create_or_reuse(&self, request: &mut TranscodeRequest, hash: &ContentHash) -> Result<TranscodeSession> {
        if let Some(existing) = self.repository.find_reusable_by_hash(hash).await? {
            if self.content_store.exists(hash).await {
                debug!(content_hash = %hash, session_id = %existing.id, "reusing transcode session");
                return Ok(existing);
            }
        }

        let provider = self.providers.select(request.container)?;
        let provider_info = provider.info();

        let mut session = TranscodeSession::new(
            provider_info.id.clone(),
            hash.clone(),
            String::new(),
            &*request,
        );
        request.session_id = session.id.to_string();

        let metadata = ContentMetadata {
            hash: hash.as_str().to_string(),
            media_id: request.media_id.as_str().to_string(),
            format: request.container.as_str().to_string(),
            segment_duration_secs: 6.0,
            status: TranscodeStatus::Queued.as_str().to_string(),
            segment_count: 0,
            quality_levels: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let directory_path = self.content_store.allocate(hash, metadata).await?;
        session.directory_path = directory_path.to_string_lossy().into_owned();

        let session = self.repository.create(&session).await?;
        self.sessions.track(session.clone());

        info!(session_id = %session.id, content_hash = %hash, provider = %provider_info.id, "starting transcode");

        self.spawn_monitor(session.clone(), request.clone(), directory_path.to_string_lossy().into_owned());

        Ok(session)
    }

    fn spawn_monitor(&self, session: TranscodeSession, request: TranscodeRequest, content_dir: String) {
        let providers = Arc::clone(&self.providers);
        let sessions = Arc::clone(&self.sessions);
        let session_id = session.id;

        tokio::spawn(async move {
            let provider = match providers.select(request.container) {
                Ok(p) => p,
                Err(err) => {
                    error!(session_id = %session_id, %err, "provider unavailable for monitor task");
                    let _ = sessions
                        .finish(
                            session_id,
                            TranscodeStatus::Failed,
                            Some(&TranscodeResult { manifest_url: None, bytes_written: 0, error_message: Some(err.to_string()) }),
                        )
                        .await;
                    return;
                }
            };

            let handle = match provider.start_transcode(&request, &content_dir).await {
                Ok(handle) => handle,
                Err(err) => {
                    error!(session_id = %session_id, %err, "failed to launch encoder");
                    let _ = sessions
                        .finish(
                            session_id,
                            TranscodeStatus::Failed,
                            Some(&TranscodeResult { manifest_url: None, bytes_written: 0, error_message: Some(err.to_string()) }),
                        )
                        .await;
                    return;
                }
            };

            Self::poll_until_done(&*provider, &handle, &sessions, session_id, &content_dir, request.container.as_str()).await;
        });
    }

    async fn poll_until_done(
        provider: &dyn crate::provider::EncoderProvider,
        handle: &TranscodeHandle,
        sessions: &Arc<SessionManager>,
        session_id: crate::models::TranscodeSessionId,
        content_dir: &str,
        container: &str,
    ) {
        let mut ticker = tokio::time::interval(PROGRESS_POLL_INTERVAL);
        loop {
            ticker.tick().await;

            let progress = match provider.get_progress(handle).await {
                Ok(progress) => progress,
                Err(err) => {
                    warn!(session_id = %session_id, %err, "progress poll failed");
                    let _ = provider.stop_transcode(handle).await;
                    let _ = sessions
                        .finish(
                            session_id,
                            TranscodeStatus::Failed,
                            Some(&TranscodeResult { manifest_url: None, bytes_written: 0, error_message: Some(err.to_string()) }),
                        )
                        .await;
                    return;
                }
            };

            let progress_value = serde_json::to_value(progress).unwrap_or(serde_json::Value::Null);
            if let Err(err) = sessions.apply_progress(session_id, progress.percent_complete, progress_value).await {
                warn!(session_id = %session_id, %err, "failed to persist progress tick");
            }

            if progress.percent_complete >= 100.0 {
                let manifest_url = Some(format!("{content_dir}/manifests/{}", manifest_file_name(container)));
                let result = TranscodeResult {
                    manifest_url,
                    bytes_written: progress.bytes_written,
                    error_message: None,
                };
                if let Err(err) = sessions.finish(session_id, TranscodeStatus::Completed, Some(&result)).await {
                    warn!(session_id = %session_id, %err, "failed to finalize completed session");
                }
                return;
            }
        }
    }

    /// Stops an in-flight transcode: tells the provider to kill the process
    /// group, then marks the session cancelled.
    pub async fn stop_transcode(&self, session_id: crate::models::TranscodeSessionId) -> Result<()> {
        let Some(session) = self.sessions.get(session_id).await? else {
            return Err(Error::NotFound(format!("transcode session {session_id} not found")));
        };
        if session.status.is_terminal() {
            return Ok(());
        }

        let provider = self.providers.get(&session.provider).ok_or_else(|| {
            Error::Internal(format!("provider {} no longer registered", session.provider))
        })?;
        let handle = TranscodeHandle { session_id: session_id.to_string(), pid: None };
        provider.stop_transcode(&handle).await?;

        self.sessions.finish(session_id, TranscodeStatus::Cancelled, None).await
    }
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    #[ignore = "requires database and ffmpeg"]
    async fn duplicate_requests_coalesce_onto_one_session() {}
}
