//! Durable transcode-session half of the Session Store (C3).

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::error::{map_sqlx_error, Error, Result};
use crate::models::{ContentHash, TranscodeResult, TranscodeSession, TranscodeSessionId, TranscodeStatus};

#[derive(Clone)]
pub struct TranscodeSessionRepository {
    pool: PgPool,
}

impl TranscodeSessionRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &TranscodeSession) -> Result<TranscodeSession> {
        let row = sqlx::query(
            "INSERT INTO transcode_sessions
                (id, provider, status, content_hash, directory_path, request, progress, result, start_time, end_time, last_accessed)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING id, provider, status, content_hash, directory_path, request, progress, result, start_time, end_time, last_accessed",
        )
        .bind(session.id)
        .bind(&session.provider)
        .bind(session.status.as_str())
        .bind(&session.content_hash)
        .bind(&session.directory_path)
        .bind(&session.request)
        .bind(&session.progress)
        .bind(&session.result)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.last_accessed)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row_to_session(row)
    }

    pub async fn get(&self, id: TranscodeSessionId) -> Result<Option<TranscodeSession>> {
        let row = sqlx::query(
            "SELECT id, provider, status, content_hash, directory_path, request, progress, result, start_time, end_time, last_accessed
             FROM transcode_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_session).transpose()
    }

    /// A non-failed session with this hash and a directory still present is
    /// the one the Transcode Service reuses instead of launching anew.
    pub async fn find_reusable_by_hash(&self, hash: &ContentHash) -> Result<Option<TranscodeSession>> {
        let row = sqlx::query(
            "SELECT id, provider, status, content_hash, directory_path, request, progress, result, start_time, end_time, last_accessed
             FROM transcode_sessions
             WHERE content_hash = $1 AND status != 'failed'
             ORDER BY start_time DESC
             LIMIT 1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_session).transpose()
    }

    pub async fn list_active(&self) -> Result<Vec<TranscodeSession>> {
        let rows = sqlx::query(
            "SELECT id, provider, status, content_hash, directory_path, request, progress, result, start_time, end_time, last_accessed
             FROM transcode_sessions WHERE status IN ('queued', 'running')",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_session).collect()
    }

    /// Only `progress`, `status`, and `last_accessed` move on a tick; the
    /// content hash and directory are fixed at creation (§3 invariant).
    pub async fn update_progress(
        &self,
        id: TranscodeSessionId,
        status: TranscodeStatus,
        progress: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE transcode_sessions SET status = $2, progress = $3, last_accessed = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(progress)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks a session terminal. `result` is `None` for `cancelled` — §3
    /// only requires a result for `completed`/`failed`.
    pub async fn complete(
        &self,
        id: TranscodeSessionId,
        status: TranscodeStatus,
        result: Option<&TranscodeResult>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::Internal(format!("{} is not a terminal status", status.as_str())));
        }
        let now = Utc::now();
        let result_json = result.map(serde_json::to_value).transpose()?;
        sqlx::query(
            "UPDATE transcode_sessions SET status = $2, result = $3, end_time = $4, last_accessed = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(result_json)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks `running` sessions whose `last_accessed` predates `max_age` as
    /// `failed` with a "timed out" result; returns the affected ids.
    pub async fn cleanup_stale_running(&self, max_age: chrono::Duration) -> Result<Vec<TranscodeSessionId>> {
        let cutoff = Utc::now() - max_age;
        let rows = sqlx::query(
            "UPDATE transcode_sessions
             SET status = 'failed', end_time = $2, result = $3
             WHERE status = 'running' AND last_accessed < $1
             RETURNING id",
        )
        .bind(cutoff)
        .bind(Utc::now())
        .bind(serde_json::json!({ "manifest_url": null, "bytes_written": 0, "error_message": "timed out" }))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.try_get::<TranscodeSessionId, _>("id").map_err(Error::from))
            .collect()
    }

    /// Deletes terminal sessions with `last_accessed` older than `retention`;
    /// callers remove the content directory themselves before or after this
    /// call (row deletion and directory deletion are independent failures).
    pub async fn cleanup_expired(&self, retention: chrono::Duration) -> Result<Vec<TranscodeSession>> {
        let cutoff = Utc::now() - retention;
        let rows = sqlx::query(
            "DELETE FROM transcode_sessions
             WHERE status IN ('completed', 'failed', 'cancelled') AND last_accessed < $1
             RETURNING id, provider, status, content_hash, directory_path, request, progress, result, start_time, end_time, last_accessed",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_session).collect()
    }

    /// Read-only counterpart to `cleanup_expired`: terminal sessions older
    /// than `retention`, without deleting anything. Lets the Cleanup
    /// Service decide per-row whether a large artifact earns the extended
    /// retention window before committing to the delete.
    pub async fn list_terminal_older_than(&self, retention: chrono::Duration) -> Result<Vec<TranscodeSession>> {
        let cutoff = Utc::now() - retention;
        let rows = sqlx::query(
            "SELECT id, provider, status, content_hash, directory_path, request, progress, result, start_time, end_time, last_accessed
             FROM transcode_sessions
             WHERE status IN ('completed', 'failed', 'cancelled') AND last_accessed < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_session).collect()
    }

    pub async fn delete(&self, id: TranscodeSessionId) -> Result<()> {
        sqlx::query("DELETE FROM transcode_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn touch(&self, id: TranscodeSessionId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE transcode_sessions SET last_accessed = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_session(row: PgRow) -> Result<TranscodeSession> {
    let status: String = row.try_get("status")?;
    Ok(TranscodeSession {
        id: row.try_get("id")?,
        provider: row.try_get("provider")?,
        status: TranscodeStatus::from_str(&status)
            .ok_or_else(|| Error::Internal(format!("unknown transcode status {status}")))?,
        content_hash: row.try_get("content_hash")?,
        directory_path: row.try_get("directory_path")?,
        request: row.try_get("request")?,
        progress: row.try_get("progress")?,
        result: row.try_get("result")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        last_accessed: row.try_get("last_accessed")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaId, Resolution, TranscodeRequest};
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new().connect_lazy("postgres://localhost/test").unwrap()
    }

    fn sample_request() -> TranscodeRequest {
        TranscodeRequest {
            media_id: MediaId::from_string("M".to_string()),
            input_path: "/media/movie.mkv".to_string(),
            container: crate::models::Container::Dash,
            video_codec: "h264".to_string(),
            audio_codec: "aac".to_string(),
            quality: 23,
            speed_priority: "balanced".to_string(),
            resolution: Some(Resolution { width: 1280, height: 720 }),
            video_bitrate_kbps: None,
            audio_bitrate_kbps: None,
            enable_abr: false,
            session_id: String::new(),
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn create_and_get_round_trips() {
        let repo = TranscodeSessionRepository::new(lazy_pool());
        let request = sample_request();
        let session = TranscodeSession::new(
            "software".to_string(),
            request.content_hash(),
            "/data/dash_software_abc".to_string(),
            &request,
        );

        let created = repo.create(&session).await.unwrap();
        let fetched = repo.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.status, TranscodeStatus::Queued);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn reusable_lookup_excludes_failed_sessions() {
        let repo = TranscodeSessionRepository::new(lazy_pool());
        let request = sample_request();
        let hash = request.content_hash();
        let mut session = TranscodeSession::new(
            "software".to_string(),
            hash.clone(),
            "/data/dash_software_def".to_string(),
            &request,
        );
        session = repo.create(&session).await.unwrap();

        repo.complete(
            session.id,
            TranscodeStatus::Failed,
            Some(&TranscodeResult { manifest_url: None, bytes_written: 0, error_message: Some("boom".to_string()) }),
        )
        .await
        .unwrap();

        assert!(repo.find_reusable_by_hash(&hash).await.unwrap().is_none());
    }
}
