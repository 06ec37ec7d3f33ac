//! Durable playback-session half of the Session Store (C3).

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::warn;

use crate::error::{map_sqlx_error, Error, Result};
use crate::models::{
    DeviceId, MediaId, PlaybackMethod, PlaybackSession, PlaybackSessionId, PlaybackState, TranscodeSessionId, UserId,
};

#[derive(Clone)]
pub struct PlaybackSessionRepository {
    pool: PgPool,
}

impl PlaybackSessionRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &PlaybackSession) -> Result<PlaybackSession> {
        let row = sqlx::query(
            "INSERT INTO playback_sessions
                (id, media_file_id, user_id, device_id, method, transcode_id, state, position_ns, duration_ns,
                 start_time, last_activity, end_time, ip_address, device_name, device_type, quality_played,
                 bandwidth_kbps, debug_info)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             RETURNING id, media_file_id, user_id, device_id, method, transcode_id, state, position_ns, duration_ns,
                       start_time, last_activity, end_time, ip_address, device_name, device_type, quality_played,
                       bandwidth_kbps, debug_info",
        )
        .bind(&session.id)
        .bind(&session.media_file_id)
        .bind(&session.user_id)
        .bind(&session.device_id)
        .bind(session.method.as_str())
        .bind(session.transcode_id)
        .bind(playback_state_str(session.state))
        .bind(i64::try_from(session.position_ns).unwrap_or(i64::MAX))
        .bind(i64::try_from(session.duration_ns).unwrap_or(i64::MAX))
        .bind(session.start_time)
        .bind(session.last_activity)
        .bind(session.end_time)
        .bind(&session.ip_address)
        .bind(&session.device_name)
        .bind(&session.device_type)
        .bind(&session.quality_played)
        .bind(session.bandwidth_kbps.and_then(|b| i64::try_from(b).ok()))
        .bind(serde_json::to_value(&session.debug_info)?)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row_to_session(row)
    }

    pub async fn get(&self, id: &PlaybackSessionId) -> Result<Option<PlaybackSession>> {
        let row = sqlx::query(
            "SELECT id, media_file_id, user_id, device_id, method, transcode_id, state, position_ns, duration_ns,
                    start_time, last_activity, end_time, ip_address, device_name, device_type, quality_played,
                    bandwidth_kbps, debug_info
             FROM playback_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_session).transpose()
    }

    pub async fn list_active(&self) -> Result<Vec<PlaybackSession>> {
        let rows = sqlx::query(
            "SELECT id, media_file_id, user_id, device_id, method, transcode_id, state, position_ns, duration_ns,
                    start_time, last_activity, end_time, ip_address, device_name, device_type, quality_played,
                    bandwidth_kbps, debug_info
             FROM playback_sessions WHERE state IN ('playing', 'paused')",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_session).collect()
    }

    /// Heartbeat / progress update: only fields a client ping can move.
    pub async fn update_progress(
        &self,
        id: &PlaybackSessionId,
        position_ns: u64,
        state: PlaybackState,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE playback_sessions SET position_ns = $2, state = $3, last_activity = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(i64::try_from(position_ns).unwrap_or(i64::MAX))
        .bind(playback_state_str(state))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Client-reported playback details a session update can carry beyond a
    /// plain heartbeat: quality actually played, measured bandwidth, and
    /// free-form debug info for troubleshooting client behavior.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_details(
        &self,
        id: &PlaybackSessionId,
        position_ns: u64,
        state: PlaybackState,
        quality_played: Option<&str>,
        bandwidth_kbps: Option<u64>,
        debug_info: Option<&serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE playback_sessions
             SET position_ns = $2, state = $3, last_activity = $4,
                 quality_played = COALESCE($5, quality_played),
                 bandwidth_kbps = COALESCE($6, bandwidth_kbps),
                 debug_info = COALESCE($7, debug_info)
             WHERE id = $1",
        )
        .bind(id)
        .bind(i64::try_from(position_ns).unwrap_or(i64::MAX))
        .bind(playback_state_str(state))
        .bind(Utc::now())
        .bind(quality_played)
        .bind(bandwidth_kbps.and_then(|b| i64::try_from(b).ok()))
        .bind(debug_info)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn end(&self, id: &PlaybackSessionId, state: PlaybackState) -> Result<()> {
        if !state.is_terminal() {
            return Err(Error::Internal("end() requires a terminal playback state".to_string()));
        }
        let now = Utc::now();
        sqlx::query("UPDATE playback_sessions SET state = $2, end_time = $3 WHERE id = $1")
            .bind(id)
            .bind(playback_state_str(state))
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Transitions every non-terminal session whose `last_activity` predates
    /// `staleness_threshold` to `abandoned`; driven by [`spawn_abandon_loop`].
    pub async fn abandon_stale(&self, staleness_threshold: chrono::Duration) -> Result<Vec<PlaybackSessionId>> {
        let cutoff = Utc::now() - staleness_threshold;
        let rows = sqlx::query(
            "UPDATE playback_sessions
             SET state = 'abandoned', end_time = $2
             WHERE state IN ('playing', 'paused') AND last_activity < $1
             RETURNING id",
        )
        .bind(cutoff)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.try_get::<PlaybackSessionId, _>("id").map_err(Error::from))
            .collect()
    }
}

/// Spawns the playback-session abandon loop as a long-lived background
/// task: every `interval`, sessions idle past `staleness_threshold` are
/// transitioned to `abandoned` (§4.6 playback state machine).
pub fn spawn_abandon_loop(
    repository: PlaybackSessionRepository,
    interval: std::time::Duration,
    staleness_threshold: chrono::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match repository.abandon_stale(staleness_threshold).await {
                Ok(abandoned) if !abandoned.is_empty() => {
                    warn!(count = abandoned.len(), "abandoned stale playback sessions");
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "playback abandon pass failed"),
            }
        }
    })
}

fn playback_state_str(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
        PlaybackState::Ended => "ended",
        PlaybackState::Abandoned => "abandoned",
    }
}

fn parse_playback_state(s: &str) -> Result<PlaybackState> {
    match s {
        "playing" => Ok(PlaybackState::Playing),
        "paused" => Ok(PlaybackState::Paused),
        "ended" => Ok(PlaybackState::Ended),
        "abandoned" => Ok(PlaybackState::Abandoned),
        other => Err(Error::Internal(format!("unknown playback state {other}"))),
    }
}

fn parse_playback_method(s: &str) -> Result<PlaybackMethod> {
    match s {
        "direct" => Ok(PlaybackMethod::Direct),
        "remux" => Ok(PlaybackMethod::Remux),
        "transcode" => Ok(PlaybackMethod::Transcode),
        other => Err(Error::Internal(format!("unknown playback method {other}"))),
    }
}

fn row_to_session(row: PgRow) -> Result<PlaybackSession> {
    let state: String = row.try_get("state")?;
    let method: String = row.try_get("method")?;
    let position_ns: i64 = row.try_get("position_ns")?;
    let duration_ns: i64 = row.try_get("duration_ns")?;
    let bandwidth_kbps: Option<i64> = row.try_get("bandwidth_kbps")?;
    let debug_info: serde_json::Value = row.try_get("debug_info")?;

    Ok(PlaybackSession {
        id: row.try_get("id")?,
        media_file_id: row.try_get::<MediaId, _>("media_file_id")?,
        user_id: row.try_get::<UserId, _>("user_id")?,
        device_id: row.try_get::<DeviceId, _>("device_id")?,
        method: parse_playback_method(&method)?,
        transcode_id: row.try_get::<Option<TranscodeSessionId>, _>("transcode_id")?,
        state: parse_playback_state(&state)?,
        position_ns: u64::try_from(position_ns).unwrap_or(0),
        duration_ns: u64::try_from(duration_ns).unwrap_or(0),
        start_time: row.try_get::<DateTime<Utc>, _>("start_time")?,
        last_activity: row.try_get::<DateTime<Utc>, _>("last_activity")?,
        end_time: row.try_get("end_time")?,
        ip_address: row.try_get("ip_address")?,
        device_name: row.try_get("device_name")?,
        device_type: row.try_get("device_type")?,
        quality_played: row.try_get("quality_played")?,
        bandwidth_kbps: bandwidth_kbps.and_then(|b| u64::try_from(b).ok()),
        debug_info: serde_json::from_value(debug_info).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new().connect_lazy("postgres://localhost/test").unwrap()
    }

    fn sample_session() -> PlaybackSession {
        PlaybackSession::new(
            MediaId::from_string("M".to_string()),
            UserId::from_string("U".to_string()),
            DeviceId::from_string("D".to_string()),
            PlaybackMethod::Direct,
        )
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn create_and_get_round_trips() {
        let repo = PlaybackSessionRepository::new(lazy_pool());
        let created = repo.create(&sample_session()).await.unwrap();
        let fetched = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.state, PlaybackState::Playing);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn abandon_stale_only_touches_non_terminal_sessions() {
        let repo = PlaybackSessionRepository::new(lazy_pool());
        let stale = repo.create(&sample_session()).await.unwrap();
        let mut ended = sample_session();
        ended.state = PlaybackState::Ended;
        let ended = repo.create(&ended).await.unwrap();
        repo.end(&ended.id, PlaybackState::Ended).await.unwrap();

        let abandoned = repo.abandon_stale(chrono::Duration::seconds(-1)).await.unwrap();
        assert!(abandoned.contains(&stale.id));
        assert!(!abandoned.contains(&ended.id));
    }
}
