// Playback decision, media info, and playback-session routes
// (`/api/v1/playback/decide`, `/compatibility`, `/media-info`, `/sessions/*`).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use reelforge_core::models::{
    ClientCapabilities, DeviceId, MediaFile, PlaybackDecision, PlaybackMethod, PlaybackSession,
    PlaybackSessionId, PlaybackState, UserId,
};
use reelforge_core::playback_decider;

use crate::http::{AppError, AppResult, AppState};

pub fn create_playback_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/playback/decide", post(decide))
        .route("/api/v1/playback/compatibility", post(compatibility))
        .route("/api/v1/playback/media-info", get(media_info))
        .route("/api/v1/playback/sessions", post(create_session).get(list_sessions))
        .route(
            "/api/v1/playback/sessions/{id}",
            get(get_session).put(update_session).delete(end_session),
        )
        .route("/api/v1/playback/sessions/{id}/heartbeat", post(heartbeat))
}

fn parse_method(method: &str) -> AppResult<PlaybackMethod> {
    match method {
        "direct" => Ok(PlaybackMethod::Direct),
        "remux" => Ok(PlaybackMethod::Remux),
        "transcode" => Ok(PlaybackMethod::Transcode),
        other => Err(AppError::validation_failed("method", &format!("unknown playback method '{other}'"))),
    }
}

fn parse_state(state: &str) -> AppResult<PlaybackState> {
    match state {
        "playing" => Ok(PlaybackState::Playing),
        "paused" => Ok(PlaybackState::Paused),
        "ended" => Ok(PlaybackState::Ended),
        "abandoned" => Ok(PlaybackState::Abandoned),
        other => Err(AppError::validation_failed("state", &format!("unknown playback state '{other}'"))),
    }
}

async fn resolve_media(state: &AppState, path: &str) -> AppResult<MediaFile> {
    state
        .media_info
        .lookup(path)
        .await?
        .ok_or_else(|| AppError::resource_not_found("media file"))
}

async fn resolve_media_by_id(state: &AppState, media_id: &reelforge_core::models::MediaId) -> AppResult<MediaFile> {
    let path = state
        .media_info
        .resolve_path(media_id)
        .await?
        .ok_or_else(|| AppError::resource_not_found("media file"))?;
    resolve_media(state, &path).await
}

#[derive(Debug, Deserialize)]
struct DecideRequest {
    media_path: String,
    #[serde(default)]
    device_profile: ClientCapabilities,
}

async fn decide(State(state): State<AppState>, Json(body): Json<DecideRequest>) -> AppResult<Json<PlaybackDecision>> {
    let media = resolve_media(&state, &body.media_path).await?;
    Ok(Json(playback_decider::decide(&media, &body.device_profile)))
}

#[derive(Debug, Deserialize)]
struct CompatibilityRequest {
    media_file_ids: Vec<reelforge_core::models::MediaId>,
    #[serde(default)]
    device_profile: ClientCapabilities,
}

#[derive(Debug, Serialize)]
struct CompatibilityEntry {
    media_file_id: String,
    method: PlaybackMethod,
    reason: String,
    can_direct_play: bool,
}

async fn compatibility(
    State(state): State<AppState>,
    Json(body): Json<CompatibilityRequest>,
) -> AppResult<Json<Vec<CompatibilityEntry>>> {
    let mut entries = Vec::with_capacity(body.media_file_ids.len());
    for media_id in &body.media_file_ids {
        let entry = match resolve_media_by_id(&state, media_id).await {
            Ok(media) => {
                let decision = playback_decider::decide(&media, &body.device_profile);
                CompatibilityEntry {
                    media_file_id: media_id.to_string(),
                    method: decision.method,
                    reason: decision.reason,
                    can_direct_play: decision.method == PlaybackMethod::Direct,
                }
            }
            Err(_) => CompatibilityEntry {
                media_file_id: media_id.to_string(),
                method: PlaybackMethod::Transcode,
                reason: "media file not found".to_string(),
                can_direct_play: false,
            },
        };
        entries.push(entry);
    }
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct MediaInfoQuery {
    path: String,
}

async fn media_info(State(state): State<AppState>, Query(query): Query<MediaInfoQuery>) -> AppResult<Json<MediaFile>> {
    Ok(Json(resolve_media(&state, &query.path).await?))
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    media_file_id: reelforge_core::models::MediaId,
    user_id: UserId,
    device_id: DeviceId,
    method: String,
    #[serde(default)]
    analytics: Option<JsonValue>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> AppResult<(StatusCode, Json<PlaybackSession>)> {
    let method = parse_method(&body.method)?;
    let mut session = PlaybackSession::new(body.media_file_id, body.user_id, body.device_id, method);
    if let Some(analytics) = body.analytics {
        session.debug_info.insert("analytics".to_string(), analytics);
    }
    let created = state.playback_repository.create(&session).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_sessions(State(state): State<AppState>) -> AppResult<Json<Vec<PlaybackSession>>> {
    Ok(Json(state.playback_repository.list_active().await?))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<PlaybackSessionId>,
) -> AppResult<Json<PlaybackSession>> {
    let session = state
        .playback_repository
        .get(&id)
        .await?
        .ok_or_else(|| AppError::resource_not_found("playback session"))?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
struct UpdateSessionRequest {
    position: u64,
    state: String,
    #[serde(default)]
    quality_played: Option<String>,
    #[serde(default)]
    bandwidth: Option<u64>,
    #[serde(default)]
    debug_info: Option<JsonValue>,
}

async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<PlaybackSessionId>,
    Json(body): Json<UpdateSessionRequest>,
) -> AppResult<StatusCode> {
    let playback_state = parse_state(&body.state)?;
    state
        .playback_repository
        .update_details(
            &id,
            body.position,
            playback_state,
            body.quality_played.as_deref(),
            body.bandwidth,
            body.debug_info.as_ref(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn end_session(State(state): State<AppState>, Path(id): Path<PlaybackSessionId>) -> AppResult<StatusCode> {
    state.playback_repository.end(&id, PlaybackState::Ended).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    position: u64,
    state: String,
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<PlaybackSessionId>,
    Json(body): Json<HeartbeatRequest>,
) -> AppResult<StatusCode> {
    let playback_state = parse_state(&body.state)?;
    state.playback_repository.update_progress(&id, body.position, playback_state).await?;
    Ok(StatusCode::NO_CONTENT)
}
