// Transcode session lifecycle routes (`/api/v1/playback/transcode*`).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};

use reelforge_core::models::{Container, MediaId, Resolution, TranscodeRequest, TranscodeSessionId};

use crate::http::{AppError, AppResult, AppState};

pub fn create_transcode_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/playback/transcode", post(start_transcode))
        .route("/api/v1/playback/transcode/{sessionId}", axum::routing::delete(stop_transcode))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodingOptions {
    #[serde(default)]
    video_codec: Option<String>,
    #[serde(default)]
    audio_codec: Option<String>,
    #[serde(default)]
    quality: Option<i32>,
    #[serde(default)]
    speed_priority: Option<String>,
    #[serde(default)]
    resolution: Option<Resolution>,
    #[serde(default)]
    video_bitrate_kbps: Option<u64>,
    #[serde(default)]
    audio_bitrate_kbps: Option<u64>,
    #[serde(default)]
    enable_abr: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartTranscodeRequest {
    media_id: MediaId,
    container: Container,
    input_path: String,
    #[serde(default)]
    encoding_options: EncodingOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartTranscodeResponse {
    session_id: String,
    status: String,
    content_hash: String,
    content_url: String,
}

async fn start_transcode(
    State(state): State<AppState>,
    Json(body): Json<StartTranscodeRequest>,
) -> AppResult<(StatusCode, Json<StartTranscodeResponse>)> {
    let options = body.encoding_options;
    let request = TranscodeRequest {
        media_id: body.media_id,
        input_path: body.input_path,
        container: body.container,
        video_codec: options.video_codec.unwrap_or_else(|| "h264".to_string()),
        audio_codec: options.audio_codec.unwrap_or_else(|| "aac".to_string()),
        quality: options.quality.unwrap_or_else(TranscodeRequest::default_quality),
        speed_priority: options.speed_priority.unwrap_or_else(|| "balanced".to_string()),
        resolution: options.resolution,
        video_bitrate_kbps: options.video_bitrate_kbps,
        audio_bitrate_kbps: options.audio_bitrate_kbps,
        enable_abr: options.enable_abr,
        session_id: String::new(),
    };

    let session = state.transcode_service.start_transcode(request).await?;
    let content_hash = session.content_hash.to_string();
    let content_url = format!("/api/v1/playback/content/{content_hash}");

    Ok((
        StatusCode::CREATED,
        Json(StartTranscodeResponse {
            session_id: session.id.to_string(),
            status: session.status.as_str().to_string(),
            content_hash,
            content_url,
        }),
    ))
}

async fn stop_transcode(
    State(state): State<AppState>,
    Path(session_id): Path<TranscodeSessionId>,
) -> AppResult<StatusCode> {
    state.transcode_service.stop_transcode(session_id).await.map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
