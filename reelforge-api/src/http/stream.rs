// Streaming Server (C8): byte-range file serving for session-based,
// direct-by-id, legacy direct-path, and content-addressed artifact
// streaming.

use std::path::{Path as FsPath, PathBuf};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use reelforge_core::content_store::manifest_file_name;
use reelforge_core::http_range::{content_type_for, parse_range};
use reelforge_core::models::{ContentHash, MediaId, PlaybackMethod, PlaybackSessionId};

use crate::http::{AppError, AppResult, AppState};

pub fn create_stream_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/playback/stream/direct", get(stream_direct_path))
        .route("/api/v1/playback/stream/file/{fileId}", get(stream_by_file_id))
        .route("/api/v1/playback/stream/{sessionId}", get(stream_by_session))
        .route("/api/v1/playback/content/{hash}/{*path}", get(stream_content_artifact))
}

fn io_err(err: std::io::Error) -> AppError {
    AppError::from(reelforge_core::Error::from(err))
}

fn range_header(headers: &HeaderMap) -> Option<String> {
    headers.get(header::RANGE).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn serve_file_response(disk_path: &FsPath, headers: &HeaderMap) -> AppResult<Response> {
    let metadata = tokio::fs::metadata(disk_path)
        .await
        .map_err(|_| AppError::resource_not_found("file"))?;
    let total_len = metadata.len();
    let content_type = content_type_for(disk_path);

    let Some(header_value) = range_header(headers) else {
        return serve_whole_file(disk_path, total_len, content_type).await;
    };

    match parse_range(&header_value, total_len) {
        Ok(Some(range)) => {
            let mut file = tokio::fs::File::open(disk_path).await.map_err(io_err)?;
            file.seek(std::io::SeekFrom::Start(range.start)).await.map_err(io_err)?;
            let limited = file.take(range.len());
            let body = Body::from_stream(ReaderStream::new(limited));

            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_RANGE, format!("bytes {}-{}/{total_len}", range.start, range.end)),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CONTENT_LENGTH, range.len().to_string()),
                ],
                body,
            )
                .into_response())
        }
        Ok(None) => serve_whole_file(disk_path, total_len, content_type).await,
        Err(_unsatisfiable) => Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{total_len}"))],
        )
            .into_response()),
    }
}

async fn serve_whole_file(disk_path: &FsPath, total_len: u64, content_type: &'static str) -> AppResult<Response> {
    let file = tokio::fs::File::open(disk_path).await.map_err(io_err)?;
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (header::CONTENT_LENGTH, total_len.to_string()),
        ],
        body,
    )
        .into_response())
}

async fn resolve_media_path(state: &AppState, media_id: &MediaId) -> AppResult<PathBuf> {
    let path = state
        .media_info
        .resolve_path(media_id)
        .await?
        .ok_or_else(|| AppError::resource_not_found("media file"))?;
    Ok(PathBuf::from(path))
}

async fn stream_by_session(
    State(state): State<AppState>,
    Path(session_id): Path<PlaybackSessionId>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let session = state
        .playback_repository
        .get(&session_id)
        .await?
        .ok_or_else(|| AppError::resource_not_found("playback session"))?;

    if session.state.is_terminal() {
        return Err(AppError::conflict("playback session has already ended"));
    }

    state
        .playback_repository
        .update_progress(&session_id, session.position_ns, session.state)
        .await?;

    match session.method {
        PlaybackMethod::Direct | PlaybackMethod::Remux => {
            let disk_path = resolve_media_path(&state, &session.media_file_id).await?;
            serve_file_response(&disk_path, &headers).await
        }
        PlaybackMethod::Transcode => {
            let transcode_id = session
                .transcode_id
                .ok_or_else(|| AppError::internal("transcode session missing from playback session"))?;
            let transcode_session = state
                .session_manager
                .get(transcode_id)
                .await?
                .ok_or_else(|| AppError::resource_not_found("transcode session"))?;
            let metadata = state.content_store.get_metadata(&transcode_session.content_hash).await?;
            let disk_path = PathBuf::from(&transcode_session.directory_path)
                .join("manifests")
                .join(manifest_file_name(&metadata.format));
            serve_file_response(&disk_path, &headers).await
        }
    }
}

async fn stream_by_file_id(
    State(state): State<AppState>,
    Path(file_id): Path<MediaId>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let disk_path = resolve_media_path(&state, &file_id).await?;
    serve_file_response(&disk_path, &headers).await
}

#[derive(Debug, serde::Deserialize)]
struct DirectPathQuery {
    path: String,
}

async fn stream_direct_path(
    Query(query): Query<DirectPathQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    serve_file_response(FsPath::new(&query.path), &headers).await
}

async fn stream_content_artifact(
    State(state): State<AppState>,
    Path((hash, sub_path)): Path<(String, String)>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let disk_path = state.content_store.path_for(&ContentHash(hash)).join(sub_path);
    serve_file_response(&disk_path, &headers).await
}
