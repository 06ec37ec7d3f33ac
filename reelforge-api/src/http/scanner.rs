// Scanner Job Coordinator routes (`/api/scanner/*`).

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};

use reelforge_core::models::{LibraryId, ScanJob};

use crate::http::{AppError, AppResult, AppState};

pub fn create_scanner_router() -> Router<AppState> {
    Router::new()
        .route("/api/scanner/pause/{library_id}", post(pause))
        .route("/api/scanner/resume/{library_id}", post(resume))
        .route("/api/scanner/status/{library_id}", get(status))
}

async fn pause(State(state): State<AppState>, Path(library_id): Path<LibraryId>) -> AppResult<Json<ScanJob>> {
    Ok(Json(state.scanner.pause(library_id).await?))
}

async fn resume(State(state): State<AppState>, Path(library_id): Path<LibraryId>) -> AppResult<Json<ScanJob>> {
    Ok(Json(state.scanner.resume(library_id).await?))
}

async fn status(State(state): State<AppState>, Path(library_id): Path<LibraryId>) -> AppResult<Json<ScanJob>> {
    state
        .scanner
        .status(&library_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::resource_not_found("scan job"))
}
