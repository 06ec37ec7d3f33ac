//! Liveness, readiness, and metrics endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::http::AppState;

/// Health and metrics router.
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(liveness_check))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(prometheus_metrics))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthDetails {
    pub database: String,
    pub content_store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Liveness probe: always OK once the process is accepting connections.
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse { status: "ok".to_string(), details: None }),
    )
}

/// Readiness probe: database reachable and the content store root writable.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut is_healthy = true;
    let mut error_messages = Vec::new();

    let db_status = match check_database_health(&state).await {
        Ok(()) => "healthy".to_string(),
        Err(e) => {
            error_messages.push(format!("database: {e}"));
            is_healthy = false;
            "unhealthy".to_string()
        }
    };

    let store_status = match check_content_store_health(&state).await {
        Ok(()) => "healthy".to_string(),
        Err(e) => {
            error_messages.push(format!("content store: {e}"));
            is_healthy = false;
            "unhealthy".to_string()
        }
    };

    let status_code = if is_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let response = HealthResponse {
        status: if is_healthy { "healthy".to_string() } else { "unhealthy".to_string() },
        details: Some(HealthDetails {
            database: db_status,
            content_store: store_status,
            message: if error_messages.is_empty() { None } else { Some(error_messages.join("; ")) },
        }),
    };

    (status_code, Json(response))
}

async fn check_database_health(state: &AppState) -> Result<(), String> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!("database readiness check failed: {}", e);
            e.to_string()
        })
}

async fn check_content_store_health(state: &AppState) -> Result<(), String> {
    let probe = state.content_store_root.join(".readyz-probe");
    tokio::fs::write(&probe, b"ok").await.map_err(|e| {
        warn!("content store readiness check failed: {}", e);
        e.to_string()
    })?;
    let _ = tokio::fs::remove_file(&probe).await;
    Ok(())
}

/// Prometheus exposition endpoint.
pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        reelforge_core::metrics::gather_metrics(),
    )
}
