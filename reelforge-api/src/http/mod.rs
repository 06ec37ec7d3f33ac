// Module: http
// HTTP/JSON REST API for the playback, transcoding, and scanner surface.

pub mod error;
pub mod health;
pub mod middleware;
pub mod playback;
pub mod scanner;
pub mod stream;
pub mod transcode;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

use reelforge_core::content_store::ContentStore;
use reelforge_core::media_info::MediaInfoLookup;
use reelforge_core::service::{CleanupService, ScannerJobCoordinator, TranscodeService};
use reelforge_core::session_manager::SessionManager;
use reelforge_core::repository::PlaybackSessionRepository;
use reelforge_core::Config;

/// Configuration for creating the HTTP router: the long-lived service
/// handles `bootstrap::init_services` produced, plus the raw pool and
/// content-store root the health checks probe directly.
#[derive(Clone)]
pub struct RouterConfig {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub content_store_root: PathBuf,
    pub transcode_service: Arc<TranscodeService>,
    pub session_manager: Arc<SessionManager>,
    pub content_store: Arc<ContentStore>,
    pub playback_repository: PlaybackSessionRepository,
    pub scanner: Arc<ScannerJobCoordinator>,
    pub cleanup_service: Arc<CleanupService>,
    pub media_info: Arc<dyn MediaInfoLookup>,
}

/// Shared application state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub content_store_root: PathBuf,
    pub transcode_service: Arc<TranscodeService>,
    pub session_manager: Arc<SessionManager>,
    pub content_store: Arc<ContentStore>,
    pub playback_repository: PlaybackSessionRepository,
    pub scanner: Arc<ScannerJobCoordinator>,
    pub cleanup_service: Arc<CleanupService>,
    pub media_info: Arc<dyn MediaInfoLookup>,
}

/// Create the HTTP router from a fully-wired configuration struct.
pub fn create_router_from_config(config: RouterConfig) -> axum::Router {
    let state = build_app_state(config);
    let router = register_all_routes(state.clone());
    apply_global_layers(router, &state)
}

fn build_app_state(config: RouterConfig) -> AppState {
    AppState {
        config: config.config,
        pool: config.pool,
        content_store_root: config.content_store_root,
        transcode_service: config.transcode_service,
        session_manager: config.session_manager,
        content_store: config.content_store,
        playback_repository: config.playback_repository,
        scanner: config.scanner,
        cleanup_service: config.cleanup_service,
        media_info: config.media_info,
    }
}

fn register_all_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(health::create_health_router())
        .merge(playback::create_playback_router())
        .merge(transcode::create_transcode_router())
        .merge(stream::create_stream_router())
        .merge(scanner::create_scanner_router())
        .with_state(state)
}

/// Build the CORS layer based on configuration: wide open in development,
/// an explicit allow-list otherwise, closed entirely when none is set.
fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.server.development_mode {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else if config.server.cors_allowed_origins.is_empty() {
        tracing::warn!(
            "CORS: no allowed origins configured; all cross-origin requests will be denied. \
             Set server.cors_allowed_origins to allow specific origins."
        );
        CorsLayer::new()
    } else {
        let origins: Vec<HeaderValue> = config
            .server
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::HEAD])
            .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT])
    }
}

/// Apply global middleware layers (CORS, body limit, timeout, tracing) and
/// bind state.
fn apply_global_layers(router: Router<AppState>, state: &AppState) -> axum::Router {
    let cors = build_cors_layer(&state.config);

    router
        .layer(cors)
        .layer(axum::extract::DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            std::time::Duration::from_secs(30),
        ))
        .layer(axum_middleware::from_fn(middleware::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone())
}
