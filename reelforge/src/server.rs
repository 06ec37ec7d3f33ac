//! Server lifecycle management: binds the HTTP listener, serves the axum
//! router built from `reelforge_api`, and waits for a shutdown signal
//! before aborting background tasks.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info};

use reelforge_api::http::{create_router_from_config, RouterConfig};
use reelforge_core::bootstrap::services::Services;
use reelforge_core::Config;

/// Owns the listening socket and the long-lived service handles for the
/// life of the process.
pub struct ReelforgeServer {
    config: Config,
    pool: PgPool,
    services: Services,
}

impl ReelforgeServer {
    #[must_use]
    pub const fn new(config: Config, pool: PgPool, services: Services) -> Self {
        Self { config, pool, services }
    }

    /// Binds the configured address, serves HTTP until a shutdown signal
    /// arrives, then aborts every background task.
    pub async fn run(self) -> Result<()> {
        let content_store_root = std::path::PathBuf::from(&self.config.transcoding.data_dir);

        let router_config = RouterConfig {
            config: std::sync::Arc::new(self.config.clone()),
            pool: self.pool,
            content_store_root,
            transcode_service: self.services.transcode_service,
            session_manager: self.services.session_manager,
            content_store: self.services.content_store,
            playback_repository: self.services.playback_repository,
            scanner: self.services.scanner,
            cleanup_service: self.services.cleanup_service,
            media_info: self.services.media_info,
        };
        let router = create_router_from_config(router_config);

        let address: SocketAddr = self
            .config
            .http_address()
            .parse()
            .with_context(|| format!("invalid http_address {}", self.config.http_address()))?;

        let listener = tokio::net::TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind {address}"))?;
        info!(%address, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        info!("HTTP server shut down gracefully");
        abort_background_tasks(self.services.background_tasks);

        Ok(())
    }
}

fn abort_background_tasks(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        task.abort();
    }
}

/// Waits for SIGTERM or Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C signal"),
            Err(err) => error!("failed to install Ctrl+C handler: {err}"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("received SIGTERM signal");
            }
            Err(err) => error!("failed to install SIGTERM handler: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
