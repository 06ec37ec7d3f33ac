mod migrations;
mod server;

use anyhow::Result;

use reelforge_core::bootstrap::{init_database, init_services, load_config};
use reelforge_core::logging;

use server::ReelforgeServer;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;

    // Keep the guard alive for the whole process: dropping it tears down the
    // non-blocking file-writer thread and silently stops log delivery.
    let _logging_guard = logging::init_logging(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting reelforge"
    );

    let pool = init_database(&config).await?;
    migrations::run_migrations(&pool).await?;

    let services = init_services(pool.clone(), &config).await?;

    let server = ReelforgeServer::new(config, pool, services);
    server.run().await
}
