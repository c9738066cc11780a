// HTTP API server binary for marketdash
// Serves the ingestion and browsing endpoints the dashboard frontend consumes

use anyhow::Result;
use marketdash::api::ApiServer;
use marketdash::db::Db;
use marketdash::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    tracing::info!("Initializing marketdash API server");

    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();

    // Load configuration from environment
    let server = ApiServer::from_env()?;

    // Initialize database connection
    let database_url = env_util::db_url()?;
    let max_connections: u32 = env_util::env_parse("DB_MAX_CONNS", 10u32);
    let db = Db::connect(&database_url, max_connections).await?;

    tracing::info!("Database connected successfully");

    // Start HTTP server
    server.run(db).await?;

    Ok(())
}
