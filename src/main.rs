//! Quillhub - A social blogging service

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quillhub::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db,
    services::{mailer_from_config, Services},
};

/// How often expired sessions and codes are purged
const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quillhub=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Quillhub...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    db::ping(&pool).await?;
    tracing::info!("Database connected: {}", config.database.url);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    // Initialize cache
    let cache = create_cache(&config.cache);
    tracing::info!("Cache initialized");

    tokio::fs::create_dir_all(&config.upload.path).await?;

    let mailer = mailer_from_config(&config.email)?;
    let services = Services::build(&pool, cache, &config, mailer)?;
    if !config.security.two_factor_enabled {
        tracing::warn!("Two-factor login is disabled");
    }

    // Purge expired sessions and verification codes
    {
        let services = services.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match services.users.cleanup_expired_sessions().await {
                    Ok(n) if n > 0 => tracing::info!("Removed {} expired sessions", n),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
                match services.two_factor.cleanup_expired().await {
                    Ok(n) if n > 0 => tracing::info!("Removed {} expired verification codes", n),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Code cleanup failed: {}", e),
                }
            }
        });
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = api::build_router(AppState::new(services, config))?;

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
