//! Applies the embedded PostgreSQL schema migrations and exits.

use secrecy::Secret;
use service_core::error::AppError;
use service_core::observability::{init_tracing, LogFormat};
use sso_service::{config::DatabaseConfig, db};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing("sso-migrate", "info", LogFormat::Text, None)?;

    let url = std::env::var("DATABASE_URL").map_err(|_| {
        AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required but not set"))
    })?;

    let pool = db::create_pool(&DatabaseConfig {
        url: Secret::new(url),
        max_connections: 1,
        min_connections: 1,
    })
    .await?;

    let pending = db::pending_migrations(&pool).await?;
    if pending == 0 {
        tracing::info!("no migrations to apply");
        return Ok(());
    }

    db::run_migrations(&pool).await?;
    tracing::info!(applied = pending, "migrations applied successfully");

    Ok(())
}
