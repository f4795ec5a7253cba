use service_core::error::AppError;
use service_core::observability::init_tracing;
use sso_service::{
    build_router,
    config::{SsoConfig, StorageConfig},
    db,
    services::{
        metrics, AccountStore, EmailProvider, LogEmailProvider, MongoAccountStore,
        PostgresAccountStore, ShutdownMode, SmtpEmailProvider, TracingEventSink,
    },
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = SsoConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.environment.log_format(),
        config.otlp_endpoint.as_deref(),
    )?;

    metrics::init_metrics().map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting sso service"
    );

    let store = connect_store(&config.storage).await?;
    tracing::info!("Account store initialized");

    let email: Arc<dyn EmailProvider> = if config.smtp.enabled {
        Arc::new(
            SmtpEmailProvider::new(&config.smtp)
                .map_err(|e| AppError::EmailError(e.to_string()))?,
        )
    } else {
        tracing::warn!("SMTP disabled, verification emails will only be logged");
        Arc::new(LogEmailProvider)
    };

    let shutdown_timeout = config.notification.shutdown_timeout();
    let addr: SocketAddr = config.common.bind_addr();

    let state = AppState::new(config, store, email, Arc::new(TracingEventSink))?;
    let notifications = state.notifications.clone();
    let app = build_router(state)?;

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = notifications
        .shutdown(ShutdownMode::Drain, shutdown_timeout)
        .await;
    if !report.discarded.is_empty() {
        tracing::warn!(
            discarded = report.discarded.len(),
            "Verification emails left undelivered at shutdown"
        );
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn connect_store(storage: &StorageConfig) -> Result<Arc<dyn AccountStore>, AppError> {
    match storage {
        StorageConfig::Postgres(pg) => {
            let pool = db::create_pool(pg).await?;
            db::run_migrations(&pool).await?;
            Ok(Arc::new(PostgresAccountStore::new(pool)))
        }
        StorageConfig::Mongo(mongo) => {
            let store = MongoAccountStore::connect(mongo).await?;
            store.initialize_indexes().await?;
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
