pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{request_id, request_id_middleware},
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::SsoConfig;
use crate::services::{
    AccountStore, EmailProvider, EventSink, NotificationQueue, RegistrationService,
    SessionTokenIssuer,
};
use crate::utils::Argon2Hasher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SsoConfig>,
    pub store: Arc<dyn AccountStore>,
    pub registration: Arc<RegistrationService>,
    pub notifications: Arc<NotificationQueue>,
}

impl AppState {
    /// Wire the registration pipeline around an already-connected store.
    /// Starts the notification workers, so it must run inside a Tokio runtime.
    pub fn new(
        config: SsoConfig,
        store: Arc<dyn AccountStore>,
        email: Arc<dyn EmailProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, AppError> {
        let hasher = Argon2Hasher::new(&config.password_hash).map_err(AppError::ConfigError)?;
        let issuer = SessionTokenIssuer::new(&config.jwt)
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
        let notifications = Arc::new(NotificationQueue::start(
            &config.notification,
            email,
            sink.clone(),
        ));

        let registration = RegistrationService::new(
            store.clone(),
            Arc::new(hasher),
            Arc::new(issuer),
            notifications.clone(),
            config.activation.clone(),
            sink,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            registration: Arc::new(registration),
            notifications,
        })
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let cors = cors_layer(&state.config.http.allowed_origins)?;
    let request_timeout = state.config.http.request_timeout();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/register", post(handlers::register))
        .route_layer(from_fn(middleware::metrics_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request_id(request.headers()).unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, AppError> {
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins = allowed_origins
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>().map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!("Invalid CORS origin '{}': {}", o, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]))
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        AppError::ServiceUnavailable
    })?;

    Ok(Json(json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
