//! Shared setup for sso-service integration tests.
//!
//! Builds the real router around an in-memory account store, a recording
//! mail double and a recording event sink.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use secrecy::Secret;
use service_core::config::Config;
use sso_service::{
    build_router,
    config::{
        ActivationConfig, Environment, HttpConfig, JwtConfig, MongoConfig, NotificationConfig,
        PasswordHashConfig, RefreshCookieConfig, SmtpConfig, SsoConfig, StorageConfig,
    },
    services::{
        MemoryAccountStore, MockEmailService, RecordingEventSink, SessionTokenIssuer,
    },
    AppState,
};
use std::sync::Arc;
use tower::util::ServiceExt;

pub const ACCESS_SECRET: &str = "test-access-secret";
pub const REFRESH_SECRET: &str = "test-refresh-secret";

pub fn test_config() -> SsoConfig {
    SsoConfig {
        common: Config::default(),
        environment: Environment::Local,
        service_name: "sso-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        storage: StorageConfig::Mongo(MongoConfig {
            uri: Secret::new("mongodb://localhost:27017".to_string()),
            database: "unused".to_string(),
        }),
        jwt: JwtConfig {
            access_secret: Secret::new(ACCESS_SECRET.to_string()),
            refresh_secret: Secret::new(REFRESH_SECRET.to_string()),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_hours: 24,
        },
        // Cheap parameters keep the suite fast.
        password_hash: PasswordHashConfig {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        },
        smtp: SmtpConfig {
            enabled: false,
            host: "localhost".to_string(),
            port: 587,
            username: String::new(),
            password: Secret::new(String::new()),
            from_email: "noreply@localhost".to_string(),
            from_name: "SSO".to_string(),
        },
        activation: ActivationConfig {
            base_url: "http://sso.test".to_string(),
        },
        notification: NotificationConfig {
            worker_count: 2,
            queue_size: 64,
            shutdown_timeout_seconds: 2,
        },
        cookie: RefreshCookieConfig {
            secure: true,
            max_age_days: 30,
        },
        http: HttpConfig {
            request_timeout_seconds: 4,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryAccountStore>,
    pub mail: Arc<MockEmailService>,
    pub events: RecordingEventSink,
    pub issuer: SessionTokenIssuer,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::spawn_with(test_config())
    }

    pub fn spawn_with(config: SsoConfig) -> Self {
        let store = Arc::new(MemoryAccountStore::new());
        let mail = Arc::new(MockEmailService::new());
        let events = RecordingEventSink::new();
        let issuer = SessionTokenIssuer::new(&config.jwt).expect("Failed to build issuer");

        let state = AppState::new(config, store.clone(), mail.clone(), Arc::new(events.clone()))
            .expect("Failed to build app state");
        let router = build_router(state.clone()).expect("Failed to build router");

        Self {
            router,
            state,
            store,
            mail,
            events,
            issuer,
        }
    }

    pub async fn post_register(&self, body: impl Into<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn register(&self, email: &str, password: &str) -> Response<Body> {
        let body = serde_json::json!({ "email": email, "password": password }).to_string();
        self.post_register(body).await
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

pub async fn json_body(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}
