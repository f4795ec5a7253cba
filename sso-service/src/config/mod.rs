use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::observability::LogFormat;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SsoConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    pub password_hash: PasswordHashConfig,
    pub smtp: SmtpConfig,
    pub activation: ActivationConfig,
    pub notification: NotificationConfig,
    pub cookie: RefreshCookieConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

impl Environment {
    pub fn log_format(&self) -> LogFormat {
        match self {
            Environment::Local => LogFormat::Text,
            Environment::Dev | Environment::Prod => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Postgres(DatabaseConfig),
    Mongo(MongoConfig),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: Secret<String>,
    pub refresh_secret: Secret<String>,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone)]
pub struct ActivationConfig {
    pub base_url: String,
}

impl ActivationConfig {
    pub fn link_for(&self, activation_token: &str) -> String {
        format!(
            "{}/activate/{}",
            self.base_url.trim_end_matches('/'),
            activation_token
        )
    }
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub worker_count: usize,
    pub queue_size: usize,
    pub shutdown_timeout_seconds: u64,
}

impl NotificationConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct RefreshCookieConfig {
    pub secure: bool,
    pub max_age_days: i64,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub request_timeout_seconds: u64,
    pub allowed_origins: Vec<String>,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl SsoConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "local".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let storage = match get_env("STORAGE_BACKEND", Some("postgres"), is_prod)?
            .to_lowercase()
            .as_str()
        {
            "postgres" => StorageConfig::Postgres(DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            }),
            "mongo" => StorageConfig::Mongo(MongoConfig {
                uri: Secret::new(get_env("MONGODB_URI", None, is_prod)?),
                database: get_env("MONGODB_DATABASE", Some("sso"), is_prod)?,
            }),
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Invalid STORAGE_BACKEND: {}",
                    other
                )))
            }
        };

        let smtp_enabled: bool = parse_env("SMTP_ENABLED", "false", is_prod)?;
        // SMTP settings are only mandatory when the relay is actually used.
        let smtp_default = |value: &'static str| if smtp_enabled { None } else { Some(value) };

        let config = SsoConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("sso-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some(default_log_level(environment)), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            storage,
            jwt: JwtConfig {
                access_secret: Secret::new(get_env("JWT_ACCESS_SECRET", None, is_prod)?),
                refresh_secret: Secret::new(get_env("JWT_REFRESH_SECRET", None, is_prod)?),
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_hours: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_HOURS",
                    "24",
                    is_prod,
                )?,
            },
            password_hash: PasswordHashConfig {
                memory_kib: parse_env(
                    "PASSWORD_HASH_MEMORY_KIB",
                    &argon2::Params::DEFAULT_M_COST.to_string(),
                    is_prod,
                )?,
                iterations: parse_env(
                    "PASSWORD_HASH_ITERATIONS",
                    &argon2::Params::DEFAULT_T_COST.to_string(),
                    is_prod,
                )?,
                parallelism: parse_env(
                    "PASSWORD_HASH_PARALLELISM",
                    &argon2::Params::DEFAULT_P_COST.to_string(),
                    is_prod,
                )?,
            },
            smtp: SmtpConfig {
                enabled: smtp_enabled,
                host: get_env("SMTP_HOST", smtp_default("localhost"), is_prod)?,
                port: parse_env("SMTP_PORT", "587", is_prod)?,
                username: get_env("SMTP_USERNAME", smtp_default(""), is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", smtp_default(""), is_prod)?),
                from_email: get_env("SMTP_FROM_EMAIL", smtp_default("noreply@localhost"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("SSO"), is_prod)?,
            },
            activation: ActivationConfig {
                base_url: get_env("ACTIVATION_BASE_URL", Some("http://localhost:8080"), is_prod)?,
            },
            notification: NotificationConfig {
                worker_count: parse_env("NOTIFICATION_WORKER_COUNT", "2", is_prod)?,
                queue_size: parse_env("NOTIFICATION_QUEUE_SIZE", "256", is_prod)?,
                shutdown_timeout_seconds: parse_env(
                    "NOTIFICATION_SHUTDOWN_TIMEOUT_SECONDS",
                    "10",
                    is_prod,
                )?,
            },
            cookie: RefreshCookieConfig {
                secure: parse_env("REFRESH_COOKIE_SECURE", "false", is_prod)?,
                max_age_days: parse_env("REFRESH_COOKIE_MAX_AGE_DAYS", "30", is_prod)?,
            },
            http: HttpConfig {
                request_timeout_seconds: parse_env("REQUEST_TIMEOUT_SECONDS", "4", is_prod)?,
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        let access = self.jwt.access_secret.expose_secret();
        let refresh = self.jwt.refresh_secret.expose_secret();
        if access.is_empty() || refresh.is_empty() {
            return Err(config_error("JWT secrets must not be empty"));
        }
        if access == refresh {
            return Err(config_error(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ",
            ));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(config_error("JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"));
        }
        let refresh_minutes = self
            .jwt
            .refresh_token_expiry_hours
            .checked_mul(60)
            .ok_or_else(|| config_error("JWT_REFRESH_TOKEN_EXPIRY_HOURS is out of range"))?;
        if self.jwt.access_token_expiry_minutes >= refresh_minutes {
            return Err(config_error(
                "Access tokens must expire before refresh tokens",
            ));
        }

        if self.notification.worker_count == 0 || self.notification.queue_size == 0 {
            return Err(config_error(
                "NOTIFICATION_WORKER_COUNT and NOTIFICATION_QUEUE_SIZE must be positive",
            ));
        }

        if self.cookie.max_age_days <= 0 {
            return Err(config_error("REFRESH_COOKIE_MAX_AGE_DAYS must be positive"));
        }

        if self.environment == Environment::Prod {
            if self.http.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }
            if !self.cookie.secure {
                return Err(config_error(
                    "REFRESH_COOKIE_SECURE must be enabled in production",
                ));
            }
            if !self.smtp.enabled {
                tracing::warn!("SMTP is disabled in production; verification mails are only logged");
            }
        }

        Ok(())
    }
}

fn default_log_level(environment: Environment) -> &'static str {
    match environment {
        Environment::Local | Environment::Dev => "debug",
        Environment::Prod => "info",
    }
}

fn config_error(msg: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> SsoConfig {
        SsoConfig {
            common: core_config::Config::default(),
            environment: Environment::Local,
            service_name: "sso-service".to_string(),
            service_version: "test".to_string(),
            log_level: "error".to_string(),
            otlp_endpoint: None,
            storage: StorageConfig::Mongo(MongoConfig {
                uri: Secret::new("mongodb://localhost:27017".to_string()),
                database: "sso_test".to_string(),
            }),
            jwt: JwtConfig {
                access_secret: Secret::new("access-secret".to_string()),
                refresh_secret: Secret::new("refresh-secret".to_string()),
                access_token_expiry_minutes: 15,
                refresh_token_expiry_hours: 24,
            },
            password_hash: PasswordHashConfig::default(),
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
                base_url: "http://localhost:8080/".to_string(),
            },
            notification: NotificationConfig {
                worker_count: 1,
                queue_size: 8,
                shutdown_timeout_seconds: 1,
            },
            cookie: RefreshCookieConfig {
                secure: false,
                max_age_days: 30,
            },
            http: HttpConfig {
                request_timeout_seconds: 4,
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
        }
    }

    #[test]
    fn accepts_sane_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn rejects_shared_signing_secret() {
        let mut config = test_config();
        config.jwt.refresh_secret = Secret::new("access-secret".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_access_expiry_not_shorter_than_refresh() {
        let mut config = test_config();
        config.jwt.access_token_expiry_minutes = 24 * 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_overflowing_refresh_expiry() {
        let mut config = test_config();
        config.jwt.refresh_token_expiry_hours = i64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn prod_requires_secure_cookie() {
        let mut config = test_config();
        config.environment = Environment::Prod;
        assert!(config.validate().is_err());

        config.cookie.secure = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn activation_link_joins_base_and_token() {
        let config = test_config();
        assert_eq!(
            config.activation.link_for("abc"),
            "http://localhost:8080/activate/abc"
        );
    }

    #[test]
    fn parses_environment_case_insensitively() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }
}
