use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JwtConfig;
use crate::models::AccountId;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to sign {kind} token: {source}")]
    Signing {
        kind: &'static str,
        #[source]
        source: jsonwebtoken::errors::Error,
    },

    #[error("Invalid {kind} token: {source}")]
    Verification {
        kind: &'static str,
        #[source]
        source: jsonwebtoken::errors::Error,
    },

    #[error("Token issuer misconfigured: {0}")]
    Configuration(String),
}

/// Identity snapshot shared by both tokens of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub email: String,
    pub user_id: AccountId,
    pub is_activated: bool,
}

/// Claims as they appear inside a signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(flatten)]
    pub identity: IdentityClaims,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct SessionTokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints the access/refresh pair for a freshly created account.
pub trait SessionIssuer: Send + Sync {
    /// Sign one claims snapshot under both keys. Either both tokens come
    /// back or neither does.
    fn issue(
        &self,
        email: &str,
        user_id: AccountId,
        activated: bool,
    ) -> Result<SessionTokenPair, TokenError>;
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// HS256 issuer holding one key per token kind.
pub struct SessionTokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionTokenIssuer {
    pub fn new(config: &JwtConfig) -> Result<Self, TokenError> {
        let access_secret = config.access_secret.expose_secret();
        let refresh_secret = config.refresh_secret.expose_secret();

        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(TokenError::Configuration(
                "signing secrets must not be empty".to_string(),
            ));
        }
        if access_secret == refresh_secret {
            return Err(TokenError::Configuration(
                "access and refresh secrets must differ".to_string(),
            ));
        }
        let access_ttl = Duration::try_minutes(config.access_token_expiry_minutes)
            .filter(|ttl| *ttl > Duration::zero());
        let refresh_ttl = Duration::try_hours(config.refresh_token_expiry_hours)
            .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some());
        let (access_ttl, refresh_ttl) = match (access_ttl, refresh_ttl) {
            (Some(access), Some(refresh)) if access < refresh => (access, refresh),
            _ => {
                return Err(TokenError::Configuration(
                    "access expiry must be positive and shorter than refresh expiry".to_string(),
                ))
            }
        };

        tracing::info!("Session token issuer initialized with HS256 keys");

        Ok(Self {
            access: SigningKeys::from_secret(access_secret),
            refresh: SigningKeys::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<SessionClaims, TokenError> {
        verify(token, &self.access.decoding, "access")
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<SessionClaims, TokenError> {
        verify(token, &self.refresh.decoding, "refresh")
    }

    /// Refresh token lifetime in seconds.
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }
}

impl SessionIssuer for SessionTokenIssuer {
    fn issue(
        &self,
        email: &str,
        user_id: AccountId,
        activated: bool,
    ) -> Result<SessionTokenPair, TokenError> {
        let identity = IdentityClaims {
            email: email.to_string(),
            user_id,
            is_activated: activated,
        };
        let now = Utc::now();
        let header = Header::new(Algorithm::HS256);

        let access_claims = SessionClaims {
            identity: identity.clone(),
            iat: now.timestamp(),
            exp: expiry(now, self.access_ttl)?,
        };
        let refresh_claims = SessionClaims {
            identity,
            iat: now.timestamp(),
            exp: expiry(now, self.refresh_ttl)?,
        };

        let access_token = encode(&header, &access_claims, &self.access.encoding)
            .map_err(|source| TokenError::Signing {
                kind: "access",
                source,
            })?;
        let refresh_token = encode(&header, &refresh_claims, &self.refresh.encoding)
            .map_err(|source| TokenError::Signing {
                kind: "refresh",
                source,
            })?;

        Ok(SessionTokenPair {
            access_token,
            refresh_token,
        })
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<i64, TokenError> {
    now.checked_add_signed(ttl)
        .map(|at| at.timestamp())
        .ok_or_else(|| TokenError::Configuration("token expiry out of range".to_string()))
}

fn verify(
    token: &str,
    key: &DecodingKey,
    kind: &'static str,
) -> Result<SessionClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp"]);

    decode::<SessionClaims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|source| TokenError::Verification { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use secrecy::Secret;

    fn issuer() -> SessionTokenIssuer {
        SessionTokenIssuer::new(&test_config().jwt).unwrap()
    }

    #[test]
    fn both_tokens_carry_identical_identity() {
        let issuer = issuer();
        let pair = issuer.issue("a@b.com", 42, false).unwrap();

        let access = issuer.verify_access_token(&pair.access_token).unwrap();
        let refresh = issuer.verify_refresh_token(&pair.refresh_token).unwrap();

        assert_eq!(access.identity, refresh.identity);
        assert_eq!(access.identity.email, "a@b.com");
        assert_eq!(access.identity.user_id, 42);
        assert!(!access.identity.is_activated);
        assert_eq!(access.iat, refresh.iat);
    }

    #[test]
    fn access_expires_before_refresh() {
        let issuer = issuer();
        let pair = issuer.issue("a@b.com", 1, false).unwrap();

        let access = issuer.verify_access_token(&pair.access_token).unwrap();
        let refresh = issuer.verify_refresh_token(&pair.refresh_token).unwrap();

        assert!(access.exp < refresh.exp);
        assert_eq!(access.exp - access.iat, 15 * 60);
        assert_eq!(refresh.exp - refresh.iat, 24 * 60 * 60);
    }

    #[test]
    fn cross_secret_verification_fails() {
        let issuer = issuer();
        let pair = issuer.issue("a@b.com", 1, false).unwrap();

        assert!(matches!(
            issuer.verify_access_token(&pair.refresh_token),
            Err(TokenError::Verification { .. })
        ));
        assert!(matches!(
            issuer.verify_refresh_token(&pair.access_token),
            Err(TokenError::Verification { .. })
        ));
    }

    #[test]
    fn rejects_shared_secret() {
        let mut config = test_config().jwt;
        config.refresh_secret = Secret::new("access-secret".to_string());

        assert!(matches!(
            SessionTokenIssuer::new(&config),
            Err(TokenError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_inverted_expiries() {
        let mut config = test_config().jwt;
        config.access_token_expiry_minutes = 24 * 60;
        config.refresh_token_expiry_hours = 24;

        assert!(SessionTokenIssuer::new(&config).is_err());
    }

    #[test]
    fn rejects_out_of_range_expiry() {
        let mut config = test_config().jwt;
        config.refresh_token_expiry_hours = i64::MAX;
        assert!(matches!(
            SessionTokenIssuer::new(&config),
            Err(TokenError::Configuration(_))
        ));

        config.refresh_token_expiry_hours = 24;
        config.access_token_expiry_minutes = i64::MIN;
        assert!(SessionTokenIssuer::new(&config).is_err());
    }
}
