//! Account model - the durable identity record created at registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account ID assigned by the store on insert.
pub type AccountId = i64;

/// Fields the orchestrator supplies when creating an account.
///
/// The store assigns `id` and `created_utc`; `activated` always starts false.
#[derive(Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub activation_token: String,
}

impl std::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Persisted account.
#[derive(Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: AccountId,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
    pub activation_token: String,
    pub created_utc: DateTime<Utc>,
}

impl Account {
    pub fn from_new(id: AccountId, new: NewAccount, created_utc: DateTime<Utc>) -> Self {
        Self {
            id,
            email: new.email,
            password_hash: new.password_hash,
            activated: false,
            activation_token: new.activation_token,
            created_utc,
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("activated", &self.activated)
            .field("created_utc", &self.created_utc)
            .finish_non_exhaustive()
    }
}

/// Canonical form used for storage and uniqueness: trimmed, lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accounts_start_inactive() {
        let account = Account::from_new(
            7,
            NewAccount {
                email: "a@b.com".to_string(),
                password_hash: "$argon2id$...".to_string(),
                activation_token: "tok".to_string(),
            },
            Utc::now(),
        );

        assert_eq!(account.id, 7);
        assert!(!account.activated);
    }

    #[test]
    fn debug_output_hides_password_hash() {
        let new = NewAccount {
            email: "a@b.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            activation_token: "tok".to_string(),
        };

        let rendered = format!("{:?}", new);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("a@b.com"));
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
