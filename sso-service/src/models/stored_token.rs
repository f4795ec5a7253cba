use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::AccountId;

/// Append-only link between an account and an issued refresh token.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StoredToken {
    pub user_id: AccountId,
    pub token: String,
    pub created_utc: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(user_id: AccountId, token: String) -> Self {
        Self {
            user_id,
            token,
            created_utc: Utc::now(),
        }
    }
}
