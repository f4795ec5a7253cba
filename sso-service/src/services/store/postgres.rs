//! PostgreSQL account store.

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use super::{AccountStore, StoreError};
use crate::models::{Account, AccountId, NewAccount, StoredToken};

const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

#[derive(Clone)]
pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err)
            if db_err.is_unique_violation()
                && db_err.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT) =>
        {
            StoreError::DuplicateAccount
        }
        _ => StoreError::Unavailable(anyhow::Error::new(err)),
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn create_account(&self, account: NewAccount) -> Result<AccountId, StoreError> {
        sqlx::query_scalar::<_, AccountId>(
            r#"
            INSERT INTO users (email, password_hash, activation_token)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.activation_token)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)
    }

    async fn attach_refresh_token(
        &self,
        account_id: AccountId,
        refresh_token: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO tokens (user_id, token) VALUES ($1, $2)")
            .bind(account_id)
            .bind(refresh_token)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(anyhow::Error::new(e)))?;
        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, password_hash, activated, activation_token, created_utc
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(anyhow::Error::new(e)))
    }

    async fn list_refresh_tokens(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<StoredToken>, StoreError> {
        sqlx::query_as::<_, StoredToken>(
            "SELECT user_id, token, created_utc FROM tokens WHERE user_id = $1 ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(anyhow::Error::new(e)))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                StoreError::Unavailable(anyhow::Error::new(e))
            })?;
        Ok(())
    }
}
