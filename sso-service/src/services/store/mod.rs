//! Account persistence.
//!
//! One capability, several backends. Email uniqueness and ID assignment are
//! the store's responsibility: callers never pre-check, they react to
//! [`StoreError::DuplicateAccount`].

mod memory;
mod mongo;
mod postgres;

pub use memory::MemoryAccountStore;
pub use mongo::MongoAccountStore;
pub use postgres::PostgresAccountStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Account, AccountId, NewAccount, StoredToken};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account already exists")]
    DuplicateAccount,

    #[error("Storage unavailable: {0}")]
    Unavailable(anyhow::Error),
}

impl StoreError {
    pub(crate) fn unavailable(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Unavailable(err.into())
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts the account and returns its ID in the same atomic step.
    async fn create_account(&self, account: NewAccount) -> Result<AccountId, StoreError>;

    /// Appends a refresh token row; repeated calls append repeated rows.
    async fn attach_refresh_token(
        &self,
        account_id: AccountId,
        refresh_token: &str,
    ) -> Result<(), StoreError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Tokens in insertion order.
    async fn list_refresh_tokens(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<StoredToken>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_keeps_the_source_error() {
        let err = StoreError::unavailable(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));

        match err {
            StoreError::Unavailable(inner) => {
                let io = inner.downcast_ref::<std::io::Error>().unwrap();
                assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
