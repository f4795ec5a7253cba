//! MongoDB account store.
//!
//! IDs come from a `counters` document bumped with `$inc`, so they stay
//! numeric and monotonic across instances. A rejected duplicate still
//! consumes its ID.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;

use super::{AccountStore, StoreError};
use crate::config::MongoConfig;
use crate::models::{Account, AccountId, NewAccount, StoredToken};

const DUPLICATE_KEY_CODE: i32 = 11000;
const ACCOUNT_COUNTER: &str = "users";

#[derive(Clone)]
pub struct MongoAccountStore {
    db: Database,
}

impl MongoAccountStore {
    pub async fn connect(config: &MongoConfig) -> Result<Self, AppError> {
        tracing::info!(database = %config.database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(config.uri.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;
        let db = client.database(&config.database);
        tracing::info!(database = %config.database, "Successfully connected to MongoDB database");
        Ok(Self { db })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for sso-service");

        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("email_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.users()
            .create_index(email_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create email index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        let token_owner_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_id_idx".to_string())
                    .build(),
            )
            .build();

        self.tokens()
            .create_index(token_owner_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create user_id index: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("MongoDB indexes created");
        Ok(())
    }

    fn users(&self) -> Collection<Account> {
        self.db.collection("users")
    }

    fn tokens(&self) -> Collection<StoredToken> {
        self.db.collection("tokens")
    }

    fn counters(&self) -> Collection<Document> {
        self.db.collection("counters")
    }

    async fn next_account_id(&self) -> Result<AccountId, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let counter = self
            .counters()
            .find_one_and_update(
                doc! { "_id": ACCOUNT_COUNTER },
                doc! { "$inc": { "seq": 1_i64 } },
                options,
            )
            .await
            .map_err(StoreError::unavailable)?;

        counter
            .and_then(|c| c.get_i64("seq").ok())
            .ok_or_else(|| {
                StoreError::Unavailable(anyhow::anyhow!("account id counter missing"))
            })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait]
impl AccountStore for MongoAccountStore {
    async fn create_account(&self, account: NewAccount) -> Result<AccountId, StoreError> {
        let id = self.next_account_id().await?;
        let record = Account::from_new(id, account, chrono::Utc::now());

        match self.users().insert_one(&record, None).await {
            Ok(_) => Ok(id),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::DuplicateAccount),
            Err(e) => Err(StoreError::unavailable(e)),
        }
    }

    async fn attach_refresh_token(
        &self,
        account_id: AccountId,
        refresh_token: &str,
    ) -> Result<(), StoreError> {
        let token = StoredToken::new(account_id, refresh_token.to_string());
        self.tokens()
            .insert_one(&token, None)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.users()
            .find_one(doc! { "email": email }, None)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn list_refresh_tokens(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<StoredToken>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self
            .tokens()
            .find(doc! { "user_id": account_id }, options)
            .await
            .map_err(StoreError::unavailable)?;

        cursor.try_collect().await.map_err(StoreError::unavailable)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                StoreError::unavailable(e)
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    async fn store() -> MongoAccountStore {
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let database = format!(
            "sso_test_{}",
            crate::utils::generate_activation_token().to_lowercase()
        );
        let store = MongoAccountStore::connect(&MongoConfig {
            uri: Secret::new(uri),
            database,
        })
        .await
        .expect("Failed to connect to MongoDB");
        store.initialize_indexes().await.expect("Failed to create indexes");
        store
    }

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password_hash: "$argon2id$test".to_string(),
            activation_token: crate::utils::generate_activation_token(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires running MongoDB
    async fn ids_are_sequential_and_duplicates_rejected() {
        let store = store().await;

        let first = store.create_account(new_account("a@b.com")).await.unwrap();
        let second = store.create_account(new_account("c@d.com")).await.unwrap();
        assert_eq!(second, first + 1);

        let duplicate = store.create_account(new_account("a@b.com")).await;
        assert!(matches!(duplicate, Err(StoreError::DuplicateAccount)));

        let found = store.find_account_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(found.id, first);
        assert!(!found.activated);
    }

    #[tokio::test]
    #[ignore] // Requires running MongoDB
    async fn tokens_listed_in_insertion_order() {
        let store = store().await;
        let id = store.create_account(new_account("t@b.com")).await.unwrap();

        store.attach_refresh_token(id, "first").await.unwrap();
        store.attach_refresh_token(id, "second").await.unwrap();

        let tokens: Vec<String> = store
            .list_refresh_tokens(id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect();
        assert_eq!(tokens, vec!["first", "second"]);
    }
}
