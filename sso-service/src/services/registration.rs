//! Registration pipeline.
//!
//! validate -> hash -> create (commit point) -> enqueue notification ->
//! issue tokens -> attach refresh token -> respond.
//!
//! Nothing is retried and nothing is compensated: a failure after the
//! account is created leaves the account in place. Everything from the
//! create onward runs on its own task, so dropping the request future
//! (client gone, request timeout) cannot stop it halfway.

use std::sync::Arc;

use anyhow::Context;
use validator::Validate;

use crate::config::ActivationConfig;
use crate::dtos::{RegisterRequest, UserDto};
use crate::models::{normalize_email, NewAccount};
use crate::services::error::ServiceError;
use crate::services::events::{EventSink, RegistrationEvent, Stage};
use crate::services::jwt::{SessionIssuer, SessionTokenPair};
use crate::services::notification_queue::{NotificationJob, NotificationQueue};
use crate::services::store::{AccountStore, StoreError};
use crate::utils::{
    describe_validation_errors, generate_activation_token, CredentialHasher, Password,
};

#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub user: UserDto,
    pub tokens: SessionTokenPair,
}

#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn AccountStore>,
    hasher: Arc<dyn CredentialHasher>,
    issuer: Arc<dyn SessionIssuer>,
    notifications: Arc<NotificationQueue>,
    activation: ActivationConfig,
    sink: Arc<dyn EventSink>,
}

impl RegistrationService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        hasher: Arc<dyn CredentialHasher>,
        issuer: Arc<dyn SessionIssuer>,
        notifications: Arc<NotificationQueue>,
        activation: ActivationConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            hasher,
            issuer,
            notifications,
            activation,
            sink,
        }
    }

    pub async fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<RegistrationOutcome, ServiceError> {
        if let Err(errors) = request.validate() {
            self.sink.record(&RegistrationEvent::ValidationRejected);
            return Err(ServiceError::Validation(describe_validation_errors(&errors)));
        }

        let email = normalize_email(&request.email);
        let password = Password::new(request.password);

        let hasher = self.hasher.clone();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task panicked")
            .and_then(|hashed| hashed.context("failed to hash password"))
            .map_err(|e| self.internal(Stage::Hashing, e))?;

        let account = NewAccount {
            email,
            password_hash: password_hash.into_string(),
            activation_token: generate_activation_token(),
        };

        let service = self.clone();
        tokio::spawn(async move { service.commit(account).await })
            .await
            .context("registration task panicked")
            .map_err(|e| self.internal(Stage::Creating, e))?
    }

    /// Create the account and finish everything that depends on it.
    async fn commit(&self, account: NewAccount) -> Result<RegistrationOutcome, ServiceError> {
        let email = account.email.clone();
        let activation_link = self.activation.link_for(&account.activation_token);

        let account_id = match self.store.create_account(account).await {
            Ok(id) => id,
            Err(StoreError::DuplicateAccount) => {
                self.sink
                    .record(&RegistrationEvent::DuplicateRejected { email });
                return Err(ServiceError::EmailAlreadyRegistered);
            }
            Err(StoreError::Unavailable(e)) => {
                return Err(self.internal(Stage::Creating, e.context("failed to create account")));
            }
        };

        // Best effort: a rejected job is already recorded by the queue.
        let _ = self.notifications.enqueue(NotificationJob {
            email: email.clone(),
            activation_link,
        });

        let tokens = self
            .issuer
            .issue(&email, account_id, false)
            .context("failed to issue session tokens")
            .map_err(|e| self.internal(Stage::TokenIssuing, e))?;

        self.store
            .attach_refresh_token(account_id, &tokens.refresh_token)
            .await
            .context("failed to persist refresh token")
            .map_err(|e| self.internal(Stage::AttachingToken, e))?;

        self.sink.record(&RegistrationEvent::Registered {
            account_id,
            email: email.clone(),
        });

        Ok(RegistrationOutcome {
            user: UserDto {
                email,
                user_id: account_id,
                is_activated: false,
            },
            tokens,
        })
    }

    fn internal(&self, stage: Stage, error: anyhow::Error) -> ServiceError {
        self.sink.record(&RegistrationEvent::InternalFailure {
            stage,
            error: format!("{:#}", error),
        });
        ServiceError::Internal(error)
    }
}
