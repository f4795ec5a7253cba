//! In-process account store for local runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;

use super::{AccountStore, StoreError};
use crate::models::{Account, AccountId, NewAccount, StoredToken};

#[derive(Default)]
struct MemoryState {
    last_id: AccountId,
    accounts: HashMap<AccountId, Account>,
    by_email: HashMap<String, AccountId>,
    tokens: Vec<StoredToken>,
}

/// The check-and-insert for email uniqueness runs under one lock, so
/// concurrent creates for the same email admit exactly one winner.
#[derive(Default)]
pub struct MemoryAccountStore {
    state: Mutex<MemoryState>,
    fail_create: AtomicBool,
    fail_attach: AtomicBool,
    attach_delay: Mutex<Duration>,
    mutations: AtomicUsize,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create_account` calls report the store unavailable.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `attach_refresh_token` calls report the store unavailable.
    pub fn fail_attaches(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    /// Stall each `attach_refresh_token` call before it writes.
    pub fn delay_attaches(&self, delay: Duration) {
        if let Ok(mut current) = self.attach_delay.lock() {
            *current = delay;
        }
    }

    /// Successful writes so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().map(|s| s.accounts.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable(anyhow!("account store lock poisoned")))
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create_account(&self, account: NewAccount) -> Result<AccountId, StoreError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(anyhow!("injected create failure")));
        }

        let mut state = self.lock()?;
        if state.by_email.contains_key(&account.email) {
            return Err(StoreError::DuplicateAccount);
        }

        state.last_id += 1;
        let id = state.last_id;
        state.by_email.insert(account.email.clone(), id);
        state
            .accounts
            .insert(id, Account::from_new(id, account, Utc::now()));
        self.mutations.fetch_add(1, Ordering::SeqCst);

        Ok(id)
    }

    async fn attach_refresh_token(
        &self,
        account_id: AccountId,
        refresh_token: &str,
    ) -> Result<(), StoreError> {
        let delay = self
            .attach_delay
            .lock()
            .map(|d| *d)
            .unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(anyhow!("injected attach failure")));
        }

        let mut state = self.lock()?;
        if !state.accounts.contains_key(&account_id) {
            return Err(StoreError::Unavailable(anyhow!(
                "unknown account {}",
                account_id
            )));
        }
        state
            .tokens
            .push(StoredToken::new(account_id, refresh_token.to_string()));
        self.mutations.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .by_email
            .get(email)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn list_refresh_tokens(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<StoredToken>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .tokens
            .iter()
            .filter(|t| t.user_id == account_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
