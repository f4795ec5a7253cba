//! Domain models for sso-service.

pub mod account;
pub mod stored_token;

pub use account::{normalize_email, Account, AccountId, NewAccount};
pub use stored_token::StoredToken;
