//! Services layer for sso-service.
//!
//! The registration pipeline and the capabilities it sequences: account
//! persistence, session token issuance and verification email delivery.

mod email;
pub mod error;
pub mod events;
mod jwt;
pub mod metrics;
mod notification_queue;
mod registration;
pub mod store;

pub use email::{
    EmailProvider, LogEmailProvider, MailError, MockEmailService, SentEmail, SmtpEmailProvider,
};
pub use error::ServiceError;
pub use events::{EventSink, RecordingEventSink, RegistrationEvent, Stage, TracingEventSink};
pub use jwt::{
    IdentityClaims, SessionClaims, SessionIssuer, SessionTokenIssuer, SessionTokenPair, TokenError,
};
pub use notification_queue::{
    NotificationJob, NotificationQueue, QueueError, ShutdownMode, ShutdownReport,
};
pub use registration::{RegistrationOutcome, RegistrationService};
pub use store::{
    AccountStore, MemoryAccountStore, MongoAccountStore, PostgresAccountStore, StoreError,
};
