//! Observable outcomes of the registration pipeline.
//!
//! The orchestrator and the notification queue report through an
//! [`EventSink`] handed to them at construction, so tests can assert on
//! outcomes (notably delivery failures, which never reach the caller)
//! without scraping logs.

use std::sync::{Arc, Mutex};

use crate::models::AccountId;
use crate::services::metrics;

/// Pipeline step at which an internal failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Hashing,
    Creating,
    TokenIssuing,
    AttachingToken,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Hashing => "hashing",
            Stage::Creating => "creating",
            Stage::TokenIssuing => "token_issuing",
            Stage::AttachingToken => "attaching_token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    Registered {
        account_id: AccountId,
        email: String,
    },
    ValidationRejected,
    DuplicateRejected {
        email: String,
    },
    InternalFailure {
        stage: Stage,
        error: String,
    },
    NotificationSent {
        email: String,
    },
    DeliveryFailed {
        email: String,
        error: String,
    },
    /// Job never handed to the transport (queue full, closed or discarded).
    NotificationDropped {
        email: String,
        reason: &'static str,
    },
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: &RegistrationEvent);
}

/// Structured logs plus Prometheus counters.
#[derive(Clone, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &RegistrationEvent) {
        match event {
            RegistrationEvent::Registered { account_id, email } => {
                tracing::info!(account_id = *account_id, email = %email, "Account registered");
                metrics::record_registration("success");
            }
            RegistrationEvent::ValidationRejected => {
                tracing::debug!("Registration rejected by validation");
                metrics::record_registration("validation_failed");
            }
            RegistrationEvent::DuplicateRejected { email } => {
                tracing::info!(email = %email, "Registration rejected, email already registered");
                metrics::record_registration("conflict");
            }
            RegistrationEvent::InternalFailure { stage, error } => {
                tracing::error!(stage = stage.as_str(), error = %error, "Registration failed");
                metrics::record_registration("internal_error");
            }
            RegistrationEvent::NotificationSent { email } => {
                tracing::info!(to = %email, "Verification email delivered");
                metrics::record_delivery("sent");
            }
            RegistrationEvent::DeliveryFailed { email, error } => {
                tracing::warn!(to = %email, error = %error, "Verification email delivery failed");
                metrics::record_delivery("failed");
            }
            RegistrationEvent::NotificationDropped { email, reason } => {
                tracing::warn!(to = %email, reason = *reason, "Verification email dropped");
                metrics::record_delivery("dropped");
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<RegistrationEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RegistrationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count_matching(&self, predicate: impl Fn(&RegistrationEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, event: &RegistrationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        sink.record(&RegistrationEvent::ValidationRejected);
        sink.record(&RegistrationEvent::DuplicateRejected {
            email: "a@b.com".to_string(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], RegistrationEvent::ValidationRejected);
        assert_eq!(
            sink.count_matching(|e| matches!(e, RegistrationEvent::DuplicateRejected { .. })),
            1
        );
    }

    #[test]
    fn tracing_sink_accepts_every_event() {
        let sink = TracingEventSink;
        sink.record(&RegistrationEvent::InternalFailure {
            stage: Stage::AttachingToken,
            error: "boom".to_string(),
        });
        sink.record(&RegistrationEvent::NotificationDropped {
            email: "a@b.com".to_string(),
            reason: "queue_full",
        });
    }
}
