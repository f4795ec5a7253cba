use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    DeliveryFailure(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Mail transport misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification_email(
        &self,
        to_email: &str,
        activation_link: &str,
    ) -> Result<(), MailError>;
}

const VERIFICATION_SUBJECT: &str = "Verify Your Email Address";

fn verification_bodies(activation_link: &str) -> (String, String) {
    let html_body = format!(
        r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Welcome! Please verify your email</h2>
        <p>Thank you for registering. Please click the link below to activate your account:</p>
        <p>
            <a href="{link}" style="background-color: #4CAF50; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                Activate Account
            </a>
        </p>
        <p style="color: #666; font-size: 12px;">
            If you didn't register, please ignore this email.
        </p>
    </body>
</html>
"###,
        link = activation_link
    );

    let plain_body = format!(
        "Welcome! Please verify your email\n\n\
         Thank you for registering. Please visit the following link to activate your account:\n\n\
         {}\n\n\
         If you didn't register, please ignore this email.",
        activation_link
    );

    (plain_body, html_body)
}

/// STARTTLS relay delivery.
pub struct SmtpEmailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailProvider {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailError::Configuration(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| MailError::Configuration(format!("Invalid from address: {}", e)))?;

        tracing::info!(host = %config.host, port = config.port, "SMTP email provider initialized");

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send_verification_email(
        &self,
        to_email: &str,
        activation_link: &str,
    ) -> Result<(), MailError> {
        let to: Mailbox = to_email
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {}", to_email, e)))?;
        let (plain_body, html_body) = verification_bodies(activation_link);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(VERIFICATION_SUBJECT)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| MailError::DeliveryFailure(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::DeliveryFailure(e.to_string()))?;

        tracing::info!(to = %to_email, "Verification email sent");
        Ok(())
    }
}

/// Used when SMTP is disabled: the send is only logged.
#[derive(Clone, Default)]
pub struct LogEmailProvider;

#[async_trait]
impl EmailProvider for LogEmailProvider {
    async fn send_verification_email(
        &self,
        to_email: &str,
        activation_link: &str,
    ) -> Result<(), MailError> {
        tracing::info!(
            to = %to_email,
            activation_link = %activation_link,
            "SMTP disabled, verification email not delivered"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub activation_link: String,
}

/// Test double that records every attempt.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
    attempts: Mutex<usize>,
    fail: AtomicBool,
    notify: Notify,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_failing(true);
        mock
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Successfully delivered messages.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Delivery attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|a| *a).unwrap_or(0)
    }

    /// Wait until at least `count` attempts were made or the timeout elapses.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.attempts() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        activation_link: &str,
    ) -> Result<(), MailError> {
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(MailError::DeliveryFailure("mock transport refused".to_string()))
        } else {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(SentEmail {
                    to: to_email.to_string(),
                    activation_link: activation_link.to_string(),
                });
            }
            Ok(())
        };

        if let Ok(mut attempts) = self.attempts.lock() {
            *attempts += 1;
        }
        self.notify.notify_waiters();
        result
    }
}
