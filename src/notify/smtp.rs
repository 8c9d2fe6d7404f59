//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use super::{Notification, NotificationDispatcher};
use crate::error::{ConfigError, NotifyError};

/// SMTP settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Returns `Ok(None)` if `SMTP_HOST` is not set (SMTP disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(host) = std::env::var("SMTP_HOST") else {
            return Ok(None);
        };

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("SMTP_FROM_ADDRESS")
            .ok()
            .or_else(|| (!username.is_empty()).then(|| username.clone()))
            .ok_or_else(|| ConfigError::MissingEnvVar("SMTP_FROM_ADDRESS".to_string()))?;

        Ok(Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        }))
    }
}

/// Sends notifications as plain-text email.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let from: Mailbox =
            self.config
                .from_address
                .parse()
                .map_err(|e| NotifyError::InvalidAddress {
                    address: self.config.from_address.clone(),
                    reason: format!("{e}"),
                })?;
        let to: Mailbox =
            notification
                .recipient
                .parse()
                .map_err(|e| NotifyError::InvalidAddress {
                    address: notification.recipient.clone(),
                    reason: format!("{e}"),
                })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(notification.subject.as_str())
            .body(notification.body.clone())
            .map_err(|e| self.failed(notification, format!("Failed to build email: {e}")))
    }

    fn failed(&self, notification: &Notification, reason: String) -> NotifyError {
        NotifyError::SendFailed {
            recipient: notification.recipient.clone(),
            template: notification.template.clone(),
            reason,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for SmtpNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let email = self.build(&notification)?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| self.failed(&notification, format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        // lettre's SmtpTransport is blocking.
        let result = tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| self.failed(&notification, format!("SMTP task failed: {e}")))?;
        result.map_err(|e| self.failed(&notification, format!("SMTP send failed: {e}")))?;

        tracing::info!(
            recipient = %notification.recipient,
            template = %notification.template,
            "Notification emailed"
        );
        Ok(())
    }
}
