//! Outbound notifications: escalations and sent-reply confirmations.

mod smtp;

pub use smtp::{SmtpConfig, SmtpNotifier};

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::NotifyError;
use crate::replies::model::FinalReply;
use crate::tickets::model::Ticket;
use crate::tickets::sla::EscalationTarget;

pub const TEMPLATE_TICKET_ESCALATION: &str = "ticket_escalation";
pub const TEMPLATE_REPLY_SENT: &str = "reply_sent";

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    /// Template name (e.g. `ticket_escalation`).
    pub template: String,
    pub body: String,
}

impl Notification {
    /// Escalation notice for one target.
    pub fn escalation(ticket: &Ticket, target: &EscalationTarget) -> Self {
        Self {
            recipient: target.recipient.clone(),
            subject: format!("Escalation: {} [{}]", ticket.id, ticket.short_description),
            template: TEMPLATE_TICKET_ESCALATION.to_string(),
            body: format!(
                "Ticket {} needs {} attention.\n\nReason: {}\nUrgency: {}\nStatus: {}\nLocation: {}\nAssigned: {} ({})\n\n{}",
                ticket.id,
                target.role,
                target.reason,
                ticket.urgency,
                ticket.status,
                ticket.unit,
                ticket.assignment_group,
                ticket.assigned_to,
                ticket.description,
            ),
        }
    }

    /// The committed reply, addressed to the tenant.
    pub fn reply_sent(recipient: &str, subject: &str, reply: &FinalReply) -> Self {
        Self {
            recipient: recipient.to_string(),
            subject: format!("Re: {subject}"),
            template: TEMPLATE_REPLY_SENT.to_string(),
            body: reply.content.clone(),
        }
    }
}

/// Delivers notifications.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Send and log; failures never reach the caller.
pub async fn dispatch(notifier: &dyn NotificationDispatcher, notification: Notification) {
    let recipient = notification.recipient.clone();
    let template = notification.template.clone();
    if let Err(e) = notifier.send(notification).await {
        warn!(recipient = %recipient, template = %template, error = %e, "Notification failed");
    }
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            recipient = %notification.recipient,
            template = %notification.template,
            subject = %notification.subject,
            "Notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory. Useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut sent = self.sent.lock().map_err(|e| NotifyError::SendFailed {
            recipient: notification.recipient.clone(),
            template: notification.template.clone(),
            reason: e.to_string(),
        })?;
        sent.push(notification);
        Ok(())
    }
}
