//! Shared types for the triage pipeline.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};

use crate::pipeline::location::UnitLocation;
use crate::tickets::model::{RequestType, TicketCategory, TicketFlags, Urgency};

// ── Inbound message ─────────────────────────────────────────────────

/// A tenant message as handed to the core by the message store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Unique message ID.
    pub id: String,
    /// Sender identity as received (`"Jane Doe <jane@example.com>"` or a bare address).
    pub sender: String,
    /// Subject line, if the channel has one.
    pub subject: Option<String>,
    /// Message body.
    pub body: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Create a message received now with a generated ID.
    pub fn new(
        sender: impl Into<String>,
        subject: Option<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.into(),
            subject,
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Subject and body joined; the text every classifier looks at.
    pub fn content(&self) -> String {
        match &self.subject {
            Some(subject) if !subject.trim().is_empty() => format!("{} {}", subject, self.body),
            _ => self.body.clone(),
        }
    }

    /// Subject or a generic placeholder.
    pub fn subject_or_default(&self) -> &str {
        self.subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("your inquiry")
    }

    /// Display name of the tenant who sent this message.
    pub fn tenant_name(&self) -> String {
        tenant_name(&self.sender)
    }
}

/// Extract a display name from a sender identity.
///
/// - `"Jane Doe <jane@example.com>"` → `Jane Doe`
/// - `john.doe@example.com` → `John Doe`
/// - anything unusable → `Tenant`
pub fn tenant_name(sender: &str) -> String {
    let sender = sender.trim();

    if let Ok(mailbox) = sender.parse::<Mailbox>() {
        if let Some(name) = mailbox.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        return title_case_local_part(mailbox.email.user());
    }

    // Not a parseable mailbox, fall back to "name <...>" or "local@..." by hand.
    if let Some((name, _)) = sender.split_once('<') {
        let name = name.trim().trim_matches('"').trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    match sender.split_once('@') {
        Some((local, _)) if !local.is_empty() => title_case_local_part(local),
        _ => "Tenant".to_string(),
    }
}

fn title_case_local_part(local: &str) -> String {
    let words: Vec<String> = local
        .split(['.', '_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        "Tenant".to_string()
    } else {
        words.join(" ")
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Output of the pattern matcher. A pure function of the input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: TicketCategory,
    pub subcategory: String,
    pub request_type: RequestType,
    pub urgency: Urgency,
    pub location: UnitLocation,
    /// Content mentions trades that usually need an outside contractor.
    pub requires_contractor: bool,
}

impl ClassificationResult {
    pub fn property_id(&self) -> String {
        self.location.property_id()
    }
}

// ── Business hours ──────────────────────────────────────────────────

/// Office hours used to flag after-hours messages.
///
/// Hours are wall-clock hours at the office, `utc_offset_minutes` east of UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    /// First hour (0-23) that counts as in-hours.
    pub open_hour: u32,
    /// Last hour (0-23) that counts as in-hours.
    pub close_hour: u32,
    /// Office time zone as minutes east of UTC (EST is -300).
    pub utc_offset_minutes: i32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open_hour: 8,
            close_hour: 18,
            utc_offset_minutes: 0,
        }
    }
}

impl BusinessHours {
    /// The office offset. Out-of-range values fall back to UTC.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn is_after_hours(&self, at: DateTime<Utc>) -> bool {
        let hour = at.with_timezone(&self.offset()).hour();
        hour < self.open_hour || hour > self.close_hour
    }
}

/// Build ticket flags from a classification and the message receipt time.
pub fn ticket_flags(
    classification: &ClassificationResult,
    received_at: DateTime<Utc>,
    hours: &BusinessHours,
) -> TicketFlags {
    TicketFlags {
        requires_contractor: classification.requires_contractor,
        after_hours: hours.is_after_hours(received_at),
    }
}
