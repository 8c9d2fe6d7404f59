//! Ticket creation and status lifecycle.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::TicketError;
use crate::pipeline::assignment::Assignment;
use crate::pipeline::types::{ClassificationResult, InboundMessage};
use crate::tickets::model::{
    AssignmentRecord, StatusNote, Ticket, TicketCategory, TicketFlags, TicketStatus,
};

/// Maximum characters of message content copied into a ticket description.
const DESCRIPTION_CONTENT_CHARS: usize = 300;

/// Generate a fresh ticket id (`TKT-` + 8 upper-case hex chars).
pub fn new_ticket_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("TKT-{}", hex[..8].to_uppercase())
}

fn short_description(category: TicketCategory, subject: &str) -> String {
    match category {
        TicketCategory::Maintenance => format!("Maintenance request: {}", subject),
        TicketCategory::Complaint => format!("Tenant complaint: {}", subject),
        TicketCategory::Payment => format!("Payment inquiry: {}", subject),
        TicketCategory::Lease => format!("Lease inquiry: {}", subject),
        _ => format!("Tenant request: {}", subject),
    }
}

fn full_description(content: &str, flags: &TicketFlags) -> String {
    let excerpt: String = content.chars().take(DESCRIPTION_CONTENT_CHARS).collect();
    let mut description = format!("Tenant reported: {}", excerpt);
    if content.chars().count() > DESCRIPTION_CONTENT_CHARS {
        description.push_str("...");
    }
    if flags.requires_contractor {
        description.push_str("\n\nNote: May require external contractor.");
    }
    if flags.after_hours {
        description.push_str("\n\nNote: Request received after business hours.");
    }
    description
}

impl Ticket {
    /// Open a new ticket from a classified message and its resolved assignment.
    ///
    /// Tickets always start in `New`.
    pub fn open(
        message: &InboundMessage,
        classification: ClassificationResult,
        assignment: Assignment,
        flags: TicketFlags,
    ) -> Self {
        let now = Utc::now();
        let subject = message.subject_or_default();
        let property_id = classification.property_id();

        let ticket = Self {
            id: new_ticket_id(),
            short_description: short_description(classification.category, subject),
            description: full_description(&message.content(), &flags),
            category: classification.category,
            subcategory: classification.subcategory,
            request_type: classification.request_type,
            urgency: classification.urgency,
            status: TicketStatus::New,
            assignment_group: assignment.group.clone(),
            assigned_to: assignment.assignee.clone(),
            unit: classification.location,
            property_id,
            requested_for: message.sender.clone(),
            source_message_id: message.id.clone(),
            flags,
            escalation_targets: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            resolved_at: None,
            closed_at: None,
            status_notes: Vec::new(),
            assignment_history: vec![AssignmentRecord {
                assignment_group: assignment.group,
                assigned_to: assignment.assignee,
                assigned_at: now,
            }],
        };

        info!(
            ticket_id = %ticket.id,
            message_id = %ticket.source_message_id,
            category = %ticket.category,
            urgency = %ticket.urgency,
            assigned_to = %ticket.assigned_to,
            "Ticket opened"
        );

        ticket
    }

    /// Transition to a new status now.
    pub fn transition(
        &mut self,
        target: TicketStatus,
        note: Option<String>,
    ) -> Result<(), TicketError> {
        self.transition_at(target, note, Utc::now())
    }

    /// Transition to a new status at `at`.
    ///
    /// On error the ticket is left untouched. Timestamps never move backward:
    /// an `at` earlier than the last update is clamped to it.
    pub fn transition_at(
        &mut self,
        target: TicketStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TicketError> {
        let from = self.status;
        if !from.can_transition_to(target) {
            warn!(ticket_id = %self.id, from = %from, to = %target, "Rejected ticket transition");
            return Err(TicketError::InvalidTransition {
                id: self.id.clone(),
                from,
                to: target,
            });
        }

        let now = at.max(self.updated_at);
        self.status = target;
        self.updated_at = now;

        match target {
            TicketStatus::InProgress if self.started_at.is_none() => {
                self.started_at = Some(now);
            }
            TicketStatus::Resolved if self.resolved_at.is_none() => {
                self.resolved_at = Some(now);
            }
            TicketStatus::Closed if self.closed_at.is_none() => {
                self.closed_at = Some(now);
            }
            _ => {}
        }

        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            self.status_notes.push(StatusNote {
                from,
                to: target,
                note,
                timestamp: now,
            });
        }

        info!(ticket_id = %self.id, from = %from, to = %target, "Ticket transitioned");
        Ok(())
    }

    /// Reassign the ticket. Closed tickets cannot be reassigned.
    pub fn reassign(&mut self, assignment: Assignment) -> Result<(), TicketError> {
        if self.status.is_terminal() {
            return Err(TicketError::Closed {
                id: self.id.clone(),
            });
        }

        let now = Utc::now().max(self.updated_at);
        self.assignment_group = assignment.group.clone();
        self.assigned_to = assignment.assignee.clone();
        self.updated_at = now;
        self.assignment_history.push(AssignmentRecord {
            assignment_group: assignment.group,
            assigned_to: assignment.assignee,
            assigned_at: now,
        });

        info!(ticket_id = %self.id, assigned_to = %self.assigned_to, "Ticket reassigned");
        Ok(())
    }

    /// One-line summary for logs and listings.
    pub fn summary(&self) -> String {
        let short: String = self.short_description.chars().take(50).collect();
        format!(
            "Ticket {}: {}... [{}/{}] Status: {} Assigned: {}",
            self.id, short, self.category, self.urgency, self.status, self.assigned_to
        )
    }
}
