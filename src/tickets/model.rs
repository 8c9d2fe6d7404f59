//! Ticket data model: enums and the ticket record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pipeline::location::UnitLocation;
use crate::tickets::sla::EscalationTarget;

/// Main ticket categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketCategory {
    Maintenance,
    Utilities,
    Lease,
    MoveInOut,
    Complaint,
    Payment,
    Amenity,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 7] = [
        Self::Maintenance,
        Self::Utilities,
        Self::Lease,
        Self::MoveInOut,
        Self::Complaint,
        Self::Payment,
        Self::Amenity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maintenance => "Maintenance",
            Self::Utilities => "Utilities",
            Self::Lease => "Lease",
            Self::MoveInOut => "Move-in/out",
            Self::Complaint => "Complaint",
            Self::Payment => "Payment",
            Self::Amenity => "Amenity",
        }
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TicketCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown ticket category: {}", s))
    }
}

/// Kind of request, derived alongside the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Repair,
    Inspection,
    Setup,
    General,
    Emergency,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Repair => "Repair",
            Self::Inspection => "Inspection",
            Self::Setup => "Setup",
            Self::General => "General",
            Self::Emergency => "Emergency",
        };
        f.write_str(s)
    }
}

/// Ticket urgency (1 = High, 2 = Medium, 3 = Low).
///
/// Ordered so that `High < Medium < Low`, matching the numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    /// Numeric code as stored on tickets ("1", "2", "3").
    pub fn code(&self) -> &'static str {
        match self {
            Self::High => "1",
            Self::Medium => "2",
            Self::Low => "3",
        }
    }

    /// Parse a stored urgency code. Returns `None` for anything out of range.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(Self::High),
            "2" => Some(Self::Medium),
            "3" => Some(Self::Low),
            _ => None,
        }
    }

    /// Parse a stored urgency code, recovering out-of-range values as Medium.
    pub fn from_code_lossy(code: &str) -> Self {
        Self::from_code(code).unwrap_or_else(|| {
            warn!(code = code, "Out-of-range urgency code, defaulting to Medium");
            Self::Medium
        })
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl From<Urgency> for String {
    fn from(u: Urgency) -> Self {
        u.code().to_string()
    }
}

/// Stored codes load leniently: a bad code becomes Medium with a warning.
impl From<String> for Urgency {
    fn from(s: String) -> Self {
        Self::from_code_lossy(&s)
    }
}

/// Ticket status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    New,
    InProgress,
    Pending,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: TicketStatus) -> bool {
        use TicketStatus::*;

        matches!(
            (self, target),
            // From New
            (New, InProgress) | (New, Closed) |
            // From InProgress
            (InProgress, Pending) | (InProgress, Resolved) | (InProgress, Closed) |
            // From Pending
            (Pending, InProgress) | (Pending, Resolved) |
            // From Resolved (close, or reopen)
            (Resolved, Closed) | (Resolved, InProgress)
        )
    }

    /// Closed is the only terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// New, In Progress and Pending count as open work.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::InProgress | Self::Pending)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "New",
            Self::InProgress => "In Progress",
            Self::Pending => "Pending",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        };
        f.write_str(s)
    }
}

/// Boolean signals that feed escalation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFlags {
    /// The work likely needs an external contractor.
    pub requires_contractor: bool,
    /// The source message arrived outside business hours.
    pub after_hours: bool,
}

/// One entry in a ticket's status-notes log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusNote {
    pub from: TicketStatus,
    pub to: TicketStatus,
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry in a ticket's assignment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub assignment_group: String,
    pub assigned_to: String,
    pub assigned_at: DateTime<Utc>,
}

/// A structured service ticket derived from a tenant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket ID (`TKT-XXXXXXXX`). Never changes once assigned.
    pub id: String,
    pub short_description: String,
    pub description: String,
    pub category: TicketCategory,
    pub subcategory: String,
    pub request_type: RequestType,
    pub urgency: Urgency,
    pub status: TicketStatus,
    pub assignment_group: String,
    pub assigned_to: String,
    pub unit: UnitLocation,
    pub property_id: String,
    /// Sender identity the ticket was raised for.
    pub requested_for: String,
    /// ID of the message this ticket was classified from.
    pub source_message_id: String,
    pub flags: TicketFlags,
    /// Escalation targets raised so far (empty when none).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalation_targets: Vec<EscalationTarget>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_notes: Vec<StatusNote>,
    #[serde(default)]
    pub assignment_history: Vec<AssignmentRecord>,
}

impl Ticket {
    /// Age of the ticket at `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }
}
