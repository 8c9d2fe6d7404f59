//! SLA compliance and escalation rules.
//!
//! Both evaluations are pure functions of a ticket, the rule tables and a
//! reference time. Nothing here is stored; compliance can flip from met to
//! missed purely because time passed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::tickets::model::{Ticket, TicketStatus, Urgency};

/// Response and resolution budgets for one urgency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTarget {
    pub response_minutes: i64,
    pub resolution_minutes: i64,
}

/// SLA budgets keyed by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTable {
    pub high: SlaTarget,
    pub medium: SlaTarget,
    pub low: SlaTarget,
}

impl Default for SlaTable {
    fn default() -> Self {
        Self {
            high: SlaTarget {
                response_minutes: 30,
                resolution_minutes: 240,
            },
            medium: SlaTarget {
                response_minutes: 120,
                resolution_minutes: 1440,
            },
            low: SlaTarget {
                response_minutes: 480,
                resolution_minutes: 4320,
            },
        }
    }
}

impl SlaTable {
    pub fn target(&self, urgency: Urgency) -> SlaTarget {
        match urgency {
            Urgency::High => self.high,
            Urgency::Medium => self.medium,
            Urgency::Low => self.low,
        }
    }
}

/// One SLA dimension (response or resolution) as of the evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaMeasure {
    pub budget_minutes: i64,
    /// Minutes consumed: up to the milestone if reached, else up to now.
    pub elapsed_minutes: i64,
    pub met: bool,
    /// The milestone was reached, so `met` can no longer change.
    pub settled: bool,
}

impl SlaMeasure {
    fn measure(
        created_at: DateTime<Utc>,
        milestone: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        budget_minutes: i64,
    ) -> Self {
        let end = milestone.unwrap_or(now);
        let elapsed = end.signed_duration_since(created_at);
        Self {
            budget_minutes,
            elapsed_minutes: elapsed.num_minutes(),
            met: elapsed <= Duration::minutes(budget_minutes),
            settled: milestone.is_some(),
        }
    }

    /// Minutes left before the budget is exhausted (negative once breached).
    pub fn remaining_minutes(&self) -> i64 {
        self.budget_minutes - self.elapsed_minutes
    }
}

/// Result of evaluating a ticket against its SLA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub ticket_id: String,
    pub urgency: Urgency,
    pub response: SlaMeasure,
    pub resolution: SlaMeasure,
    pub evaluated_at: DateTime<Utc>,
}

impl ComplianceResult {
    pub fn is_compliant(&self) -> bool {
        self.response.met && self.resolution.met
    }
}

/// Evaluate SLA compliance of `ticket` as of `now`.
pub fn evaluate_sla(ticket: &Ticket, table: &SlaTable, now: DateTime<Utc>) -> ComplianceResult {
    let target = table.target(ticket.urgency);
    ComplianceResult {
        ticket_id: ticket.id.clone(),
        urgency: ticket.urgency,
        response: SlaMeasure::measure(
            ticket.created_at,
            ticket.started_at,
            now,
            target.response_minutes,
        ),
        resolution: SlaMeasure::measure(
            ticket.created_at,
            ticket.resolved_at,
            now,
            target.resolution_minutes,
        ),
        evaluated_at: now,
    }
}

// ── Escalation ──────────────────────────────────────────────────────

/// Who an escalation goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationRole {
    Supervisor,
    ContractorCoordinator,
    EmergencyCoordinator,
}

impl std::fmt::Display for EscalationRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Supervisor => write!(f, "supervisor"),
            Self::ContractorCoordinator => write!(f, "contractor_coordinator"),
            Self::EmergencyCoordinator => write!(f, "emergency_coordinator"),
        }
    }
}

/// A recipient to notify because an escalation rule tripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscalationTarget {
    pub role: EscalationRole,
    pub recipient: String,
    pub reason: String,
}

/// Escalation recipients and thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub supervisor: String,
    pub contractor_coordinator: String,
    pub emergency_coordinator: String,
    /// A High-urgency ticket still New after this many minutes goes to the supervisor.
    pub unstarted_high_minutes: i64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            supervisor: "supervisor@property.com".to_string(),
            contractor_coordinator: "contractors@property.com".to_string(),
            emergency_coordinator: "emergency@property.com".to_string(),
            unstarted_high_minutes: 30,
        }
    }
}

/// Every escalation target whose rule applies to `ticket` at `now`.
///
/// Rules are independent; all matches are returned in rule order.
pub fn check_escalation(
    ticket: &Ticket,
    policy: &EscalationPolicy,
    now: DateTime<Utc>,
) -> Vec<EscalationTarget> {
    let mut targets = Vec::new();
    let high = ticket.urgency == Urgency::High;

    if high
        && ticket.status == TicketStatus::New
        && ticket.age_at(now) > Duration::minutes(policy.unstarted_high_minutes)
    {
        targets.push(EscalationTarget {
            role: EscalationRole::Supervisor,
            recipient: policy.supervisor.clone(),
            reason: format!(
                "High urgency ticket not started after {} minutes",
                policy.unstarted_high_minutes
            ),
        });
    }

    if ticket.flags.requires_contractor {
        targets.push(EscalationTarget {
            role: EscalationRole::ContractorCoordinator,
            recipient: policy.contractor_coordinator.clone(),
            reason: "May require external contractor".to_string(),
        });
    }

    if ticket.flags.after_hours && high {
        targets.push(EscalationTarget {
            role: EscalationRole::EmergencyCoordinator,
            recipient: policy.emergency_coordinator.clone(),
            reason: "High urgency request received after business hours".to_string(),
        });
    }

    targets
}
