//! Service tickets: data model, status lifecycle, SLA/escalation, reporting.

pub mod lifecycle;
pub mod model;
pub mod report;
pub mod sla;

pub use model::{Ticket, TicketCategory, TicketStatus, Urgency};
pub use sla::{ComplianceResult, EscalationPolicy, EscalationTarget, SlaTable};
