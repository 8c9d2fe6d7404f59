//! Assignment resolution: (category, subcategory) → (group, assignee).

use serde::{Deserialize, Serialize};

use crate::tickets::model::TicketCategory;

/// Where a ticket is routed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub group: String,
    pub assignee: String,
}

impl Assignment {
    pub fn new(group: impl Into<String>, assignee: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            assignee: assignee.into(),
        }
    }
}

/// Category-level routing plus specialist assignee overrides.
///
/// Read-only once built. A specialist override only ever replaces the
/// assignee; the group always comes from the category row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentTable {
    by_category: Vec<(TicketCategory, Assignment)>,
    specialists: Vec<(String, String)>,
    default: Assignment,
}

impl Default for AssignmentTable {
    fn default() -> Self {
        use TicketCategory::*;

        Self {
            by_category: vec![
                (Maintenance, Assignment::new("Property Maintenance", "maintenance@property.com")),
                (Complaint, Assignment::new("Property Management", "manager@property.com")),
                (Payment, Assignment::new("Accounting", "accounting@property.com")),
                (Lease, Assignment::new("Leasing Office", "leasing@property.com")),
                (Amenity, Assignment::new("Property Maintenance", "maintenance@property.com")),
            ],
            specialists: vec![
                ("Plumbing".into(), "plumber@property.com".into()),
                ("Electrical".into(), "electrician@property.com".into()),
                ("HVAC".into(), "hvac@property.com".into()),
            ],
            default: Assignment::new("General Support", "support@property.com"),
        }
    }
}

impl AssignmentTable {
    /// An empty table routing everything to `default`.
    pub fn with_default(default: Assignment) -> Self {
        Self {
            by_category: Vec::new(),
            specialists: Vec::new(),
            default,
        }
    }

    /// Route a category to a group/assignee (replaces an existing row).
    pub fn route(mut self, category: TicketCategory, assignment: Assignment) -> Self {
        self.by_category.retain(|(c, _)| *c != category);
        self.by_category.push((category, assignment));
        self
    }

    /// Add a specialist assignee for a subcategory (replaces an existing row).
    pub fn specialist(mut self, subcategory: impl Into<String>, assignee: impl Into<String>) -> Self {
        let subcategory = subcategory.into();
        self.specialists.retain(|(s, _)| *s != subcategory);
        self.specialists.push((subcategory, assignee.into()));
        self
    }

    /// Resolve the assignment for a classified ticket. Total and idempotent.
    pub fn resolve(&self, category: TicketCategory, subcategory: &str) -> Assignment {
        let base = self
            .by_category
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, a)| a)
            .unwrap_or(&self.default);

        let assignee = self
            .specialists
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(subcategory))
            .map(|(_, assignee)| assignee.clone())
            .unwrap_or_else(|| base.assignee.clone());

        Assignment {
            group: base.group.clone(),
            assignee,
        }
    }
}
