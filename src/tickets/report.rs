//! Ticket reporting: statistics, attention lists, and search.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::tickets::model::{Ticket, TicketStatus, Urgency};

/// A New ticket older than this needs attention regardless of urgency.
const STALE_NEW_HOURS: i64 = 24;

/// Aggregate counts over a set of tickets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketStatistics {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_urgency: BTreeMap<String, usize>,
    pub open: usize,
    pub closed: usize,
}

pub fn statistics<'a>(tickets: impl IntoIterator<Item = &'a Ticket>) -> TicketStatistics {
    let mut stats = TicketStatistics::default();
    for ticket in tickets {
        stats.total += 1;
        *stats.by_status.entry(ticket.status.to_string()).or_default() += 1;
        *stats.by_category.entry(ticket.category.to_string()).or_default() += 1;
        *stats.by_urgency.entry(ticket.urgency.to_string()).or_default() += 1;
        if ticket.status.is_open() {
            stats.open += 1;
        } else {
            stats.closed += 1;
        }
    }
    stats
}

/// Open tickets that need someone to look at them now: High urgency, or
/// still New after a day.
pub fn requiring_attention<'a>(
    tickets: impl IntoIterator<Item = &'a Ticket>,
    now: DateTime<Utc>,
) -> Vec<&'a Ticket> {
    tickets
        .into_iter()
        .filter(|t| t.status.is_open())
        .filter(|t| {
            t.urgency == Urgency::High
                || (t.status == TicketStatus::New
                    && t.age_at(now) > Duration::hours(STALE_NEW_HOURS))
        })
        .collect()
}

/// Whether a ticket's text fields contain `query` (case-insensitive).
pub fn matches_query(ticket: &Ticket, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    [
        ticket.id.as_str(),
        ticket.short_description.as_str(),
        ticket.description.as_str(),
        ticket.category.as_str(),
        ticket.subcategory.as_str(),
        ticket.requested_for.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&query))
        || ticket.unit.to_string().to_lowercase().contains(&query)
}

/// Tickets matching `query`, at most `limit`.
pub fn search<'a>(
    tickets: impl IntoIterator<Item = &'a Ticket>,
    query: &str,
    limit: usize,
) -> Vec<&'a Ticket> {
    tickets
        .into_iter()
        .filter(|t| matches_query(t, query))
        .take(limit)
        .collect()
}

/// Closed tickets whose `closed_at` is older than `days` before `now`.
pub fn is_expired_closed(ticket: &Ticket, days: i64, now: DateTime<Utc>) -> bool {
    ticket.status == TicketStatus::Closed
        && ticket
            .closed_at
            .is_some_and(|closed| now.signed_duration_since(closed) > Duration::days(days))
}
