//! Triage service: classifies inbound messages into tickets and drafts
//! replies into the waiting zone.
//!
//! **Core invariant: no reply leaves without a human selecting it.**
//! Drafted replies only ever land in the waiting zone; the only path to a
//! committed reply is `commit_selection`.
//!
//! Flow:
//! 1. Pattern matcher (pure, no LLM) → classification
//! 2. Assignment table → group + assignee
//! 3. Ticket opened, escalation checked, targets notified
//! 4. Strategy runner → candidates → waiting zone

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Rulebook, ZoneConfig};
use crate::error::{Error, SelectionError, StoreError, TicketError};
use crate::notify::{dispatch, Notification};
use crate::pipeline::assignment::Assignment;
use crate::pipeline::types::{ticket_flags, ClassificationResult, InboundMessage};
use crate::replies::model::{FinalReply, ReplyCandidate};
use crate::replies::runner::StrategyRunner;
use crate::replies::strategy::ReplyStrategy;
use crate::replies::zone::{WaitingZone, ZoneHooks};
use crate::store::traits::TicketStore;
use crate::tickets::model::{Ticket, TicketCategory, TicketStatus};
use crate::tickets::report::{self, TicketStatistics};
use crate::tickets::sla::{self, ComplianceResult, EscalationTarget};

/// Result of ingesting one message.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub ticket: Ticket,
    pub escalations: Vec<EscalationTarget>,
}

/// Candidates drafted for a message and the waiting-zone entry holding them.
#[derive(Debug, Clone, Serialize)]
pub struct DraftOutcome {
    pub entry_id: Uuid,
    pub candidates: Vec<ReplyCandidate>,
}

/// Wires rule tables, stores, the strategy runner and the waiting zone.
pub struct TriageService {
    rulebook: Arc<Rulebook>,
    tickets: Arc<dyn TicketStore>,
    hooks: ZoneHooks,
    runner: StrategyRunner,
    strategies: Vec<Arc<dyn ReplyStrategy>>,
    zone: Arc<WaitingZone>,
}

impl TriageService {
    pub fn new(
        rulebook: Arc<Rulebook>,
        tickets: Arc<dyn TicketStore>,
        hooks: ZoneHooks,
        runner: StrategyRunner,
        strategies: Vec<Arc<dyn ReplyStrategy>>,
        zone_config: ZoneConfig,
    ) -> Self {
        let zone = WaitingZone::new(zone_config, hooks.clone());
        Self {
            rulebook,
            tickets,
            hooks,
            runner,
            strategies,
            zone,
        }
    }

    pub fn zone(&self) -> Arc<WaitingZone> {
        Arc::clone(&self.zone)
    }

    // ── Pure operations ─────────────────────────────────────────────

    pub fn classify(&self, text: &str) -> ClassificationResult {
        self.rulebook.matcher.classify(text)
    }

    pub fn resolve_assignment(&self, category: TicketCategory, subcategory: &str) -> Assignment {
        self.rulebook.assignments.resolve(category, subcategory)
    }

    pub fn evaluate_sla(&self, ticket: &Ticket) -> ComplianceResult {
        sla::evaluate_sla(ticket, &self.rulebook.sla, Utc::now())
    }

    pub fn check_escalation(&self, ticket: &Ticket) -> Vec<EscalationTarget> {
        sla::check_escalation(ticket, &self.rulebook.escalation, Utc::now())
    }

    // ── Tickets ─────────────────────────────────────────────────────

    /// Classify a message, open its ticket and notify escalation targets.
    pub async fn ingest(&self, message: InboundMessage) -> Result<IngestOutcome, Error> {
        info!(
            id = %message.id,
            sender = %message.sender,
            "Processing inbound message"
        );
        self.hooks.messages.insert(&message).await?;

        let classification = self.classify(&message.content());
        debug!(
            id = %message.id,
            category = %classification.category,
            subcategory = %classification.subcategory,
            urgency = %classification.urgency,
            "Message classified"
        );
        let assignment =
            self.resolve_assignment(classification.category, &classification.subcategory);
        let flags = ticket_flags(
            &classification,
            message.received_at,
            &self.rulebook.business_hours,
        );

        let mut ticket = Ticket::open(&message, classification, assignment, flags);
        let escalations = self.check_escalation(&ticket);
        ticket.escalation_targets = escalations.clone();
        self.tickets.create(&ticket).await?;

        self.notify_escalations(&ticket, &escalations).await;

        Ok(IngestOutcome {
            ticket,
            escalations,
        })
    }

    async fn load(&self, ticket_id: &str) -> Result<Ticket, Error> {
        self.tickets
            .get(ticket_id)
            .await?
            .ok_or_else(|| {
                TicketError::NotFound {
                    id: ticket_id.to_string(),
                }
                .into()
            })
    }

    /// Move a ticket to `target`, persisting the result.
    pub async fn transition(
        &self,
        ticket_id: &str,
        target: TicketStatus,
        note: Option<String>,
    ) -> Result<Ticket, Error> {
        let mut ticket = self.load(ticket_id).await?;
        ticket.transition(target, note)?;
        self.tickets.update(&ticket).await?;
        Ok(ticket)
    }

    /// Hand a ticket to a different group/assignee.
    pub async fn reassign(&self, ticket_id: &str, assignment: Assignment) -> Result<Ticket, Error> {
        let mut ticket = self.load(ticket_id).await?;
        ticket.reassign(assignment)?;
        self.tickets.update(&ticket).await?;
        Ok(ticket)
    }

    /// Re-check escalation on every open ticket and notify targets not
    /// already raised. Returns the newly raised (ticket id, target) pairs.
    pub async fn sweep_escalations(&self) -> Result<Vec<(String, EscalationTarget)>, Error> {
        let mut raised = Vec::new();
        for mut ticket in self.tickets.all().await? {
            if !ticket.status.is_open() {
                continue;
            }
            let fresh: Vec<EscalationTarget> = self
                .check_escalation(&ticket)
                .into_iter()
                .filter(|t| !ticket.escalation_targets.iter().any(|e| e.role == t.role))
                .collect();
            if fresh.is_empty() {
                continue;
            }
            ticket.escalation_targets.extend(fresh.iter().cloned());
            self.tickets.update(&ticket).await?;
            self.notify_escalations(&ticket, &fresh).await;
            raised.extend(fresh.into_iter().map(|t| (ticket.id.clone(), t)));
        }
        Ok(raised)
    }

    async fn notify_escalations(&self, ticket: &Ticket, targets: &[EscalationTarget]) {
        for target in targets {
            warn!(
                ticket_id = %ticket.id,
                role = %target.role,
                recipient = %target.recipient,
                reason = %target.reason,
                "Escalation raised"
            );
            dispatch(
                self.hooks.notifier.as_ref(),
                Notification::escalation(ticket, target),
            )
            .await;
        }
    }

    pub async fn statistics(&self) -> Result<TicketStatistics, Error> {
        let tickets = self.tickets.all().await?;
        Ok(report::statistics(&tickets))
    }

    pub async fn requiring_attention(&self) -> Result<Vec<Ticket>, Error> {
        let tickets = self.tickets.all().await?;
        Ok(report::requiring_attention(&tickets, Utc::now())
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Ticket>, Error> {
        let tickets = self.tickets.all().await?;
        Ok(report::search(&tickets, query, limit)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Delete Closed tickets older than `days`. Returns how many went.
    pub async fn cleanup_closed(&self, days: i64) -> Result<usize, Error> {
        let now = Utc::now();
        let mut removed = 0;
        for ticket in self.tickets.by_status(TicketStatus::Closed).await? {
            if report::is_expired_closed(&ticket, days, now) && self.tickets.delete(&ticket.id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, days, "Cleaned up closed tickets");
        }
        Ok(removed)
    }

    // ── Replies ─────────────────────────────────────────────────────

    pub async fn generate_replies(
        &self,
        message: &InboundMessage,
        tenant_name: &str,
    ) -> Vec<ReplyCandidate> {
        self.runner.run(message, tenant_name, &self.strategies).await
    }

    pub async fn stage_for_selection(
        &self,
        message_id: &str,
        candidates: Vec<ReplyCandidate>,
    ) -> Result<Uuid, SelectionError> {
        self.zone.stage(message_id, candidates).await
    }

    pub async fn commit_selection(
        &self,
        entry_id: Uuid,
        candidate_id: Uuid,
        rating: Option<u8>,
        edited_text: Option<String>,
    ) -> Result<FinalReply, SelectionError> {
        self.zone
            .select(entry_id, candidate_id, rating, edited_text)
            .await
    }

    /// Draft replies for a stored message and stage them. Calling this again
    /// for the same message supersedes the previous pending entry.
    pub async fn draft_replies(&self, message_id: &str) -> Result<DraftOutcome, Error> {
        let message = self
            .hooks
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Message".to_string(),
                id: message_id.to_string(),
            })?;
        let tenant_name = message.tenant_name();

        let candidates = self.generate_replies(&message, &tenant_name).await;
        let entry_id = self
            .stage_for_selection(&message.id, candidates.clone())
            .await?;
        Ok(DraftOutcome {
            entry_id,
            candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use crate::notify::{RecordingNotifier, TEMPLATE_TICKET_ESCALATION};
    use crate::pipeline::location::UnitLocation;
    use crate::store::memory::MemoryStore;
    use crate::tickets::model::Urgency;
    use chrono::TimeZone;

    fn service() -> (TriageService, Arc<MemoryStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(MemoryStore::new());
        let notifier = RecordingNotifier::new();
        let hooks = ZoneHooks {
            store: store.clone(),
            replies: store.clone(),
            messages: store.clone(),
            notifier: notifier.clone(),
        };
        let service = TriageService::new(
            Arc::new(Rulebook::default()),
            store.clone(),
            hooks,
            StrategyRunner::new(RunnerConfig::default()),
            Vec::new(),
            ZoneConfig::default(),
        );
        (service, store, notifier)
    }

    fn at_hour(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn ingest_opens_ticket() {
        let (service, store, notifier) = service();
        let message = InboundMessage::new(
            "Jane Doe <jane@example.com>",
            Some("EMERGENCY gas leak in apt 4C".into()),
            "Please send someone now.",
        )
        .with_received_at(at_hour(10));

        let outcome = service.ingest(message).await.unwrap();
        let ticket = &outcome.ticket;
        assert_eq!(ticket.status, TicketStatus::New);
        assert_eq!(ticket.category, TicketCategory::Maintenance);
        assert_eq!(ticket.urgency, Urgency::High);
        assert_eq!(ticket.unit, UnitLocation::Unit("4C".into()));
        assert_eq!(ticket.property_id, "P4C0");
        assert!(ticket.id.starts_with("TKT-"));
        assert!(TicketStore::get(store.as_ref(), &ticket.id).await.unwrap().is_some());
        // Fresh high-urgency in-hours ticket: nothing to escalate yet.
        assert!(outcome.escalations.is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn after_hours_emergency_escalates() {
        let (service, _store, notifier) = service();
        let message = InboundMessage::new("jane@example.com", None, "Flooding emergency in unit 12")
            .with_received_at(at_hour(23));

        let outcome = service.ingest(message).await.unwrap();
        assert!(!outcome.escalations.is_empty());
        assert_eq!(outcome.ticket.escalation_targets, outcome.escalations);
        let sent = notifier.sent();
        assert_eq!(sent.len(), outcome.escalations.len());
        assert!(sent.iter().all(|n| n.template == TEMPLATE_TICKET_ESCALATION));
        assert!(sent.iter().any(|n| n.recipient == "emergency@property.com"));
    }

    #[tokio::test]
    async fn transition_persists_and_rejects() {
        let (service, _store, _) = service();
        let outcome = service
            .ingest(InboundMessage::new("a@b.com", None, "Broken window in unit 5B"))
            .await
            .unwrap();
        let id = outcome.ticket.id;

        let t = service
            .transition(&id, TicketStatus::InProgress, Some("on it".into()))
            .await
            .unwrap();
        assert!(t.started_at.is_some());

        let err = service.transition(&id, TicketStatus::New, None).await.unwrap_err();
        assert!(matches!(err, Error::Ticket(TicketError::InvalidTransition { .. })));

        let err = service.transition("TKT-NOPE", TicketStatus::Closed, None).await.unwrap_err();
        assert!(matches!(err, Error::Ticket(TicketError::NotFound { .. })));
    }

    #[tokio::test]
    async fn reporting_and_cleanup() {
        let (service, store, _) = service();
        let a = service
            .ingest(InboundMessage::new("a@b.com", None, "Noise complaint from neighbor"))
            .await
            .unwrap()
            .ticket;
        service
            .ingest(InboundMessage::new("c@d.com", None, "Question about my rent payment"))
            .await
            .unwrap();

        let stats = service.statistics().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.open, 2);
        assert_eq!(service.search("noise", 10).await.unwrap().len(), 1);

        let mut closed = service
            .transition(&a.id, TicketStatus::Closed, None)
            .await
            .unwrap();
        closed.closed_at = Some(Utc::now() - chrono::Duration::days(100));
        TicketStore::update(store.as_ref(), &closed).await.unwrap();

        assert_eq!(service.cleanup_closed(90).await.unwrap(), 1);
        assert_eq!(service.statistics().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn draft_replies_stages_template() {
        let (service, _store, _) = service();
        let message = InboundMessage::new("jane@example.com", Some("Rent".into()), "Late fee question")
            .with_id("m-7");
        service.ingest(message).await.unwrap();

        let drafted = service.draft_replies("m-7").await.unwrap();
        assert_eq!(drafted.candidates.len(), 1);
        assert!(drafted.candidates[0].content.starts_with("Dear Jane,"));

        let err = service.draft_replies("missing").await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn sweep_escalations_raises_once() {
        let (service, store, notifier) = service();
        let mut ticket = service
            .ingest(InboundMessage::new("a@b.com", None, "Gas leak in unit 7A").with_received_at(at_hour(10)))
            .await
            .unwrap()
            .ticket;
        ticket.created_at = Utc::now() - chrono::Duration::minutes(45);
        TicketStore::update(store.as_ref(), &ticket).await.unwrap();

        let raised = service.sweep_escalations().await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].1.recipient, "supervisor@property.com");
        assert!(service.sweep_escalations().await.unwrap().is_empty());
        assert_eq!(notifier.sent().len(), 1);
    }
}
