//! In-memory implementation of every store trait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{MessageStatus, MessageStore, ReplyLog, TicketStore, WaitingZoneStore};
use crate::error::StoreError;
use crate::pipeline::types::InboundMessage;
use crate::replies::model::{FinalReply, WaitingZoneEntry};
use crate::tickets::model::{Ticket, TicketStatus, Urgency};

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tickets: RwLock<HashMap<String, Ticket>>,
    messages: RwLock<HashMap<String, (InboundMessage, MessageStatus)>>,
    entries: RwLock<HashMap<Uuid, WaitingZoneEntry>>,
    replies: RwLock<Vec<FinalReply>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn tickets_where(&self, pred: impl Fn(&Ticket) -> bool) -> Vec<Ticket> {
        let tickets = self.tickets.read().await;
        let mut found: Vec<Ticket> = tickets.values().filter(|t| pred(t)).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        found
    }
}

fn not_found(entity: &str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn create(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let mut tickets = self.tickets.write().await;
        if tickets.contains_key(&ticket.id) {
            return Err(StoreError::Query(format!("ticket {} already exists", ticket.id)));
        }
        tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    async fn update(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let mut tickets = self.tickets.write().await;
        let slot = tickets
            .get_mut(&ticket.id)
            .ok_or_else(|| not_found("Ticket", &ticket.id))?;
        *slot = ticket.clone();
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tickets.read().await.get(id).cloned())
    }

    async fn by_status(&self, status: TicketStatus) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.tickets_where(|t| t.status == status).await)
    }

    async fn by_urgency(&self, urgency: Urgency) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.tickets_where(|t| t.urgency == urgency).await)
    }

    async fn all(&self) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.tickets_where(|_| true).await)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.tickets.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: &InboundMessage) -> Result<(), StoreError> {
        self.messages
            .write()
            .await
            .insert(message.id.clone(), (message.clone(), MessageStatus::Pending));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<InboundMessage>, StoreError> {
        Ok(self.messages.read().await.get(id).map(|(m, _)| m.clone()))
    }

    async fn status(&self, id: &str) -> Result<Option<MessageStatus>, StoreError> {
        Ok(self.messages.read().await.get(id).map(|(_, s)| *s))
    }

    async fn update_status(&self, id: &str, status: MessageStatus) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        let (_, slot) = messages.get_mut(id).ok_or_else(|| not_found("Message", id))?;
        *slot = status;
        Ok(())
    }
}

#[async_trait]
impl WaitingZoneStore for MemoryStore {
    async fn save(&self, entry: &WaitingZoneEntry) -> Result<(), StoreError> {
        self.entries.write().await.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WaitingZoneEntry>, StoreError> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn by_message(&self, message_id: &str) -> Result<Vec<WaitingZoneEntry>, StoreError> {
        let entries = self.entries.read().await;
        let mut found: Vec<WaitingZoneEntry> = entries
            .values()
            .filter(|e| e.message_id == message_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }
}

#[async_trait]
impl ReplyLog for MemoryStore {
    async fn record(&self, reply: &FinalReply) -> Result<(), StoreError> {
        self.replies.write().await.push(reply.clone());
        Ok(())
    }

    async fn for_message(&self, message_id: &str) -> Result<Vec<FinalReply>, StoreError> {
        Ok(self
            .replies
            .read()
            .await
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect())
    }
}
