//! Backend-agnostic store traits for tickets, messages, waiting-zone entries
//! and committed replies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::pipeline::types::InboundMessage;
use crate::replies::model::{FinalReply, WaitingZoneEntry};
use crate::tickets::model::{Ticket, TicketStatus, Urgency};

/// Status of a tracked inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Awaiting reply.
    Pending,
    /// A selected reply was committed.
    Responded,
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a new ticket. Fails if the id already exists.
    async fn create(&self, ticket: &Ticket) -> Result<(), StoreError>;

    /// Replace a stored ticket. Fails if it does not exist.
    async fn update(&self, ticket: &Ticket) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Ticket>, StoreError>;

    /// Oldest first.
    async fn by_status(&self, status: TicketStatus) -> Result<Vec<Ticket>, StoreError>;

    /// Oldest first.
    async fn by_urgency(&self, urgency: Urgency) -> Result<Vec<Ticket>, StoreError>;

    /// Every ticket, oldest first.
    async fn all(&self) -> Result<Vec<Ticket>, StoreError>;

    /// Returns whether a ticket was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: &InboundMessage) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<InboundMessage>, StoreError>;

    /// Sender identity of a stored message.
    async fn sender(&self, id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(id).await?.map(|m| m.sender))
    }

    async fn status(&self, id: &str) -> Result<Option<MessageStatus>, StoreError>;

    async fn update_status(&self, id: &str, status: MessageStatus) -> Result<(), StoreError>;
}

#[async_trait]
pub trait WaitingZoneStore: Send + Sync {
    /// Insert or replace an entry.
    async fn save(&self, entry: &WaitingZoneEntry) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<WaitingZoneEntry>, StoreError>;

    /// Entries for a message, oldest first.
    async fn by_message(&self, message_id: &str) -> Result<Vec<WaitingZoneEntry>, StoreError>;
}

/// Sink for committed replies.
#[async_trait]
pub trait ReplyLog: Send + Sync {
    async fn record(&self, reply: &FinalReply) -> Result<(), StoreError>;

    async fn for_message(&self, message_id: &str) -> Result<Vec<FinalReply>, StoreError>;
}
