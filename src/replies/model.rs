//! Reply data model: candidates, waiting-zone entries, committed replies, events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which family of strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Model answer grounded in retrieved policy snippets.
    Retrieval,
    /// Direct model answer.
    Model,
    /// Static template, no external calls.
    Template,
}

impl StrategyKind {
    /// Presentation rank: retrieval first, template last.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Retrieval => 0,
            Self::Model => 1,
            Self::Template => 2,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retrieval => write!(f, "retrieval"),
            Self::Model => write!(f, "model"),
            Self::Template => write!(f, "template"),
        }
    }
}

/// One drafted reply. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyCandidate {
    pub id: Uuid,
    pub message_id: String,
    /// Strategy name (e.g. "retrieval", "model:gpt-4o", "template").
    pub strategy: String,
    pub kind: StrategyKind,
    /// Provider/model that produced the text.
    pub provider: String,
    pub content: String,
    /// 0.0 to 1.0; informational only.
    pub confidence: f32,
    /// Position in the presented list, starting at 1.
    pub option_index: usize,
    pub created_at: DateTime<Utc>,
}

impl ReplyCandidate {
    pub fn new(
        message_id: impl Into<String>,
        strategy: impl Into<String>,
        kind: StrategyKind,
        provider: impl Into<String>,
        content: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id: message_id.into(),
            strategy: strategy.into(),
            kind,
            provider: provider.into(),
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            option_index: 0,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn with_option_index(mut self, option_index: usize) -> Self {
        self.option_index = option_index;
        self
    }
}

/// Status of a waiting-zone entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for a human to pick.
    PendingSelection,
    /// A candidate was committed. Terminal.
    Selected,
    /// Timed out or superseded by regeneration. Terminal.
    Expired,
}

/// Candidates for one message, held until a human picks one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingZoneEntry {
    pub id: Uuid,
    pub message_id: String,
    pub candidates: Vec<ReplyCandidate>,
    pub status: EntryStatus,
    pub selected_candidate_id: Option<Uuid>,
    pub rating: Option<u8>,
    pub edited_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WaitingZoneEntry {
    pub fn new(
        message_id: impl Into<String>,
        candidates: Vec<ReplyCandidate>,
        expire_minutes: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            message_id: message_id.into(),
            candidates,
            status: EntryStatus::PendingSelection,
            selected_candidate_id: None,
            rating: None,
            edited_text: None,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(i64::from(expire_minutes)),
            updated_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Pending and not past its deadline.
    pub fn is_selectable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::PendingSelection && !self.is_expired_at(now)
    }

    pub fn candidate(&self, candidate_id: Uuid) -> Option<&ReplyCandidate> {
        self.candidates.iter().find(|c| c.id == candidate_id)
    }
}

/// The reply a human committed, with audit fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReply {
    pub entry_id: Uuid,
    pub message_id: String,
    pub candidate_id: Uuid,
    pub strategy: String,
    pub provider: String,
    pub confidence: f32,
    /// Text that goes out: the edit if there was one, else the candidate.
    pub content: String,
    /// The candidate's text, kept only when it was edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    pub modified: bool,
    /// 1 to 5.
    pub rating: Option<u8>,
    pub selected_at: DateTime<Utc>,
}

impl FinalReply {
    pub(crate) fn commit(
        entry: &WaitingZoneEntry,
        candidate: &ReplyCandidate,
        rating: Option<u8>,
        edited_text: Option<String>,
    ) -> Self {
        let (content, original_content, modified) = match edited_text {
            Some(edit) => (edit, Some(candidate.content.clone()), true),
            None => (candidate.content.clone(), None, false),
        };
        Self {
            entry_id: entry.id,
            message_id: entry.message_id.clone(),
            candidate_id: candidate.id,
            strategy: candidate.strategy.clone(),
            provider: candidate.provider.clone(),
            confidence: candidate.confidence,
            content,
            original_content,
            modified,
            rating: rating.map(clamp_rating),
            selected_at: Utc::now(),
        }
    }
}

pub fn clamp_rating(rating: u8) -> u8 {
    rating.clamp(1, 5)
}

/// Waiting-zone events for subscribers (dashboards, sockets).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneEvent {
    Staged { entry: WaitingZoneEntry },
    Selected { entry_id: Uuid, candidate_id: Uuid },
    Expired { entry_id: Uuid },
}
