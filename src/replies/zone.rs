//! Waiting zone: holds drafted replies until a human picks one.
//!
//! Each entry sits behind its own mutex; selection is a check-and-flip on the
//! entry status under that mutex, so concurrent selects have exactly one
//! winner. Store writes, the reply log, message status and notifications all
//! happen after the mutex is released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ZoneConfig;
use crate::error::SelectionError;
use crate::notify::{dispatch, Notification, NotificationDispatcher};
use crate::replies::model::{
    clamp_rating, EntryStatus, FinalReply, ReplyCandidate, WaitingZoneEntry, ZoneEvent,
};
use crate::store::traits::{MessageStatus, MessageStore, ReplyLog, WaitingZoneStore};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// How often the background sweep expires overdue entries.
pub const EXPIRY_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Collaborators the zone writes through to.
#[derive(Clone)]
pub struct ZoneHooks {
    pub store: Arc<dyn WaitingZoneStore>,
    pub replies: Arc<dyn ReplyLog>,
    pub messages: Arc<dyn MessageStore>,
    pub notifier: Arc<dyn NotificationDispatcher>,
}

type Slot = Arc<Mutex<WaitingZoneEntry>>;

pub struct WaitingZone {
    entries: RwLock<HashMap<Uuid, Slot>>,
    tx: broadcast::Sender<ZoneEvent>,
    config: ZoneConfig,
    hooks: ZoneHooks,
}

impl WaitingZone {
    pub fn new(config: ZoneConfig, hooks: ZoneHooks) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            tx,
            config,
            hooks,
        })
    }

    /// Subscribe to staged/selected/expired events.
    pub fn subscribe(&self) -> broadcast::Receiver<ZoneEvent> {
        self.tx.subscribe()
    }

    /// Stage candidates for a message and return the new entry id.
    ///
    /// Any still-pending entry for the same message is superseded (expired).
    pub async fn stage(
        &self,
        message_id: &str,
        candidates: Vec<ReplyCandidate>,
    ) -> Result<Uuid, SelectionError> {
        if candidates.is_empty() {
            warn!(message_id = %message_id, "Refusing to stage empty candidate set");
            return Err(SelectionError::EmptyCandidateSet {
                message_id: message_id.to_string(),
            });
        }

        let entry = WaitingZoneEntry::new(message_id, candidates, self.config.expire_minutes);
        let entry_id = entry.id;
        let snapshot = entry.clone();

        let mut superseded = Vec::new();
        {
            let mut entries = self.entries.write().await;
            for slot in entries.values() {
                let mut existing = slot.lock().await;
                if existing.message_id == message_id
                    && existing.status == EntryStatus::PendingSelection
                {
                    existing.status = EntryStatus::Expired;
                    existing.updated_at = Utc::now();
                    superseded.push(existing.clone());
                }
            }
            entries.insert(entry_id, Arc::new(Mutex::new(entry)));
        }

        for old in &superseded {
            info!(entry_id = %old.id, message_id = %message_id, "Entry superseded by regeneration");
            self.persist(old).await;
            let _ = self.tx.send(ZoneEvent::Expired { entry_id: old.id });
        }

        info!(
            entry_id = %entry_id,
            message_id = %message_id,
            candidates = snapshot.candidates.len(),
            "Replies staged for selection"
        );
        self.persist(&snapshot).await;
        let _ = self.tx.send(ZoneEvent::Staged { entry: snapshot });

        Ok(entry_id)
    }

    /// Commit a human's pick.
    ///
    /// `edited_text`, when non-blank, replaces the candidate text and the
    /// original is kept on the returned reply.
    pub async fn select(
        &self,
        entry_id: Uuid,
        candidate_id: Uuid,
        rating: Option<u8>,
        edited_text: Option<String>,
    ) -> Result<FinalReply, SelectionError> {
        let slot = self.slot(entry_id).await.ok_or_else(|| SelectionError::NotFound {
            entity: "Entry".to_string(),
            id: entry_id.to_string(),
        })?;
        let edited_text = edited_text.filter(|t| !t.trim().is_empty());

        let (reply, snapshot) = {
            let mut entry = slot.lock().await;
            match entry.status {
                EntryStatus::Selected => {
                    debug!(entry_id = %entry_id, "Entry already selected");
                    return Err(SelectionError::AlreadySelected { entry_id });
                }
                EntryStatus::Expired => return Err(SelectionError::Expired { entry_id }),
                EntryStatus::PendingSelection => {}
            }

            let now = Utc::now();
            if entry.is_expired_at(now) {
                entry.status = EntryStatus::Expired;
                entry.updated_at = now;
                let expired = entry.clone();
                drop(entry);
                self.persist(&expired).await;
                let _ = self.tx.send(ZoneEvent::Expired { entry_id });
                return Err(SelectionError::Expired { entry_id });
            }

            let candidate = entry
                .candidate(candidate_id)
                .cloned()
                .ok_or_else(|| SelectionError::NotFound {
                    entity: "Candidate".to_string(),
                    id: candidate_id.to_string(),
                })?;

            let reply = FinalReply::commit(&entry, &candidate, rating, edited_text.clone());
            entry.status = EntryStatus::Selected;
            entry.selected_candidate_id = Some(candidate_id);
            entry.rating = rating.map(clamp_rating);
            entry.edited_text = edited_text;
            entry.updated_at = now;
            (reply, entry.clone())
        };

        info!(
            entry_id = %entry_id,
            candidate_id = %candidate_id,
            strategy = %reply.strategy,
            modified = reply.modified,
            "Reply selected"
        );
        let _ = self.tx.send(ZoneEvent::Selected {
            entry_id,
            candidate_id,
        });

        self.persist(&snapshot).await;
        self.after_commit(&reply).await;
        Ok(reply)
    }

    /// Log the reply, mark the message responded, tell the tenant.
    async fn after_commit(&self, reply: &FinalReply) {
        if let Err(e) = self.hooks.replies.record(reply).await {
            error!(entry_id = %reply.entry_id, error = %e, "Failed to record committed reply");
        }
        if let Err(e) = self
            .hooks
            .messages
            .update_status(&reply.message_id, MessageStatus::Responded)
            .await
        {
            error!(message_id = %reply.message_id, error = %e, "Failed to mark message responded");
        }
        match self.hooks.messages.get(&reply.message_id).await {
            Ok(Some(message)) => {
                let notification =
                    Notification::reply_sent(&message.sender, message.subject_or_default(), reply);
                dispatch(self.hooks.notifier.as_ref(), notification).await;
            }
            Ok(None) => warn!(message_id = %reply.message_id, "No message to notify about"),
            Err(e) => warn!(message_id = %reply.message_id, error = %e, "Message lookup failed"),
        }
    }

    async fn persist(&self, entry: &WaitingZoneEntry) {
        if let Err(e) = self.hooks.store.save(entry).await {
            warn!(entry_id = %entry.id, error = %e, "Failed to persist waiting-zone entry");
        }
    }

    async fn slot(&self, entry_id: Uuid) -> Option<Slot> {
        self.entries.read().await.get(&entry_id).cloned()
    }

    async fn snapshots(&self) -> Vec<WaitingZoneEntry> {
        let slots: Vec<Slot> = self.entries.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.lock().await.clone());
        }
        out.sort_by_key(|e| e.created_at);
        out
    }

    /// Look up an entry, falling back to the store for pruned history.
    pub async fn get(&self, entry_id: Uuid) -> Option<WaitingZoneEntry> {
        if let Some(slot) = self.slot(entry_id).await {
            return Some(slot.lock().await.clone());
        }
        match self.hooks.store.get(entry_id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(entry_id = %entry_id, error = %e, "Entry lookup failed");
                None
            }
        }
    }

    /// The newest entry for a message, falling back to the store for pruned history.
    pub async fn entry_for_message(&self, message_id: &str) -> Option<WaitingZoneEntry> {
        let in_memory = self
            .snapshots()
            .await
            .into_iter()
            .rev()
            .find(|e| e.message_id == message_id);
        if in_memory.is_some() {
            return in_memory;
        }
        match self.hooks.store.by_message(message_id).await {
            Ok(entries) => entries.into_iter().max_by_key(|e| e.created_at),
            Err(e) => {
                warn!(message_id = %message_id, error = %e, "Entry lookup by message failed");
                None
            }
        }
    }

    /// Entries still open for selection, oldest first.
    pub async fn pending(&self) -> Vec<WaitingZoneEntry> {
        let now = Utc::now();
        self.snapshots()
            .await
            .into_iter()
            .filter(|e| e.is_selectable_at(now))
            .collect()
    }

    /// Total entries held in memory (all statuses).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Expire overdue entries and prune old settled ones.
    /// Returns the number of entries expired.
    pub async fn expire_old(&self) -> usize {
        let now = Utc::now();
        let slots: Vec<Slot> = self.entries.read().await.values().cloned().collect();

        let mut expired = Vec::new();
        for slot in slots {
            let mut entry = slot.lock().await;
            if entry.status == EntryStatus::PendingSelection && entry.is_expired_at(now) {
                entry.status = EntryStatus::Expired;
                entry.updated_at = now;
                expired.push(entry.clone());
            }
        }

        for entry in &expired {
            debug!(entry_id = %entry.id, "Entry expired");
            self.persist(entry).await;
            let _ = self.tx.send(ZoneEvent::Expired { entry_id: entry.id });
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired waiting-zone entries");
        }

        self.prune_history().await;
        expired.len()
    }

    /// Drop the oldest settled entries beyond `history_limit`; the store keeps them.
    async fn prune_history(&self) {
        let settled: Vec<(Uuid, chrono::DateTime<Utc>)> = self
            .snapshots()
            .await
            .into_iter()
            .filter(|e| e.status != EntryStatus::PendingSelection)
            .map(|e| (e.id, e.updated_at))
            .collect();
        let excess = settled.len().saturating_sub(self.config.history_limit);
        if excess == 0 {
            return;
        }
        let mut settled = settled;
        settled.sort_by_key(|(_, at)| *at);
        let mut entries = self.entries.write().await;
        for (id, _) in settled.into_iter().take(excess) {
            entries.remove(&id);
        }
        debug!(pruned = excess, "Pruned settled waiting-zone entries");
    }
}

/// Spawn a background task that periodically expires old entries.
pub fn spawn_expiry_task(zone: Arc<WaitingZone>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            zone.expire_old().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::pipeline::types::InboundMessage;
    use crate::replies::model::StrategyKind;
    use crate::store::memory::MemoryStore;

    struct Fixture {
        zone: Arc<WaitingZone>,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
    }

    async fn fixture(config: ZoneConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = RecordingNotifier::new();
        let message = InboundMessage::new("Jane Doe <jane@example.com>", Some("Leak".into()), "Sink leak")
            .with_id("msg-1");
        MessageStore::insert(store.as_ref(), &message).await.unwrap();
        let zone = WaitingZone::new(
            config,
            ZoneHooks {
                store: store.clone(),
                replies: store.clone(),
                messages: store.clone(),
                notifier: notifier.clone(),
            },
        );
        Fixture {
            zone,
            store,
            notifier,
        }
    }

    fn candidates() -> Vec<ReplyCandidate> {
        vec![
            ReplyCandidate::new("msg-1", "model:a", StrategyKind::Model, "a", "reply a", 0.8),
            ReplyCandidate::new("msg-1", "template", StrategyKind::Template, "t", "reply t", 0.75),
        ]
    }

    #[tokio::test]
    async fn stage_empty_fails() {
        let f = fixture(ZoneConfig::default()).await;
        let err = f.zone.stage("msg-1", vec![]).await.unwrap_err();
        assert!(matches!(err, SelectionError::EmptyCandidateSet { .. }));
        assert!(f.zone.is_empty().await);
    }

    #[tokio::test]
    async fn select_commits_once() {
        let f = fixture(ZoneConfig::default()).await;
        let cands = candidates();
        let pick = cands[0].id;
        let entry_id = f.zone.stage("msg-1", cands).await.unwrap();
        assert_eq!(f.zone.pending().await.len(), 1);

        let reply = f.zone.select(entry_id, pick, Some(4), None).await.unwrap();
        assert_eq!(reply.content, "reply a");
        assert!(!reply.modified);

        let again = f.zone.select(entry_id, pick, None, None).await.unwrap_err();
        assert!(matches!(again, SelectionError::AlreadySelected { .. }));
        assert!(again.is_not_found());

        let entry = f.zone.get(entry_id).await.unwrap();
        assert_eq!(entry.status, EntryStatus::Selected);
        assert_eq!(entry.selected_candidate_id, Some(pick));
        assert!(f.zone.pending().await.is_empty());

        assert_eq!(f.store.status("msg-1").await.unwrap(), Some(MessageStatus::Responded));
        assert_eq!(f.store.for_message("msg-1").await.unwrap().len(), 1);
        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "Jane Doe <jane@example.com>");
        assert_eq!(sent[0].body, "reply a");
    }

    #[tokio::test]
    async fn edited_selection_keeps_original() {
        let f = fixture(ZoneConfig::default()).await;
        let cands = candidates();
        let pick = cands[1].id;
        let entry_id = f.zone.stage("msg-1", cands).await.unwrap();

        let reply = f
            .zone
            .select(entry_id, pick, None, Some("custom text".into()))
            .await
            .unwrap();
        assert!(reply.modified);
        assert_eq!(reply.content, "custom text");
        assert_eq!(reply.original_content.as_deref(), Some("reply t"));
        let entry = f.zone.get(entry_id).await.unwrap();
        assert_eq!(entry.edited_text.as_deref(), Some("custom text"));
    }

    #[tokio::test]
    async fn blank_edit_is_ignored() {
        let f = fixture(ZoneConfig::default()).await;
        let cands = candidates();
        let pick = cands[0].id;
        let entry_id = f.zone.stage("msg-1", cands).await.unwrap();
        let reply = f.zone.select(entry_id, pick, None, Some("   ".into())).await.unwrap();
        assert!(!reply.modified);
        assert_eq!(reply.content, "reply a");
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let f = fixture(ZoneConfig::default()).await;
        let entry_id = f.zone.stage("msg-1", candidates()).await.unwrap();

        let err = f.zone.select(Uuid::new_v4(), Uuid::new_v4(), None, None).await.unwrap_err();
        assert!(matches!(err, SelectionError::NotFound { .. }));

        let err = f.zone.select(entry_id, Uuid::new_v4(), None, None).await.unwrap_err();
        assert!(matches!(err, SelectionError::NotFound { .. }));
        // A bad candidate id does not consume the entry.
        assert_eq!(f.zone.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn expired_entry_cannot_be_selected() {
        let f = fixture(ZoneConfig {
            expire_minutes: 0,
            ..ZoneConfig::default()
        })
        .await;
        let cands = candidates();
        let pick = cands[0].id;
        let entry_id = f.zone.stage("msg-1", cands).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let err = f.zone.select(entry_id, pick, None, None).await.unwrap_err();
        assert!(matches!(err, SelectionError::Expired { .. }));
        assert_eq!(f.zone.get(entry_id).await.unwrap().status, EntryStatus::Expired);
    }

    #[tokio::test]
    async fn sweep_expires_overdue_entries() {
        let f = fixture(ZoneConfig {
            expire_minutes: 0,
            ..ZoneConfig::default()
        })
        .await;
        let mut rx = f.zone.subscribe();
        f.zone.stage("msg-1", candidates()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(f.zone.expire_old().await, 1);
        assert_eq!(f.zone.expire_old().await, 0);
        assert!(matches!(rx.recv().await.unwrap(), ZoneEvent::Staged { .. }));
        assert!(matches!(rx.recv().await.unwrap(), ZoneEvent::Expired { .. }));
    }

    #[tokio::test]
    async fn regeneration_supersedes_pending_entry() {
        let f = fixture(ZoneConfig::default()).await;
        let first = f.zone.stage("msg-1", candidates()).await.unwrap();
        let second = f.zone.stage("msg-1", candidates()).await.unwrap();

        assert_eq!(f.zone.get(first).await.unwrap().status, EntryStatus::Expired);
        let latest = f.zone.entry_for_message("msg-1").await.unwrap();
        assert_eq!(latest.id, second);
        let pending = f.zone.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second);
    }

    #[tokio::test]
    async fn pruned_history_still_readable_from_store() {
        let f = fixture(ZoneConfig {
            history_limit: 0,
            ..ZoneConfig::default()
        })
        .await;
        let cands = candidates();
        let pick = cands[0].id;
        let entry_id = f.zone.stage("msg-1", cands).await.unwrap();
        f.zone.select(entry_id, pick, None, None).await.unwrap();

        f.zone.expire_old().await;
        assert!(f.zone.is_empty().await);
        assert_eq!(f.zone.get(entry_id).await.unwrap().status, EntryStatus::Selected);

        let by_message = f.zone.entry_for_message("msg-1").await.unwrap();
        assert_eq!(by_message.id, entry_id);
        assert!(f.zone.entry_for_message("msg-unknown").await.is_none());
    }

    async fn backdate(zone: &WaitingZone, entry_id: Uuid) {
        let slot = zone.slot(entry_id).await.unwrap();
        slot.lock().await.expires_at = Utc::now() - chrono::Duration::minutes(1);
    }

    async fn wait_for_expiry(rx: &mut broadcast::Receiver<ZoneEvent>, entry_id: Uuid) {
        loop {
            if let ZoneEvent::Expired { entry_id: id } = rx.recv().await.unwrap() {
                if id == entry_id {
                    return;
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_sweeps_every_interval() {
        let f = fixture(ZoneConfig::default()).await;
        let mut rx = f.zone.subscribe();
        let start = tokio::time::Instant::now();

        let first = f.zone.stage("msg-1", candidates()).await.unwrap();
        backdate(&f.zone, first).await;
        let task = spawn_expiry_task(f.zone.clone());
        tokio::time::timeout(EXPIRY_SWEEP_INTERVAL * 2, wait_for_expiry(&mut rx, first))
            .await
            .unwrap();

        // Staged after the first sweep finished, so only a later tick can expire it.
        let second = f.zone.stage("msg-2", candidates()).await.unwrap();
        backdate(&f.zone, second).await;
        tokio::time::timeout(EXPIRY_SWEEP_INTERVAL * 2, wait_for_expiry(&mut rx, second))
            .await
            .unwrap();

        assert!(start.elapsed() >= EXPIRY_SWEEP_INTERVAL);
        assert_eq!(f.zone.get(second).await.unwrap().status, EntryStatus::Expired);
        task.abort();
    }
}
