//! Reply drafting and human selection.
//!
//! `StrategyRunner` drafts candidates from several strategies at once;
//! `WaitingZone` holds them until someone commits one.

pub mod knowledge;
pub mod model;
pub mod runner;
pub mod strategy;
pub mod zone;

pub use knowledge::{InMemoryKnowledge, KnowledgeStore};
pub use model::{EntryStatus, FinalReply, ReplyCandidate, StrategyKind, WaitingZoneEntry, ZoneEvent};
pub use runner::StrategyRunner;
pub use strategy::{ReplyStrategy, StrategyOutput};
pub use zone::{spawn_expiry_task, WaitingZone, ZoneHooks};
