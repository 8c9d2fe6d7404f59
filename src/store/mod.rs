//! Collaborator stores the core reads and writes through.
//!
//! The core never prescribes a persistence engine; `MemoryStore` backs the
//! binary and the tests.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{MessageStatus, MessageStore, ReplyLog, TicketStore, WaitingZoneStore};
