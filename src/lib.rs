//! Tenant triage: classifies tenant correspondence into service tickets and
//! drafts candidate replies for human selection.

pub mod config;
pub mod error;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod replies;
pub mod store;
pub mod tickets;
