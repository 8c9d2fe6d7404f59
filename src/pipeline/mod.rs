//! Inbound message triage pipeline.
//!
//! Every tenant message flows through:
//! 1. `PatternMatcher::classify()`: keyword rules, no LLM
//! 2. `AssignmentTable::resolve()`: group + assignee
//! 3. `Ticket::open()`: a New ticket
//! 4. `check_escalation()`: escalation targets notified fire-and-forget
//!
//! Reply drafting runs alongside and ends in the waiting zone; **no reply is
//! sent without a human selecting it.**

pub mod assignment;
pub mod location;
pub mod processor;
pub mod rules;
pub mod types;
