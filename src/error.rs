//! Error types for tenant triage.

use std::time::Duration;

use uuid::Uuid;

use crate::tickets::model::TicketStatus;

/// Top-level error type for the triage core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ticket error: {0}")]
    Ticket(#[from] TicketError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Collaborator store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Ticket lifecycle errors. Always surfaced to the caller verbatim.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("Ticket {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TicketStatus,
        to: TicketStatus,
    },

    #[error("Ticket {id} not found")]
    NotFound { id: String },

    #[error("Ticket {id} is closed")]
    Closed { id: String },
}

/// Waiting-zone staging and selection errors.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("Entry {entry_id} already has a selected reply")]
    AlreadySelected { entry_id: Uuid },

    #[error("Entry {entry_id} expired before a reply was selected")]
    Expired { entry_id: Uuid },

    #[error("Cannot stage an empty candidate set for message {message_id}")]
    EmptyCandidateSet { message_id: String },
}

impl SelectionError {
    /// Whether this failure means "no selectable entry/candidate exists".
    ///
    /// Race losers and expired entries are reported the same way as unknown ids.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::AlreadySelected { .. } | Self::Expired { .. }
        )
    }
}

/// Strategy failures. Internal to the strategy runner; never propagated past it.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("Strategy {strategy} failed: {reason}")]
    Failed { strategy: String, reason: String },

    #[error("Strategy {strategy} timed out after {timeout:?}")]
    Timeout { strategy: String, timeout: Duration },

    #[error("Strategy {strategy} unavailable: {reason}")]
    Unavailable { strategy: String, reason: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Model {model} not available on provider {provider}")]
    ModelNotAvailable { provider: String, model: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Notification dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to send {template} notification to {recipient}: {reason}")]
    SendFailed {
        recipient: String,
        template: String,
        reason: String,
    },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Result type alias for the triage core.
pub type Result<T> = std::result::Result<T, Error>;
