//! Error types for the core library.

use chatsweep_remote::{AccountId, ChatId};
use thiserror::Error;

/// Errors that can occur in core operations.
///
/// Expected remote outcomes (a message that still exists after a delete, a
/// partially failed batch, a failed connect) are returned as results, not as
/// errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote service call failed.
    #[error("Remote error: {0}")]
    Remote(#[from] chatsweep_remote::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The chat is not part of the scan table.
    #[error("Unknown chat: {0}")]
    UnknownChat(ChatId),

    /// The operation needs a running scan job.
    #[error("No scan job has been started")]
    NotStarted,

    /// Another scan job is already active for the account.
    #[error("A scan job is already active for account {0}")]
    AlreadyActive(AccountId),

    /// The operation is not valid in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
