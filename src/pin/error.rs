use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Debug, Error)]
pub enum PinError {
    /// The message kind or origin can never be replicated. Not retryable.
    #[error("message is not pinnable: {0}")]
    NotPinnable(String),
    #[error("no pin channel configured for guild {0}")]
    ChannelNotConfigured(u64),
    #[error("posting identity unavailable: {0}")]
    IdentityUnavailable(#[source] anyhow::Error),
    /// Messages sent before the failure are left in place.
    #[error("replication failed: {0}")]
    ReplicationFailed(#[source] anyhow::Error),
    /// The forwarded copy exists but is not recorded.
    #[error("pin was forwarded but could not be recorded: {0}")]
    LedgerWriteFailed(#[source] DatabaseError),
    #[error("platform request failed: {0}")]
    Platform(#[source] anyhow::Error),
    #[error(transparent)]
    Storage(#[from] DatabaseError),
    #[error("pin queue is closed")]
    QueueClosed,
}

impl PinError {
    pub fn not_pinnable(reason: impl Into<String>) -> Self {
        PinError::NotPinnable(reason.into())
    }
}
