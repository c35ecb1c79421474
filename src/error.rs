//! Error types shared by the engine and its capability implementations.

use thiserror::Error;

/// Failures the engine distinguishes from generic transport errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote rejected our credentials. Remote implementations must
    /// surface login failures as this variant so the engine can avoid
    /// touching folder bookkeeping.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Message count {count} for folder {folder}")]
    InvalidMessageCount { folder: String, count: i64 },
    #[error("message {uid} not found in folder {folder}")]
    MessageNotFound { folder: String, uid: String },
}

/// A single message that could not be fetched or parsed inside an otherwise
/// successful batch fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot fetch message {uid}: {reason}")]
pub struct FetchFailure {
    pub uid: String,
    pub reason: String,
}

impl FetchFailure {
    pub fn new(uid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            reason: reason.into(),
        }
    }
}

/// Whether any error in the chain is an authentication failure.
pub fn is_authentication_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<SyncError>(),
            Some(SyncError::AuthenticationFailed(_))
        )
    })
}

/// Short diagnostic for the innermost cause of an error, suitable for the
/// folder status column.
pub fn root_cause_message(err: &anyhow::Error) -> String {
    let root = err.root_cause();
    let message = root.to_string();
    if message.is_empty() {
        format!("{:?}", root)
    } else {
        message
    }
}
