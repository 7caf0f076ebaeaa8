//! Contribution Engine Errors

use thiserror::Error;

/// Errors surfaced by the contribution engine to its callers.
///
/// None of these are retried internally. Retrying on serialization
/// conflicts belongs to whoever owns the surrounding transaction.
#[derive(Debug, Error)]
pub enum ContributionError {
    /// Unknown action name, or an action routed to the wrong award path
    /// (e.g. an upvote passed to content creation)
    #[error("invalid action kind: {0}")]
    InvalidActionKind(String),

    /// Actor has no ledger row
    #[error("user {0} has no contribution ledger")]
    UserNotFound(i64),

    /// Storage or surrounding transaction failed; nothing was persisted
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

impl ContributionError {
    /// Wrap a storage failure, naming the operation that failed
    pub fn aborted(operation: &str, err: impl std::fmt::Display) -> Self {
        ContributionError::TransactionAborted(format!("{}: {}", operation, err))
    }

    /// Caller errors that should not be retried
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ContributionError::InvalidActionKind(_) | ContributionError::UserNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ContributionError>;
