//! Error types for the activation module.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Activation-specific errors.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// No account carries the presented token. Worded like a bad credential
    /// so callers do not leak whether an account exists.
    #[error("invalid activation token")]
    TokenNotFound,

    /// Token recognized but past its validity window.
    #[error("activation token expired at {expired_at}")]
    TokenExpired {
        /// When the token stopped being valid.
        expired_at: DateTime<Utc>,
    },

    /// Notifications are enabled but nothing can deliver them.
    #[error("mailer misconfigured: {0}")]
    MailerMisconfigured(String),

    /// Configuration rejected at start-up.
    #[error("invalid activation config: {0}")]
    InvalidConfig(String),

    /// The account already completed activation.
    #[error("account is already active")]
    AlreadyActive,

    /// The account never entered the activation lifecycle.
    #[error("account is not subject to activation")]
    NotApplicable,

    /// The store rejected or failed the write.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for activation operations.
pub type ActivationResult<T> = Result<T, ActivationError>;

/// Errors surfaced by an [`AccountStore`](crate::AccountStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure.
    #[error("database error: {0}")]
    Database(String),

    /// Field validation rejected the record.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A conditional write found the record changed underneath it.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a [`Notifier`](crate::Notifier). Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Why the login pre-check refused an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoginDenied {
    /// The account has not completed activation.
    #[error("account is not activated")]
    Inactive,
}
