//! Core type definitions for Keygate.
//!
//! This crate defines the account entity the activation workflow operates on:
//! - [`AccountId`] — time-ordered account identifier (UUID v7)
//! - [`ActivationState`] — the pending/active lifecycle
//! - [`Account`] — the record carrying credentials and activation fields
//!
//! Policy and orchestration live in `keygate-activation`; storage adapters
//! live in `keygate-store`.

mod account;
mod ids;

pub use account::{Account, ActivationState};
pub use ids::AccountId;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown activation state: {0}")]
    InvalidState(String),
}
