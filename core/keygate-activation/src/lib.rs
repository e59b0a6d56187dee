//! Account activation for Keygate.
//!
//! This crate handles:
//! - Issuing single-use activation tokens when a local account is created
//! - Validating presented tokens against identity and expiry
//! - The one-way `Pending -> Active` transition
//! - Gating login on activation state
//!
//! # Components
//!
//! - [`ActivationPolicy`]: pure decisions over an [`Account`] and an
//!   [`ActivationConfig`]. No I/O.
//! - [`ActivationWorkflow`]: orchestration. Calls the policy, persists through
//!   an [`AccountStore`], and dispatches notifications through a [`Notifier`]
//!   only after the write has succeeded.
//!
//! # Concurrency
//!
//! All operations are synchronous and request-scoped. The configuration is
//! frozen once the workflow is built. Two callers presenting the same token
//! at the same time both pass validation; the store's conditional write
//! (see [`SaveOptions::activation`]) lets exactly one of them commit.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use keygate_activation::{ActivationConfig, ActivationWorkflow, MemoryAccountStore};
//! use keygate_types::Account;
//!
//! let config = ActivationConfig {
//!     mailer_disabled: true,
//!     ..Default::default()
//! };
//! let workflow = ActivationWorkflow::new(
//!     Arc::new(config),
//!     Arc::new(MemoryAccountStore::new()),
//!     None,
//! )
//! .unwrap();
//!
//! let mut account = Account::local("ada@example.com", "secret");
//! workflow.on_account_create(&mut account).unwrap();
//! assert!(workflow.check_login_allowed(&account).is_err());
//!
//! let token = account.activation_token.clone().unwrap();
//! let active = workflow.activate(&token).unwrap();
//! assert!(workflow.check_login_allowed(&active).is_ok());
//! ```

mod clock;
mod config;
mod error;
mod fields;
mod notify;
mod policy;
mod store;
mod token;
mod workflow;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ActivationConfig;
pub use error::{
    ActivationError, ActivationResult, LoginDenied, NotifyError, StoreError, StoreResult,
};
pub use fields::{ActivationField, ActivationFields, FieldType};
pub use notify::{NotificationKind, Notifier, RecordingNotifier, SentNotification};
pub use policy::ActivationPolicy;
pub use store::{validate_account, AccountStore, MemoryAccountStore, SaveOptions};
pub use token::{ActivationToken, TOKEN_BYTES, TOKEN_LEN};
pub use workflow::ActivationWorkflow;

pub use keygate_types::{Account, AccountId, ActivationState};
