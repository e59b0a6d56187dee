//! Notification dispatch seam.
//!
//! The workflow hands a kind, the configured selector and the account to a
//! [`Notifier`]. Delivery (mail templates, queues, SMTP) belongs to the host.

use crate::error::NotifyError;
use keygate_types::{Account, AccountId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Which activation notification is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A token was issued and the owner must act on it.
    ActivationNeeded,
    /// The account was activated.
    ActivationSuccess,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActivationNeeded => f.write_str("activation_needed"),
            Self::ActivationSuccess => f.write_str("activation_success"),
        }
    }
}

/// Delivers activation notifications.
///
/// Called only after the state change has been persisted. An `Err` is
/// logged by the workflow and otherwise ignored.
pub trait Notifier: Send + Sync {
    fn send(&self, kind: NotificationKind, selector: &str, account: &Account)
        -> Result<(), NotifyError>;
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentNotification {
    pub kind: NotificationKind,
    pub selector: String,
    pub account_id: AccountId,
    pub email: String,
    /// Token at dispatch time, so "needed" mails can carry the link.
    pub token: Option<String>,
}

/// Notifier that keeps every dispatch in memory. Acts as an outbox for
/// hosts that deliver asynchronously, and as a probe in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything sent so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of notifications of `kind` sent so far.
    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }

    /// Removes and returns everything sent so far.
    pub fn drain(&self) -> Vec<SentNotification> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Notifier for RecordingNotifier {
    fn send(
        &self,
        kind: NotificationKind,
        selector: &str,
        account: &Account,
    ) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentNotification {
                kind,
                selector: selector.to_string(),
                account_id: account.id,
                email: account.email.clone(),
                token: account.activation_token.clone(),
            });
        Ok(())
    }
}
