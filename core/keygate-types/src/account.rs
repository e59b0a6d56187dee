//! The account entity and its activation lifecycle.

use crate::{AccountId, Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Activation lifecycle of a locally-created account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    /// Token issued, waiting for the owner to prove control of the channel.
    Pending,
    /// Token consumed. Terminal.
    Active,
}

impl ActivationState {
    /// Returns the storage representation (`"pending"` / `"active"`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            other => Err(Error::InvalidState(other.to_string())),
        }
    }
}

/// A user account as seen by the activation workflow.
///
/// The host application owns the record. The activation core writes only
/// `activation_state`, `activation_token` and `activation_token_expires_at`,
/// and reads the credential fields through [`Account::has_local_credential`]
/// and [`Account::is_externally_authenticated`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID.
    pub id: AccountId,
    /// Address activation mail is delivered to.
    pub email: String,
    /// Local secret as supplied at sign-up. Never serialized.
    #[serde(skip)]
    pub password: Option<String>,
    /// Identity provider for federated accounts (e.g. `"github"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_provider: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// `None` for accounts that never entered the activation lifecycle.
    #[serde(default)]
    pub activation_state: Option<ActivationState>,
    #[serde(default)]
    pub activation_token: Option<String>,
    /// `None` means the token never expires.
    #[serde(default)]
    pub activation_token_expires_at: Option<DateTime<Utc>>,
    /// Suppresses the "activation needed" notification for one operation.
    #[serde(skip)]
    pub skip_activation_needed_email: bool,
    /// Suppresses the "activation succeeded" notification for one operation.
    #[serde(skip)]
    pub skip_activation_success_email: bool,
}

impl Account {
    /// Creates an account backed by a locally stored secret.
    pub fn local(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::bare(email.into())
        }
    }

    /// Creates an account whose credential comes from a third-party identity provider.
    pub fn external(email: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            external_provider: Some(provider.into()),
            ..Self::bare(email.into())
        }
    }

    fn bare(email: String) -> Self {
        Self {
            id: AccountId::new(),
            email,
            password: None,
            external_provider: None,
            created_at: Utc::now(),
            activation_state: None,
            activation_token: None,
            activation_token_expires_at: None,
            skip_activation_needed_email: false,
            skip_activation_success_email: false,
        }
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Suppresses the "activation needed" notification for the next operation.
    #[must_use]
    pub fn without_activation_needed_email(mut self) -> Self {
        self.skip_activation_needed_email = true;
        self
    }

    /// Suppresses the "activation succeeded" notification for the next operation.
    #[must_use]
    pub fn without_activation_success_email(mut self) -> Self {
        self.skip_activation_success_email = true;
        self
    }

    /// Returns true if the account was created with a non-empty local secret.
    #[must_use]
    pub fn has_local_credential(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Returns true if the credential originates from an external identity provider.
    #[must_use]
    pub fn is_externally_authenticated(&self) -> bool {
        self.external_provider.is_some()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.activation_state == Some(ActivationState::Active)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.activation_state == Some(ActivationState::Pending)
    }

    /// Clears the per-operation notification overrides.
    pub fn reset_transient_flags(&mut self) {
        self.skip_activation_needed_email = false;
        self.skip_activation_success_email = false;
    }

    /// Serializes the persistent fields to JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restores an account from [`Account::to_json`] output.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("external_provider", &self.external_provider)
            .field("created_at", &self.created_at)
            .field("activation_state", &self.activation_state)
            .field("activation_token", &self.activation_token.as_ref().map(|_| "[REDACTED]"))
            .field("activation_token_expires_at", &self.activation_token_expires_at)
            .field("skip_activation_needed_email", &self.skip_activation_needed_email)
            .field("skip_activation_success_email", &self.skip_activation_success_email)
            .finish()
    }
}
