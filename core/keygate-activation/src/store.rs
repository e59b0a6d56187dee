//! Persistence seam and an in-memory implementation.

use crate::error::{StoreError, StoreResult};
use crate::fields::{ActivationField, ActivationFields};
use crate::token::tokens_equal;
use keygate_types::{Account, AccountId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// How a save is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// Run field validation before writing.
    pub validate: bool,
    /// Only write if the stored record still carries this activation token.
    /// A mismatch (or a missing record) fails with [`StoreError::Conflict`].
    pub expect_token: Option<String>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            validate: true,
            expect_token: None,
        }
    }
}

impl SaveOptions {
    /// Standard validating save.
    #[must_use]
    pub fn validated() -> Self {
        Self::default()
    }

    /// Options for committing an activation: skip field validation and
    /// compare-and-clear against the token that was presented.
    #[must_use]
    pub fn activation(token: impl Into<String>) -> Self {
        Self {
            validate: false,
            expect_token: Some(token.into()),
        }
    }

    /// Options for replacing a pending account's token: validate, and only
    /// write while the stored record still carries `previous`.
    #[must_use]
    pub fn reissue(previous: impl Into<String>) -> Self {
        Self {
            validate: true,
            expect_token: Some(previous.into()),
        }
    }
}

/// Account persistence as required by the workflow.
///
/// Implementations never persist the transient fields of [`Account`]
/// (the plaintext password and the skip flags).
pub trait AccountStore: Send + Sync {
    /// Registers the activation columns. Called once at start-up.
    fn define_fields(&self, fields: &ActivationFields) -> StoreResult<()>;

    /// Inserts or updates an account.
    fn save(&self, account: &Account, options: &SaveOptions) -> StoreResult<()>;

    /// Finds the account whose `field` equals `value` exactly.
    fn find_by_field(&self, field: ActivationField, value: &str) -> StoreResult<Option<Account>>;

    /// Loads an account by ID.
    fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Finds the account carrying `token`.
    fn find_by_activation_token(&self, token: &str) -> StoreResult<Option<Account>> {
        self.find_by_field(ActivationField::Token, token)
    }
}

/// Field validation shared by the bundled stores.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] for a missing or malformed email, or a
/// pending account without a token.
pub fn validate_account(account: &Account) -> StoreResult<()> {
    let email = account.email.trim();
    if email.is_empty() {
        return Err(StoreError::Validation("email must not be empty".to_string()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => {
            return Err(StoreError::Validation(format!(
                "email is not an address: {email}"
            )));
        }
    }
    if account.is_pending() && account.activation_token.is_none() {
        return Err(StoreError::Validation(
            "pending account must carry an activation token".to_string(),
        ));
    }
    Ok(())
}

/// Field value as the stores compare it in [`AccountStore::find_by_field`].
pub(crate) fn field_value(account: &Account, field: ActivationField) -> Option<String> {
    match field {
        ActivationField::State => account.activation_state.map(|s| s.as_str().to_string()),
        ActivationField::Token => account.activation_token.clone(),
        ActivationField::ExpiresAt => account.activation_token_expires_at.map(|t| t.to_rfc3339()),
    }
}

/// Volatile store backed by a map. The whole map sits behind one mutex, so
/// conditional writes are atomic.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<AccountId, Account>>,
    fields: Mutex<Option<ActivationFields>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the mapping registered through [`AccountStore::define_fields`].
    pub fn registered_fields(&self) -> Option<ActivationFields> {
        self.fields.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AccountId, Account>> {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AccountStore for MemoryAccountStore {
    fn define_fields(&self, fields: &ActivationFields) -> StoreResult<()> {
        fields
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        *self.fields.lock().unwrap_or_else(|e| e.into_inner()) = Some(fields.clone());
        debug!("Activation fields registered");
        Ok(())
    }

    fn save(&self, account: &Account, options: &SaveOptions) -> StoreResult<()> {
        if options.validate {
            validate_account(account)?;
        }

        let mut accounts = self.lock();

        if let Some(expected) = &options.expect_token {
            let current = accounts
                .get(&account.id)
                .and_then(|a| a.activation_token.as_deref());
            if !current.is_some_and(|t| tokens_equal(t, expected)) {
                return Err(StoreError::Conflict(format!(
                    "activation token for {} no longer matches",
                    account.id
                )));
            }
        }

        let mut stored = account.clone();
        stored.password = None;
        stored.reset_transient_flags();
        accounts.insert(account.id, stored);
        Ok(())
    }

    fn find_by_field(&self, field: ActivationField, value: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .lock()
            .values()
            .find(|a| field_value(a, field).as_deref() == Some(value))
            .cloned())
    }

    fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.lock().get(&id).cloned())
    }
}
