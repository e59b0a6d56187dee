//! Activation workflow — orchestration over policy, store and notifier.
//!
//! Ordering guarantees:
//! - Tokens are only issued for accounts created with a local credential.
//! - Notifications go out only after the corresponding write succeeded.
//! - A failed write leaves the caller's account exactly as it was.
//! - Notifier failures are logged and never undo or fail an operation.

use crate::clock::{Clock, SystemClock};
use crate::config::ActivationConfig;
use crate::error::{ActivationError, ActivationResult, LoginDenied};
use crate::notify::{NotificationKind, Notifier};
use crate::policy::ActivationPolicy;
use crate::store::{AccountStore, SaveOptions};
use keygate_types::{Account, ActivationState};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Wires [`ActivationPolicy`] into account creation, activation and login.
pub struct ActivationWorkflow {
    config: Arc<ActivationConfig>,
    store: Arc<dyn AccountStore>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Arc<dyn Clock>,
}

impl ActivationWorkflow {
    /// Creates a workflow using the system clock.
    ///
    /// # Errors
    ///
    /// - [`ActivationError::MailerMisconfigured`] if notifications are enabled
    ///   but no notifier is supplied.
    /// - [`ActivationError::InvalidConfig`] if the config fails validation.
    pub fn new(
        config: Arc<ActivationConfig>,
        store: Arc<dyn AccountStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> ActivationResult<Self> {
        Self::with_clock(config, store, notifier, Arc::new(SystemClock))
    }

    /// Creates a workflow with a custom time source.
    pub fn with_clock(
        config: Arc<ActivationConfig>,
        store: Arc<dyn AccountStore>,
        notifier: Option<Arc<dyn Notifier>>,
        clock: Arc<dyn Clock>,
    ) -> ActivationResult<Self> {
        config.validate()?;

        if config.notifications_enabled() && notifier.is_none() {
            return Err(ActivationError::MailerMisconfigured(
                "a notifier is required unless mailer_disabled is set".to_string(),
            ));
        }

        Ok(Self {
            config,
            store,
            notifier,
            clock,
        })
    }

    /// Returns the frozen configuration.
    pub fn config(&self) -> &ActivationConfig {
        &self.config
    }

    /// Registers the activation columns with the store. Call once at start-up.
    pub fn register_fields(&self) -> ActivationResult<()> {
        self.store.define_fields(&self.config.fields)?;
        Ok(())
    }

    /// Post-creation hook.
    ///
    /// For accounts with a local credential: issues a token, saves the
    /// account, then sends "activation needed" if eligible. Accounts without
    /// one (federated or auto-created) are left untouched and not saved.
    pub fn on_account_create(&self, account: &mut Account) -> ActivationResult<()> {
        if !account.has_local_credential() {
            debug!(account_id = %account.id, "No local credential, activation skipped");
            return Ok(());
        }

        self.issue_and_save(account, &SaveOptions::validated())?;
        info!(
            account_id = %account.id,
            expires_at = ?account.activation_token_expires_at,
            "Activation token issued"
        );

        self.notify(NotificationKind::ActivationNeeded, account);
        account.skip_activation_needed_email = false;
        Ok(())
    }

    /// Replaces the token of a pending account and resends "activation needed".
    ///
    /// # Errors
    ///
    /// - [`ActivationError::AlreadyActive`] for active accounts.
    /// - [`ActivationError::NotApplicable`] for accounts outside the lifecycle.
    /// - [`ActivationError::Persistence`] with [`StoreError::Conflict`] if the
    ///   stored account no longer carries the caller's token, e.g. because it
    ///   was activated in the meantime. Nothing is written or sent.
    ///
    /// [`StoreError::Conflict`]: crate::StoreError::Conflict
    pub fn reissue_token(&self, account: &mut Account) -> ActivationResult<()> {
        match account.activation_state {
            Some(ActivationState::Pending) => {}
            Some(ActivationState::Active) => return Err(ActivationError::AlreadyActive),
            None => return Err(ActivationError::NotApplicable),
        }

        // An empty expectation never matches a stored token.
        let previous = account.activation_token.clone().unwrap_or_default();
        self.issue_and_save(account, &SaveOptions::reissue(previous))?;
        info!(account_id = %account.id, "Activation token reissued");

        self.notify(NotificationKind::ActivationNeeded, account);
        account.skip_activation_needed_email = false;
        Ok(())
    }

    /// Activates the account carrying `token`.
    ///
    /// # Errors
    ///
    /// - [`ActivationError::TokenNotFound`] if no account carries the token.
    /// - [`ActivationError::TokenExpired`] if it expired; nothing is modified.
    /// - [`ActivationError::Persistence`] if the write fails, including when
    ///   a concurrent activation consumed the token first.
    pub fn activate(&self, token: &str) -> ActivationResult<Account> {
        let mut account = self
            .store
            .find_by_activation_token(token)?
            .ok_or(ActivationError::TokenNotFound)?;
        self.activate_account(&mut account, token)?;
        Ok(account)
    }

    /// Activates an account the caller already located.
    ///
    /// Honors the account's `skip_activation_success_email` flag. On error
    /// the account is left unchanged.
    pub fn activate_account(&self, account: &mut Account, token: &str) -> ActivationResult<()> {
        let now = self.clock.now();
        if let Err(e) = ActivationPolicy::validate_token(token, account, now) {
            debug!(account_id = %account.id, "Activation rejected: {}", e);
            return Err(e);
        }

        let mut activated = account.clone();
        ActivationPolicy::mark_active(&mut activated);
        self.store.save(&activated, &SaveOptions::activation(token))?;
        *account = activated;
        info!(account_id = %account.id, "Account activated");

        self.notify(NotificationKind::ActivationSuccess, account);
        account.skip_activation_success_email = false;
        Ok(())
    }

    /// Finds the account carrying `token` and checks it has not expired,
    /// without changing anything.
    pub fn load_from_activation_token(&self, token: &str) -> ActivationResult<Account> {
        let account = self
            .store
            .find_by_activation_token(token)?
            .ok_or(ActivationError::TokenNotFound)?;
        ActivationPolicy::validate_token(token, &account, self.clock.now())?;
        Ok(account)
    }

    /// Login pre-check consulted before credentials are trusted.
    pub fn check_login_allowed(&self, account: &Account) -> Result<(), LoginDenied> {
        let result = ActivationPolicy::check_login(account, &self.config);
        if result.is_err() {
            debug!(account_id = %account.id, "Login refused for inactive account");
        }
        result
    }

    fn issue_and_save(&self, account: &mut Account, options: &SaveOptions) -> ActivationResult<()> {
        let mut issued = account.clone();
        ActivationPolicy::issue_token(&mut issued, &self.config, self.clock.now());
        self.store.save(&issued, options)?;
        *account = issued;
        Ok(())
    }

    fn notify(&self, kind: NotificationKind, account: &Account) {
        let Some(selector) = ActivationPolicy::notification_selector(kind, account, &self.config)
        else {
            debug!(account_id = %account.id, %kind, "Notification not eligible");
            return;
        };
        let Some(notifier) = &self.notifier else {
            return;
        };

        match notifier.send(kind, selector, account) {
            Ok(()) => debug!(account_id = %account.id, %kind, selector, "Notification dispatched"),
            Err(e) => warn!(account_id = %account.id, %kind, "Notification failed: {}", e),
        }
    }
}

impl std::fmt::Debug for ActivationWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationWorkflow")
            .field("config", &self.config)
            .field("has_notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}
