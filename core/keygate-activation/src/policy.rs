//! Activation policy — pure decisions without I/O.
//!
//! Every function takes the current time as an argument so expiry behaviour
//! is fully determined by its inputs. The workflow supplies `now` from its
//! [`Clock`](crate::Clock).

use crate::config::ActivationConfig;
use crate::error::{ActivationError, ActivationResult, LoginDenied};
use crate::notify::NotificationKind;
use crate::token::{tokens_equal, ActivationToken};
use chrono::{DateTime, Utc};
use keygate_types::{Account, ActivationState};

/// Token issuance, validation, state transition and login gating rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivationPolicy;

impl ActivationPolicy {
    /// Attaches a fresh token to `account` and moves it to `Pending`.
    ///
    /// The expiry is fixed here as `now + expiration_period`, or left
    /// `None` when no period is configured. Later config changes do not
    /// affect a token that was already issued.
    pub fn issue_token(
        account: &mut Account,
        config: &ActivationConfig,
        now: DateTime<Utc>,
    ) -> ActivationToken {
        let token = ActivationToken::generate();

        account.activation_token = Some(token.as_str().to_string());
        account.activation_state = Some(ActivationState::Pending);
        account.activation_token_expires_at = config
            .expiration_period
            .map(|period| now.checked_add_signed(period).unwrap_or(DateTime::<Utc>::MAX_UTC));

        token
    }

    /// Checks a presented token against the candidate account.
    ///
    /// # Errors
    ///
    /// - [`ActivationError::TokenNotFound`] if the account carries no token or
    ///   a different one (exact, case-sensitive match).
    /// - [`ActivationError::TokenExpired`] if the expiry is strictly before `now`.
    pub fn validate_token(
        token: &str,
        account: &Account,
        now: DateTime<Utc>,
    ) -> ActivationResult<()> {
        let stored = account
            .activation_token
            .as_deref()
            .ok_or(ActivationError::TokenNotFound)?;

        if !tokens_equal(stored, token) {
            return Err(ActivationError::TokenNotFound);
        }

        Self::check_expiry(account, now)
    }

    /// Expiry half of [`ActivationPolicy::validate_token`].
    pub fn check_expiry(account: &Account, now: DateTime<Utc>) -> ActivationResult<()> {
        match account.activation_token_expires_at {
            Some(expired_at) if expired_at < now => Err(ActivationError::TokenExpired { expired_at }),
            _ => Ok(()),
        }
    }

    /// Consumes the token and marks the account active.
    pub fn mark_active(account: &mut Account) {
        account.activation_token = None;
        account.activation_state = Some(ActivationState::Active);
    }

    /// Login pre-check. Has no opinion on whether the credentials are correct.
    ///
    /// Externally authenticated accounts never enter the lifecycle and are
    /// treated as active.
    pub fn check_login(account: &Account, config: &ActivationConfig) -> Result<(), LoginDenied> {
        if !config.prevent_non_active_login
            || account.is_active()
            || account.is_externally_authenticated()
        {
            Ok(())
        } else {
            Err(LoginDenied::Inactive)
        }
    }

    /// Returns the selector to dispatch `kind` with, or `None` if the
    /// notification must not be sent for this account.
    #[must_use]
    pub fn notification_selector<'a>(
        kind: NotificationKind,
        account: &Account,
        config: &'a ActivationConfig,
    ) -> Option<&'a str> {
        if account.is_externally_authenticated() || config.mailer_disabled {
            return None;
        }

        let (selector, skipped) = match kind {
            NotificationKind::ActivationNeeded => (
                &config.activation_needed_email,
                account.skip_activation_needed_email,
            ),
            NotificationKind::ActivationSuccess => (
                &config.activation_success_email,
                account.skip_activation_success_email,
            ),
        };

        if skipped {
            return None;
        }
        selector.as_deref()
    }
}
