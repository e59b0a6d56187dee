mod common;

use chrono::Duration;
use common::{day_config, harness, local_account, t0, BrokenNotifier, FlakyStore};
use keygate_activation::{
    Account, AccountStore, ActivationConfig, ActivationError, ActivationState, ActivationWorkflow,
    LoginDenied, MemoryAccountStore, NotificationKind, Notifier, StoreError,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Barrier};
use std::thread;

// ── Construction ─────────────────────────────────────────────────

#[test]
fn new_requires_notifier_when_mailer_enabled() {
    let result = ActivationWorkflow::new(
        Arc::new(ActivationConfig::default()),
        Arc::new(MemoryAccountStore::new()),
        None,
    );
    assert!(matches!(result, Err(ActivationError::MailerMisconfigured(_))));
}

#[test]
fn new_without_notifier_when_mailer_disabled() {
    let config = ActivationConfig {
        mailer_disabled: true,
        ..Default::default()
    };
    let result = ActivationWorkflow::new(Arc::new(config), Arc::new(MemoryAccountStore::new()), None);
    assert!(result.is_ok());
}

#[test]
fn new_rejects_invalid_config() {
    let config = ActivationConfig {
        expiration_period: Some(Duration::seconds(-5)),
        mailer_disabled: true,
        ..Default::default()
    };
    let result = ActivationWorkflow::new(Arc::new(config), Arc::new(MemoryAccountStore::new()), None);
    assert!(matches!(result, Err(ActivationError::InvalidConfig(_))));
}

#[test]
fn register_fields_reaches_store() {
    let store = Arc::new(MemoryAccountStore::new());
    let config = ActivationConfig {
        mailer_disabled: true,
        ..Default::default()
    };
    let workflow = ActivationWorkflow::new(Arc::new(config.clone()), store.clone(), None).unwrap();
    workflow.register_fields().unwrap();
    assert_eq!(store.registered_fields(), Some(config.fields));
}

// ── on_account_create ────────────────────────────────────────────

#[test]
fn create_local_account_issues_token() {
    let h = harness(day_config());
    let mut account = local_account();

    h.workflow.on_account_create(&mut account).unwrap();

    assert_eq!(account.activation_state, Some(ActivationState::Pending));
    assert!(account.activation_token.is_some());
    assert_eq!(
        account.activation_token_expires_at,
        Some(account.created_at + Duration::hours(24))
    );

    let stored = h.store.find_by_id(account.id).unwrap().unwrap();
    assert_eq!(stored.activation_token, account.activation_token);
    assert_eq!(stored.activation_state, Some(ActivationState::Pending));
}

#[test]
fn create_sends_needed_notification_with_token() {
    let h = harness(day_config());
    let mut account = local_account();

    h.workflow.on_account_create(&mut account).unwrap();

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::ActivationNeeded);
    assert_eq!(sent[0].selector, "activation_needed_email");
    assert_eq!(sent[0].account_id, account.id);
    assert_eq!(sent[0].token, account.activation_token);
}

#[test]
fn create_external_account_is_untouched() {
    let h = harness(day_config());
    let mut account = Account::external("sso@example.com", "github");
    let before = account.clone();

    h.workflow.on_account_create(&mut account).unwrap();

    assert_eq!(account, before);
    assert!(h.notifier.sent().is_empty());
    assert!(h.store.inner.is_empty());
}

#[test]
fn create_without_password_is_untouched() {
    let h = harness(day_config());
    let mut account = Account::local("auto@example.com", "");
    let before = account.clone();

    h.workflow.on_account_create(&mut account).unwrap();

    assert_eq!(account, before);
    assert!(h.notifier.sent().is_empty());
}

#[test]
fn create_respects_skip_flag_once() {
    let h = harness(day_config());
    let mut account = local_account().without_activation_needed_email();

    h.workflow.on_account_create(&mut account).unwrap();

    assert!(h.notifier.sent().is_empty());
    assert!(account.activation_token.is_some());
    assert!(!account.skip_activation_needed_email);
}

#[test]
fn create_with_needed_selector_disabled() {
    let h = harness(ActivationConfig {
        activation_needed_email: None,
        ..day_config()
    });
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    assert!(h.notifier.sent().is_empty());
    assert!(account.is_pending());
}

#[test]
fn create_save_failure_sends_nothing_and_keeps_account() {
    let h = harness(day_config());
    h.store.fail_saves(true);
    let mut account = local_account();
    let before = account.clone();

    let result = h.workflow.on_account_create(&mut account);

    assert!(matches!(
        result,
        Err(ActivationError::Persistence(StoreError::Database(_)))
    ));
    assert_eq!(account, before);
    assert!(h.notifier.sent().is_empty());
}

#[test]
fn create_validation_failure_is_persistence_error() {
    let h = harness(day_config());
    let mut account = Account::local("not-an-email", "secret");
    let result = h.workflow.on_account_create(&mut account);
    assert!(matches!(
        result,
        Err(ActivationError::Persistence(StoreError::Validation(_)))
    ));
    assert!(h.notifier.sent().is_empty());
}

#[test]
fn notifier_failure_does_not_fail_create() {
    let store = Arc::new(FlakyStore::default());
    let workflow = ActivationWorkflow::new(
        Arc::new(day_config()),
        store.clone(),
        Some(Arc::new(BrokenNotifier) as Arc<dyn Notifier>),
    )
    .unwrap();
    let mut account = local_account();

    workflow.on_account_create(&mut account).unwrap();

    assert!(account.is_pending());
    assert!(store.find_by_id(account.id).unwrap().is_some());
}

// ── activate ─────────────────────────────────────────────────────

#[test]
fn activate_valid_token() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();

    let active = h.workflow.activate(&token).unwrap();

    assert_eq!(active.id, account.id);
    assert_eq!(active.activation_state, Some(ActivationState::Active));
    assert_eq!(active.activation_token, None);

    let stored = h.store.find_by_id(account.id).unwrap().unwrap();
    assert_eq!(stored.activation_state, Some(ActivationState::Active));
    assert_eq!(stored.activation_token, None);
}

#[test]
fn activate_twice_yields_not_found() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();

    h.workflow.activate(&token).unwrap();
    let second = h.workflow.activate(&token);

    assert!(matches!(second, Err(ActivationError::TokenNotFound)));
    assert_eq!(h.notifier.count(NotificationKind::ActivationSuccess), 1);
}

#[test]
fn activate_unknown_token() {
    let h = harness(day_config());
    assert!(matches!(
        h.workflow.activate("nope"),
        Err(ActivationError::TokenNotFound)
    ));
}

#[test]
fn activate_lookup_is_exact() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();

    let mangled = format!("{}x", token);
    assert!(matches!(
        h.workflow.activate(&mangled),
        Err(ActivationError::TokenNotFound)
    ));
    assert!(matches!(
        h.workflow.activate(&token[..token.len() - 1]),
        Err(ActivationError::TokenNotFound)
    ));
}

#[test]
fn activate_expired_token_leaves_account_alone() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();
    let stored_before = h.store.find_by_id(account.id).unwrap().unwrap();

    h.clock.advance(Duration::hours(25));
    let result = h.workflow.activate(&token);

    assert!(matches!(result, Err(ActivationError::TokenExpired { .. })));
    let stored_after = h.store.find_by_id(account.id).unwrap().unwrap();
    assert_eq!(stored_after, stored_before);
    assert_eq!(h.notifier.count(NotificationKind::ActivationSuccess), 0);
}

#[test]
fn activate_at_exact_expiry_succeeds() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();

    h.clock.set(t0() + Duration::hours(24));
    assert!(h.workflow.activate(&token).is_ok());
}

#[test]
fn never_expiring_token_activates_much_later() {
    let h = harness(ActivationConfig::default());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    assert_eq!(account.activation_token_expires_at, None);
    let token = account.activation_token.clone().unwrap();

    h.clock.advance(Duration::days(5 * 365));
    let active = h.workflow.activate(&token).unwrap();
    assert!(active.is_active());
}

#[test]
fn activate_store_failure_is_hard_error() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();
    h.notifier.drain();

    h.store.fail_saves(true);
    let result = h.workflow.activate(&token);

    assert!(matches!(result, Err(ActivationError::Persistence(_))));
    assert!(h.notifier.sent().is_empty());
    let stored = h.store.find_by_id(account.id).unwrap().unwrap();
    assert!(stored.is_pending());
}

#[test]
fn activate_account_failure_keeps_caller_copy() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();
    let before = account.clone();

    h.store.fail_saves(true);
    assert!(h.workflow.activate_account(&mut account, &token).is_err());
    assert_eq!(account, before);
}

#[test]
fn activate_skips_invalid_fields_validation() {
    // A record that would fail validation can still be activated.
    let h = harness(day_config());
    let mut account = Account::local("legacy-without-at", "secret");
    account.activation_state = Some(ActivationState::Pending);
    account.activation_token = Some("legacy-token".to_string());
    h.store
        .inner
        .save(&account, &keygate_activation::SaveOptions {
            validate: false,
            expect_token: None,
        })
        .unwrap();

    let active = h.workflow.activate("legacy-token").unwrap();
    assert!(active.is_active());
}

#[test]
fn activate_account_honors_success_skip_flag() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();
    h.notifier.drain();

    account.skip_activation_success_email = true;
    h.workflow.activate_account(&mut account, &token).unwrap();

    assert!(account.is_active());
    assert!(h.notifier.sent().is_empty());
    assert!(!account.skip_activation_success_email);
}

#[test]
fn notifier_failure_does_not_fail_activation() {
    let store = Arc::new(FlakyStore::default());
    let workflow = ActivationWorkflow::new(
        Arc::new(day_config()),
        store.clone(),
        Some(Arc::new(BrokenNotifier) as Arc<dyn Notifier>),
    )
    .unwrap();
    let mut account = local_account();
    workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();

    let active = workflow.activate(&token).unwrap();
    assert!(active.is_active());
    assert!(store.find_by_id(account.id).unwrap().unwrap().is_active());
}

#[test]
fn concurrent_activation_commits_once() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();
    h.notifier.drain();

    // Both callers already hold the pending record before either writes.
    let workflow = Arc::new(h.workflow);
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let workflow = Arc::clone(&workflow);
            let barrier = Arc::clone(&barrier);
            let mut copy = account.clone();
            let token = token.clone();
            thread::spawn(move || {
                barrier.wait();
                workflow.activate_account(&mut copy, &token)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(ActivationError::Persistence(StoreError::Conflict(_)))))
        .count();

    assert_eq!(ok, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(h.notifier.count(NotificationKind::ActivationSuccess), 1);
}

// ── load_from_activation_token ───────────────────────────────────

#[test]
fn load_from_token_does_not_mutate() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();

    let loaded = h.workflow.load_from_activation_token(&token).unwrap();
    assert_eq!(loaded.id, account.id);
    assert!(loaded.is_pending());
    assert!(h.store.find_by_id(account.id).unwrap().unwrap().is_pending());
}

#[test]
fn load_from_token_reports_expiry() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();

    h.clock.advance(Duration::days(2));
    assert!(matches!(
        h.workflow.load_from_activation_token(&token),
        Err(ActivationError::TokenExpired { .. })
    ));
}

// ── reissue_token ────────────────────────────────────────────────

#[test]
fn reissue_replaces_expired_token() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let old = account.activation_token.clone().unwrap();

    h.clock.advance(Duration::days(3));
    h.workflow.reissue_token(&mut account).unwrap();
    let new = account.activation_token.clone().unwrap();

    assert_ne!(old, new);
    assert_eq!(
        account.activation_token_expires_at,
        Some(t0() + Duration::days(3) + Duration::hours(24))
    );
    assert!(matches!(
        h.workflow.activate(&old),
        Err(ActivationError::TokenNotFound)
    ));
    assert!(h.workflow.activate(&new).unwrap().is_active());
    assert_eq!(h.notifier.count(NotificationKind::ActivationNeeded), 2);
}

#[test]
fn reissue_rejects_active_account() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();
    let mut active = h.workflow.activate(&token).unwrap();

    assert!(matches!(
        h.workflow.reissue_token(&mut active),
        Err(ActivationError::AlreadyActive)
    ));
    assert_eq!(active.activation_token, None);
}

#[test]
fn reissue_with_stale_copy_cannot_undo_activation() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let mut stale = account.clone();
    let token = account.activation_token.clone().unwrap();

    h.workflow.activate(&token).unwrap();
    let result = h.workflow.reissue_token(&mut stale);

    assert!(matches!(
        result,
        Err(ActivationError::Persistence(StoreError::Conflict(_)))
    ));
    assert_eq!(stale.activation_token.as_deref(), Some(token.as_str()));
    let stored = h.store.find_by_id(account.id).unwrap().unwrap();
    assert_eq!(stored.activation_state, Some(ActivationState::Active));
    assert_eq!(stored.activation_token, None);
    assert_eq!(h.notifier.count(NotificationKind::ActivationNeeded), 1);
}

#[test]
fn reissue_with_superseded_token_conflicts() {
    let h = harness(day_config());
    let mut account = local_account();
    h.workflow.on_account_create(&mut account).unwrap();
    let mut stale = account.clone();

    h.workflow.reissue_token(&mut account).unwrap();
    let current = account.activation_token.clone();

    assert!(matches!(
        h.workflow.reissue_token(&mut stale),
        Err(ActivationError::Persistence(StoreError::Conflict(_)))
    ));
    let stored = h.store.find_by_id(account.id).unwrap().unwrap();
    assert_eq!(stored.activation_token, current);
}

#[test]
fn reissue_rejects_account_outside_lifecycle() {
    let h = harness(day_config());
    let mut account = Account::external("sso@example.com", "github");
    assert!(matches!(
        h.workflow.reissue_token(&mut account),
        Err(ActivationError::NotApplicable)
    ));
}

// ── check_login_allowed ──────────────────────────────────────────

#[test]
fn login_gating_follows_config() {
    let strict = harness(day_config());
    let lenient = harness(ActivationConfig {
        prevent_non_active_login: false,
        ..day_config()
    });
    let mut account = local_account();
    strict.workflow.on_account_create(&mut account).unwrap();

    assert_eq!(
        strict.workflow.check_login_allowed(&account),
        Err(LoginDenied::Inactive)
    );
    assert_eq!(lenient.workflow.check_login_allowed(&account), Ok(()));
}

// ── End to end ───────────────────────────────────────────────────

#[test]
fn sign_up_activate_login() {
    let h = harness(day_config());
    let mut account = local_account();

    h.workflow.on_account_create(&mut account).unwrap();
    let token = account.activation_token.clone().unwrap();
    assert!(account.is_pending());
    assert_eq!(
        h.workflow.check_login_allowed(&account),
        Err(LoginDenied::Inactive)
    );

    let active = h.workflow.activate(&token).unwrap();
    assert!(active.is_active());
    assert_eq!(active.activation_token, None);
    assert_eq!(h.workflow.check_login_allowed(&active), Ok(()));

    let kinds: Vec<_> = h.notifier.sent().into_iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::ActivationNeeded,
            NotificationKind::ActivationSuccess
        ]
    );
    let success = &h.notifier.sent()[1];
    assert_eq!(success.selector, "activation_success_email");
    assert_eq!(success.token, None);
}
