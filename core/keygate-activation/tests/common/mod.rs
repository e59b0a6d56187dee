//! Shared test helpers for activation tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use keygate_activation::{
    Account, AccountId, AccountStore, ActivationConfig, ActivationField, ActivationFields,
    ActivationWorkflow, FixedClock, MemoryAccountStore, NotificationKind, Notifier, NotifyError,
    RecordingNotifier, SaveOptions, StoreError, StoreResult,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fixed creation instant used across tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
}

/// Default config with a 24h token lifetime.
pub fn day_config() -> ActivationConfig {
    ActivationConfig::default().with_expiration_period(Duration::hours(24))
}

/// Everything a workflow test needs to poke at.
pub struct Harness {
    pub workflow: ActivationWorkflow,
    pub store: Arc<FlakyStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
}

pub fn harness(config: ActivationConfig) -> Harness {
    let store = Arc::new(FlakyStore::default());
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = Arc::new(FixedClock::new(t0()));
    let workflow = ActivationWorkflow::with_clock(
        Arc::new(config),
        store.clone(),
        Some(notifier.clone() as Arc<dyn Notifier>),
        clock.clone(),
    )
    .unwrap();
    Harness {
        workflow,
        store,
        notifier,
        clock,
    }
}

/// Memory store whose writes can be switched off.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryAccountStore,
    fail_saves: AtomicBool,
}

impl FlakyStore {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl AccountStore for FlakyStore {
    fn define_fields(&self, fields: &ActivationFields) -> StoreResult<()> {
        self.inner.define_fields(fields)
    }

    fn save(&self, account: &Account, options: &SaveOptions) -> StoreResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database("disk full".to_string()));
        }
        self.inner.save(account, options)
    }

    fn find_by_field(&self, field: ActivationField, value: &str) -> StoreResult<Option<Account>> {
        self.inner.find_by_field(field, value)
    }

    fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.find_by_id(id)
    }
}

/// Notifier that always fails.
pub struct BrokenNotifier;

impl Notifier for BrokenNotifier {
    fn send(&self, _: NotificationKind, _: &str, _: &Account) -> Result<(), NotifyError> {
        Err(NotifyError("smtp unreachable".to_string()))
    }
}

/// A locally-created account stamped with [`t0`].
pub fn local_account() -> Account {
    Account::local("ada@example.com", "secret").with_created_at(t0())
}
