//! SQLite storage for Keygate accounts.
//!
//! Accounts live in a single `accounts` table. The three activation columns
//! are added by [`AccountStore::define_fields`] under the names configured in
//! [`ActivationFields`], so hosts can point the store at an existing schema.
//!
//! Activation commits use a conditional `UPDATE ... WHERE token = ?`, and the
//! token column carries a unique index. Together they make a token usable at
//! most once even when two requests race.
//!
//! [`AccountStore::define_fields`]: keygate_activation::AccountStore::define_fields
//! [`ActivationFields`]: keygate_activation::ActivationFields

mod sqlite;

pub use sqlite::SqliteAccountStore;
