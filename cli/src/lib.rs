//! Wiring shared by the `keygate` binary: config loading, the log-backed
//! notifier, and the store/workflow setup.

use anyhow::{Context, Result};
use keygate_activation::{
    ActivationConfig, ActivationWorkflow, NotificationKind, Notifier, NotifyError,
};
use keygate_store::SqliteAccountStore;
use keygate_types::Account;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Loads the activation config from a JSON file, or the defaults when no
/// path is given.
pub fn load_config(path: Option<&Path>) -> Result<ActivationConfig> {
    let Some(path) = path else {
        return Ok(ActivationConfig::default());
    };
    info!("Loading activation config from {:?}", path);
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    ActivationConfig::from_json(&json).context("Failed to parse activation config")
}

/// Opens the store at `db` and builds a workflow around it.
pub fn build_workflow(
    config: ActivationConfig,
    db: &Path,
) -> Result<(ActivationWorkflow, Arc<SqliteAccountStore>)> {
    let store = Arc::new(
        SqliteAccountStore::open(db, &config.fields).context("Failed to open account store")?,
    );
    let notifier: Option<Arc<dyn Notifier>> = if config.mailer_disabled {
        None
    } else {
        Some(Arc::new(LogNotifier))
    };
    let workflow = ActivationWorkflow::new(Arc::new(config), store.clone(), notifier)
        .context("Invalid activation setup")?;
    workflow.register_fields().context("Failed to register activation fields")?;
    Ok((workflow, store))
}

/// Emits notifications as log events instead of mail.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(
        &self,
        kind: NotificationKind,
        selector: &str,
        account: &Account,
    ) -> std::result::Result<(), NotifyError> {
        info!(
            account_id = %account.id,
            email = %account.email,
            %kind,
            selector,
            token = account.activation_token.as_deref().unwrap_or("-"),
            "Notification"
        );
        Ok(())
    }
}

/// Printable snapshot of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: String,
    pub email: String,
    pub state: Option<String>,
    pub token: Option<String>,
    pub expires_at: Option<String>,
    pub external_provider: Option<String>,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            email: account.email.clone(),
            state: account.activation_state.map(|s| s.to_string()),
            token: account.activation_token.clone(),
            expires_at: account.activation_token_expires_at.map(|t| t.to_rfc3339()),
            external_provider: account.external_provider.clone(),
        }
    }
}
