//! Activation configuration.
//!
//! Built once at start-up and shared read-only (`Arc<ActivationConfig>`) by
//! every operation. There is no way to change it through the workflow.

use crate::error::{ActivationError, ActivationResult};
use crate::fields::ActivationFields;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default selector for the "activation needed" notification.
pub const DEFAULT_NEEDED_EMAIL: &str = "activation_needed_email";

/// Default selector for the "activation succeeded" notification.
pub const DEFAULT_SUCCESS_EMAIL: &str = "activation_success_email";

/// Process-wide activation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// How long an issued token stays valid. `None` means it never expires.
    /// Serialized as whole seconds.
    #[serde(with = "period_secs")]
    pub expiration_period: Option<Duration>,
    /// When true, no notification is ever dispatched and the host handles
    /// delivery itself.
    pub mailer_disabled: bool,
    /// Selector for the "activation needed" notification; `None` disables it.
    pub activation_needed_email: Option<String>,
    /// Selector for the "activation succeeded" notification; `None` disables it.
    pub activation_success_email: Option<String>,
    /// Refuse login for accounts that are not active.
    pub prevent_non_active_login: bool,
    /// Column mapping for stores.
    pub fields: ActivationFields,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            expiration_period: None,
            mailer_disabled: false,
            activation_needed_email: Some(DEFAULT_NEEDED_EMAIL.to_string()),
            activation_success_email: Some(DEFAULT_SUCCESS_EMAIL.to_string()),
            prevent_non_active_login: true,
            fields: ActivationFields::default(),
        }
    }
}

impl ActivationConfig {
    /// Parses a config from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> ActivationResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the token lifetime.
    #[must_use]
    pub fn with_expiration_period(mut self, period: Duration) -> Self {
        self.expiration_period = Some(period);
        self
    }

    /// Returns true if notifications may be dispatched at all.
    #[must_use]
    pub fn notifications_enabled(&self) -> bool {
        !self.mailer_disabled
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::InvalidConfig`] for a non-positive
    /// expiration period, an empty selector, or a bad column mapping.
    pub fn validate(&self) -> ActivationResult<()> {
        if let Some(period) = self.expiration_period {
            if period <= Duration::zero() {
                return Err(ActivationError::InvalidConfig(format!(
                    "expiration_period must be positive, got {}s",
                    period.num_seconds()
                )));
            }
        }

        for (name, selector) in [
            ("activation_needed_email", &self.activation_needed_email),
            ("activation_success_email", &self.activation_success_email),
        ] {
            if selector.as_deref().is_some_and(|s| s.trim().is_empty()) {
                return Err(ActivationError::InvalidConfig(format!(
                    "{name} must be null or a non-empty name"
                )));
            }
        }

        self.fields.validate()
    }
}

mod period_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.num_seconds()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<i64>::deserialize(d)?
            .map(|secs| {
                Duration::try_seconds(secs).ok_or_else(|| {
                    serde::de::Error::custom(format!("expiration period out of range: {secs}"))
                })
            })
            .transpose()
    }
}
