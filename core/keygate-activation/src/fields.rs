//! Logical activation fields and their storage column mapping.
//!
//! The workflow only ever talks about the three logical fields. Stores that
//! keep accounts in a table resolve them to column names through
//! [`ActivationFields`], which hosts may override to fit an existing schema.

use crate::error::{ActivationError, ActivationResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type of an activation column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Timestamp,
}

/// One of the activation fields the core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationField {
    /// `pending` / `active`.
    State,
    /// The opaque token.
    Token,
    /// Token expiry, null for never.
    ExpiresAt,
}

impl ActivationField {
    /// All fields, in registration order.
    pub const ALL: [Self; 3] = [Self::State, Self::Token, Self::ExpiresAt];

    /// Returns the storage type registered for this field.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::State | Self::Token => FieldType::Text,
            Self::ExpiresAt => FieldType::Timestamp,
        }
    }

    /// Returns the default column name.
    #[must_use]
    pub const fn default_column(&self) -> &'static str {
        match self {
            Self::State => "activation_state",
            Self::Token => "activation_token",
            Self::ExpiresAt => "activation_token_expires_at",
        }
    }
}

impl fmt::Display for ActivationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_column())
    }
}

/// Column names used to persist the activation fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationFields {
    pub state: String,
    pub token: String,
    pub expires_at: String,
}

impl Default for ActivationFields {
    fn default() -> Self {
        Self {
            state: ActivationField::State.default_column().to_string(),
            token: ActivationField::Token.default_column().to_string(),
            expires_at: ActivationField::ExpiresAt.default_column().to_string(),
        }
    }
}

impl ActivationFields {
    /// Returns the column name mapped to `field`.
    #[must_use]
    pub fn column(&self, field: ActivationField) -> &str {
        match field {
            ActivationField::State => &self.state,
            ActivationField::Token => &self.token,
            ActivationField::ExpiresAt => &self.expires_at,
        }
    }

    /// Returns `(field, column, type)` for every activation field.
    pub fn definitions(&self) -> impl Iterator<Item = (ActivationField, &str, FieldType)> {
        ActivationField::ALL
            .into_iter()
            .map(move |f| (f, self.column(f), f.field_type()))
    }

    /// Checks that every column is a plain identifier and that no two
    /// fields share a column.
    pub fn validate(&self) -> ActivationResult<()> {
        let columns: Vec<&str> = ActivationField::ALL.iter().map(|f| self.column(*f)).collect();

        for (field, column) in ActivationField::ALL.iter().zip(&columns) {
            if !is_identifier(column) {
                return Err(ActivationError::InvalidConfig(format!(
                    "column for {field} must be an identifier, got {column:?}"
                )));
            }
        }

        for (i, column) in columns.iter().enumerate() {
            if columns[i + 1..].contains(column) {
                return Err(ActivationError::InvalidConfig(format!(
                    "column {column:?} mapped to more than one activation field"
                )));
            }
        }

        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
