//! [`AccountStore`] backed by SQLite.

use chrono::{DateTime, SecondsFormat, Utc};
use keygate_activation::{
    validate_account, AccountStore, ActivationField, ActivationFields, FieldType, SaveOptions,
    StoreError, StoreResult,
};
use keygate_types::{Account, AccountId, ActivationState};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

/// Columns owned by the `accounts` table itself.
const ACCOUNT_COLUMNS: [&str; 4] = ["id", "email", "external_provider", "created_at"];

/// Persistent account store backed by SQLite.
pub struct SqliteAccountStore {
    conn: Arc<Mutex<Connection>>,
    fields: RwLock<ActivationFields>,
}

impl SqliteAccountStore {
    /// Opens (or creates) a store at the given path and registers `fields`.
    pub fn open(path: impl AsRef<Path>, fields: &ActivationFields) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Database(format!("failed to open account store: {e}")))?;
        let store = Self::from_connection(conn, fields)?;
        info!("Account store opened at {}", path.display());
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory(fields: &ActivationFields) -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::Database(format!("failed to open in-memory account store: {e}"))
        })?;
        Self::from_connection(conn, fields)
    }

    fn from_connection(conn: Connection, fields: &ActivationFields) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            fields: RwLock::new(fields.clone()),
        };
        store.init_schema()?;
        store.define_fields(fields)?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                external_provider TEXT,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| StoreError::Database(format!("failed to init account schema: {e}")))?;
        Ok(())
    }

    /// Number of stored accounts.
    pub fn count(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
            .map_err(|e| StoreError::Database(format!("failed to count accounts: {e}")))?;
        Ok(n as usize)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("account store connection poisoned".to_string()))
    }

    fn current_fields(&self) -> ActivationFields {
        self.fields
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn select_sql(fields: &ActivationFields, filter: &str) -> String {
        format!(
            "SELECT id, email, external_provider, created_at, {}, {}, {} FROM accounts WHERE {} = ?1 LIMIT 1",
            fields.state, fields.token, fields.expires_at, filter
        )
    }

    fn query_one(&self, sql: &str, value: &str) -> StoreResult<Option<Account>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(sql, params![value], RawAccount::from_row)
            .optional()
            .map_err(|e| StoreError::Database(format!("failed to query account: {e}")))?;
        raw.map(RawAccount::into_account).transpose()
    }
}

impl AccountStore for SqliteAccountStore {
    fn define_fields(&self, fields: &ActivationFields) -> StoreResult<()> {
        fields
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;

        for (field, column, _) in fields.definitions() {
            if ACCOUNT_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                return Err(StoreError::Validation(format!(
                    "column {column:?} for {field} is reserved by the accounts table"
                )));
            }
        }

        let conn = self.lock()?;
        let existing = existing_columns(&conn)?;

        for (field, column, field_type) in fields.definitions() {
            if let Some(declared) = existing.get(&column.to_ascii_lowercase()) {
                if !declared.eq_ignore_ascii_case(sql_type(field_type)) {
                    return Err(StoreError::Validation(format!(
                        "column {column:?} for {field} is declared {declared}, expected {}",
                        sql_type(field_type)
                    )));
                }
                continue;
            }
            let sql = format!(
                "ALTER TABLE accounts ADD COLUMN {column} {}",
                sql_type(field_type)
            );
            conn.execute(&sql, []).map_err(|e| {
                StoreError::Database(format!("failed to add column {column} for {field}: {e}"))
            })?;
            debug!(column, "Activation column added");
        }

        let index = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_{token} ON accounts({token})",
            token = fields.token
        );
        conn.execute(&index, [])
            .map_err(|e| StoreError::Database(format!("failed to index activation token: {e}")))?;

        *self.fields.write().unwrap_or_else(|e| e.into_inner()) = fields.clone();
        Ok(())
    }

    fn save(&self, account: &Account, options: &SaveOptions) -> StoreResult<()> {
        if options.validate {
            validate_account(account)?;
        }

        let fields = self.current_fields();
        let conn = self.lock()?;

        let id = account.id.to_string();
        let created_at = format_ts(account.created_at);
        let state = account.activation_state.map(|s| s.as_str());
        let expires_at = account.activation_token_expires_at.map(format_ts);

        match &options.expect_token {
            Some(expected) => {
                let sql = format!(
                    "UPDATE accounts SET email = ?2, external_provider = ?3, created_at = ?4, \
                     {state_col} = ?5, {token_col} = ?6, {exp_col} = ?7 \
                     WHERE id = ?1 AND {token_col} = ?8",
                    state_col = fields.state,
                    token_col = fields.token,
                    exp_col = fields.expires_at,
                );
                let updated = conn
                    .execute(
                        &sql,
                        params![
                            id,
                            account.email,
                            account.external_provider,
                            created_at,
                            state,
                            account.activation_token,
                            expires_at,
                            expected,
                        ],
                    )
                    .map_err(|e| StoreError::Database(format!("failed to update account: {e}")))?;
                if updated == 0 {
                    return Err(StoreError::Conflict(format!(
                        "activation token for {} no longer matches",
                        account.id
                    )));
                }
            }
            None => {
                let sql = format!(
                    "INSERT INTO accounts (id, email, external_provider, created_at, {s}, {t}, {x}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                     ON CONFLICT(id) DO UPDATE SET email = excluded.email, \
                     external_provider = excluded.external_provider, \
                     created_at = excluded.created_at, \
                     {s} = excluded.{s}, {t} = excluded.{t}, {x} = excluded.{x}",
                    s = fields.state,
                    t = fields.token,
                    x = fields.expires_at,
                );
                conn.execute(
                    &sql,
                    params![
                        id,
                        account.email,
                        account.external_provider,
                        created_at,
                        state,
                        account.activation_token,
                        expires_at,
                    ],
                )
                .map_err(|e| match &e {
                    rusqlite::Error::SqliteFailure(err, _)
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        StoreError::Conflict(format!("failed to save account {}: {e}", account.id))
                    }
                    _ => StoreError::Database(format!("failed to save account: {e}")),
                })?;
            }
        }

        Ok(())
    }

    fn find_by_field(&self, field: ActivationField, value: &str) -> StoreResult<Option<Account>> {
        let fields = self.current_fields();
        let value = match field {
            // Normalize to the stored representation; anything unparsable cannot match.
            ActivationField::ExpiresAt => match DateTime::parse_from_rfc3339(value) {
                Ok(ts) => format_ts(ts.with_timezone(&Utc)),
                Err(_) => return Ok(None),
            },
            ActivationField::State | ActivationField::Token => value.to_string(),
        };
        let sql = Self::select_sql(&fields, fields.column(field));
        self.query_one(&sql, &value)
    }

    fn find_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let fields = self.current_fields();
        let sql = Self::select_sql(&fields, "id");
        self.query_one(&sql, &id.to_string())
    }
}

/// Column values as read from a row, before parsing.
struct RawAccount {
    id: String,
    email: String,
    external_provider: Option<String>,
    created_at: String,
    state: Option<String>,
    token: Option<String>,
    expires_at: Option<String>,
}

impl RawAccount {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            external_provider: row.get(2)?,
            created_at: row.get(3)?,
            state: row.get(4)?,
            token: row.get(5)?,
            expires_at: row.get(6)?,
        })
    }

    fn into_account(self) -> StoreResult<Account> {
        let id = AccountId::parse(&self.id)
            .map_err(|e| StoreError::Corrupt(format!("bad account id {}: {e}", self.id)))?;
        let activation_state = self
            .state
            .map(|s| s.parse::<ActivationState>())
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Account {
            id,
            email: self.email,
            password: None,
            external_provider: self.external_provider,
            created_at: parse_ts(&self.created_at)?,
            activation_state,
            activation_token: self.token,
            activation_token_expires_at: self.expires_at.as_deref().map(parse_ts).transpose()?,
            skip_activation_needed_email: false,
            skip_activation_success_email: false,
        })
    }
}

/// Lower-cased column name to declared type.
fn existing_columns(conn: &Connection) -> StoreResult<HashMap<String, String>> {
    let mut stmt = conn
        .prepare("PRAGMA table_info(accounts)")
        .map_err(|e| StoreError::Database(format!("failed to read account schema: {e}")))?;
    let columns = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?.to_ascii_lowercase(), row.get::<_, String>(2)?))
        })
        .map_err(|e| StoreError::Database(format!("failed to read account schema: {e}")))?
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(|e| StoreError::Database(format!("failed to read account schema: {e}")))?;
    Ok(columns)
}

fn sql_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text => "TEXT",
        FieldType::Timestamp => "TIMESTAMP",
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}
