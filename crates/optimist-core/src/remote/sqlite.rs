//! SQLite-backed remote store
//!
//! A reference `RemoteStore` for local development and the CLI. Every call
//! runs on the blocking pool against a single shared connection. Latency and
//! failures can be injected to make the retry behaviour visible.
//!
//! Templates:
//! - updates take the key as their only positional parameter
//!   (`UPDATE widgets SET active = TRUE WHERE id = ?;`)
//! - inserts use named parameters matching the record's fields and should
//!   return the stored row (`INSERT ... VALUES (:description, :active) RETURNING *;`)

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Statement};
use serde_json::Value;
use tracing::{debug, warn};

use super::schema::{self, init_schema};
use super::{RemoteStore, Row, UpdateOutcome};
use crate::config::RemoteSettings;
use crate::error::RemoteCallFailure;

/// Artificial latency and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RemoteOptions {
    /// Delay added to every successful call
    pub latency: Duration,
    /// Probability (0.0 to 1.0) that a call fails before touching the database
    pub failure_rate: f64,
}

impl From<&RemoteSettings> for RemoteOptions {
    fn from(settings: &RemoteSettings) -> Self {
        Self {
            latency: Duration::from_millis(settings.latency_ms),
            failure_rate: settings.failure_rate,
        }
    }
}

/// Remote store backed by a SQLite database
pub struct SqliteRemote {
    conn: Arc<Mutex<Connection>>,
    options: RemoteOptions,
}

impl SqliteRemote {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: &Path, options: RemoteOptions) -> Result<Self, RemoteCallFailure> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        Self::from_connection(conn, options)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory(options: RemoteOptions) -> Result<Self, RemoteCallFailure> {
        Self::from_connection(Connection::open_in_memory()?, options)
    }

    pub fn from_connection(
        conn: Connection,
        options: RemoteOptions,
    ) -> Result<Self, RemoteCallFailure> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            options,
        })
    }

    /// Add demo widgets; latency and failure injection do not apply
    ///
    /// Returns the number of widgets stored afterwards.
    pub async fn seed_widgets(&self, count: usize) -> Result<i64, RemoteCallFailure> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(schema::seed_widgets(&conn, count)?)
        })
        .await
        .map_err(|e| RemoteCallFailure::new(format!("database task failed: {}", e)))?
    }

    /// Run database work on the blocking pool, then apply injected latency
    async fn run<R, F>(&self, work: F) -> Result<R, RemoteCallFailure>
    where
        R: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<R, RemoteCallFailure> + Send + 'static,
    {
        if self.should_fail() {
            warn!("Injecting remote failure");
            return Err(RemoteCallFailure::new("injected failure"));
        }

        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            work(&mut *conn)
        })
        .await
        .map_err(|e| RemoteCallFailure::new(format!("database task failed: {}", e)))?;

        if !self.options.latency.is_zero() {
            tokio::time::sleep(self.options.latency).await;
        }

        result
    }

    fn should_fail(&self) -> bool {
        let rate = self.options.failure_rate.clamp(0.0, 1.0);
        rate > 0.0 && rand::thread_rng().gen_bool(rate)
    }
}

#[async_trait]
impl RemoteStore for SqliteRemote {
    async fn fetch_all(&self, query: &str) -> Result<Vec<Row>, RemoteCallFailure> {
        let query = query.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&query)?;
            collect_rows(&mut stmt)
        })
        .await
    }

    async fn transactional_update(
        &self,
        keys: &[Value],
        request_template: &str,
    ) -> Result<Vec<UpdateOutcome>, RemoteCallFailure> {
        let keys: Vec<SqlValue> = keys.iter().map(json_to_sql).collect();
        let template = request_template.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut outcomes = Vec::with_capacity(keys.len());
            {
                let mut stmt = tx.prepare(&template)?;
                for key in keys {
                    let rows_changed = stmt.execute([key])?;
                    outcomes.push(UpdateOutcome { rows_changed });
                }
            }
            tx.commit()?;
            debug!("Updated {} keys in one transaction", outcomes.len());
            Ok(outcomes)
        })
        .await
    }

    async fn transactional_insert(
        &self,
        record: &Row,
        request_template: &str,
    ) -> Result<Vec<Row>, RemoteCallFailure> {
        let record = record.clone();
        let template = request_template.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let rows = {
                let mut stmt = tx.prepare(&template)?;
                bind_named(&mut stmt, &record)?;
                collect_raw_rows(&mut stmt)?
            };
            tx.commit()?;
            Ok(rows)
        })
        .await
    }
}

/// Bind record fields to the statement's named parameters
///
/// `:name`, `@name` and `$name` all look up `name`; anything the record lacks
/// binds as NULL.
fn bind_named(stmt: &mut Statement<'_>, record: &Row) -> Result<(), RemoteCallFailure> {
    for index in 1..=stmt.parameter_count() {
        let value = stmt
            .parameter_name(index)
            .and_then(|name| record.get(name.get(1..).unwrap_or_default()))
            .map(json_to_sql)
            .unwrap_or(SqlValue::Null);
        stmt.raw_bind_parameter(index, value)?;
    }
    Ok(())
}

fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names()
        .into_iter()
        .map(String::from)
        .collect()
}

fn collect_rows(stmt: &mut Statement<'_>) -> Result<Vec<Row>, RemoteCallFailure> {
    let names = column_names(stmt);
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_json(&names, row)?);
    }
    Ok(out)
}

fn collect_raw_rows(stmt: &mut Statement<'_>) -> Result<Vec<Row>, RemoteCallFailure> {
    let names = column_names(stmt);
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_json(&names, row)?);
    }
    Ok(out)
}

fn row_to_json(names: &[String], row: &rusqlite::Row<'_>) -> Result<Row, RemoteCallFailure> {
    let mut out = Row::new();
    for (index, name) in names.iter().enumerate() {
        out.insert(name.clone(), sql_to_json(row.get_ref(index)?));
    }
    Ok(out)
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}
