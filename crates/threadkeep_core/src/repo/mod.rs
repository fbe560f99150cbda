//! Entity stores: repository contracts and SQLite implementations.
//!
//! # Responsibility
//! - One store per entity kind with create/get/list/update/delete/count.
//! - Map domain values to rows through the codec.
//! - Translate SQLite faults into the domain error taxonomy.
//!
//! # Invariants
//! - Writes validate entities before any SQL runs.
//! - Scope filters are folded into the SQL WHERE clause, never applied to
//!   loaded rows.
//! - Every public operation runs under the retry wrapper.

pub mod container_repo;
pub mod grouping_repo;
pub mod item_repo;
pub mod owner_repo;

use crate::error::{
    classify_sqlite_error, invalid_data, EntityKind, SqliteFault, StoreError, StoreResult,
};
use crate::retry::{with_retry, RetryPolicy};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::time::Instant;
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: i64 = 100;
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// SQL expression for "now" in epoch milliseconds.
pub(crate) const NOW_EPOCH_MS_SQL: &str =
    "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

/// Caller-supplied pagination window. `None` selects the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageRequest {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    pub fn first(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            offset: None,
        }
    }

    /// Resolves defaults and rejects out-of-range values.
    ///
    /// # Errors
    /// - `ValidationFailed` when `limit` is outside `1..=1000` or `offset < 0`.
    pub fn resolve(&self) -> StoreResult<(i64, i64)> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = self.offset.unwrap_or(0);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(StoreError::invalid(
                "limit",
                format!("must be between 1 and {MAX_PAGE_LIMIT}"),
            ));
        }
        if offset < 0 {
            return Err(StoreError::invalid("offset", "must not be negative"));
        }
        Ok((limit, offset))
    }
}

/// Execution context shared by every store bound to one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepoContext {
    pub retry: RetryPolicy,
    pub deadline: Option<Instant>,
}

impl RepoContext {
    pub fn new(retry: RetryPolicy, deadline: Option<Instant>) -> Self {
        Self { retry, deadline }
    }

    pub(crate) fn run<T, F>(&self, operation: &'static str, op: F) -> StoreResult<T>
    where
        F: FnMut() -> StoreResult<T>,
    {
        with_retry(&self.retry, self.deadline, operation, op)
    }
}

/// Maps an INSERT/UPDATE failure. Unique violations become `Conflict` on the
/// reported column; FK violations become the supplied missing-reference error.
pub(crate) fn write_error(
    err: rusqlite::Error,
    kind: EntityKind,
    conflict_value: impl FnOnce(&str) -> String,
    missing_reference: impl FnOnce() -> StoreError,
) -> StoreError {
    match classify_sqlite_error(&err) {
        SqliteFault::Unique { column } => {
            let field = column.unwrap_or_else(|| "id".to_string());
            let value = conflict_value(&field);
            StoreError::Conflict { kind, field, value }
        }
        SqliteFault::ForeignKey => missing_reference(),
        SqliteFault::Busy | SqliteFault::Other => StoreError::from(err),
    }
}

/// Maps a DELETE failure. FK violations mean dependent rows still exist.
pub(crate) fn delete_error(
    err: rusqlite::Error,
    kind: EntityKind,
    dependents: &str,
    id: Uuid,
) -> StoreError {
    match classify_sqlite_error(&err) {
        SqliteFault::ForeignKey => StoreError::conflict(kind, dependents, id.to_string()),
        _ => StoreError::from(err),
    }
}

pub(crate) fn query_optional<T>(
    conn: &Connection,
    sql: &str,
    binds: Vec<Value>,
    parse: fn(&Row<'_>) -> StoreResult<T>,
) -> StoreResult<Option<T>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse(row)?));
    }
    Ok(None)
}

pub(crate) fn query_all<T>(
    conn: &Connection,
    sql: &str,
    binds: Vec<Value>,
    parse: fn(&Row<'_>) -> StoreResult<T>,
) -> StoreResult<Vec<T>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse(row)?);
    }
    Ok(items)
}

pub(crate) fn query_count(conn: &Connection, sql: &str, binds: Vec<Value>) -> StoreResult<u64> {
    let count: i64 = conn.query_row(sql, params_from_iter(binds), |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

pub(crate) fn query_exists(conn: &Connection, sql: &str, binds: Vec<Value>) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS({sql});"),
        params_from_iter(binds),
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn text(value: impl ToString) -> Value {
    Value::Text(value.to_string())
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| invalid_data(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn uuid_column(row: &Row<'_>, column: &'static str) -> StoreResult<Uuid> {
    let value: String = row.get(column)?;
    parse_uuid(&value, column)
}
