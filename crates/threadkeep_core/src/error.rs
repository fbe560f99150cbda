//! Closed error taxonomy for store and transaction operations.
//!
//! # Responsibility
//! - Define the only failure kinds stores and the coordinator may surface.
//! - Classify raw SQLite faults by extended result code.
//!
//! # Invariants
//! - `Display` output never contains storage-engine text. The engine cause
//!   stays reachable through `Error::source` and `StorageFault::diagnostic`
//!   for server-side logs only.
//! - Absent and out-of-scope entities both surface as `NotFound`.

use crate::db::DbError;
use rusqlite::ffi;
use rusqlite::ErrorCode;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Field name -> human-readable violation.
pub type FieldErrors = BTreeMap<String, String>;

/// Entity kinds managed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Owner,
    Container,
    Grouping,
    Item,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Container => "container",
            Self::Grouping => "grouping",
            Self::Item => "item",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level failure raised by every store and coordinator operation.
#[derive(Debug)]
pub enum StoreError {
    /// Entity absent or outside the caller's visible scope.
    NotFound { kind: EntityKind, id: String },
    /// Uniqueness violation, or a delete blocked by dependent rows.
    Conflict {
        kind: EntityKind,
        field: String,
        value: String,
    },
    /// Caller data violates a structural invariant. Raised before any storage call.
    ValidationFailed { field_errors: FieldErrors },
    /// Writer lock stayed busy through every retry attempt.
    Contention {
        operation: &'static str,
        attempts: u32,
    },
    /// Scope deadline exceeded.
    Timeout { operation: &'static str },
    /// Any other storage failure.
    StorageFault(StorageFault),
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn conflict(kind: EntityKind, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            field: field.into(),
            value: value.into(),
        }
    }

    /// Single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut field_errors = FieldErrors::new();
        field_errors.insert(field.into(), message.into());
        Self::ValidationFailed { field_errors }
    }

    /// Whether retrying the same operation unchanged may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    /// Labels an operation-agnostic error with the operation that raised it.
    pub(crate) fn in_operation(self, operation: &'static str) -> Self {
        match self {
            Self::Contention { attempts, .. } => Self::Contention {
                operation,
                attempts,
            },
            Self::Timeout { .. } => Self::Timeout { operation },
            Self::StorageFault(fault) => Self::StorageFault(StorageFault {
                operation,
                cause: fault.cause,
            }),
            other => other,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::Conflict { kind, field, value } => {
                write!(f, "{kind} conflict on `{field}`: {value}")
            }
            Self::ValidationFailed { field_errors } => {
                write!(f, "validation failed")?;
                for (index, (field, message)) in field_errors.iter().enumerate() {
                    let separator = if index == 0 { ": " } else { "; " };
                    write!(f, "{separator}{field} {message}")?;
                }
                Ok(())
            }
            Self::Contention {
                operation,
                attempts,
            } => write!(
                f,
                "storage busy during `{operation}` after {attempts} attempt(s)"
            ),
            Self::Timeout { operation } => write!(f, "scope deadline exceeded during `{operation}`"),
            Self::StorageFault(fault) => write!(f, "{fault}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageFault(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        match classify_sqlite_error(&value) {
            SqliteFault::Busy => Self::Contention {
                operation: "statement",
                attempts: 1,
            },
            _ => Self::StorageFault(StorageFault::new("statement", FaultCause::Sqlite(value))),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::StorageFault(StorageFault::new("bootstrap", FaultCause::Db(other))),
        }
    }
}

/// Opaque storage failure with a retained diagnostic cause.
#[derive(Debug)]
pub struct StorageFault {
    operation: &'static str,
    cause: FaultCause,
}

/// Internal cause of a [`StorageFault`].
#[derive(Debug)]
pub enum FaultCause {
    Sqlite(rusqlite::Error),
    Db(DbError),
    /// Persisted row cannot be mapped back to a domain value.
    InvalidData(String),
}

impl StorageFault {
    pub fn new(operation: &'static str, cause: FaultCause) -> Self {
        Self { operation, cause }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn cause(&self) -> &FaultCause {
        &self.cause
    }

    /// Full internal detail for server-side logs. Never forward to callers.
    pub fn diagnostic(&self) -> String {
        match &self.cause {
            FaultCause::Sqlite(err) => format!("op={} sqlite={err}", self.operation),
            FaultCause::Db(err) => format!("op={} bootstrap={err}", self.operation),
            FaultCause::InvalidData(message) => {
                format!("op={} invalid_data={message}", self.operation)
            }
        }
    }
}

impl Display for StorageFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "storage fault during `{}`", self.operation)
    }
}

impl Error for StorageFault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            FaultCause::Sqlite(err) => Some(err),
            FaultCause::Db(err) => Some(err),
            FaultCause::InvalidData(_) => None,
        }
    }
}

pub(crate) fn invalid_data(message: impl Into<String>) -> StoreError {
    StoreError::StorageFault(StorageFault::new(
        "decode_row",
        FaultCause::InvalidData(message.into()),
    ))
}

/// Coarse classification of a raw SQLite error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SqliteFault {
    Busy,
    Unique { column: Option<String> },
    ForeignKey,
    Other,
}

pub(crate) fn classify_sqlite_error(err: &rusqlite::Error) -> SqliteFault {
    let rusqlite::Error::SqliteFailure(failure, message) = err else {
        return SqliteFault::Other;
    };

    if matches!(
        failure.code,
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
    ) {
        return SqliteFault::Busy;
    }

    match failure.extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => SqliteFault::Unique {
            column: message.as_deref().and_then(unique_violation_column),
        },
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => SqliteFault::ForeignKey,
        _ => SqliteFault::Other,
    }
}

/// Extracts `email` from `UNIQUE constraint failed: owners.email`.
fn unique_violation_column(message: &str) -> Option<String> {
    let (_, columns) = message.split_once(": ")?;
    let first = columns.split(',').next()?.trim();
    let column = first.rsplit('.').next()?;
    if column.is_empty() {
        None
    } else {
        Some(column.to_string())
    }
}
