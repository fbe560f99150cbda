//! Schema steps for the hierarchy store, tracked by `PRAGMA user_version`.
//!
//! - v1 `owners_hierarchy`: the `owners`, `containers`, `groupings` and
//!   `items` tables. Children reference their parent through foreign keys
//!   without cascades, and every timestamp defaults to epoch milliseconds.
//! - v2 `lookup_indexes`: indexes behind parent lookups and the
//!   creation-ordered listings.
//!
//! Pending steps run inside one transaction. A database stamped with a newer
//! version than this build knows is refused.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    label: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        label: "owners_hierarchy",
        sql: include_str!("0001_init.sql"),
    },
    SchemaStep {
        version: 2,
        label: "lookup_indexes",
        sql: include_str!("0002_lookup_indexes.sql"),
    },
];

/// Highest schema version this build can apply.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |step| step.version)
}

/// Brings `conn` up to [`latest_version`].
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file is newer than this build.
/// - `Sqlite` when a step fails; nothing from the run is kept.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = current_user_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let pending: Vec<&SchemaStep> = MIGRATIONS.iter().filter(|step| step.version > from).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
    }
    tx.commit()?;

    for step in pending {
        info!(
            "event=schema_migrate module=db status=ok version={} label={}",
            step.version, step.label
        );
    }
    Ok(())
}

/// Reads the applied schema version.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
