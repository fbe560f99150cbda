//! Owner store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist owner identities keyed by a unique, normalized email.
//!
//! # Invariants
//! - Emails are stored trimmed and lowercased; uniqueness is case-insensitive.
//! - An owner still referenced by containers, items or a grouping's
//!   participant list cannot be deleted (`Conflict` on `references`).

use crate::access::{owner_scope, participant_clause, Intent, ScopeFilter};
use crate::codec::{decode_attributes, encode_attributes, merge_attributes};
use crate::error::{EntityKind, StoreError, StoreResult};
use crate::model::owner::{normalize_email, Owner, OwnerId};
use crate::repo::{
    delete_error, query_all, query_count, query_exists, query_optional, text, uuid_column,
    write_error, PageRequest, RepoContext, NOW_EPOCH_MS_SQL,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const OWNER_SELECT_SQL: &str = "SELECT
    o.id AS id,
    o.email AS email,
    o.display_name AS display_name,
    o.attributes AS attributes,
    o.created_at AS created_at,
    o.updated_at AS updated_at
FROM owners o";

/// List/count filter for owners.
#[derive(Debug, Clone, Default)]
pub struct OwnerFilter {
    /// Exact natural-key match (normalized before comparison).
    pub email: Option<String>,
    pub scope: ScopeFilter,
}

/// Store contract for owners.
pub trait OwnerRepository {
    fn create(&self, owner: &Owner) -> StoreResult<Owner>;
    fn get(&self, id: OwnerId, scope: ScopeFilter) -> StoreResult<Option<Owner>>;
    fn find_by_email(&self, email: &str, scope: ScopeFilter) -> StoreResult<Option<Owner>>;
    fn list(&self, filter: &OwnerFilter, page: PageRequest) -> StoreResult<Vec<Owner>>;
    fn update(&self, owner: &Owner, scope: ScopeFilter) -> StoreResult<Owner>;
    fn delete(&self, id: OwnerId, scope: ScopeFilter) -> StoreResult<bool>;
    fn count(&self, filter: &OwnerFilter) -> StoreResult<u64>;
}

/// SQLite-backed owner store.
pub struct SqliteOwnerRepository<'conn> {
    conn: &'conn Connection,
    ctx: RepoContext,
}

impl<'conn> SqliteOwnerRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_context(conn, RepoContext::default())
    }

    pub fn with_context(conn: &'conn Connection, ctx: RepoContext) -> Self {
        Self { conn, ctx }
    }

    fn filter_clause(filter: &OwnerFilter) -> (String, Vec<Value>) {
        let predicate = owner_scope(filter.scope, Intent::Read, "o");
        let mut sql = format!(" WHERE {}", predicate.sql);
        let mut binds = Vec::new();
        predicate.bind_into(&mut binds);
        if let Some(email) = &filter.email {
            sql.push_str(" AND o.email = ?");
            binds.push(text(normalize_email(email)));
        }
        (sql, binds)
    }
}

impl OwnerRepository for SqliteOwnerRepository<'_> {
    fn create(&self, owner: &Owner) -> StoreResult<Owner> {
        owner.validate()?;
        let email = normalize_email(&owner.email);
        let attributes = encode_attributes(&owner.attributes);

        self.ctx.run("owner.create", || {
            self.conn
                .execute(
                    "INSERT INTO owners (id, email, display_name, attributes)
                     VALUES (?1, ?2, ?3, ?4);",
                    params![
                        owner.id.to_string(),
                        email.as_str(),
                        owner.display_name.trim(),
                        attributes.as_str(),
                    ],
                )
                .map_err(|err| {
                    write_error(
                        err,
                        EntityKind::Owner,
                        |field| conflict_value(field, owner, &email),
                        || StoreError::not_found(EntityKind::Owner, owner.id),
                    )
                })?;
            load_required(self.conn, owner.id)
        })
    }

    fn get(&self, id: OwnerId, scope: ScopeFilter) -> StoreResult<Option<Owner>> {
        self.ctx.run("owner.get", || {
            let predicate = owner_scope(scope, Intent::Read, "o");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            query_optional(
                self.conn,
                &format!("{OWNER_SELECT_SQL} WHERE o.id = ? AND {};", predicate.sql),
                binds,
                parse_owner_row,
            )
        })
    }

    fn find_by_email(&self, email: &str, scope: ScopeFilter) -> StoreResult<Option<Owner>> {
        let email = normalize_email(email);
        self.ctx.run("owner.find_by_email", || {
            let predicate = owner_scope(scope, Intent::Read, "o");
            let mut binds = vec![text(&email)];
            predicate.bind_into(&mut binds);
            query_optional(
                self.conn,
                &format!("{OWNER_SELECT_SQL} WHERE o.email = ? AND {};", predicate.sql),
                binds,
                parse_owner_row,
            )
        })
    }

    fn list(&self, filter: &OwnerFilter, page: PageRequest) -> StoreResult<Vec<Owner>> {
        let (limit, offset) = page.resolve()?;
        self.ctx.run("owner.list", || {
            let (where_sql, mut binds) = Self::filter_clause(filter);
            binds.push(Value::Integer(limit));
            binds.push(Value::Integer(offset));
            query_all(
                self.conn,
                &format!(
                    "{OWNER_SELECT_SQL}{where_sql}
                     ORDER BY o.created_at ASC, o.rowid ASC
                     LIMIT ? OFFSET ?;"
                ),
                binds,
                parse_owner_row,
            )
        })
    }

    fn update(&self, owner: &Owner, scope: ScopeFilter) -> StoreResult<Owner> {
        owner.validate()?;
        let email = normalize_email(&owner.email);

        self.ctx.run("owner.update", || {
            let predicate = owner_scope(scope, Intent::Write, "o");
            let mut binds = vec![text(owner.id)];
            predicate.bind_into(&mut binds);
            let stored: Option<String> = self
                .conn
                .query_row(
                    &format!(
                        "SELECT o.attributes FROM owners o WHERE o.id = ? AND {};",
                        predicate.sql
                    ),
                    params_from_iter(binds),
                    |row| row.get(0),
                )
                .optional()?;
            let Some(stored) = stored else {
                return Err(StoreError::not_found(EntityKind::Owner, owner.id));
            };

            let merged = merge_attributes(decode_attributes(Some(&stored)), &owner.attributes);
            self.conn
                .execute(
                    &format!(
                        "UPDATE owners
                         SET email = ?1,
                             display_name = ?2,
                             attributes = ?3,
                             updated_at = {NOW_EPOCH_MS_SQL}
                         WHERE id = ?4;"
                    ),
                    params![
                        email.as_str(),
                        owner.display_name.trim(),
                        encode_attributes(&merged),
                        owner.id.to_string(),
                    ],
                )
                .map_err(|err| {
                    write_error(
                        err,
                        EntityKind::Owner,
                        |field| conflict_value(field, owner, &email),
                        || StoreError::not_found(EntityKind::Owner, owner.id),
                    )
                })?;
            load_required(self.conn, owner.id)
        })
    }

    fn delete(&self, id: OwnerId, scope: ScopeFilter) -> StoreResult<bool> {
        self.ctx.run("owner.delete", || {
            let predicate = owner_scope(scope, Intent::Delete, "o");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            if !query_exists(
                self.conn,
                &format!("SELECT 1 FROM owners o WHERE o.id = ? AND {}", predicate.sql),
                binds.clone(),
            )? {
                return Ok(false);
            }
            // Participant lists are not covered by foreign keys.
            if query_exists(
                self.conn,
                &format!(
                    "SELECT 1 FROM groupings g WHERE {}",
                    participant_clause("g")
                ),
                vec![text(id)],
            )? {
                return Err(StoreError::conflict(
                    EntityKind::Owner,
                    "references",
                    id.to_string(),
                ));
            }

            let changed = self
                .conn
                .execute(
                    &format!(
                        "DELETE FROM owners
                         WHERE id IN (SELECT o.id FROM owners o WHERE o.id = ? AND {});",
                        predicate.sql
                    ),
                    params_from_iter(binds),
                )
                .map_err(|err| delete_error(err, EntityKind::Owner, "references", id))?;
            Ok(changed > 0)
        })
    }

    fn count(&self, filter: &OwnerFilter) -> StoreResult<u64> {
        self.ctx.run("owner.count", || {
            let (where_sql, binds) = Self::filter_clause(filter);
            query_count(
                self.conn,
                &format!("SELECT COUNT(*) FROM owners o{where_sql};"),
                binds,
            )
        })
    }
}

fn conflict_value(field: &str, owner: &Owner, email: &str) -> String {
    match field {
        "email" => email.to_string(),
        _ => owner.id.to_string(),
    }
}

fn load_required(conn: &Connection, id: OwnerId) -> StoreResult<Owner> {
    query_optional(
        conn,
        &format!("{OWNER_SELECT_SQL} WHERE o.id = ?;"),
        vec![text(id)],
        parse_owner_row,
    )?
    .ok_or_else(|| StoreError::not_found(EntityKind::Owner, id))
}

fn parse_owner_row(row: &Row<'_>) -> StoreResult<Owner> {
    let attributes: Option<String> = row.get("attributes")?;
    Ok(Owner {
        id: uuid_column(row, "id")?,
        email: row.get("email")?,
        display_name: row.get("display_name")?,
        attributes: decode_attributes(attributes.as_deref()),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
