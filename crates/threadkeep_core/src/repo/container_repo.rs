//! Container store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist containers and enforce the owner reference at creation.
//!
//! # Invariants
//! - `owner_id` must resolve to an existing owner when created and never changes.
//! - Store-level delete does not cascade; a container with groupings is a
//!   `Conflict` on `groupings`. Cascades live in `HierarchyService`.

use crate::access::{container_scope, Intent, ScopeFilter};
use crate::codec::{decode_attributes, encode_attributes, merge_attributes};
use crate::error::{EntityKind, StoreError, StoreResult};
use crate::model::container::{Container, ContainerId};
use crate::model::owner::OwnerId;
use crate::repo::{
    delete_error, query_all, query_count, query_exists, query_optional, text, uuid_column,
    write_error, PageRequest, RepoContext, NOW_EPOCH_MS_SQL,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const CONTAINER_SELECT_SQL: &str = "SELECT
    c.id AS id,
    c.owner_id AS owner_id,
    c.name AS name,
    c.description AS description,
    c.attributes AS attributes,
    c.created_at AS created_at,
    c.updated_at AS updated_at
FROM containers c";

/// List/count filter for containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    pub owner_id: Option<OwnerId>,
    /// Visibility narrowing, evaluated with read intent.
    pub scope: ScopeFilter,
}

/// Store contract for containers.
pub trait ContainerRepository {
    fn create(&self, container: &Container) -> StoreResult<Container>;
    fn get(&self, id: ContainerId, scope: ScopeFilter) -> StoreResult<Option<Container>>;
    /// Whether `id` exists and `scope` holds `intent` on it.
    fn exists(&self, id: ContainerId, scope: ScopeFilter, intent: Intent) -> StoreResult<bool>;
    fn list(&self, filter: &ContainerFilter, page: PageRequest) -> StoreResult<Vec<Container>>;
    fn update(&self, container: &Container, scope: ScopeFilter) -> StoreResult<Container>;
    fn delete(&self, id: ContainerId, scope: ScopeFilter) -> StoreResult<bool>;
    fn count(&self, filter: &ContainerFilter) -> StoreResult<u64>;
}

/// SQLite-backed container store.
pub struct SqliteContainerRepository<'conn> {
    conn: &'conn Connection,
    ctx: RepoContext,
}

impl<'conn> SqliteContainerRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_context(conn, RepoContext::default())
    }

    pub fn with_context(conn: &'conn Connection, ctx: RepoContext) -> Self {
        Self { conn, ctx }
    }

    fn filter_clause(filter: &ContainerFilter) -> (String, Vec<Value>) {
        let predicate = container_scope(filter.scope, Intent::Read, "c");
        let mut sql = format!(" WHERE {}", predicate.sql);
        let mut binds = Vec::new();
        predicate.bind_into(&mut binds);
        if let Some(owner_id) = filter.owner_id {
            sql.push_str(" AND c.owner_id = ?");
            binds.push(text(owner_id));
        }
        (sql, binds)
    }
}

impl ContainerRepository for SqliteContainerRepository<'_> {
    fn create(&self, container: &Container) -> StoreResult<Container> {
        container.validate()?;
        let attributes = encode_attributes(&container.attributes);
        let missing_owner = || StoreError::not_found(EntityKind::Owner, container.owner_id);

        self.ctx.run("container.create", || {
            if !query_exists(
                self.conn,
                "SELECT 1 FROM owners WHERE id = ?",
                vec![text(container.owner_id)],
            )? {
                return Err(missing_owner());
            }

            self.conn
                .execute(
                    "INSERT INTO containers (id, owner_id, name, description, attributes)
                     VALUES (?1, ?2, ?3, ?4, ?5);",
                    params![
                        container.id.to_string(),
                        container.owner_id.to_string(),
                        container.name.trim(),
                        container.description.as_str(),
                        attributes.as_str(),
                    ],
                )
                .map_err(|err| {
                    write_error(
                        err,
                        EntityKind::Container,
                        |_| container.id.to_string(),
                        missing_owner,
                    )
                })?;
            load_required(self.conn, container.id)
        })
    }

    fn get(&self, id: ContainerId, scope: ScopeFilter) -> StoreResult<Option<Container>> {
        self.ctx.run("container.get", || {
            let predicate = container_scope(scope, Intent::Read, "c");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            query_optional(
                self.conn,
                &format!("{CONTAINER_SELECT_SQL} WHERE c.id = ? AND {};", predicate.sql),
                binds,
                parse_container_row,
            )
        })
    }

    fn exists(&self, id: ContainerId, scope: ScopeFilter, intent: Intent) -> StoreResult<bool> {
        self.ctx.run("container.exists", || {
            let predicate = container_scope(scope, intent, "c");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            query_exists(
                self.conn,
                &format!(
                    "SELECT 1 FROM containers c WHERE c.id = ? AND {}",
                    predicate.sql
                ),
                binds,
            )
        })
    }

    fn list(&self, filter: &ContainerFilter, page: PageRequest) -> StoreResult<Vec<Container>> {
        let (limit, offset) = page.resolve()?;
        self.ctx.run("container.list", || {
            let (where_sql, mut binds) = Self::filter_clause(filter);
            binds.push(Value::Integer(limit));
            binds.push(Value::Integer(offset));
            query_all(
                self.conn,
                &format!(
                    "{CONTAINER_SELECT_SQL}{where_sql}
                     ORDER BY c.created_at ASC, c.rowid ASC
                     LIMIT ? OFFSET ?;"
                ),
                binds,
                parse_container_row,
            )
        })
    }

    fn update(&self, container: &Container, scope: ScopeFilter) -> StoreResult<Container> {
        container.validate()?;

        self.ctx.run("container.update", || {
            let predicate = container_scope(scope, Intent::Write, "c");
            let mut binds = vec![text(container.id)];
            predicate.bind_into(&mut binds);
            let stored: Option<String> = self
                .conn
                .query_row(
                    &format!(
                        "SELECT c.attributes FROM containers c WHERE c.id = ? AND {};",
                        predicate.sql
                    ),
                    params_from_iter(binds),
                    |row| row.get(0),
                )
                .optional()?;
            let Some(stored) = stored else {
                return Err(StoreError::not_found(EntityKind::Container, container.id));
            };

            let merged =
                merge_attributes(decode_attributes(Some(&stored)), &container.attributes);
            self.conn.execute(
                &format!(
                    "UPDATE containers
                     SET name = ?1,
                         description = ?2,
                         attributes = ?3,
                         updated_at = {NOW_EPOCH_MS_SQL}
                     WHERE id = ?4;"
                ),
                params![
                    container.name.trim(),
                    container.description.as_str(),
                    encode_attributes(&merged),
                    container.id.to_string(),
                ],
            )?;
            load_required(self.conn, container.id)
        })
    }

    fn delete(&self, id: ContainerId, scope: ScopeFilter) -> StoreResult<bool> {
        self.ctx.run("container.delete", || {
            let predicate = container_scope(scope, Intent::Delete, "c");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            let changed = self
                .conn
                .execute(
                    &format!(
                        "DELETE FROM containers
                         WHERE id IN (SELECT c.id FROM containers c WHERE c.id = ? AND {});",
                        predicate.sql
                    ),
                    params_from_iter(binds),
                )
                .map_err(|err| delete_error(err, EntityKind::Container, "groupings", id))?;
            Ok(changed > 0)
        })
    }

    fn count(&self, filter: &ContainerFilter) -> StoreResult<u64> {
        self.ctx.run("container.count", || {
            let (where_sql, binds) = Self::filter_clause(filter);
            query_count(
                self.conn,
                &format!("SELECT COUNT(*) FROM containers c{where_sql};"),
                binds,
            )
        })
    }
}

fn load_required(conn: &Connection, id: ContainerId) -> StoreResult<Container> {
    query_optional(
        conn,
        &format!("{CONTAINER_SELECT_SQL} WHERE c.id = ?;"),
        vec![text(id)],
        parse_container_row,
    )?
    .ok_or_else(|| StoreError::not_found(EntityKind::Container, id))
}

fn parse_container_row(row: &Row<'_>) -> StoreResult<Container> {
    let attributes: Option<String> = row.get("attributes")?;
    Ok(Container {
        id: uuid_column(row, "id")?,
        owner_id: uuid_column(row, "owner_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        attributes: decode_attributes(attributes.as_deref()),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
