//! Item store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist leaf items and keep them ordered by creation time.
//!
//! # Invariants
//! - The sender is a participant of the parent grouping at creation.
//! - `grouping_id` and `sender_id` never change after creation.
//! - Listing order is `created_at ASC`, ties broken by insertion order.

use crate::access::{grouping_scope, item_scope, Intent, ScopeFilter};
use crate::codec::{decode_attributes, encode_attributes, merge_attributes};
use crate::error::{EntityKind, StoreError, StoreResult};
use crate::model::container::ContainerId;
use crate::model::grouping::GroupingId;
use crate::model::item::{Item, ItemId};
use crate::model::owner::OwnerId;
use crate::repo::grouping_repo::decode_participants;
use crate::repo::{
    query_all, query_count, query_optional, text, uuid_column, write_error, PageRequest,
    RepoContext, NOW_EPOCH_MS_SQL,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const ITEM_SELECT_SQL: &str = "SELECT
    i.id AS id,
    i.grouping_id AS grouping_id,
    i.sender_id AS sender_id,
    i.content AS content,
    i.attributes AS attributes,
    i.created_at AS created_at,
    i.updated_at AS updated_at
FROM items i";

/// List/count filter for items.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub grouping_id: Option<GroupingId>,
    pub sender_id: Option<OwnerId>,
    /// Visibility narrowing, evaluated with read intent.
    pub scope: ScopeFilter,
}

impl ItemFilter {
    pub fn in_grouping(grouping_id: GroupingId) -> Self {
        Self {
            grouping_id: Some(grouping_id),
            ..Self::default()
        }
    }
}

/// Store contract for items.
pub trait ItemRepository {
    /// Creates an item. With an actor scope, the actor must be the sender
    /// and must see the parent grouping.
    fn create(&self, item: &Item, scope: ScopeFilter) -> StoreResult<Item>;
    fn get(&self, id: ItemId, scope: ScopeFilter) -> StoreResult<Option<Item>>;
    fn list(&self, filter: &ItemFilter, page: PageRequest) -> StoreResult<Vec<Item>>;
    /// Replaces content, merges attributes.
    fn update(&self, item: &Item, scope: ScopeFilter) -> StoreResult<Item>;
    fn delete(&self, id: ItemId, scope: ScopeFilter) -> StoreResult<bool>;
    fn count(&self, filter: &ItemFilter) -> StoreResult<u64>;
    /// Removes every item of a grouping without scope checks.
    fn delete_by_grouping(&self, grouping_id: GroupingId) -> StoreResult<u64>;
    /// Removes every item below a container without scope checks.
    fn delete_by_container(&self, container_id: ContainerId) -> StoreResult<u64>;
}

/// SQLite-backed item store.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
    ctx: RepoContext,
}

impl<'conn> SqliteItemRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_context(conn, RepoContext::default())
    }

    pub fn with_context(conn: &'conn Connection, ctx: RepoContext) -> Self {
        Self { conn, ctx }
    }

    fn filter_clause(filter: &ItemFilter) -> (String, Vec<Value>) {
        let predicate = item_scope(filter.scope, Intent::Read, "i");
        let mut sql = format!(" WHERE {}", predicate.sql);
        let mut binds = Vec::new();
        predicate.bind_into(&mut binds);
        if let Some(grouping_id) = filter.grouping_id {
            sql.push_str(" AND i.grouping_id = ?");
            binds.push(text(grouping_id));
        }
        if let Some(sender_id) = filter.sender_id {
            sql.push_str(" AND i.sender_id = ?");
            binds.push(text(sender_id));
        }
        (sql, binds)
    }

    /// Loads the participant list of a grouping visible to `scope`.
    fn visible_participants(
        &self,
        grouping_id: GroupingId,
        scope: ScopeFilter,
    ) -> StoreResult<Option<Vec<OwnerId>>> {
        let predicate = grouping_scope(scope, Intent::Read, "g");
        let mut binds = vec![text(grouping_id)];
        predicate.bind_into(&mut binds);
        let encoded: Option<Option<String>> = self
            .conn
            .query_row(
                &format!(
                    "SELECT g.participants FROM groupings g WHERE g.id = ? AND {};",
                    predicate.sql
                ),
                params_from_iter(binds),
                |row| row.get(0),
            )
            .optional()?;
        Ok(encoded.map(|value| decode_participants(value.as_deref())))
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn create(&self, item: &Item, scope: ScopeFilter) -> StoreResult<Item> {
        item.validate()?;
        if let Some(actor) = scope.actor() {
            if actor != item.sender_id {
                return Err(StoreError::invalid(
                    "sender_id",
                    "must be the acting owner",
                ));
            }
        }
        let attributes = encode_attributes(&item.attributes);

        self.ctx.run("item.create", || {
            let Some(participants) = self.visible_participants(item.grouping_id, scope)? else {
                return Err(StoreError::not_found(EntityKind::Grouping, item.grouping_id));
            };
            if !participants.contains(&item.sender_id) {
                return Err(StoreError::invalid(
                    "sender_id",
                    "must be a participant of the grouping",
                ));
            }

            self.conn
                .execute(
                    "INSERT INTO items (id, grouping_id, sender_id, content, attributes)
                     VALUES (?1, ?2, ?3, ?4, ?5);",
                    params![
                        item.id.to_string(),
                        item.grouping_id.to_string(),
                        item.sender_id.to_string(),
                        item.content.as_str(),
                        attributes.as_str(),
                    ],
                )
                .map_err(|err| {
                    write_error(
                        err,
                        EntityKind::Item,
                        |_| item.id.to_string(),
                        || StoreError::not_found(EntityKind::Owner, item.sender_id),
                    )
                })?;
            load_required(self.conn, item.id)
        })
    }

    fn get(&self, id: ItemId, scope: ScopeFilter) -> StoreResult<Option<Item>> {
        self.ctx.run("item.get", || {
            let predicate = item_scope(scope, Intent::Read, "i");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            query_optional(
                self.conn,
                &format!("{ITEM_SELECT_SQL} WHERE i.id = ? AND {};", predicate.sql),
                binds,
                parse_item_row,
            )
        })
    }

    fn list(&self, filter: &ItemFilter, page: PageRequest) -> StoreResult<Vec<Item>> {
        let (limit, offset) = page.resolve()?;
        self.ctx.run("item.list", || {
            let (where_sql, mut binds) = Self::filter_clause(filter);
            binds.push(Value::Integer(limit));
            binds.push(Value::Integer(offset));
            query_all(
                self.conn,
                &format!(
                    "{ITEM_SELECT_SQL}{where_sql}
                     ORDER BY i.created_at ASC, i.rowid ASC
                     LIMIT ? OFFSET ?;"
                ),
                binds,
                parse_item_row,
            )
        })
    }

    fn update(&self, item: &Item, scope: ScopeFilter) -> StoreResult<Item> {
        item.validate()?;

        self.ctx.run("item.update", || {
            let predicate = item_scope(scope, Intent::Write, "i");
            let mut binds = vec![text(item.id)];
            predicate.bind_into(&mut binds);
            let stored: Option<String> = self
                .conn
                .query_row(
                    &format!(
                        "SELECT i.attributes FROM items i WHERE i.id = ? AND {};",
                        predicate.sql
                    ),
                    params_from_iter(binds),
                    |row| row.get(0),
                )
                .optional()?;
            let Some(stored) = stored else {
                return Err(StoreError::not_found(EntityKind::Item, item.id));
            };

            let merged = merge_attributes(decode_attributes(Some(&stored)), &item.attributes);
            self.conn.execute(
                &format!(
                    "UPDATE items
                     SET content = ?1,
                         attributes = ?2,
                         updated_at = {NOW_EPOCH_MS_SQL}
                     WHERE id = ?3;"
                ),
                params![
                    item.content.as_str(),
                    encode_attributes(&merged),
                    item.id.to_string(),
                ],
            )?;
            load_required(self.conn, item.id)
        })
    }

    fn delete(&self, id: ItemId, scope: ScopeFilter) -> StoreResult<bool> {
        self.ctx.run("item.delete", || {
            let predicate = item_scope(scope, Intent::Delete, "i");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            let changed = self.conn.execute(
                &format!(
                    "DELETE FROM items
                     WHERE id IN (SELECT i.id FROM items i WHERE i.id = ? AND {});",
                    predicate.sql
                ),
                params_from_iter(binds),
            )?;
            Ok(changed > 0)
        })
    }

    fn count(&self, filter: &ItemFilter) -> StoreResult<u64> {
        self.ctx.run("item.count", || {
            let (where_sql, binds) = Self::filter_clause(filter);
            query_count(
                self.conn,
                &format!("SELECT COUNT(*) FROM items i{where_sql};"),
                binds,
            )
        })
    }

    fn delete_by_grouping(&self, grouping_id: GroupingId) -> StoreResult<u64> {
        self.ctx.run("item.delete_by_grouping", || {
            let removed = self.conn.execute(
                "DELETE FROM items WHERE grouping_id = ?1;",
                [grouping_id.to_string()],
            )?;
            Ok(removed as u64)
        })
    }

    fn delete_by_container(&self, container_id: ContainerId) -> StoreResult<u64> {
        self.ctx.run("item.delete_by_container", || {
            let removed = self.conn.execute(
                "DELETE FROM items
                 WHERE grouping_id IN (SELECT id FROM groupings WHERE container_id = ?1);",
                [container_id.to_string()],
            )?;
            Ok(removed as u64)
        })
    }
}

fn load_required(conn: &Connection, id: ItemId) -> StoreResult<Item> {
    query_optional(
        conn,
        &format!("{ITEM_SELECT_SQL} WHERE i.id = ?;"),
        vec![text(id)],
        parse_item_row,
    )?
    .ok_or_else(|| StoreError::not_found(EntityKind::Item, id))
}

fn parse_item_row(row: &Row<'_>) -> StoreResult<Item> {
    let attributes: Option<String> = row.get("attributes")?;
    Ok(Item {
        id: uuid_column(row, "id")?,
        grouping_id: uuid_column(row, "grouping_id")?,
        sender_id: uuid_column(row, "sender_id")?,
        content: row.get("content")?,
        attributes: decode_attributes(attributes.as_deref()),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
