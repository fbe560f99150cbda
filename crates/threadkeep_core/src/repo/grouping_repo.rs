//! Grouping store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist groupings with their encoded participant list.
//! - Resolve container ownership and participant identities on write.
//!
//! # Invariants
//! - The acting owner is added to `participants` on create and update.
//! - `participants` is never written empty; every entry names an existing owner.
//! - Only the container owner may create or delete groupings.

use crate::access::{container_scope, grouping_scope, participant_clause, Intent, ScopeFilter};
use crate::codec::{
    decode_attributes, decode_identifier_list, encode_attributes, encode_identifier_list,
    merge_attributes,
};
use crate::error::{EntityKind, StoreError, StoreResult};
use crate::model::container::ContainerId;
use crate::model::grouping::{Grouping, GroupingId};
use crate::model::owner::OwnerId;
use crate::repo::{
    delete_error, parse_uuid, query_all, query_count, query_exists, query_optional, text,
    uuid_column, write_error, PageRequest, RepoContext, NOW_EPOCH_MS_SQL,
};
use log::warn;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const GROUPING_SELECT_SQL: &str = "SELECT
    g.id AS id,
    g.container_id AS container_id,
    g.topic AS topic,
    g.participants AS participants,
    g.attributes AS attributes,
    g.created_at AS created_at,
    g.updated_at AS updated_at
FROM groupings g";

/// List/count filter for groupings.
#[derive(Debug, Clone, Default)]
pub struct GroupingFilter {
    pub container_id: Option<ContainerId>,
    /// Only groupings listing this owner as participant.
    pub participant: Option<OwnerId>,
    /// Visibility narrowing, evaluated with read intent.
    pub scope: ScopeFilter,
}

/// Store contract for groupings.
pub trait GroupingRepository {
    /// Creates a grouping. With an actor scope, the actor must own the
    /// container and is added to the participants.
    fn create(&self, grouping: &Grouping, scope: ScopeFilter) -> StoreResult<Grouping>;
    fn get(&self, id: GroupingId, scope: ScopeFilter) -> StoreResult<Option<Grouping>>;
    fn exists(&self, id: GroupingId, scope: ScopeFilter, intent: Intent) -> StoreResult<bool>;
    fn list(&self, filter: &GroupingFilter, page: PageRequest) -> StoreResult<Vec<Grouping>>;
    /// Replaces topic and participants, merges attributes.
    fn update(&self, grouping: &Grouping, scope: ScopeFilter) -> StoreResult<Grouping>;
    fn delete(&self, id: GroupingId, scope: ScopeFilter) -> StoreResult<bool>;
    fn count(&self, filter: &GroupingFilter) -> StoreResult<u64>;
    /// Removes every grouping of a container without scope checks.
    fn delete_by_container(&self, container_id: ContainerId) -> StoreResult<u64>;
}

/// SQLite-backed grouping store.
pub struct SqliteGroupingRepository<'conn> {
    conn: &'conn Connection,
    ctx: RepoContext,
}

impl<'conn> SqliteGroupingRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_context(conn, RepoContext::default())
    }

    pub fn with_context(conn: &'conn Connection, ctx: RepoContext) -> Self {
        Self { conn, ctx }
    }

    fn filter_clause(filter: &GroupingFilter) -> (String, Vec<Value>) {
        let predicate = grouping_scope(filter.scope, Intent::Read, "g");
        let mut sql = format!(" WHERE {}", predicate.sql);
        let mut binds = Vec::new();
        predicate.bind_into(&mut binds);
        if let Some(container_id) = filter.container_id {
            sql.push_str(" AND g.container_id = ?");
            binds.push(text(container_id));
        }
        if let Some(participant) = filter.participant {
            sql.push_str(" AND ");
            sql.push_str(&participant_clause("g"));
            binds.push(text(participant));
        }
        (sql, binds)
    }

    /// Returns the first participant with no owner row, if any.
    fn first_unknown_participant(&self, encoded: &str) -> StoreResult<Option<String>> {
        let missing = self
            .conn
            .query_row(
                "SELECT member.value
                 FROM json_each(?1) AS member
                 WHERE member.value NOT IN (SELECT id FROM owners)
                 LIMIT 1;",
                [encoded],
                |row| row.get(0),
            )
            .optional()?;
        Ok(missing)
    }
}

/// Applies the implicit-participant rule and checks invariants.
fn prepare_for_write(grouping: &Grouping, scope: ScopeFilter) -> StoreResult<Grouping> {
    let mut prepared = grouping.clone();
    prepared.dedupe_participants();
    if let Some(actor) = scope.actor() {
        prepared.add_participant(actor);
    }
    prepared.validate()?;
    Ok(prepared)
}

fn encode_participants(participants: &[OwnerId]) -> String {
    let ids: Vec<String> = participants.iter().map(ToString::to_string).collect();
    encode_identifier_list(&ids)
}

impl GroupingRepository for SqliteGroupingRepository<'_> {
    fn create(&self, grouping: &Grouping, scope: ScopeFilter) -> StoreResult<Grouping> {
        let grouping = prepare_for_write(grouping, scope)?;
        let participants = encode_participants(&grouping.participants);
        let attributes = encode_attributes(&grouping.attributes);
        let missing_container =
            || StoreError::not_found(EntityKind::Container, grouping.container_id);

        self.ctx.run("grouping.create", || {
            let predicate = container_scope(scope, Intent::Write, "c");
            let mut binds = vec![text(grouping.container_id)];
            predicate.bind_into(&mut binds);
            if !query_exists(
                self.conn,
                &format!(
                    "SELECT 1 FROM containers c WHERE c.id = ? AND {}",
                    predicate.sql
                ),
                binds,
            )? {
                return Err(missing_container());
            }
            if let Some(missing) = self.first_unknown_participant(&participants)? {
                return Err(StoreError::not_found(EntityKind::Owner, missing));
            }

            self.conn
                .execute(
                    "INSERT INTO groupings (id, container_id, topic, participants, attributes)
                     VALUES (?1, ?2, ?3, ?4, ?5);",
                    params![
                        grouping.id.to_string(),
                        grouping.container_id.to_string(),
                        grouping.topic.as_str(),
                        participants.as_str(),
                        attributes.as_str(),
                    ],
                )
                .map_err(|err| {
                    write_error(
                        err,
                        EntityKind::Grouping,
                        |_| grouping.id.to_string(),
                        missing_container,
                    )
                })?;
            load_required(self.conn, grouping.id)
        })
    }

    fn get(&self, id: GroupingId, scope: ScopeFilter) -> StoreResult<Option<Grouping>> {
        self.ctx.run("grouping.get", || {
            let predicate = grouping_scope(scope, Intent::Read, "g");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            query_optional(
                self.conn,
                &format!("{GROUPING_SELECT_SQL} WHERE g.id = ? AND {};", predicate.sql),
                binds,
                parse_grouping_row,
            )
        })
    }

    fn exists(&self, id: GroupingId, scope: ScopeFilter, intent: Intent) -> StoreResult<bool> {
        self.ctx.run("grouping.exists", || {
            let predicate = grouping_scope(scope, intent, "g");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            query_exists(
                self.conn,
                &format!(
                    "SELECT 1 FROM groupings g WHERE g.id = ? AND {}",
                    predicate.sql
                ),
                binds,
            )
        })
    }

    fn list(&self, filter: &GroupingFilter, page: PageRequest) -> StoreResult<Vec<Grouping>> {
        let (limit, offset) = page.resolve()?;
        self.ctx.run("grouping.list", || {
            let (where_sql, mut binds) = Self::filter_clause(filter);
            binds.push(Value::Integer(limit));
            binds.push(Value::Integer(offset));
            query_all(
                self.conn,
                &format!(
                    "{GROUPING_SELECT_SQL}{where_sql}
                     ORDER BY g.created_at ASC, g.rowid ASC
                     LIMIT ? OFFSET ?;"
                ),
                binds,
                parse_grouping_row,
            )
        })
    }

    fn update(&self, grouping: &Grouping, scope: ScopeFilter) -> StoreResult<Grouping> {
        let grouping = prepare_for_write(grouping, scope)?;
        let participants = encode_participants(&grouping.participants);

        self.ctx.run("grouping.update", || {
            let predicate = grouping_scope(scope, Intent::Write, "g");
            let mut binds = vec![text(grouping.id)];
            predicate.bind_into(&mut binds);
            let stored: Option<String> = self
                .conn
                .query_row(
                    &format!(
                        "SELECT g.attributes FROM groupings g WHERE g.id = ? AND {};",
                        predicate.sql
                    ),
                    params_from_iter(binds),
                    |row| row.get(0),
                )
                .optional()?;
            let Some(stored) = stored else {
                return Err(StoreError::not_found(EntityKind::Grouping, grouping.id));
            };
            if let Some(missing) = self.first_unknown_participant(&participants)? {
                return Err(StoreError::not_found(EntityKind::Owner, missing));
            }

            let merged = merge_attributes(decode_attributes(Some(&stored)), &grouping.attributes);
            self.conn.execute(
                &format!(
                    "UPDATE groupings
                     SET topic = ?1,
                         participants = ?2,
                         attributes = ?3,
                         updated_at = {NOW_EPOCH_MS_SQL}
                     WHERE id = ?4;"
                ),
                params![
                    grouping.topic.as_str(),
                    participants.as_str(),
                    encode_attributes(&merged),
                    grouping.id.to_string(),
                ],
            )?;
            load_required(self.conn, grouping.id)
        })
    }

    fn delete(&self, id: GroupingId, scope: ScopeFilter) -> StoreResult<bool> {
        self.ctx.run("grouping.delete", || {
            let predicate = grouping_scope(scope, Intent::Delete, "g");
            let mut binds = vec![text(id)];
            predicate.bind_into(&mut binds);
            let changed = self
                .conn
                .execute(
                    &format!(
                        "DELETE FROM groupings
                         WHERE id IN (SELECT g.id FROM groupings g WHERE g.id = ? AND {});",
                        predicate.sql
                    ),
                    params_from_iter(binds),
                )
                .map_err(|err| delete_error(err, EntityKind::Grouping, "items", id))?;
            Ok(changed > 0)
        })
    }

    fn count(&self, filter: &GroupingFilter) -> StoreResult<u64> {
        self.ctx.run("grouping.count", || {
            let (where_sql, binds) = Self::filter_clause(filter);
            query_count(
                self.conn,
                &format!("SELECT COUNT(*) FROM groupings g{where_sql};"),
                binds,
            )
        })
    }

    fn delete_by_container(&self, container_id: ContainerId) -> StoreResult<u64> {
        self.ctx.run("grouping.delete_by_container", || {
            let removed = self
                .conn
                .execute(
                    "DELETE FROM groupings WHERE container_id = ?1;",
                    [container_id.to_string()],
                )
                .map_err(|err| {
                    delete_error(err, EntityKind::Container, "items", container_id)
                })?;
            Ok(removed as u64)
        })
    }
}

fn load_required(conn: &Connection, id: GroupingId) -> StoreResult<Grouping> {
    query_optional(
        conn,
        &format!("{GROUPING_SELECT_SQL} WHERE g.id = ?;"),
        vec![text(id)],
        parse_grouping_row,
    )?
    .ok_or_else(|| StoreError::not_found(EntityKind::Grouping, id))
}

/// Decodes participants; unparseable entries are dropped with a warning.
pub(crate) fn decode_participants(encoded: Option<&str>) -> Vec<OwnerId> {
    decode_identifier_list(encoded)
        .into_iter()
        .filter_map(|value| match parse_uuid(&value, "groupings.participants") {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(
                    "event=identifier_list_decode_failed module=repo status=skip column=groupings.participants"
                );
                None
            }
        })
        .collect()
}

fn parse_grouping_row(row: &Row<'_>) -> StoreResult<Grouping> {
    let participants: Option<String> = row.get("participants")?;
    let attributes: Option<String> = row.get("attributes")?;
    Ok(Grouping {
        id: uuid_column(row, "id")?,
        container_id: uuid_column(row, "container_id")?,
        topic: row.get("topic")?,
        participants: decode_participants(participants.as_deref()),
        attributes: decode_attributes(attributes.as_deref()),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
