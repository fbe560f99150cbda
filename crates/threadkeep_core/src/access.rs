//! Ownership-based access rules and their SQL scope predicates.
//!
//! # Responsibility
//! - Decide read/write/delete rights from ownership and participation.
//! - Render the same rules as WHERE fragments so stores fold them into the
//!   query instead of filtering loaded rows.
//!
//! # Invariants
//! - Every pure rule in this module has a SQL twin with identical meaning.
//! - An unrestricted scope renders `1 = 1` and binds nothing.
//! - Malformed participant text in storage grants nothing (treated as `[]`).

use crate::model::owner::OwnerId;
use rusqlite::types::Value;

/// Optional narrowing predicate for store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeFilter {
    /// No narrowing. For trusted internal callers.
    #[default]
    Unrestricted,
    /// Only rows the given owner may access for the operation's intent.
    Actor(OwnerId),
}

impl ScopeFilter {
    pub fn actor(&self) -> Option<OwnerId> {
        match self {
            Self::Unrestricted => None,
            Self::Actor(owner_id) => Some(*owner_id),
        }
    }
}

/// What the caller is about to do with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read,
    Write,
    Delete,
}

/// Rights held by one candidate on one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl Permissions {
    pub fn allows(self, intent: Intent) -> bool {
        match intent {
            Intent::Read => self.read,
            Intent::Write => self.write,
            Intent::Delete => self.delete,
        }
    }
}

/// Owners only see and change themselves.
pub fn owner_permissions(owner_id: OwnerId, candidate: OwnerId) -> Permissions {
    let is_self = owner_id == candidate;
    Permissions {
        read: is_self,
        write: is_self,
        delete: is_self,
    }
}

/// Container owner has full rights; participants of any grouping inside may read.
pub fn container_permissions(
    container_owner: OwnerId,
    participates_in_any_grouping: bool,
    candidate: OwnerId,
) -> Permissions {
    let is_owner = container_owner == candidate;
    Permissions {
        read: is_owner || participates_in_any_grouping,
        write: is_owner,
        delete: is_owner,
    }
}

/// Participants and the container owner read/write; only the owner deletes.
pub fn grouping_permissions(
    participants: &[OwnerId],
    container_owner: OwnerId,
    candidate: OwnerId,
) -> Permissions {
    let is_owner = container_owner == candidate;
    let member = is_owner || participants.contains(&candidate);
    Permissions {
        read: member,
        write: member,
        delete: is_owner,
    }
}

/// Grouping readers read items; only the sender edits; sender or container owner deletes.
pub fn item_permissions(
    participants: &[OwnerId],
    container_owner: OwnerId,
    sender: OwnerId,
    candidate: OwnerId,
) -> Permissions {
    let grouping = grouping_permissions(participants, container_owner, candidate);
    let is_sender = sender == candidate;
    Permissions {
        read: grouping.read,
        write: is_sender,
        delete: is_sender || container_owner == candidate,
    }
}

/// WHERE fragment plus its positional (`?`) bind values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Predicate {
    fn always() -> Self {
        Self {
            sql: "1 = 1".to_string(),
            params: Vec::new(),
        }
    }

    fn new(sql: String, actor: OwnerId, binds: usize) -> Self {
        Self {
            sql,
            params: vec![Value::Text(actor.to_string()); binds],
        }
    }

    pub(crate) fn bind_into(&self, binds: &mut Vec<Value>) {
        binds.extend(self.params.iter().cloned());
    }
}

pub(crate) fn participant_clause(grouping_alias: &str) -> String {
    format!(
        "EXISTS (SELECT 1 FROM json_each(CASE WHEN json_valid({grouping_alias}.participants) \
         THEN {grouping_alias}.participants ELSE '[]' END) AS member WHERE member.value = ?)"
    )
}

/// Scope predicate over `owners AS {alias}`.
pub(crate) fn owner_scope(scope: ScopeFilter, _intent: Intent, alias: &str) -> Predicate {
    match scope {
        ScopeFilter::Unrestricted => Predicate::always(),
        ScopeFilter::Actor(actor) => Predicate::new(format!("{alias}.id = ?"), actor, 1),
    }
}

/// Scope predicate over `containers AS {alias}`.
pub(crate) fn container_scope(scope: ScopeFilter, intent: Intent, alias: &str) -> Predicate {
    let ScopeFilter::Actor(actor) = scope else {
        return Predicate::always();
    };
    match intent {
        Intent::Read => Predicate::new(
            format!(
                "({alias}.owner_id = ? OR EXISTS (SELECT 1 FROM groupings AS scope_g \
                 WHERE scope_g.container_id = {alias}.id AND {}))",
                participant_clause("scope_g")
            ),
            actor,
            2,
        ),
        Intent::Write | Intent::Delete => {
            Predicate::new(format!("{alias}.owner_id = ?"), actor, 1)
        }
    }
}

/// Scope predicate over `groupings AS {alias}`.
pub(crate) fn grouping_scope(scope: ScopeFilter, intent: Intent, alias: &str) -> Predicate {
    let ScopeFilter::Actor(actor) = scope else {
        return Predicate::always();
    };
    let owner_clause = format!(
        "EXISTS (SELECT 1 FROM containers AS scope_c \
         WHERE scope_c.id = {alias}.container_id AND scope_c.owner_id = ?)"
    );
    match intent {
        Intent::Read | Intent::Write => Predicate::new(
            format!("({owner_clause} OR {})", participant_clause(alias)),
            actor,
            2,
        ),
        Intent::Delete => Predicate::new(owner_clause, actor, 1),
    }
}

/// Scope predicate over `items AS {alias}`.
pub(crate) fn item_scope(scope: ScopeFilter, intent: Intent, alias: &str) -> Predicate {
    let ScopeFilter::Actor(actor) = scope else {
        return Predicate::always();
    };
    match intent {
        Intent::Read => Predicate::new(
            format!(
                "EXISTS (SELECT 1 FROM groupings AS scope_g \
                 JOIN containers AS scope_c ON scope_c.id = scope_g.container_id \
                 WHERE scope_g.id = {alias}.grouping_id AND (scope_c.owner_id = ? OR {}))",
                participant_clause("scope_g")
            ),
            actor,
            2,
        ),
        Intent::Write => Predicate::new(format!("{alias}.sender_id = ?"), actor, 1),
        Intent::Delete => Predicate::new(
            format!(
                "({alias}.sender_id = ? OR EXISTS (SELECT 1 FROM groupings AS scope_g \
                 JOIN containers AS scope_c ON scope_c.id = scope_g.container_id \
                 WHERE scope_g.id = {alias}.grouping_id AND scope_c.owner_id = ?))"
            ),
            actor,
            2,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        container_permissions, container_scope, grouping_permissions, item_permissions,
        item_scope, owner_permissions, Intent, ScopeFilter,
    };
    use uuid::Uuid;

    #[test]
    fn grouping_rules_split_delete_from_membership() {
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let participants = [member];

        let for_owner = grouping_permissions(&participants, owner, owner);
        assert!(for_owner.read && for_owner.write && for_owner.delete);

        let for_member = grouping_permissions(&participants, owner, member);
        assert!(for_member.read && for_member.write);
        assert!(!for_member.delete);

        let for_stranger = grouping_permissions(&participants, owner, stranger);
        assert!(!for_stranger.allows(Intent::Read));
        assert!(!for_stranger.allows(Intent::Write));
        assert!(!for_stranger.allows(Intent::Delete));
    }

    #[test]
    fn item_edit_is_sender_only_while_owner_may_delete() {
        let owner = Uuid::new_v4();
        let sender = Uuid::new_v4();
        let other = Uuid::new_v4();
        let participants = [owner, sender, other];

        let for_owner = item_permissions(&participants, owner, sender, owner);
        assert!(for_owner.read && !for_owner.write && for_owner.delete);

        let for_sender = item_permissions(&participants, owner, sender, sender);
        assert!(for_sender.read && for_sender.write && for_sender.delete);

        let for_other = item_permissions(&participants, owner, sender, other);
        assert!(for_other.read && !for_other.write && !for_other.delete);
    }

    #[test]
    fn container_and_owner_rules() {
        let owner = Uuid::new_v4();
        let guest = Uuid::new_v4();
        assert!(container_permissions(owner, false, owner).delete);
        let guest_rights = container_permissions(owner, true, guest);
        assert!(guest_rights.read && !guest_rights.write && !guest_rights.delete);
        assert!(!container_permissions(owner, false, guest).read);

        assert!(owner_permissions(owner, owner).write);
        assert!(!owner_permissions(owner, guest).read);
    }

    #[test]
    fn unrestricted_scope_binds_nothing() {
        let predicate = container_scope(ScopeFilter::Unrestricted, Intent::Delete, "c");
        assert_eq!(predicate.sql, "1 = 1");
        assert!(predicate.params.is_empty());
    }

    #[test]
    fn placeholder_count_matches_bind_count() {
        let actor = ScopeFilter::Actor(Uuid::new_v4());
        for intent in [Intent::Read, Intent::Write, Intent::Delete] {
            for predicate in [
                container_scope(actor, intent, "c"),
                item_scope(actor, intent, "i"),
                super::grouping_scope(actor, intent, "g"),
                super::owner_scope(actor, intent, "o"),
            ] {
                assert_eq!(
                    predicate.sql.matches('?').count(),
                    predicate.params.len(),
                    "{}",
                    predicate.sql
                );
            }
        }
    }
}
