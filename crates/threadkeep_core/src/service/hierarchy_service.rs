//! Cascading deletes over the owner -> container -> grouping -> item chain.
//!
//! # Responsibility
//! - Remove a parent together with all descendants, leaves first.
//!
//! # Invariants
//! - Delete permission is checked on the root of the cascade through the
//!   scope filter before any row is touched.
//! - Runs inside the caller's scope; a failure at any step leaves the whole
//!   cascade to that scope's rollback.

use crate::access::{Intent, ScopeFilter};
use crate::error::StoreResult;
use crate::model::container::ContainerId;
use crate::model::grouping::GroupingId;
use crate::repo::container_repo::{ContainerRepository, SqliteContainerRepository};
use crate::repo::grouping_repo::{GroupingRepository, SqliteGroupingRepository};
use crate::repo::item_repo::{ItemRepository, SqliteItemRepository};
use crate::tx::Scope;
use log::info;

/// Cascade facade over the container, grouping and item stores.
pub struct HierarchyService<'a, C, G, I>
where
    C: ContainerRepository,
    G: GroupingRepository,
    I: ItemRepository,
{
    containers: &'a C,
    groupings: &'a G,
    items: &'a I,
}

impl<'a, 'c>
    HierarchyService<
        'a,
        SqliteContainerRepository<'c>,
        SqliteGroupingRepository<'c>,
        SqliteItemRepository<'c>,
    >
{
    /// Binds the service to the stores of an active scope.
    pub fn for_scope(scope: &'a Scope<'c>) -> Self {
        Self::new(scope.containers(), scope.groupings(), scope.items())
    }
}

impl<'a, C, G, I> HierarchyService<'a, C, G, I>
where
    C: ContainerRepository,
    G: GroupingRepository,
    I: ItemRepository,
{
    pub fn new(containers: &'a C, groupings: &'a G, items: &'a I) -> Self {
        Self {
            containers,
            groupings,
            items,
        }
    }

    /// Deletes a container with every grouping and item below it.
    ///
    /// Returns `false` when the container is absent or `scope` may not
    /// delete it.
    pub fn delete_container(&self, id: ContainerId, scope: ScopeFilter) -> StoreResult<bool> {
        if !self.containers.exists(id, scope, Intent::Delete)? {
            return Ok(false);
        }

        let items = self.items.delete_by_container(id)?;
        let groupings = self.groupings.delete_by_container(id)?;
        let removed = self.containers.delete(id, scope)?;
        info!(
            "event=cascade_delete module=service status=ok root=container groupings={} items={}",
            groupings, items
        );
        Ok(removed)
    }

    /// Deletes a grouping with all of its items.
    ///
    /// Returns `false` when the grouping is absent or `scope` may not
    /// delete it.
    pub fn delete_grouping(&self, id: GroupingId, scope: ScopeFilter) -> StoreResult<bool> {
        if !self.groupings.exists(id, scope, Intent::Delete)? {
            return Ok(false);
        }

        let items = self.items.delete_by_grouping(id)?;
        let removed = self.groupings.delete(id, scope)?;
        info!(
            "event=cascade_delete module=service status=ok root=grouping items={}",
            items
        );
        Ok(removed)
    }
}
