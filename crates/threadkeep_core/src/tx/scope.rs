//! Scope: one live transaction plus the stores bound to it.

use super::{ScopeMode, TxState};
use crate::error::{FaultCause, StorageFault, StoreError, StoreResult};
use crate::repo::container_repo::SqliteContainerRepository;
use crate::repo::grouping_repo::SqliteGroupingRepository;
use crate::repo::item_repo::SqliteItemRepository;
use crate::repo::owner_repo::SqliteOwnerRepository;
use crate::repo::RepoContext;
use crate::retry::ensure_before_deadline;
use log::{info, warn};
use once_cell::unsync::OnceCell;
use rusqlite::{Connection, Transaction};
use std::cell::Cell;
use std::time::Instant;

/// Active unit of work. Stores obtained here share its transaction.
pub struct Scope<'c> {
    conn: &'c Connection,
    tx: Option<Transaction<'c>>,
    state: &'c Cell<TxState>,
    mode: ScopeMode,
    ctx: RepoContext,
    opened_at: Instant,
    owners: OnceCell<SqliteOwnerRepository<'c>>,
    containers: OnceCell<SqliteContainerRepository<'c>>,
    groupings: OnceCell<SqliteGroupingRepository<'c>>,
    items: OnceCell<SqliteItemRepository<'c>>,
}

impl<'c> Scope<'c> {
    pub(super) fn new(
        conn: &'c Connection,
        tx: Transaction<'c>,
        state: &'c Cell<TxState>,
        mode: ScopeMode,
        ctx: RepoContext,
    ) -> Self {
        Self {
            conn,
            tx: Some(tx),
            state,
            mode,
            ctx,
            opened_at: Instant::now(),
            owners: OnceCell::new(),
            containers: OnceCell::new(),
            groupings: OnceCell::new(),
            items: OnceCell::new(),
        }
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    pub fn state(&self) -> TxState {
        self.state.get()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.ctx.deadline
    }

    pub fn owners(&self) -> &SqliteOwnerRepository<'c> {
        self.owners
            .get_or_init(|| SqliteOwnerRepository::with_context(self.conn, self.ctx))
    }

    pub fn containers(&self) -> &SqliteContainerRepository<'c> {
        self.containers
            .get_or_init(|| SqliteContainerRepository::with_context(self.conn, self.ctx))
    }

    pub fn groupings(&self) -> &SqliteGroupingRepository<'c> {
        self.groupings
            .get_or_init(|| SqliteGroupingRepository::with_context(self.conn, self.ctx))
    }

    pub fn items(&self) -> &SqliteItemRepository<'c> {
        self.items
            .get_or_init(|| SqliteItemRepository::with_context(self.conn, self.ctx))
    }

    /// Commits every write made through this scope.
    ///
    /// # Errors
    /// - `Timeout` when the scope deadline has passed; the scope rolls back.
    /// - `StorageFault` when the engine refuses the commit; the scope is
    ///   rolled back.
    pub fn commit(mut self) -> StoreResult<()> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };

        if let Err(err) = ensure_before_deadline(self.ctx.deadline, "scope.commit") {
            self.finish_rollback(tx, "timeout");
            return Err(err);
        }

        let committed = tx.commit();
        self.release_read_only();
        match committed {
            Ok(()) => {
                self.state.set(TxState::Committed);
                info!(
                    "event=scope_commit module=tx status=ok mode={} duration_ms={}",
                    self.mode.as_str(),
                    self.opened_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                // A failed commit drops the transaction, which rolls it back.
                self.state.set(TxState::RolledBack);
                let fault = StorageFault::new("scope.commit", FaultCause::Sqlite(err));
                warn!(
                    "event=scope_commit module=tx status=error {}",
                    fault.diagnostic()
                );
                Err(StoreError::StorageFault(fault))
            }
        }
    }

    /// Discards every write made through this scope.
    ///
    /// # Errors
    /// - `StorageFault` when the engine refuses the rollback. The scope is
    ///   still reported as rolled back.
    pub fn rollback(mut self) -> StoreResult<()> {
        match self.tx.take() {
            Some(tx) => self.rollback_with(tx, "requested"),
            None => Ok(()),
        }
    }

    /// Lifts `query_only` once a read-only scope has ended.
    fn release_read_only(&self) {
        if self.mode != ScopeMode::ReadOnly {
            return;
        }
        if let Err(err) = self.conn.pragma_update(None, "query_only", false) {
            warn!(
                "event=scope_release module=tx status=error mode={} error={}",
                self.mode.as_str(),
                err
            );
        }
    }

    fn finish_rollback(&self, tx: Transaction<'c>, reason: &str) {
        if let Err(err) = self.rollback_with(tx, reason) {
            warn!(
                "event=scope_rollback module=tx status=error reason={} error={}",
                reason, err
            );
        }
    }

    fn rollback_with(&self, tx: Transaction<'c>, reason: &str) -> StoreResult<()> {
        self.state.set(TxState::RolledBack);
        let result = tx.rollback();
        self.release_read_only();
        info!(
            "event=scope_rollback module=tx status={} mode={} reason={} duration_ms={}",
            if result.is_ok() { "ok" } else { "error" },
            self.mode.as_str(),
            reason,
            self.opened_at.elapsed().as_millis()
        );
        result.map_err(|err| {
            StoreError::StorageFault(StorageFault::new("scope.rollback", FaultCause::Sqlite(err)))
        })
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.finish_rollback(tx, "dropped");
        }
    }
}
