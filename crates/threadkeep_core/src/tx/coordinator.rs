//! Coordinator: owns the connection and opens scopes on it.

use super::scope::Scope;
use super::{ScopeMode, TxState};
use crate::config::StoreConfig;
use crate::db::migrations::current_user_version;
use crate::db::open_configured;
use crate::error::{FaultCause, StorageFault, StoreError, StoreResult};
use crate::repo::RepoContext;
use crate::retry::with_retry;
use log::{info, warn};
use rusqlite::{Connection, Transaction};
use std::cell::Cell;
use std::time::Instant;

/// Unit-of-work manager for one connection.
///
/// Not shared across threads; every concurrent unit of work opens its own
/// coordinator.
pub struct Coordinator {
    conn: Connection,
    config: StoreConfig,
    state: Cell<TxState>,
}

impl Coordinator {
    /// Wraps an already bootstrapped connection.
    pub fn new(conn: Connection, config: StoreConfig) -> Self {
        Self {
            conn,
            config,
            state: Cell::new(TxState::Idle),
        }
    }

    /// Validates `config`, opens its database and applies migrations.
    ///
    /// # Errors
    /// - `ValidationFailed` for out-of-range settings.
    /// - `StorageFault` when bootstrap fails.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let conn = open_configured(config)?;
        Ok(Self::new(conn, config.clone()))
    }

    /// Private in-memory store with default settings.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Applied schema migration version.
    pub fn schema_version(&self) -> StoreResult<u32> {
        Ok(current_user_version(&self.conn)?)
    }

    /// State of the most recent scope.
    pub fn state(&self) -> TxState {
        self.state.get()
    }

    /// Opens a scope. Lock contention at begin goes through the retry wrapper.
    ///
    /// # Errors
    /// - `Contention` when the writer lock stays busy.
    /// - `Timeout` when the configured scope timeout is zero or elapses while
    ///   waiting for the lock.
    /// - `StorageFault` when a read-only scope cannot switch the connection to
    ///   `query_only`.
    pub fn begin(&mut self, mode: ScopeMode) -> StoreResult<Scope<'_>> {
        let this: &Self = self;
        let deadline = this
            .config
            .scope_timeout()
            .map(|timeout| Instant::now() + timeout);
        let ctx = RepoContext::new(this.config.retry_policy(), deadline);

        let tx = with_retry(&ctx.retry, ctx.deadline, "scope.begin", || {
            Transaction::new_unchecked(&this.conn, mode.behavior()).map_err(StoreError::from)
        })
        .inspect_err(|err| {
            warn!(
                "event=scope_begin module=tx status=error mode={} error={}",
                mode.as_str(),
                err
            );
        })?;

        if mode == ScopeMode::ReadOnly {
            if let Err(err) = this.conn.pragma_update(None, "query_only", true) {
                let fault = StorageFault::new("scope.begin", FaultCause::Sqlite(err));
                warn!(
                    "event=scope_begin module=tx status=error mode={} {}",
                    mode.as_str(),
                    fault.diagnostic()
                );
                return Err(StoreError::StorageFault(fault));
            }
        }

        this.state.set(TxState::Active);
        info!(
            "event=scope_begin module=tx status=ok mode={} timeout_ms={}",
            mode.as_str(),
            this.config
                .scope_timeout_ms
                .map_or_else(|| "none".to_string(), |ms| ms.to_string())
        );
        Ok(Scope::new(&this.conn, tx, &this.state, mode, ctx))
    }

    /// Runs `work` in a scope: commit on `Ok`, roll back on `Err`.
    ///
    /// The error from `work` is returned unchanged.
    pub fn scoped<T, F>(&mut self, mode: ScopeMode, work: F) -> StoreResult<T>
    where
        F: FnOnce(&Scope<'_>) -> StoreResult<T>,
    {
        let scope = self.begin(mode)?;
        match work(&scope) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = scope.rollback() {
                    warn!(
                        "event=scope_rollback module=tx status=error error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    /// `scoped` in read-write mode.
    pub fn write<T, F>(&mut self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&Scope<'_>) -> StoreResult<T>,
    {
        self.scoped(ScopeMode::ReadWrite, work)
    }

    /// `scoped` in read-only mode.
    pub fn read<T, F>(&mut self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&Scope<'_>) -> StoreResult<T>,
    {
        self.scoped(ScopeMode::ReadOnly, work)
    }
}
