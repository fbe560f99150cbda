//! Transaction scopes over one exclusively owned connection.
//!
//! # Responsibility
//! - Open, commit and roll back unit-of-work scopes.
//! - Hand out entity stores bound to the active scope.
//!
//! # Invariants
//! - One coordinator owns exactly one connection.
//! - At most one scope is active per coordinator; `begin` borrows the
//!   coordinator mutably for the scope's lifetime, so nesting does not compile.
//! - A scope that is neither committed nor rolled back explicitly rolls back
//!   when dropped.

mod coordinator;
mod scope;

pub use coordinator::Coordinator;
pub use scope::Scope;

use std::fmt::{Display, Formatter};

/// Lifecycle of the most recent scope opened by a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxState {
    #[default]
    Idle,
    Active,
    Committed,
    RolledBack,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl Display for TxState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locking mode requested when a scope begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMode {
    /// Takes the writer lock at begin (`BEGIN IMMEDIATE`).
    #[default]
    ReadWrite,
    /// Defers locking until the first statement (`BEGIN DEFERRED`) and sets
    /// `PRAGMA query_only` until the scope ends, so any write fails with
    /// `StorageFault`.
    ReadOnly,
}

impl ScopeMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadWrite => "read_write",
            Self::ReadOnly => "read_only",
        }
    }

    pub(crate) fn behavior(self) -> rusqlite::TransactionBehavior {
        match self {
            Self::ReadWrite => rusqlite::TransactionBehavior::Immediate,
            Self::ReadOnly => rusqlite::TransactionBehavior::Deferred,
        }
    }
}
