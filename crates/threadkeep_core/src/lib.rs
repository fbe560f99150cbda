//! Persistence coordination core for threadkeep.
//!
//! Maps the owner -> container -> grouping -> item hierarchy onto SQLite,
//! with scoped transactions, contention retry and ownership-scoped access.

pub mod access;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod retry;
pub mod service;
pub mod tx;

pub use access::{Intent, Permissions, ScopeFilter};
pub use codec::{AttributeBag, AttributeValue};
pub use config::{JournalMode, StoreConfig};
pub use db::{open_configured, open_db, open_db_in_memory, DbError};
pub use error::{EntityKind, FieldErrors, StoreError, StoreResult};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::container::{Container, ContainerId};
pub use model::grouping::{Grouping, GroupingId};
pub use model::item::{Item, ItemId};
pub use model::owner::{Owner, OwnerId};
pub use repo::container_repo::{ContainerFilter, ContainerRepository};
pub use repo::grouping_repo::{GroupingFilter, GroupingRepository};
pub use repo::item_repo::{ItemFilter, ItemRepository};
pub use repo::owner_repo::{OwnerFilter, OwnerRepository};
pub use repo::PageRequest;
pub use retry::RetryPolicy;
pub use service::hierarchy_service::HierarchyService;
pub use tx::{Coordinator, Scope, ScopeMode, TxState};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
