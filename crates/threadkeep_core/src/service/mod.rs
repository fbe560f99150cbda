//! Use-case services composed from several stores.
//!
//! # Responsibility
//! - Orchestrate multi-store operations inside one caller-owned scope.
//! - Keep store contracts single-entity.

pub mod hierarchy_service;
