//! Domain model for the owner -> container -> grouping -> item chain.
//!
//! # Responsibility
//! - Define canonical entity records shared by stores and callers.
//! - Check structural invariants before any storage call.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID chosen at construction.
//! - `created_at`/`updated_at` are owned by the store; values set by callers
//!   are ignored on write.

pub mod container;
pub mod grouping;
pub mod item;
pub mod owner;

use crate::error::{FieldErrors, StoreError, StoreResult};

/// Accumulates per-field violations for one entity.
#[derive(Debug, Default)]
pub(crate) struct Violations {
    errors: FieldErrors,
}

impl Violations {
    pub(crate) fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok && !self.errors.contains_key(field) {
            self.errors.insert(field.to_string(), message.into());
        }
    }

    /// Non-blank after trim and at most `max_chars` characters.
    pub(crate) fn required_text(&mut self, value: &str, field: &str, max_chars: usize) {
        self.check(!value.trim().is_empty(), field, "must not be blank");
        self.bounded_text(value, field, max_chars);
    }

    pub(crate) fn bounded_text(&mut self, value: &str, field: &str, max_chars: usize) {
        self.check(
            value.chars().count() <= max_chars,
            field,
            format!("must be at most {max_chars} characters"),
        );
    }

    pub(crate) fn finish(self) -> StoreResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::ValidationFailed {
                field_errors: self.errors,
            })
        }
    }
}
