//! Owner identity record.

use crate::codec::AttributeBag;
use crate::error::StoreResult;
use crate::model::Violations;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type OwnerId = Uuid;

pub const MAX_EMAIL_CHARS: usize = 320;
pub const MAX_DISPLAY_NAME_CHARS: usize = 100;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern must compile")
});

/// Top-level identity. Created by external provisioning, never cascaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    /// Natural key. Stored trimmed and lowercased.
    pub email: String,
    pub display_name: String,
    pub attributes: AttributeBag,
    /// Epoch ms, store-maintained.
    pub created_at: i64,
    /// Epoch ms, store-maintained.
    pub updated_at: i64,
}

impl Owner {
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), email, display_name)
    }

    pub fn with_id(id: OwnerId, email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            display_name: display_name.into(),
            attributes: AttributeBag::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        let mut violations = Violations::default();
        let email = normalize_email(&self.email);
        violations.check(
            EMAIL_PATTERN.is_match(&email),
            "email",
            "must look like local@domain.tld",
        );
        violations.bounded_text(&email, "email", MAX_EMAIL_CHARS);
        violations.required_text(&self.display_name, "display_name", MAX_DISPLAY_NAME_CHARS);
        violations.finish()
    }
}

/// Canonical form of the natural key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{normalize_email, Owner};
    use crate::error::StoreError;

    #[test]
    fn email_is_normalized_case_insensitively() {
        assert_eq!(normalize_email("  Ada@Example.ORG "), "ada@example.org");
    }

    #[test]
    fn validate_reports_each_bad_field() {
        let owner = Owner::new("not-an-email", "   ");
        match owner.validate() {
            Err(StoreError::ValidationFailed { field_errors }) => {
                assert!(field_errors.contains_key("email"));
                assert!(field_errors.contains_key("display_name"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Owner::new("ada@example.org", "Ada").validate().unwrap();
    }
}
