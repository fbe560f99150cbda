//! Container record: top-level grouping owned by one owner.

use crate::codec::AttributeBag;
use crate::error::StoreResult;
use crate::model::owner::OwnerId;
use crate::model::Violations;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ContainerId = Uuid;

pub const MAX_CONTAINER_NAME_CHARS: usize = 255;
pub const MAX_DESCRIPTION_CHARS: usize = 4000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    /// Immutable after creation.
    pub owner_id: OwnerId,
    pub name: String,
    pub description: String,
    pub attributes: AttributeBag,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Container {
    pub fn new(owner_id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            description: String::new(),
            attributes: AttributeBag::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        let mut violations = Violations::default();
        violations.required_text(&self.name, "name", MAX_CONTAINER_NAME_CHARS);
        violations.bounded_text(&self.description, "description", MAX_DESCRIPTION_CHARS);
        violations.finish()
    }
}
