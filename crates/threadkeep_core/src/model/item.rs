//! Item record: leaf content sent by one participant.

use crate::codec::AttributeBag;
use crate::error::StoreResult;
use crate::model::grouping::GroupingId;
use crate::model::owner::OwnerId;
use crate::model::Violations;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ItemId = Uuid;

pub const MAX_CONTENT_CHARS: usize = 32_768;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Immutable after creation.
    pub grouping_id: GroupingId,
    /// Immutable after creation. Must be a participant at creation time.
    pub sender_id: OwnerId,
    pub content: String,
    pub attributes: AttributeBag,
    /// Epoch ms; items are listed in this order.
    pub created_at: i64,
    pub updated_at: i64,
}

impl Item {
    pub fn new(grouping_id: GroupingId, sender_id: OwnerId, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            grouping_id,
            sender_id,
            content: content.into(),
            attributes: AttributeBag::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        let mut violations = Violations::default();
        violations.required_text(&self.content, "content", MAX_CONTENT_CHARS);
        violations.finish()
    }
}
