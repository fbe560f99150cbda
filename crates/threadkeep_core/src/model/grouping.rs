//! Grouping record: a topic inside a container with a participant set.
//!
//! # Invariants
//! - `participants` is never persisted empty.
//! - Participant order is insertion order, without duplicates.

use crate::codec::AttributeBag;
use crate::error::StoreResult;
use crate::model::container::ContainerId;
use crate::model::owner::OwnerId;
use crate::model::Violations;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type GroupingId = Uuid;

pub const MAX_TOPIC_CHARS: usize = 255;
pub const MAX_PARTICIPANTS: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grouping {
    pub id: GroupingId,
    /// Immutable after creation.
    pub container_id: ContainerId,
    pub topic: String,
    pub participants: Vec<OwnerId>,
    pub attributes: AttributeBag,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Grouping {
    pub fn new(
        container_id: ContainerId,
        topic: impl Into<String>,
        participants: impl IntoIterator<Item = OwnerId>,
    ) -> Self {
        let mut grouping = Self {
            id: Uuid::new_v4(),
            container_id,
            topic: topic.into(),
            participants: Vec::new(),
            attributes: AttributeBag::new(),
            created_at: 0,
            updated_at: 0,
        };
        for participant in participants {
            grouping.add_participant(participant);
        }
        grouping
    }

    pub fn has_participant(&self, owner_id: OwnerId) -> bool {
        self.participants.contains(&owner_id)
    }

    /// Appends `owner_id` unless already present.
    pub fn add_participant(&mut self, owner_id: OwnerId) {
        if !self.has_participant(owner_id) {
            self.participants.push(owner_id);
        }
    }

    pub(crate) fn dedupe_participants(&mut self) {
        let mut seen = Vec::with_capacity(self.participants.len());
        self.participants.retain(|id| {
            if seen.contains(id) {
                false
            } else {
                seen.push(*id);
                true
            }
        });
    }

    pub fn validate(&self) -> StoreResult<()> {
        let mut violations = Violations::default();
        violations.bounded_text(&self.topic, "topic", MAX_TOPIC_CHARS);
        violations.check(
            !self.participants.is_empty(),
            "participants",
            "must contain at least one owner",
        );
        violations.check(
            self.participants.len() <= MAX_PARTICIPANTS,
            "participants",
            format!("must contain at most {MAX_PARTICIPANTS} owners"),
        );
        violations.finish()
    }
}
