//! Text codec for attribute bags and identifier lists.
//!
//! # Responsibility
//! - Map the open attribute bag and participant lists to/from their TEXT
//!   column representation (JSON).
//! - Merge attribute patches for partial updates.
//!
//! # Invariants
//! - `decode_attributes(encode_attributes(bag)) == bag`.
//! - Decoding never fails: absent or malformed text yields an empty value
//!   and a warning log line.
//! - Encoding an empty bag yields `{}`; an empty list yields `[]`.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered attribute bag carried by every entity.
pub type AttributeBag = BTreeMap<String, AttributeValue>;

/// Closed value variant stored inside an attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

const EMPTY_BAG_TEXT: &str = "{}";
const EMPTY_LIST_TEXT: &str = "[]";
const MAX_LOGGED_ERROR_CHARS: usize = 120;

/// Encodes an attribute bag for the `attributes` column.
pub fn encode_attributes(bag: &AttributeBag) -> String {
    if bag.is_empty() {
        return EMPTY_BAG_TEXT.to_string();
    }
    match serde_json::to_string(bag) {
        Ok(text) => text,
        Err(err) => {
            warn!(
                "event=attribute_encode_failed module=codec status=fallback keys={} error={}",
                bag.len(),
                truncate(&err.to_string())
            );
            EMPTY_BAG_TEXT.to_string()
        }
    }
}

/// Decodes the `attributes` column, defaulting to an empty bag.
pub fn decode_attributes(text: Option<&str>) -> AttributeBag {
    let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) else {
        return AttributeBag::new();
    };
    match serde_json::from_str::<AttributeBag>(text) {
        Ok(bag) => bag,
        Err(err) => {
            warn!(
                "event=attribute_decode_failed module=codec status=fallback chars={} error={}",
                text.chars().count(),
                truncate(&err.to_string())
            );
            AttributeBag::new()
        }
    }
}

/// Encodes a participant identifier list.
pub fn encode_identifier_list<S: AsRef<str>>(ids: &[S]) -> String {
    if ids.is_empty() {
        return EMPTY_LIST_TEXT.to_string();
    }
    let ids: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
    serde_json::to_string(&ids).unwrap_or_else(|_| EMPTY_LIST_TEXT.to_string())
}

/// Decodes a participant identifier list, defaulting to empty.
pub fn decode_identifier_list(text: Option<&str>) -> Vec<String> {
    let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(text) {
        Ok(ids) => ids,
        Err(err) => {
            warn!(
                "event=identifier_list_decode_failed module=codec status=fallback chars={} error={}",
                text.chars().count(),
                truncate(&err.to_string())
            );
            Vec::new()
        }
    }
}

/// Overlays `patch` onto `base`. A `Null` in the patch removes the key.
pub fn merge_attributes(mut base: AttributeBag, patch: &AttributeBag) -> AttributeBag {
    for (key, value) in patch {
        match value {
            AttributeValue::Null => {
                base.remove(key);
            }
            other => {
                base.insert(key.clone(), other.clone());
            }
        }
    }
    base
}

fn truncate(value: &str) -> String {
    value.chars().take(MAX_LOGGED_ERROR_CHARS).collect()
}
