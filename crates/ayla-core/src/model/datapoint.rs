use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single value written to (or reported by) a property.
///
/// The value is kept as raw JSON; it is coerced to the property's base
/// type when merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub id: Option<String>,
    pub value: serde_json::Value,
    pub metadata: Option<BTreeMap<String, String>>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub echo: Option<bool>,
    pub acked_at: Option<String>,
    pub ack_status: Option<i64>,
    pub ack_message: Option<i64>,
}

impl Datapoint {
    pub fn new(value: serde_json::Value, metadata: Option<BTreeMap<String, String>>) -> Self {
        Self {
            value,
            metadata,
            ..Self::default()
        }
    }

    /// `true` once the device has acknowledged this datapoint.
    pub fn is_acked(&self) -> bool {
        self.acked_at.as_deref().is_some_and(|s| !s.is_empty())
    }
}
