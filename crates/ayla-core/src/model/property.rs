// ── Property domain types ──
//
// A property is one named value on a device. All merge rules live here:
// coercion to the base type, field-by-field change detection, and the
// timestamps synthesized for LAN updates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::datapoint::Datapoint;
use super::source::DataSource;
use crate::error::CoreError;

// ── Base type ────────────────────────────────────────────────────────

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BaseType {
    Boolean,
    Integer,
    Decimal,
    #[default]
    String,
    File,
    Message,
}

impl BaseType {
    /// Unknown type names are treated as strings.
    pub fn from_wire(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// File properties never travel over LAN.
    pub fn supports_lan(self) -> bool {
        self != Self::File
    }

    /// Coerce a raw JSON value to this type. `null` stays `None`.
    pub fn coerce(self, raw: &serde_json::Value) -> Result<Option<PropertyValue>, CoreError> {
        use serde_json::Value;

        if raw.is_null() {
            return Ok(None);
        }

        let value = match self {
            Self::Boolean | Self::Integer => PropertyValue::Integer(coerce_integer(raw)?),
            Self::Decimal => PropertyValue::Decimal(coerce_decimal(raw)?),
            Self::String | Self::File | Self::Message => PropertyValue::Text(match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        };
        Ok(Some(value))
    }
}

fn coerce_integer(raw: &serde_json::Value) -> Result<i64, CoreError> {
    use serde_json::Value;

    let parsed = match raw {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .and_then(|f| format!("{f:.0}").parse().ok())
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| CoreError::Json {
        message: format!("cannot coerce {raw} to an integer"),
    })
}

fn coerce_decimal(raw: &serde_json::Value) -> Result<f64, CoreError> {
    use serde_json::Value;

    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| CoreError::Json {
        message: format!("cannot coerce {raw} to a decimal"),
    })
}

// ── Value ────────────────────────────────────────────────────────────

/// A property value after coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl PropertyValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Decimal(f) => serde_json::Value::from(*f),
            Self::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ── Change tracking ──────────────────────────────────────────────────

/// Property fields whose changes are reported to listeners.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PropertyField {
    Value,
    Metadata,
    DataUpdatedAt,
    AckedAt,
    AckStatus,
    AckMessage,
    Key,
    DisplayName,
}

// ── Property ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub key: Option<u64>,
    pub base_type: BaseType,
    pub value: Option<PropertyValue>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub display_name: Option<String>,
    pub direction: Option<String>,
    pub read_only: bool,
    pub ack_enabled: bool,
    pub ack_status: Option<i64>,
    pub ack_message: Option<i64>,
    pub acked_at: Option<String>,
    pub data_updated_at: Option<String>,
    pub last_update_source: Option<DataSource>,
}

impl Property {
    pub fn supports_lan(&self) -> bool {
        self.base_type.supports_lan()
    }

    /// Check that `dp` could be merged without applying it.
    pub(crate) fn validate_datapoint(&self, dp: &Datapoint) -> Result<(), CoreError> {
        self.base_type.coerce(&dp.value).map(|_| ())
    }

    /// Apply a datapoint. Returns the changed fields (empty when nothing
    /// differed).
    ///
    /// LAN updates carry no timestamps; when a LAN update changes value or
    /// metadata, `data_updated_at` (and `acked_at` on ack-enabled
    /// properties) are stamped locally. File properties ignore LAN updates.
    pub fn merge_datapoint(
        &mut self,
        dp: &Datapoint,
        source: DataSource,
    ) -> Result<BTreeSet<PropertyField>, CoreError> {
        let mut changed = BTreeSet::new();
        if source == DataSource::Lan && !self.supports_lan() {
            return Ok(changed);
        }

        let value = self.base_type.coerce(&dp.value)?;
        self.last_update_source = Some(source);

        if let Some(value) = value {
            if self.value.as_ref() != Some(&value) {
                self.value = Some(value);
                changed.insert(PropertyField::Value);
            }
        }

        if dp.metadata != self.metadata {
            self.metadata.clone_from(&dp.metadata);
            changed.insert(PropertyField::Metadata);
        }

        let mut updated_at = dp.updated_at.clone();
        let mut acked_at = dp.acked_at.clone();
        if source == DataSource::Lan && !changed.is_empty() {
            let now = now_timestamp();
            if self.ack_enabled && acked_at.is_none() {
                acked_at = Some(now.clone());
            }
            if updated_at.is_none() {
                updated_at = Some(now);
            }
        }

        if let Some(ts) = updated_at {
            if self.data_updated_at.as_deref() != Some(ts.as_str()) {
                self.data_updated_at = Some(ts);
                changed.insert(PropertyField::DataUpdatedAt);
            }
        }

        if let Some(ts) = acked_at.filter(|s| !s.is_empty()) {
            if self.acked_at.as_deref() != Some(ts.as_str()) {
                self.acked_at = Some(ts);
                self.ack_status = dp.ack_status;
                self.ack_message = dp.ack_message;
                changed.extend([
                    PropertyField::AckedAt,
                    PropertyField::AckStatus,
                    PropertyField::AckMessage,
                ]);
            }
        }

        Ok(changed)
    }

    /// Apply a whole property, as returned by a cloud fetch or the cache.
    /// Descriptive fields (type, direction, ack capability) are copied
    /// silently; tracked fields are reported.
    pub fn merge_property(&mut self, other: &Property, source: DataSource) -> BTreeSet<PropertyField> {
        let mut changed = BTreeSet::new();
        self.last_update_source = Some(source);
        self.base_type = other.base_type;
        self.direction.clone_from(&other.direction);
        self.read_only = other.read_only;
        self.ack_enabled = other.ack_enabled;

        if self.key != other.key {
            self.key = other.key;
            changed.insert(PropertyField::Key);
        }
        if self.acked_at != other.acked_at {
            self.acked_at.clone_from(&other.acked_at);
            changed.insert(PropertyField::AckedAt);
        }
        if self.ack_message != other.ack_message {
            self.ack_message = other.ack_message;
            changed.insert(PropertyField::AckMessage);
        }
        if self.ack_status != other.ack_status {
            self.ack_status = other.ack_status;
            changed.insert(PropertyField::AckStatus);
        }
        if self.data_updated_at != other.data_updated_at {
            self.data_updated_at.clone_from(&other.data_updated_at);
            changed.insert(PropertyField::DataUpdatedAt);
        }
        if self.display_name != other.display_name {
            self.display_name.clone_from(&other.display_name);
            changed.insert(PropertyField::DisplayName);
        }
        if self.value != other.value {
            self.value.clone_from(&other.value);
            changed.insert(PropertyField::Value);
        }
        if self.metadata != other.metadata {
            self.metadata.clone_from(&other.metadata);
            changed.insert(PropertyField::Metadata);
        }

        changed
    }
}

/// ISO-8601 UTC timestamp used for locally stamped fields.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
