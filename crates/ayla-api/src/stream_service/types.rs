// Wire types for the device stream service: subscriptions (mdss) and the
// change events delivered over the push socket (mstream).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device_service::types::DatapointRecord;

// ── Event types ──────────────────────────────────────────────────────

/// Kinds of change the stream service can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Connectivity,
    Datapoint,
    #[serde(rename = "datapointack")]
    DatapointAck,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::Datapoint => "datapoint",
            Self::DatapointAck => "datapointack",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connectivity" => Ok(Self::Connectivity),
            "datapoint" => Ok(Self::Datapoint),
            "datapointack" => Ok(Self::DatapointAck),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

// ── Subscriptions ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    pub subscription: NewSubscription,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSubscription {
    pub name: String,
    pub description: String,
    /// Comma-separated DSN scope.
    pub dsn: String,
    pub property_name: String,
    pub client_type: String,
    pub batch_size: u32,
    /// Comma-separated event types.
    pub subscription_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionWrapper {
    pub subscription: SubscriptionRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionRecord {
    pub id: Option<u64>,
    pub stream_key: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub dsn: Option<String>,
    pub property_name: Option<String>,
    pub client_type: Option<String>,
    pub subscription_type: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

// ── Push events ──────────────────────────────────────────────────────

/// A decoded change event from the push socket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamEvent {
    pub seq: Option<serde_json::Value>,
    pub datapoint: Option<DatapointRecord>,
    pub metadata: Option<StreamEventMetadata>,
    pub connection: Option<StreamConnection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamEventMetadata {
    pub oem_id: Option<String>,
    pub oem_model: Option<String>,
    /// Comma-separated list of affected DSNs.
    pub dsn: Option<String>,
    pub property_name: Option<String>,
    pub display_name: Option<String>,
    pub base_type: Option<String>,
    pub event_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConnection {
    pub status: Option<String>,
    pub event_time: Option<String>,
}

impl StreamEvent {
    /// DSNs this event applies to.
    pub fn dsns(&self) -> Vec<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.dsn.as_deref())
            .map(|s| s.split(',').map(str::trim).filter(|d| !d.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Parsed event type, if present and recognized.
    pub fn event_type(&self) -> Option<EventType> {
        self.metadata
            .as_ref()
            .and_then(|m| m.event_type.as_deref())
            .and_then(|t| t.parse().ok())
    }
}
