//! LAN session contract.
//!
//! A LAN session talks to a device directly on the local network. The
//! embedded HTTP server, key exchange and encryption live behind
//! [`LanSession`]; this crate only fixes the shape of the conversation:
//! ordered command batches with one result per command, plus a stream of
//! session events (state changes and property updates pushed by the device).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Error;

// ── Commands ─────────────────────────────────────────────────────────

/// One command in a LAN batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum LanCommand {
    /// Read a property of the session's own device.
    GetProperty { name: String },
    /// Read a property of a node behind the session's gateway.
    GetNodeProperty { dsn: String, name: String },
    /// Write a datapoint. `dsn` is set when addressing a node.
    CreateDatapoint {
        #[serde(skip_serializing_if = "Option::is_none")]
        dsn: Option<String>,
        name: String,
        base_type: String,
        value: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<BTreeMap<String, String>>,
    },
}

impl LanCommand {
    /// Property this command addresses.
    pub fn property_name(&self) -> &str {
        match self {
            Self::GetProperty { name }
            | Self::GetNodeProperty { name, .. }
            | Self::CreateDatapoint { name, .. } => name,
        }
    }
}

/// Module reply to a property read: `{"name", "value", "metadata"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LanPropertyResponse {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Result for one command: the raw module response text, or its error.
pub type LanCommandResult = Result<String, Error>;

// ── Events ───────────────────────────────────────────────────────────

/// Acknowledgement attached to a device-pushed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanAck {
    pub id: Option<String>,
    pub status: i64,
    pub message: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LanEvent {
    /// The session entered (`active = true`) or left LAN mode. `error`
    /// explains a departure, e.g. a failed key exchange.
    StateChanged { active: bool, error: Option<String> },
    /// The device pushed a property value over LAN.
    PropertyUpdate {
        name: String,
        value: serde_json::Value,
        metadata: Option<BTreeMap<String, String>>,
        ack: Option<LanAck>,
    },
}

// ── Session ──────────────────────────────────────────────────────────

/// A LAN session with a single device.
///
/// Implementations must execute the commands of one batch in order and
/// return exactly one result per command, in the same order.
pub trait LanSession: Send + Sync {
    fn is_active(&self) -> bool;

    fn start(&self) -> BoxFuture<'_, Result<(), Error>>;

    fn stop(&self) -> BoxFuture<'_, ()>;

    fn send(
        &self,
        commands: Vec<LanCommand>,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<LanCommandResult>, Error>>;

    fn subscribe(&self) -> broadcast::Receiver<LanEvent>;
}

/// Parameters a factory needs to open a session with one device.
#[derive(Debug, Clone)]
pub struct LanTarget {
    pub dsn: String,
    pub lan_ip: Option<String>,
    pub key_id: Option<u64>,
    pub key: Option<secrecy::SecretString>,
    pub keep_alive: Option<Duration>,
}

/// Creates LAN sessions. The session manager owns one factory for all
/// devices.
pub trait LanSessionFactory: Send + Sync {
    fn create(&self, target: LanTarget) -> Arc<dyn LanSession>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn commands_serialize_with_tag() {
        let cmd = LanCommand::GetNodeProperty {
            dsn: "AC000N1".into(),
            name: "Blue_LED".into(),
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            serde_json::json!({ "cmd": "get_node_property", "dsn": "AC000N1", "name": "Blue_LED" })
        );
        assert_eq!(cmd.property_name(), "Blue_LED");
    }

    #[test]
    fn property_response_metadata_is_optional() {
        let resp: LanPropertyResponse =
            serde_json::from_str(r#"{"name":"Blue_LED","value":"1"}"#).unwrap();
        assert_eq!(resp.name, "Blue_LED");
        assert_eq!(resp.value, serde_json::json!("1"));
        assert!(resp.metadata.is_none());
    }
}
