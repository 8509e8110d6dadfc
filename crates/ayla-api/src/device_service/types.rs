// Wire types for the Ayla device service (`apiv1/...`).
//
// Every collection endpoint wraps each element in a single-key object
// (`[{"device": {...}}]`), so each record type has a matching wrapper.
// Fields are optional wherever the service is known to send `null`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceWrapper {
    pub device: DeviceRecord,
}

/// A device as returned by `apiv1/devices.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRecord {
    pub dsn: String,
    pub key: Option<u64>,
    pub product_name: Option<String>,
    pub model: Option<String>,
    pub oem_model: Option<String>,
    pub sw_version: Option<String>,
    pub template_id: Option<u64>,
    pub mac: Option<String>,
    pub lan_ip: Option<String>,
    pub ip: Option<String>,
    pub connection_status: Option<String>,
    pub connected_at: Option<String>,
    pub module_updated_at: Option<String>,
    pub product_class: Option<String>,
    pub device_type: Option<String>,
    pub registration_type: Option<String>,
    pub lan_enabled: Option<bool>,
    pub has_properties: Option<bool>,
    pub grant: Option<GrantRecord>,
}

/// Present on devices shared with (not owned by) the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantRecord {
    pub user_id: Option<String>,
    pub operation: Option<String>,
    pub start_date_at: Option<String>,
    pub end_date_at: Option<String>,
    pub role: Option<String>,
}

// ── Properties ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyWrapper {
    pub property: PropertyRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyRecord {
    pub name: String,
    pub key: Option<u64>,
    pub base_type: String,
    pub value: serde_json::Value,
    pub display_name: Option<String>,
    pub direction: Option<String>,
    pub read_only: Option<bool>,
    pub data_updated_at: Option<String>,
    pub ack_enabled: Option<bool>,
    pub ack_status: Option<i64>,
    pub ack_message: Option<i64>,
    pub acked_at: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

// ── Datapoints ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatapointWrapper {
    pub datapoint: DatapointRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatapointRecord {
    pub id: Option<String>,
    pub value: serde_json::Value,
    pub metadata: Option<BTreeMap<String, String>>,
    pub created_at: Option<String>,
    pub created_at_from_device: Option<String>,
    pub updated_at: Option<String>,
    pub echo: Option<bool>,
    pub acked_at: Option<String>,
    pub ack_status: Option<i64>,
    pub ack_message: Option<i64>,
}

/// Body for `POST .../datapoints.json`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateDatapointRequest {
    pub datapoint: NewDatapoint,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewDatapoint {
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

// ── LAN configuration ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanConfigWrapper {
    pub lanip: LanConfigRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanConfigRecord {
    pub lanip_key_id: Option<u64>,
    pub lanip_key: Option<String>,
    pub keep_alive: Option<u64>,
    pub auto_sync: Option<u64>,
    pub status: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn device_record_tolerates_nulls() {
        let json = r#"{
            "device": {
                "dsn": "AC000W000000001",
                "key": 42,
                "product_name": "Plug",
                "connection_status": "Online",
                "lan_enabled": null,
                "has_properties": true,
                "grant": null,
                "lat": "37.0"
            }
        }"#;
        let wrapper: DeviceWrapper = serde_json::from_str(json).unwrap();
        assert_eq!(wrapper.device.dsn, "AC000W000000001");
        assert_eq!(wrapper.device.key, Some(42));
        assert_eq!(wrapper.device.lan_enabled, None);
        assert_eq!(wrapper.device.has_properties, Some(true));
    }

    #[test]
    fn create_request_omits_missing_metadata() {
        let body = CreateDatapointRequest {
            datapoint: NewDatapoint {
                value: serde_json::json!(1),
                metadata: None,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "datapoint": { "value": 1 } }));
    }
}
