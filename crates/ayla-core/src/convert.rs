// ── Wire → domain conversions ──
//
// Bridges `ayla_api` records into the canonical model. Property values
// are coerced here, so a record whose value does not fit its base type
// fails to convert.

use std::time::Duration;

use ayla_api::device_service::types::{
    DatapointRecord, DeviceRecord, GrantRecord, LanConfigRecord, PropertyRecord,
};
use secrecy::SecretString;

use crate::error::CoreError;
use crate::model::{
    BaseType, ConnectionStatus, Datapoint, DeviceInfo, DeviceType, Grant, LanConfig, Property,
    RegistrationType,
};

impl From<GrantRecord> for Grant {
    fn from(g: GrantRecord) -> Self {
        Self {
            user_id: g.user_id,
            operation: g.operation,
            start_date_at: g.start_date_at,
            end_date_at: g.end_date_at,
            role: g.role,
        }
    }
}

impl From<DeviceRecord> for DeviceInfo {
    fn from(d: DeviceRecord) -> Self {
        Self {
            connection_status: ConnectionStatus::from_wire(d.connection_status.as_deref()),
            device_type: DeviceType::from_wire(d.device_type.as_deref()),
            registration_type: RegistrationType::from_wire(d.registration_type.as_deref()),
            lan_enabled: d.lan_enabled.unwrap_or(false),
            grant: d.grant.map(Grant::from),
            dsn: d.dsn,
            key: d.key,
            connected_at: d.connected_at,
            lan_ip: d.lan_ip,
            ip: d.ip,
            mac: d.mac,
            product_name: d.product_name,
            product_class: d.product_class,
            model: d.model,
            oem_model: d.oem_model,
            sw_version: d.sw_version,
            template_id: d.template_id,
            has_properties: d.has_properties,
            module_updated_at: d.module_updated_at,
        }
    }
}

impl TryFrom<PropertyRecord> for Property {
    type Error = CoreError;

    fn try_from(p: PropertyRecord) -> Result<Self, Self::Error> {
        let base_type = BaseType::from_wire(&p.base_type);
        let value = base_type.coerce(&p.value)?;
        Ok(Self {
            name: p.name,
            key: p.key,
            base_type,
            value,
            metadata: p.metadata,
            display_name: p.display_name,
            direction: p.direction,
            read_only: p.read_only.unwrap_or(false),
            ack_enabled: p.ack_enabled.unwrap_or(false),
            ack_status: p.ack_status,
            ack_message: p.ack_message,
            acked_at: p.acked_at,
            data_updated_at: p.data_updated_at,
            last_update_source: None,
        })
    }
}

impl From<DatapointRecord> for Datapoint {
    fn from(d: DatapointRecord) -> Self {
        Self {
            id: d.id,
            value: d.value,
            metadata: d.metadata,
            created_at: d.created_at,
            updated_at: d.updated_at,
            echo: d.echo,
            acked_at: d.acked_at,
            ack_status: d.ack_status,
            ack_message: d.ack_message,
        }
    }
}

impl From<LanConfigRecord> for LanConfig {
    fn from(l: LanConfigRecord) -> Self {
        Self {
            lanip_key_id: l.lanip_key_id,
            lanip_key: l.lanip_key.map(SecretString::from),
            keep_alive: l.keep_alive.map(Duration::from_secs),
            auto_sync: l.auto_sync,
            status: l.status,
        }
    }
}
