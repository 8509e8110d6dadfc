// Routing of decoded push events to devices.

use ayla_api::stream_service::types::{EventType, StreamEvent};
use tracing::{debug, warn};

use crate::model::{ConnectionStatus, DataSource, Datapoint};
use crate::store::DeviceCollection;

/// Apply one push event to every device it names. Returns how many
/// devices changed.
///
/// Datapoint events are skipped for devices with an active LAN session
/// (the LAN path is authoritative) and for unknown properties.
pub(crate) async fn update_devices(devices: &DeviceCollection, event: &StreamEvent) -> usize {
    let Some(event_type) = event.event_type() else {
        debug!(metadata = ?event.metadata, "push event without a known type");
        return 0;
    };

    let mut changed = 0;
    for dsn in event.dsns() {
        let Some(device) = devices.get(dsn) else {
            debug!(dsn, "push event for unknown device");
            continue;
        };

        match event_type {
            EventType::Connectivity => {
                let status = ConnectionStatus::from_wire(
                    event.connection.as_ref().and_then(|c| c.status.as_deref()),
                );
                if device.set_connection_status(status, DataSource::Dss).await.is_some() {
                    changed += 1;
                }
            }
            EventType::Datapoint | EventType::DatapointAck => {
                if device.is_lan_active() {
                    debug!(dsn, "LAN active, ignoring push datapoint");
                    continue;
                }
                let Some(name) = event.metadata.as_ref().and_then(|m| m.property_name.as_deref()) else {
                    continue;
                };
                let Some(record) = event.datapoint.clone() else {
                    continue;
                };
                let dp = Datapoint::from(record);
                match device.apply_stream_datapoint(name, &dp, event_type).await {
                    Ok(Some(_)) => changed += 1,
                    Ok(None) => {}
                    Err(e) => warn!(dsn, property = name, error = %e, "dropping push datapoint"),
                }
            }
        }
    }
    changed
}
