// Datapoint writes, with acknowledgement tracking for ack-enabled
// properties.

use std::collections::BTreeMap;
use std::time::Duration;

use ayla_api::lan::LanCommand;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::Device;
use crate::change::DeviceEvent;
use crate::error::CoreError;
use crate::model::{DataSource, Datapoint, Property};
use crate::selector::{Transport, choose_write_transport};

/// HTTP status a device reports for a successful acknowledgement.
const ACK_STATUS_OK: i64 = 200;

impl Device {
    /// Write a new value to `name`.
    ///
    /// For ack-enabled properties the call waits up to `ack_timeout_secs`
    /// (the session default when `None`) for the device to acknowledge.
    /// A timeout of zero returns as soon as the write is accepted.
    pub async fn create_datapoint(
        &self,
        name: &str,
        value: serde_json::Value,
        metadata: Option<BTreeMap<String, String>>,
        ack_timeout_secs: Option<u64>,
    ) -> Result<Datapoint, CoreError> {
        let property = self
            .property(name)
            .await
            .ok_or_else(|| CoreError::invalid_argument(format!("Unknown property {name}")))?;
        let coerced = property
            .base_type
            .coerce(&value)?
            .ok_or_else(|| CoreError::invalid_argument(format!("A value is required for {name}")))?;
        let timeout_secs =
            ack_timeout_secs.unwrap_or(self.ctx().config().default_ack_timeout_secs);

        let transport = choose_write_transport(self.is_lan_active(), &property);
        debug!(dsn = %self.dsn(), property = name, %transport, "creating datapoint");
        match transport {
            Transport::Lan => {
                self.create_datapoint_lan(&property, coerced.to_json(), metadata, timeout_secs)
                    .await
            }
            Transport::Cloud => {
                self.create_datapoint_cloud(&property, coerced.to_json(), metadata, timeout_secs)
                    .await
            }
        }
    }

    async fn create_datapoint_cloud(
        &self,
        property: &Property,
        value: serde_json::Value,
        metadata: Option<BTreeMap<String, String>>,
        timeout_secs: u64,
    ) -> Result<Datapoint, CoreError> {
        let echo: Datapoint = self
            .cancellable(
                self.ctx()
                    .device_service()
                    .create_datapoint(self.dsn(), &property.name, value, metadata),
            )
            .await?
            .into();

        if !property.ack_enabled {
            self.merge_datapoint(&property.name, &echo, DataSource::Cloud).await?;
            return Ok(echo);
        }
        if timeout_secs == 0 {
            return Ok(echo);
        }

        let id = echo
            .id
            .clone()
            .ok_or_else(|| CoreError::Internal("Created datapoint has no id".to_owned()))?;
        let acked = self.poll_for_ack(&property.name, &id, timeout_secs).await?;
        self.merge_datapoint(&property.name, &acked, DataSource::Cloud).await?;
        Ok(acked)
    }

    /// Poll the service once per interval until the datapoint is acked,
    /// up to `timeout_secs` attempts.
    async fn poll_for_ack(&self, name: &str, id: &str, timeout_secs: u64) -> Result<Datapoint, CoreError> {
        let interval = self.ctx().config().ack_poll_interval;
        for attempt in 1..=timeout_secs {
            tokio::select! {
                biased;
                () = self.inner.cancel.cancelled() => return Err(CoreError::Cancelled),
                () = tokio::time::sleep(interval) => {}
            }
            let dp: Datapoint = self
                .cancellable(self.ctx().device_service().get_datapoint(self.dsn(), name, id))
                .await?
                .into();
            if !dp.is_acked() {
                debug!(dsn = %self.dsn(), property = name, attempt, "datapoint not yet acked");
                continue;
            }
            return match dp.ack_status {
                None | Some(ACK_STATUS_OK) => Ok(dp),
                status => {
                    warn!(dsn = %self.dsn(), property = name, ?status, "datapoint NAK");
                    Err(CoreError::Server {
                        status: status.and_then(|s| u16::try_from(s).ok()).unwrap_or(0),
                        message: "Datapoint NAK".to_owned(),
                    })
                }
            };
        }
        Err(CoreError::AckTimeout {
            property: name.to_owned(),
            timeout_secs,
        })
    }

    async fn create_datapoint_lan(
        &self,
        property: &Property,
        value: serde_json::Value,
        metadata: Option<BTreeMap<String, String>>,
        timeout_secs: u64,
    ) -> Result<Datapoint, CoreError> {
        let session = self
            .active_lan_session()
            .ok_or_else(|| CoreError::precondition("LAN session is not active"))?;
        let wait_for_ack = property.ack_enabled && timeout_secs > 0;
        // Subscribe before sending so an ack racing the reply is not lost.
        let mut events = wait_for_ack.then(|| self.subscribe());

        let command = LanCommand::CreateDatapoint {
            dsn: self.is_node().then(|| self.dsn().to_owned()),
            name: property.name.clone(),
            base_type: property.base_type.to_string(),
            value: value.clone(),
            metadata: metadata.clone(),
        };
        let timeout = self.ctx().config().lan_batch_timeout(1);
        let mut results = self.cancellable(session.send(vec![command], timeout)).await?;
        match results.pop() {
            Some(result) => {
                result?;
            }
            None => return Err(CoreError::Internal("LAN batch returned no result".to_owned())),
        }

        let dp = Datapoint::new(value, metadata);
        let Some(events) = events.as_mut() else {
            self.merge_datapoint(&property.name, &dp, DataSource::Lan).await?;
            return Ok(dp);
        };
        self.wait_for_lan_ack(events, &property.name, timeout_secs).await
    }

    async fn wait_for_lan_ack(
        &self,
        events: &mut tokio::sync::broadcast::Receiver<DeviceEvent>,
        name: &str,
        timeout_secs: u64,
    ) -> Result<Datapoint, CoreError> {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(DeviceEvent::Acked { name: acked, datapoint }) if acked == name => {
                        return match datapoint.ack_status {
                            None | Some(ACK_STATUS_OK) => Ok(datapoint),
                            status => {
                                warn!(dsn = %self.dsn(), property = name, ?status, "LAN datapoint NAK");
                                Err(CoreError::Server {
                                    status: status.and_then(|s| u16::try_from(s).ok()).unwrap_or(0),
                                    message: "Datapoint NAK".to_owned(),
                                })
                            }
                        };
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(dsn = %self.dsn(), skipped, "ack waiter lagged");
                    }
                    Err(RecvError::Closed) => return Err(CoreError::Cancelled),
                }
            }
        };

        let timed = tokio::time::timeout(Duration::from_secs(timeout_secs), wait);
        match self.inner.cancel.run_until_cancelled(timed).await {
            None => Err(CoreError::Cancelled),
            Some(Err(_elapsed)) => Err(CoreError::AckTimeout {
                property: name.to_owned(),
                timeout_secs,
            }),
            Some(Ok(result)) => result,
        }
    }
}
