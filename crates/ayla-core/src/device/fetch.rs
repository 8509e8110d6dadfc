// Property and LAN-config fetches.

use std::sync::atomic::Ordering;

use ayla_api::device_service::types::LanConfigRecord;
use ayla_api::lan::{LanCommand, LanPropertyResponse};
use tracing::{debug, info};

use super::Device;
use crate::cache::{self, CacheKind};
use crate::change::Change;
use crate::error::CoreError;
use crate::model::{DataSource, Datapoint, LanConfig, Property};
use crate::selector::{Transport, choose_read_transport};

impl Device {
    /// Fetch properties from the device (LAN) or the cloud.
    ///
    /// With `names`, only those are fetched and returned, in the order
    /// given. LAN is used only when a session is active and every named
    /// property is LAN-capable.
    pub async fn fetch_properties(&self, names: Option<&[String]>) -> Result<Vec<Property>, CoreError> {
        let transport = {
            let state = self.inner.state.lock().await;
            choose_read_transport(self.is_lan_active(), &state.properties, names)
        };
        debug!(dsn = %self.dsn(), %transport, count = names.map_or(0, <[String]>::len), "fetching properties");
        match (transport, names) {
            (Transport::Lan, Some(names)) => self.fetch_properties_lan(names).await,
            _ => self.fetch_properties_cloud(names).await,
        }
    }

    async fn fetch_properties_cloud(&self, names: Option<&[String]>) -> Result<Vec<Property>, CoreError> {
        let records = self
            .cancellable(self.ctx().device_service().list_properties(self.dsn(), names))
            .await?;
        let properties = records
            .into_iter()
            .map(Property::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.inner.state.lock().await;
        for change in state.properties.merge_properties(properties, DataSource::Cloud) {
            self.publish(&mut state, change, DataSource::Cloud);
        }
        self.cache_properties(&state);
        Ok(match names {
            Some(names) => state.properties.select(names),
            None => state.properties.snapshot(),
        })
    }

    async fn fetch_properties_lan(&self, names: &[String]) -> Result<Vec<Property>, CoreError> {
        let session = self
            .active_lan_session()
            .ok_or_else(|| CoreError::precondition("LAN session is not active"))?;
        let info = self.info();
        let commands: Vec<LanCommand> = names
            .iter()
            .map(|name| {
                if info.is_node() {
                    LanCommand::GetNodeProperty {
                        dsn: info.dsn.clone(),
                        name: name.clone(),
                    }
                } else {
                    LanCommand::GetProperty { name: name.clone() }
                }
            })
            .collect();
        let timeout = self.ctx().config().lan_batch_timeout(commands.len());

        let results = self.cancellable(session.send(commands, timeout)).await?;
        if results.len() != names.len() {
            return Err(CoreError::Internal(format!(
                "LAN batch returned {} results for {} commands",
                results.len(),
                names.len()
            )));
        }

        let mut batch = Vec::with_capacity(names.len());
        for (name, result) in names.iter().zip(results) {
            let text = result?;
            let resp: LanPropertyResponse = serde_json::from_str(&text)?;
            if resp.name != *name {
                debug!(dsn = %self.dsn(), expected = %name, got = %resp.name, "LAN reply name mismatch");
            }
            batch.push((name.clone(), Datapoint::new(resp.value, resp.metadata)));
        }

        let mut state = self.inner.state.lock().await;
        let changes = state.properties.merge_datapoints(&batch, DataSource::Lan)?;
        for change in changes {
            self.publish(&mut state, Change::Property(change), DataSource::Lan);
        }
        self.cache_properties(&state);
        Ok(state.properties.select(names))
    }

    /// Fetch every property the service lists for this device. Used by
    /// the manager's initialization phase; an empty list is an error.
    pub(crate) async fn fetch_all_properties(&self) -> Result<(), CoreError> {
        let names = self.managed_property_names();
        let properties = self.fetch_properties_cloud(names.as_deref()).await?;
        if properties.is_empty() {
            return Err(CoreError::Internal(
                "No properties found for this device".to_owned(),
            ));
        }
        Ok(())
    }

    /// Fetch LAN-mode parameters. Nodes are reached through their
    /// gateway and have none of their own.
    pub async fn fetch_lan_config(&self) -> Result<LanConfig, CoreError> {
        if self.is_node() {
            return Err(CoreError::precondition("Nodes do not have a LAN config"));
        }
        let record = self
            .cancellable(self.ctx().device_service().get_lan_config(self.dsn()))
            .await?;
        if self.ctx().config().allow_offline_use {
            cache::save_json_logged(self.ctx().cache(), CacheKind::LanConfig, self.dsn(), &record);
        }
        let config = LanConfig::from(record);
        self.apply_lan_config(config.clone()).await;
        Ok(config)
    }

    /// Restore the LAN config saved by a previous online session.
    pub(crate) async fn load_cached_lan_config(&self) -> Result<bool, CoreError> {
        let record: Option<LanConfigRecord> =
            cache::load_json(self.ctx().cache(), CacheKind::LanConfig, self.dsn())?;
        match record {
            Some(record) => {
                self.apply_lan_config(LanConfig::from(record)).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Restore cached properties; returns how many were loaded.
    pub(crate) async fn load_cached_properties(&self) -> Result<usize, CoreError> {
        let properties: Option<Vec<Property>> =
            cache::load_json(self.ctx().cache(), CacheKind::Property, self.dsn())?;
        let properties = properties.unwrap_or_default();
        let count = properties.len();
        self.merge_properties(properties, DataSource::Cached).await;
        Ok(count)
    }

    async fn apply_lan_config(&self, config: LanConfig) {
        let mut state = self.inner.state.lock().await;
        let key_changed = state
            .lan_config
            .as_ref()
            .is_some_and(|old| old.lanip_key_id != config.lanip_key_id);
        if key_changed && self.inner.lan_temp_disabled.swap(false, Ordering::Relaxed) {
            info!(dsn = %self.dsn(), "LAN key rotated, re-enabling LAN mode");
        }
        state.lan_config = Some(config);
    }
}
