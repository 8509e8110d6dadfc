// Merging an exhaustive device list into the collection.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::{DeviceManager, DeviceManagerState, ManagerEvent, lock};
use crate::cache::{self, CacheKind};
use crate::change::ListChange;
use crate::device::Device;
use crate::model::{DataSource, DeviceInfo};

impl DeviceManager {
    /// Merge the complete device list for the account.
    ///
    /// Known DSNs are updated in place, new ones are added and local
    /// devices absent from `infos` are removed and shut down. Publishes one
    /// list change for the whole pass. Any addition sends the manager back
    /// to fetching properties.
    pub async fn merge_devices(&self, infos: Vec<DeviceInfo>, source: DataSource) -> ListChange {
        let ctx = &self.inner.ctx;
        if ctx.config().allow_offline_use && source != DataSource::Cached {
            cache::save_json_logged(
                ctx.cache(),
                CacheKind::Device,
                &ctx.config().session_name,
                &infos,
            );
        }

        let incoming: BTreeSet<String> = infos.iter().map(|i| i.dsn.clone()).collect();
        let mut change = ListChange::default();

        for info in infos {
            if let Some(device) = self.inner.devices.get(&info.dsn) {
                device.update_from(&info, source).await;
            } else {
                let dsn = info.dsn.clone();
                lock(&self.inner.init_errors).remove(&dsn);
                self.inner
                    .devices
                    .insert(Device::new(Arc::clone(ctx), info, source));
                change.added.push(dsn);
            }
        }

        let mut stale: Vec<String> = self
            .inner
            .devices
            .keys()
            .into_iter()
            .filter(|dsn| !incoming.contains(dsn))
            .collect();
        stale.sort();
        for dsn in stale {
            if let Some(device) = self.inner.devices.remove(&dsn) {
                device.shutdown().await;
            }
            lock(&self.inner.init_errors).remove(&dsn);
            change.removed.push(dsn);
        }

        if change.is_empty() {
            return change;
        }
        info!(added = change.added.len(), removed = change.removed.len(), "device list changed");
        self.emit(ManagerEvent::DeviceListChanged(change.clone()));

        if !change.added.is_empty() {
            self.restart_property_phase();
        }
        change
    }

    fn restart_property_phase(&self) {
        let target = DeviceManagerState::FetchingDeviceProperties;
        match self.state() {
            DeviceManagerState::Paused => {
                let mut pre = lock(&self.inner.pre_pause_state);
                if *pre == Some(DeviceManagerState::Ready) {
                    *pre = Some(target);
                }
            }
            DeviceManagerState::Ready
            | DeviceManagerState::FetchingLanConfig
            | DeviceManagerState::FetchingDeviceProperties => {
                debug!("new devices, fetching their properties");
                self.set_state(target);
            }
            // Initial list fetch advances on its own; offline bootstrap
            // goes straight to Ready.
            DeviceManagerState::FetchingDeviceList
            | DeviceManagerState::Uninitialized
            | DeviceManagerState::Error => {}
        }
    }
}
