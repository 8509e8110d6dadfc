// Initialization phases and the offline fallback.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use super::{DeviceManager, DeviceManagerState, ManagerEvent, lock};
use crate::cache::{self, CacheKind};
use crate::change::ListChange;
use crate::error::CoreError;
use crate::model::{DataSource, DeviceInfo};

impl DeviceManager {
    /// Drive the phases from the current state until a resting state
    /// (`Ready`, `Error`, `Paused`, `Uninitialized`) is reached.
    pub(super) async fn run_phases(&self) {
        let _guard = self.inner.phase_lock.lock().await;
        loop {
            if self.inner.cancel.is_cancelled() {
                break;
            }
            match self.state() {
                DeviceManagerState::FetchingDeviceList => match self.fetch_device_list().await {
                    Ok(_) => {
                        self.advance(
                            DeviceManagerState::FetchingDeviceList,
                            DeviceManagerState::FetchingDeviceProperties,
                        );
                    }
                    Err(CoreError::Cancelled) => break,
                    Err(e) => {
                        // Still here: no fallback took over.
                        if self.state() == DeviceManagerState::FetchingDeviceList {
                            *lock(&self.inner.last_error) = Some(e);
                            self.set_state(DeviceManagerState::Error);
                        }
                    }
                },
                DeviceManagerState::FetchingDeviceProperties => self.fetch_properties_phase().await,
                DeviceManagerState::FetchingLanConfig => self.fetch_lan_config_phase().await,
                DeviceManagerState::Uninitialized
                | DeviceManagerState::Ready
                | DeviceManagerState::Error
                | DeviceManagerState::Paused => break,
            }
        }
    }

    // ── Device list ──────────────────────────────────────────────────

    /// GET the device list and merge it. Failures are handled (offline
    /// fallback, state change, event) before being returned.
    pub(super) async fn fetch_device_list(&self) -> Result<ListChange, CoreError> {
        let service = self.inner.ctx.device_service();
        let result = match self.inner.cancel.run_until_cancelled(service.list_devices()).await {
            Some(result) => result.map_err(CoreError::from),
            None => Err(CoreError::Cancelled),
        };

        match result {
            Ok(records) => {
                self.inner.cached_list.store(false, Ordering::Relaxed);
                let infos: Vec<DeviceInfo> = records.into_iter().map(DeviceInfo::from).collect();
                debug!(count = infos.len(), "device list fetched");
                Ok(self.merge_devices(infos, DataSource::Cloud).await)
            }
            Err(CoreError::Cancelled) => Err(CoreError::Cancelled),
            Err(e) => {
                self.handle_list_error(&e).await;
                Err(e)
            }
        }
    }

    async fn handle_list_error(&self, error: &CoreError) {
        let config = self.inner.ctx.config();
        if error.is_network_or_timeout()
            && config.allow_offline_use
            && self.state() != DeviceManagerState::Ready
        {
            match self.initialize_from_cache().await {
                Ok(true) => return,
                Ok(false) => debug!("no cached device list"),
                Err(e) => warn!(error = %e, "cached device list unusable"),
            }
        }

        let cached = self.inner.cached_list.load(Ordering::Relaxed);
        if (error.is_authentication() && !cached) || !self.has_initialized() {
            warn!(error = %error, "device manager initialization failed");
            *lock(&self.inner.last_error) = Some(error.clone());
            self.stop_list_polling();
            self.set_state(DeviceManagerState::Error);
            self.emit(ManagerEvent::Error(Arc::new(error.clone())));
            if !self.has_initialized() {
                self.emit(ManagerEvent::InitFailed(Arc::new(error.clone())));
            }
            return;
        }
        self.emit_error(error.clone());
    }

    /// Restore devices, properties and LAN configs saved by an earlier
    /// session and go straight to `Ready`. Returns `false` when nothing
    /// was cached.
    async fn initialize_from_cache(&self) -> Result<bool, CoreError> {
        let ctx = &self.inner.ctx;
        let infos: Option<Vec<DeviceInfo>> =
            cache::load_json(ctx.cache(), CacheKind::Device, &ctx.config().session_name)?;
        let Some(infos) = infos else {
            return Ok(false);
        };

        info!(count = infos.len(), "initializing from the offline cache");
        self.inner.cached_list.store(true, Ordering::Relaxed);
        self.merge_devices(infos, DataSource::Cached).await;

        for device in self.inner.devices.snapshot().iter() {
            device.set_cached(true);
            if let Err(e) = device.load_cached_properties().await {
                warn!(dsn = %device.dsn(), error = %e, "cached properties unusable");
            }
            match device.load_cached_lan_config().await {
                Ok(true) => {
                    if let Err(e) = device.start_lan_session().await {
                        debug!(dsn = %device.dsn(), error = %e, "LAN session not started");
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(dsn = %device.dsn(), error = %e, "cached LAN config unusable"),
            }
        }

        if self.state() != DeviceManagerState::Paused {
            self.set_state(DeviceManagerState::Ready);
            self.become_ready();
        }
        Ok(true)
    }

    // ── Properties ───────────────────────────────────────────────────

    /// Fetch properties for one eligible device at a time until none
    /// remain. Eligible: declares properties, has none yet, and has no
    /// recorded init error. Errors persist across re-entries; the list
    /// merge drops them for DSNs that leave or join.
    async fn fetch_properties_phase(&self) {
        loop {
            if self.state() != DeviceManagerState::FetchingDeviceProperties {
                return;
            }
            let mut next = None;
            for device in self.inner.devices.snapshot().iter() {
                if device.info().declares_properties()
                    && device.property_count().await == 0
                    && !lock(&self.inner.init_errors).contains_key(device.dsn())
                {
                    next = Some(device.clone());
                    break;
                }
            }
            let Some(device) = next else {
                break;
            };

            debug!(dsn = %device.dsn(), "fetching initial properties");
            match device.fetch_all_properties().await {
                Ok(()) => {}
                Err(CoreError::Cancelled) => return,
                Err(e) => {
                    warn!(dsn = %device.dsn(), error = %e, "initial property fetch failed");
                    lock(&self.inner.init_errors).insert(device.dsn().to_owned(), Arc::new(e));
                }
            }
        }
        self.advance(
            DeviceManagerState::FetchingDeviceProperties,
            DeviceManagerState::FetchingLanConfig,
        );
    }

    // ── LAN configuration ────────────────────────────────────────────

    async fn fetch_lan_config_phase(&self) {
        if self.inner.ctx.lan_factory().is_some() {
            for device in self.inner.devices.snapshot().iter() {
                if self.state() != DeviceManagerState::FetchingLanConfig {
                    return;
                }
                if device.is_node()
                    || !device.is_lan_mode_permitted()
                    || device.lan_config().await.is_some()
                    || lock(&self.inner.init_errors).contains_key(device.dsn())
                {
                    continue;
                }

                match device.fetch_lan_config().await {
                    Ok(_) => {
                        if let Err(e) = device.start_lan_session().await {
                            debug!(dsn = %device.dsn(), error = %e, "LAN session not started");
                        }
                    }
                    Err(CoreError::Cancelled) => return,
                    Err(e) => {
                        warn!(dsn = %device.dsn(), error = %e, "LAN config fetch failed");
                        lock(&self.inner.init_errors).insert(device.dsn().to_owned(), Arc::new(e));
                    }
                }
            }
        }
        if self.advance(DeviceManagerState::FetchingLanConfig, DeviceManagerState::Ready) {
            self.become_ready();
        }
    }

    // ── Ready ────────────────────────────────────────────────────────

    fn become_ready(&self) {
        self.inner.has_initialized.store(true, Ordering::Relaxed);
        let errors = lock(&self.inner.init_errors).clone();
        info!(
            devices = self.inner.devices.len(),
            failed = errors.len(),
            "device manager ready"
        );
        self.emit(ManagerEvent::InitComplete {
            errors: Arc::new(errors),
        });

        self.start_device_polling();
        self.start_list_polling();
        if let Some(stream) = &self.inner.stream {
            stream.resume();
        }
    }
}
