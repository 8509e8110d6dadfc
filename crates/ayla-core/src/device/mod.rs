// ── Device ──
//
// Per-device state and the operations that move it: property fetches,
// datapoint writes, polling and LAN sessions. A `Device` is a cheap
// handle around `Arc<DeviceInner>`; the manager owns the canonical set.
//
// Mutations happen under `state` (a tokio mutex) and their events are
// published before the lock is released, so subscribers observe changes
// in mutation order.

mod datapoint;
mod fetch;
mod lan;
mod polling;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use ayla_api::lan::LanSession;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{self, CacheKind};
use crate::change::{Change, DeviceEvent, FieldChange, PropertyChange};
use crate::context::SessionContext;
use crate::error::CoreError;
use crate::model::{ConnectionStatus, DataSource, Datapoint, DeviceInfo, LanConfig, Property};
use crate::store::PropertyStore;

const EVENT_CHANNEL_SIZE: usize = 256;

/// A device on the account.
///
/// Cheaply cloneable; every clone refers to the same device.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    dsn: String,
    ctx: Arc<SessionContext>,
    state: Mutex<DeviceState>,
    /// Copy of `state.info`, replaced under the state lock.
    info: ArcSwap<DeviceInfo>,
    events: broadcast::Sender<DeviceEvent>,
    cancel: CancellationToken,
    polling_permitted: AtomicBool,
    lan_mode_permitted: AtomicBool,
    /// Set after a failed key exchange; cleared on network change or a
    /// new LAN key.
    lan_temp_disabled: AtomicBool,
    /// Restored from the offline cache and not yet confirmed by the cloud.
    cached: AtomicBool,
    poller: SyncMutex<Option<TaskSlot>>,
    lan: SyncMutex<Option<Arc<LanHandle>>>,
}

struct DeviceState {
    info: DeviceInfo,
    properties: PropertyStore,
    lan_config: Option<LanConfig>,
    last_update_source: Option<DataSource>,
}

struct TaskSlot {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct LanHandle {
    session: Arc<dyn LanSession>,
    cancel: CancellationToken,
}

fn lock_slot<T>(slot: &SyncMutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Device {
    pub(crate) fn new(ctx: Arc<SessionContext>, info: DeviceInfo, source: DataSource) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = ctx.cancel_token().child_token();
        Self {
            inner: Arc::new(DeviceInner {
                dsn: info.dsn.clone(),
                info: ArcSwap::from_pointee(info.clone()),
                state: Mutex::new(DeviceState {
                    info,
                    properties: PropertyStore::new(),
                    lan_config: None,
                    last_update_source: Some(source),
                }),
                ctx,
                events,
                cancel,
                polling_permitted: AtomicBool::new(true),
                lan_mode_permitted: AtomicBool::new(true),
                lan_temp_disabled: AtomicBool::new(false),
                cached: AtomicBool::new(source == DataSource::Cached),
                poller: SyncMutex::new(None),
                lan: SyncMutex::new(None),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn dsn(&self) -> &str {
        &self.inner.dsn
    }

    /// Current descriptive attributes.
    pub fn info(&self) -> Arc<DeviceInfo> {
        self.inner.info.load_full()
    }

    pub fn is_node(&self) -> bool {
        self.inner.info.load().is_node()
    }

    pub async fn property(&self, name: &str) -> Option<Property> {
        self.inner.state.lock().await.properties.get(name).cloned()
    }

    pub async fn properties(&self) -> Vec<Property> {
        self.inner.state.lock().await.properties.snapshot()
    }

    pub async fn property_count(&self) -> usize {
        self.inner.state.lock().await.properties.len()
    }

    pub async fn lan_config(&self) -> Option<LanConfig> {
        self.inner.state.lock().await.lan_config.clone()
    }

    pub async fn last_update_source(&self) -> Option<DataSource> {
        self.inner.state.lock().await.last_update_source
    }

    /// Subscribe to changes, errors and LAN state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_cached(&self) -> bool {
        self.inner.cached.load(Ordering::Relaxed)
    }

    pub(crate) fn set_cached(&self, cached: bool) {
        self.inner.cached.store(cached, Ordering::Relaxed);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // ── Permissions ──────────────────────────────────────────────────

    pub fn is_polling_permitted(&self) -> bool {
        self.inner.polling_permitted.load(Ordering::Relaxed)
    }

    pub fn set_polling_permitted(&self, permitted: bool) {
        self.inner.polling_permitted.store(permitted, Ordering::Relaxed);
        if !permitted {
            self.stop_polling();
        }
    }

    /// LAN mode is possible when permitted locally, enabled on the
    /// service, not temporarily disabled, and (for shared devices)
    /// allowed by the session.
    pub fn is_lan_mode_permitted(&self) -> bool {
        let info = self.inner.info.load();
        self.inner.lan_mode_permitted.load(Ordering::Relaxed)
            && info.lan_enabled
            && !self.inner.lan_temp_disabled.load(Ordering::Relaxed)
            && (!info.is_shared() || self.inner.ctx.config().allow_lan_for_shared_devices)
    }

    pub fn set_lan_mode_permitted(&self, permitted: bool) {
        self.inner.lan_mode_permitted.store(permitted, Ordering::Relaxed);
    }

    pub fn is_lan_temp_disabled(&self) -> bool {
        self.inner.lan_temp_disabled.load(Ordering::Relaxed)
    }

    pub fn clear_lan_temp_disabled(&self) {
        self.inner.lan_temp_disabled.store(false, Ordering::Relaxed);
    }

    // ── Merges ───────────────────────────────────────────────────────

    /// Take descriptive fields from `other`. Publishes one field change
    /// when anything differed.
    pub async fn update_from(&self, other: &DeviceInfo, source: DataSource) -> Option<FieldChange> {
        let mut state = self.inner.state.lock().await;
        let fields = state.info.update_from(other);
        if source == DataSource::Cloud {
            self.set_cached(false);
        }
        if fields.is_empty() {
            return None;
        }
        self.inner.info.store(Arc::new(state.info.clone()));
        let change = FieldChange { fields };
        self.publish(&mut state, Change::Field(change.clone()), source);
        Some(change)
    }

    pub async fn set_connection_status(
        &self,
        status: ConnectionStatus,
        source: DataSource,
    ) -> Option<FieldChange> {
        let mut info = (*self.info()).clone();
        info.connection_status = status;
        self.update_from(&info, source).await
    }

    /// Merge one datapoint into a known property and persist the snapshot.
    pub async fn merge_datapoint(
        &self,
        name: &str,
        dp: &Datapoint,
        source: DataSource,
    ) -> Result<Option<PropertyChange>, CoreError> {
        let mut state = self.inner.state.lock().await;
        let change = state.properties.merge_datapoint(name, dp, source)?;
        if let Some(change) = &change {
            self.publish(&mut state, Change::Property(change.clone()), source);
            self.cache_properties(&state);
        }
        Ok(change)
    }

    pub(crate) async fn merge_properties(&self, properties: Vec<Property>, source: DataSource) {
        let mut state = self.inner.state.lock().await;
        for change in state.properties.merge_properties(properties, source) {
            self.publish(&mut state, change, source);
        }
    }

    pub(crate) async fn apply_stream_datapoint(
        &self,
        name: &str,
        dp: &Datapoint,
        event_type: ayla_api::stream_service::types::EventType,
    ) -> Result<Option<PropertyChange>, CoreError> {
        let mut state = self.inner.state.lock().await;
        let change = state.properties.merge_event(name, dp, event_type)?;
        if let Some(change) = &change {
            self.publish(&mut state, Change::Property(change.clone()), DataSource::Dss);
            self.cache_properties(&state);
        }
        Ok(change)
    }

    // ── Source arbitration ───────────────────────────────────────────

    /// React to a transport becoming available or going away.
    ///
    /// A push event while LAN is active changes nothing. LAN entry forces
    /// a property fetch and only then announces the LAN state; with the
    /// push channel connected any other source triggers a one-shot fetch.
    /// Otherwise the device falls back to polling.
    pub async fn data_source_changed(&self, source: DataSource) {
        let lan_active = self.is_lan_active();
        let fetch = if source == DataSource::Dss && lan_active {
            false
        } else if self.inner.ctx.is_stream_connected() {
            true
        } else {
            source == DataSource::Lan && lan_active
        };
        debug!(dsn = %self.dsn(), %source, lan_active, fetch, "data source changed");

        if !fetch {
            self.start_polling();
            return;
        }

        let names = self.sync_property_names().await;
        let result = self.fetch_properties(names.as_deref()).await;
        self.stop_polling();
        match result {
            Ok(_) => {
                if source == DataSource::Lan {
                    self.emit(DeviceEvent::LanStateChanged {
                        active: true,
                        error: None,
                    });
                }
            }
            Err(e) => {
                warn!(dsn = %self.dsn(), error = %e, "property fetch after source change failed");
                self.emit_error(e);
            }
        }
    }

    /// Names kept in sync by polling: the configured filter, if any.
    pub fn managed_property_names(&self) -> Option<Vec<String>> {
        self.inner
            .ctx
            .config()
            .managed_property_names(&self.inner.info.load())
    }

    /// Names for a forced fetch: the filter, falling back to every known
    /// property so the fetch can go over LAN.
    async fn sync_property_names(&self) -> Option<Vec<String>> {
        if let Some(names) = self.managed_property_names() {
            return Some(names);
        }
        let known = self.inner.state.lock().await.properties.names();
        (!known.is_empty()).then_some(known)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop polling and LAN, and cancel every task owned by this device.
    pub async fn shutdown(&self) {
        self.stop_polling();
        self.stop_lan_session().await;
        self.inner.cancel.cancel();
        debug!(dsn = %self.dsn(), "device shut down");
    }

    // ── Internal helpers ─────────────────────────────────────────────

    /// Publish while the state lock is held.
    fn publish(&self, state: &mut DeviceState, change: Change, source: DataSource) {
        state.last_update_source = Some(source);
        let _ = self.inner.events.send(DeviceEvent::Changed { change, source });
    }

    fn emit(&self, event: DeviceEvent) {
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn emit_error(&self, error: CoreError) {
        self.emit(DeviceEvent::Error(Arc::new(error)));
    }

    fn cache_properties(&self, state: &DeviceState) {
        if self.inner.ctx.config().allow_offline_use {
            cache::save_json_logged(
                self.inner.ctx.cache(),
                CacheKind::Property,
                self.dsn(),
                &state.properties.snapshot(),
            );
        }
    }

    fn ctx(&self) -> &SessionContext {
        &self.inner.ctx
    }

    async fn cancellable<T, F>(&self, fut: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, ayla_api::Error>>,
    {
        match self.inner.cancel.run_until_cancelled(fut).await {
            Some(result) => result.map_err(CoreError::from),
            None => Err(CoreError::Cancelled),
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("dsn", &self.inner.dsn)
            .field("lan_active", &self.is_lan_active())
            .field("polling", &self.is_polling())
            .finish_non_exhaustive()
    }
}
