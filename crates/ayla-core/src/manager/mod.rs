// ── Device manager ──
//
// Owns the device collection and drives initialization:
//
//   Uninitialized → FetchingDeviceList → FetchingDeviceProperties
//     → FetchingLanConfig → Ready
//
// with `Error` as the alternate terminal state and `Paused` reachable
// from any non-error state. Once ready it polls the device list, starts
// per-device polling and brings up the push channel.

mod init;
mod merge;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard, PoisonError};

use ayla_api::stream_service::types::StreamEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::change::ListChange;
use crate::context::SessionContext;
use crate::device::Device;
use crate::dss::{StreamManager, update_devices};
use crate::error::CoreError;
use crate::store::DeviceCollection;
use crate::stream::DeviceStream;

const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceManagerState {
    #[default]
    Uninitialized,
    FetchingDeviceList,
    FetchingDeviceProperties,
    FetchingLanConfig,
    Ready,
    Error,
    Paused,
}

/// Per-DSN failures recorded during initialization.
pub type InitErrors = BTreeMap<String, Arc<CoreError>>;

#[derive(Debug, Clone)]
pub enum ManagerEvent {
    StateChanged {
        old: DeviceManagerState,
        new: DeviceManagerState,
    },
    DeviceListChanged(ListChange),
    /// A background operation (list poll, refresh) failed.
    Error(Arc<CoreError>),
    /// Initialization reached `Ready`. Devices that could not be fully
    /// initialized are listed with their errors.
    InitComplete { errors: Arc<InitErrors> },
    InitFailed(Arc<CoreError>),
}

/// Entry point to a signed-in account's devices.
///
/// Cheaply cloneable; every clone drives the same manager.
#[derive(Clone)]
pub struct DeviceManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    ctx: Arc<SessionContext>,
    devices: DeviceCollection,
    state: watch::Sender<DeviceManagerState>,
    pre_pause_state: SyncMutex<Option<DeviceManagerState>>,
    has_initialized: AtomicBool,
    /// The device list came from the offline cache.
    cached_list: AtomicBool,
    init_errors: SyncMutex<InitErrors>,
    last_error: SyncMutex<Option<CoreError>>,
    events: broadcast::Sender<ManagerEvent>,
    stream: Option<StreamManager>,
    cancel: CancellationToken,
    list_poller: SyncMutex<Option<(CancellationToken, JoinHandle<()>)>>,
    /// Serializes runs of the initialization phases.
    phase_lock: Mutex<()>,
}

fn lock<T>(m: &SyncMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceManager {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        let devices = DeviceCollection::new();
        let stream = ctx
            .stream_service()
            .is_some()
            .then(|| StreamManager::new(Arc::clone(&ctx), devices.clone()));
        let (state, _) = watch::channel(DeviceManagerState::Uninitialized);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = ctx.cancel_token().child_token();

        Self {
            inner: Arc::new(ManagerInner {
                ctx,
                devices,
                state,
                pre_pause_state: SyncMutex::new(None),
                has_initialized: AtomicBool::new(false),
                cached_list: AtomicBool::new(false),
                init_errors: SyncMutex::new(BTreeMap::new()),
                last_error: SyncMutex::new(None),
                events,
                stream,
                cancel,
                list_poller: SyncMutex::new(None),
                phase_lock: Mutex::new(()),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Run initialization until the manager is `Ready` (or `Error`).
    ///
    /// Per-device failures do not fail the call; they are reported on
    /// the `InitComplete` event and by [`init_errors`](Self::init_errors).
    pub async fn start(&self) -> Result<(), CoreError> {
        let state = self.state();
        if state == DeviceManagerState::Uninitialized || state == DeviceManagerState::Error {
            self.set_state(DeviceManagerState::FetchingDeviceList);
        }
        self.run_phases().await;

        match self.state() {
            DeviceManagerState::Error => Err(lock(&self.inner.last_error)
                .clone()
                .unwrap_or_else(|| CoreError::Internal("initialization failed".to_owned()))),
            _ => Ok(()),
        }
    }

    /// Fetch the device list now and merge it. New devices send the
    /// manager back through the property and LAN-config phases.
    pub async fn refresh(&self) -> Result<ListChange, CoreError> {
        let change = self.fetch_device_list().await?;
        if self.state() == DeviceManagerState::FetchingDeviceProperties {
            self.run_phases().await;
        }
        Ok(change)
    }

    /// Stop polling, LAN sessions and the push channel. Device state is
    /// kept.
    pub async fn pause(&self) {
        let current = self.state();
        if matches!(current, DeviceManagerState::Paused | DeviceManagerState::Error) {
            return;
        }
        *lock(&self.inner.pre_pause_state) = Some(current);
        self.set_state(DeviceManagerState::Paused);
        info!(from = %current, "device manager paused");

        self.stop_list_polling();
        for device in self.inner.devices.snapshot().iter() {
            device.stop_polling();
            device.stop_lan_session().await;
        }
        if let Some(stream) = &self.inner.stream {
            stream.pause();
        }
    }

    /// Return to the state held before `pause`.
    pub async fn resume(&self) {
        if self.state() != DeviceManagerState::Paused {
            return;
        }
        let previous = lock(&self.inner.pre_pause_state)
            .take()
            .unwrap_or(DeviceManagerState::Uninitialized);
        self.set_state(previous);
        info!(to = %previous, "device manager resumed");

        match previous {
            DeviceManagerState::Ready => {
                self.start_list_polling();
                self.start_device_polling();
                self.start_lan_sessions().await;
                if let Some(stream) = &self.inner.stream {
                    stream.resume();
                }
            }
            DeviceManagerState::FetchingDeviceList
            | DeviceManagerState::FetchingDeviceProperties
            | DeviceManagerState::FetchingLanConfig => {
                let manager = self.clone();
                tokio::spawn(async move { manager.run_phases().await });
            }
            _ => {}
        }
    }

    /// Pause everything, shut every device down and forget them.
    pub async fn shutdown(&self) {
        self.pause().await;
        for device in self.inner.devices.clear() {
            device.shutdown().await;
        }
        if let Some(stream) = &self.inner.stream {
            stream.shutdown();
        }
        self.inner.cancel.cancel();
        lock(&self.inner.pre_pause_state).take();
        self.set_state(DeviceManagerState::Uninitialized);
        info!("device manager shut down");
    }

    /// Connectivity changed: give LAN another chance on every device and
    /// re-arm the push channel.
    pub async fn network_changed(&self) {
        debug!("network changed");
        for device in self.inner.devices.snapshot().iter() {
            device.clear_lan_temp_disabled();
        }
        if self.state() == DeviceManagerState::Ready {
            self.start_lan_sessions().await;
            if let Some(stream) = &self.inner.stream {
                stream.network_changed();
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> DeviceManagerState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DeviceManagerState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.events.subscribe()
    }

    /// Sticky: stays `true` once the manager has reached `Ready`.
    pub fn has_initialized(&self) -> bool {
        self.inner.has_initialized.load(Ordering::Relaxed)
    }

    pub fn is_cached_session(&self) -> bool {
        self.inner.cached_list.load(Ordering::Relaxed)
    }

    pub fn init_errors(&self) -> InitErrors {
        lock(&self.inner.init_errors).clone()
    }

    pub fn device(&self, dsn: &str) -> Option<Device> {
        self.inner.devices.get(dsn)
    }

    pub fn devices(&self) -> Arc<Vec<Device>> {
        self.inner.devices.snapshot()
    }

    pub fn subscribe_devices(&self) -> DeviceStream {
        DeviceStream::new(self.inner.devices.subscribe())
    }

    pub fn stream(&self) -> Option<&StreamManager> {
        self.inner.stream.as_ref()
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.inner.ctx
    }

    /// Route a push event to the devices it names. Returns how many
    /// devices changed.
    pub async fn apply_stream_event(&self, event: &StreamEvent) -> usize {
        update_devices(&self.inner.devices, event).await
    }

    // ── State helpers ────────────────────────────────────────────────

    fn set_state(&self, new: DeviceManagerState) {
        let old = self.inner.state.send_replace(new);
        if old != new {
            debug!(%old, %new, "device manager state");
            self.emit(ManagerEvent::StateChanged { old, new });
        }
    }

    /// Move `from → to` only if the manager is still in `from`. Phases use
    /// this so a concurrent pause is never overwritten.
    fn advance(&self, from: DeviceManagerState, to: DeviceManagerState) -> bool {
        let moved = self.inner.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(old = %from, new = %to, "device manager state");
            self.emit(ManagerEvent::StateChanged { old: from, new: to });
        }
        moved
    }

    fn emit(&self, event: ManagerEvent) {
        let _ = self.inner.events.send(event);
    }

    fn emit_error(&self, error: CoreError) {
        warn!(error = %error, "device manager error");
        self.emit(ManagerEvent::Error(Arc::new(error)));
    }

    // ── Polling ──────────────────────────────────────────────────────

    fn start_list_polling(&self) {
        let mut slot = lock(&self.inner.list_poller);
        if slot.as_ref().is_some_and(|(_, h)| !h.is_finished()) {
            return;
        }
        let cancel = self.inner.cancel.child_token();
        let interval = self.inner.ctx.config().poll_interval;
        let handle = tokio::spawn(list_poll_task(self.clone(), interval, cancel.clone()));
        *slot = Some((cancel, handle));
    }

    fn stop_list_polling(&self) {
        if let Some((cancel, _)) = lock(&self.inner.list_poller).take() {
            cancel.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.list_poller)
            .as_ref()
            .is_some_and(|(c, h)| !c.is_cancelled() && !h.is_finished())
    }

    /// Poll every device not already fed by the push channel.
    fn start_device_polling(&self) {
        for device in self.inner.devices.snapshot().iter() {
            let pushed = self
                .inner
                .stream
                .as_ref()
                .is_some_and(|s| s.covers(device.dsn()));
            if !pushed {
                device.start_polling();
            }
        }
    }

    async fn start_lan_sessions(&self) {
        for device in self.inner.devices.snapshot().iter() {
            if let Err(e) = device.start_lan_session().await {
                debug!(dsn = %device.dsn(), error = %e, "LAN session not started");
            }
        }
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("state", &self.state())
            .field("devices", &self.inner.devices.len())
            .finish_non_exhaustive()
    }
}

async fn list_poll_task(manager: DeviceManager, interval: std::time::Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = manager.refresh().await {
                    debug!(error = %e, "device list poll failed");
                }
            }
        }
    }
}
