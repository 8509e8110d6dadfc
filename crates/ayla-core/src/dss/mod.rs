// ── Device stream service ──
//
// Keeps a push socket open to the stream service: subscribe for the
// current device list, connect, answer heartbeats, route change events to
// devices, and reconnect at a fixed interval while retries are armed.

mod connection;
mod dispatch;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard, PoisonError};

use ayla_api::stream_service::types::{StreamEvent, SubscriptionRecord};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::context::SessionContext;
use crate::store::DeviceCollection;

pub(crate) use dispatch::update_devices;

/// Push channel lifecycle. The cycle repeats on every reconnect.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamState {
    #[default]
    Uninitialized,
    /// A subscription (stream key) is in hand.
    Initialized,
    Connecting,
    Connected,
    Disconnected,
}

/// Owns the push channel for one session.
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    ctx: Arc<SessionContext>,
    devices: DeviceCollection,
    subscribe_retry: AtomicBool,
    connect_retry: AtomicBool,
    paused: AtomicBool,
    /// Generation and token of the running subscribe/connect cycle.
    cycle: SyncMutex<Option<(u64, CancellationToken)>>,
    generation: AtomicU64,
    subscription: SyncMutex<Option<SubscriptionRecord>>,
    cancel: CancellationToken,
}

fn lock<T>(m: &SyncMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StreamManager {
    pub(crate) fn new(ctx: Arc<SessionContext>, devices: DeviceCollection) -> Self {
        let cancel = ctx.cancel_token().child_token();
        Self {
            inner: Arc::new(StreamInner {
                ctx,
                devices,
                subscribe_retry: AtomicBool::new(true),
                connect_retry: AtomicBool::new(true),
                paused: AtomicBool::new(false),
                cycle: SyncMutex::new(None),
                generation: AtomicU64::new(0),
                subscription: SyncMutex::new(None),
                cancel,
            }),
        }
    }

    pub fn state(&self) -> StreamState {
        self.inner.ctx.stream_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.ctx.is_stream_connected()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Relaxed)
    }

    /// DSNs covered by the current subscription.
    pub fn subscribed_dsns(&self) -> BTreeSet<String> {
        lock(&self.inner.subscription)
            .as_ref()
            .and_then(|s| s.dsn.as_deref())
            .map(|s| s.split(',').map(str::trim).filter(|d| !d.is_empty()).map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// `true` when pushes for `dsn` arrive on a connected socket.
    pub fn covers(&self, dsn: &str) -> bool {
        self.is_connected() && self.subscribed_dsns().contains(dsn)
    }

    /// Start (or continue) the subscribe/connect cycle on a background
    /// task. Does nothing without devices or while a cycle is running.
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Relaxed);
        self.inner.subscribe_retry.store(true, Ordering::Relaxed);
        self.inner.connect_retry.store(true, Ordering::Relaxed);

        if self.inner.ctx.stream_service().is_none() || self.inner.cancel.is_cancelled() {
            return;
        }
        if self.inner.devices.is_empty() {
            debug!("no devices, push channel not started");
            return;
        }

        let mut cycle = lock(&self.inner.cycle);
        if cycle.as_ref().is_some_and(|(_, t)| !t.is_cancelled()) {
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.inner.cancel.child_token();
        *cycle = Some((generation, token.clone()));
        drop(cycle);

        info!(generation, "starting push channel");
        tokio::spawn(connection::run_cycle(self.clone(), generation, token));
    }

    /// Disarm both retries, close the socket and cancel in-flight stream
    /// requests. Device state is untouched.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Relaxed);
        self.inner.subscribe_retry.store(false, Ordering::Relaxed);
        self.inner.connect_retry.store(false, Ordering::Relaxed);
        if let Some((_, token)) = lock(&self.inner.cycle).take() {
            token.cancel();
            debug!("push channel paused");
        }
    }

    /// Connectivity returned: re-arm retries and resume.
    pub fn network_changed(&self) {
        self.resume();
    }

    pub fn shutdown(&self) {
        self.pause();
        self.inner.cancel.cancel();
    }

    /// Route a decoded push event to the devices it names.
    pub async fn apply_event(&self, event: &StreamEvent) -> usize {
        update_devices(&self.inner.devices, event).await
    }

    // ── Internal accessors for the connection task ───────────────────

    fn ctx(&self) -> &SessionContext {
        &self.inner.ctx
    }

    fn devices(&self) -> &DeviceCollection {
        &self.inner.devices
    }

    fn subscribe_retry_armed(&self) -> bool {
        self.inner.subscribe_retry.load(Ordering::Relaxed)
    }

    fn connect_retry_armed(&self) -> bool {
        self.inner.connect_retry.load(Ordering::Relaxed)
    }

    fn set_subscribe_retry(&self, armed: bool) {
        self.inner.subscribe_retry.store(armed, Ordering::Relaxed);
    }

    fn set_connect_retry(&self, armed: bool) {
        self.inner.connect_retry.store(armed, Ordering::Relaxed);
    }

    fn set_subscription(&self, subscription: Option<SubscriptionRecord>) {
        *lock(&self.inner.subscription) = subscription;
    }

    /// Clear the cycle slot if it still belongs to `generation`.
    fn finish_cycle(&self, generation: u64) {
        let mut cycle = lock(&self.inner.cycle);
        if cycle.as_ref().is_some_and(|(g, _)| *g == generation) {
            *cycle = None;
        }
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("state", &self.state())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}
