// ── Reactive device collection ──
//
// Concurrent storage keyed by DSN with push-based change notification
// via a `watch` channel carrying the full snapshot.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::device::Device;

/// The set of devices a manager currently knows about.
///
/// Every mutation rebuilds the snapshot (sorted by DSN) that subscribers
/// receive.
#[derive(Clone)]
pub struct DeviceCollection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    by_dsn: DashMap<String, Device>,
    snapshot: watch::Sender<Arc<Vec<Device>>>,
}

impl DeviceCollection {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            inner: Arc::new(CollectionInner {
                by_dsn: DashMap::new(),
                snapshot,
            }),
        }
    }

    /// Insert a device. Returns `true` if the DSN was new.
    pub fn insert(&self, device: Device) -> bool {
        let is_new = self
            .inner
            .by_dsn
            .insert(device.dsn().to_owned(), device)
            .is_none();
        self.rebuild_snapshot();
        is_new
    }

    pub fn remove(&self, dsn: &str) -> Option<Device> {
        let removed = self.inner.by_dsn.remove(dsn).map(|(_, d)| d);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub fn get(&self, dsn: &str) -> Option<Device> {
        self.inner.by_dsn.get(dsn).map(|r| r.value().clone())
    }

    pub fn contains(&self, dsn: &str) -> bool {
        self.inner.by_dsn.contains_key(dsn)
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Device>> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Device>>> {
        self.inner.snapshot.subscribe()
    }

    /// Remove every device, returning them.
    pub fn clear(&self) -> Vec<Device> {
        let removed: Vec<Device> = self.snapshot().iter().cloned().collect();
        self.inner.by_dsn.clear();
        self.rebuild_snapshot();
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.by_dsn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.by_dsn.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.by_dsn.iter().map(|r| r.key().clone()).collect()
    }

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Device> = self.inner.by_dsn.iter().map(|r| r.value().clone()).collect();
        values.sort_by(|a, b| a.dsn().cmp(b.dsn()));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.inner.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

impl Default for DeviceCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCollection")
            .field("len", &self.len())
            .finish()
    }
}
