// ── Reactive device streams ──
//
// Subscription handle over the manager's device collection.

mod filter;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub use filter::DeviceFilter;

use crate::device::Device;

/// A subscription to the device list.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed`](Self::changed) or by converting to a `Stream`.
pub struct DeviceStream {
    current: Arc<Vec<Device>>,
    receiver: watch::Receiver<Arc<Vec<Device>>>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Vec<Device>>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation (or at the last `changed()`).
    pub fn current(&self) -> &Arc<Vec<Device>> {
        &self.current
    }

    /// Latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<Vec<Device>> {
        self.receiver.borrow().clone()
    }

    /// Latest snapshot, narrowed by `filter`.
    pub fn filtered(&self, filter: &DeviceFilter) -> Vec<Device> {
        self.latest()
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the manager has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Vec<Device>>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> DeviceWatchStream {
        DeviceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a snapshot each time the device list changes.
pub struct DeviceWatchStream {
    inner: WatchStream<Arc<Vec<Device>>>,
}

impl Stream for DeviceWatchStream {
    type Item = Arc<Vec<Device>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
