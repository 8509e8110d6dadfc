// Per-device property polling.
//
// Polling keeps a device fresh when neither LAN nor the push channel
// delivers updates. At most one poll task runs per device.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Device, TaskSlot, lock_slot};

impl Device {
    /// Start polling. Returns `false` when polling is not permitted, LAN
    /// is active or the device is shut down; `true` when a poll task is
    /// (now) running.
    pub fn start_polling(&self) -> bool {
        if !self.is_polling_permitted() || self.is_lan_active() || self.is_shut_down() {
            return false;
        }
        let mut slot = lock_slot(&self.inner.poller);
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return true;
        }
        let cancel = self.inner.cancel.child_token();
        let interval = self.ctx().config().device_poll_interval;
        let handle = tokio::spawn(poll_task(self.clone(), interval, cancel.clone()));
        *slot = Some(TaskSlot { cancel, handle });
        debug!(dsn = %self.dsn(), ?interval, "device polling started");
        true
    }

    pub fn stop_polling(&self) {
        if let Some(task) = lock_slot(&self.inner.poller).take() {
            task.cancel.cancel();
            debug!(dsn = %self.dsn(), "device polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        lock_slot(&self.inner.poller)
            .as_ref()
            .is_some_and(|s| !s.cancel.is_cancelled() && !s.handle.is_finished())
    }
}

async fn poll_task(device: Device, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if device.is_lan_active() {
                    debug!(dsn = %device.dsn(), "LAN active, device polling ends");
                    break;
                }
                let names = device.managed_property_names();
                if let Err(e) = device.fetch_properties(names.as_deref()).await {
                    warn!(dsn = %device.dsn(), error = %e, "device poll failed");
                    device.emit_error(e);
                }
            }
        }
    }
}
