// LAN session lifecycle for one device.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use ayla_api::lan::{LanEvent, LanSession, LanTarget};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Device, LanHandle, lock_slot};
use crate::change::{Change, DeviceEvent};
use crate::error::CoreError;
use crate::model::property::now_timestamp;
use crate::model::{DataSource, Datapoint};

impl Device {
    /// `true` while a LAN session exists and reports itself active.
    pub fn is_lan_active(&self) -> bool {
        self.active_lan_session().is_some()
    }

    pub(crate) fn active_lan_session(&self) -> Option<Arc<dyn LanSession>> {
        lock_slot(&self.inner.lan)
            .as_ref()
            .filter(|h| h.session.is_active())
            .map(|h| Arc::clone(&h.session))
    }

    /// Open a LAN session. Returns `Ok(false)` when one already exists or
    /// LAN mode is unavailable (not permitted, no factory, no config).
    ///
    /// A failed start marks LAN temporarily disabled for this device and
    /// reports the failure on the event channel as well as to the caller.
    pub async fn start_lan_session(&self) -> Result<bool, CoreError> {
        if lock_slot(&self.inner.lan).is_some() || !self.is_lan_mode_permitted() || self.is_shut_down() {
            return Ok(false);
        }
        let Some(factory) = self.ctx().lan_factory().cloned() else {
            return Ok(false);
        };
        let Some(config) = self.lan_config().await.filter(|c| c.is_enabled()) else {
            debug!(dsn = %self.dsn(), "no LAN config, not starting LAN session");
            return Ok(false);
        };

        let info = self.info();
        let session = factory.create(LanTarget {
            dsn: info.dsn.clone(),
            lan_ip: info.lan_ip.clone(),
            key_id: config.lanip_key_id,
            key: config.lanip_key,
            keep_alive: config.keep_alive,
        });
        let cancel = self.inner.cancel.child_token();
        let events = session.subscribe();
        {
            let mut slot = lock_slot(&self.inner.lan);
            if slot.is_some() {
                return Ok(false);
            }
            *slot = Some(Arc::new(LanHandle {
                session: Arc::clone(&session),
                cancel: cancel.clone(),
            }));
        }
        tokio::spawn(lan_event_pump(self.clone(), events, cancel));

        info!(dsn = %self.dsn(), "starting LAN session");
        if let Err(e) = self.cancellable(session.start()).await {
            warn!(dsn = %self.dsn(), error = %e, "LAN session failed to start");
            self.inner.lan_temp_disabled.store(true, Ordering::Relaxed);
            self.teardown_lan_handle();
            self.emit(DeviceEvent::LanStateChanged {
                active: false,
                error: Some(e.to_string()),
            });
            return Err(e);
        }
        Ok(true)
    }

    /// Close the LAN session, if any.
    pub async fn stop_lan_session(&self) {
        let handle = lock_slot(&self.inner.lan).take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            handle.session.stop().await;
            debug!(dsn = %self.dsn(), "LAN session stopped");
        }
    }

    fn teardown_lan_handle(&self) {
        if let Some(handle) = lock_slot(&self.inner.lan).take() {
            handle.cancel.cancel();
        }
    }

    async fn handle_lan_event(&self, event: LanEvent) {
        match event {
            LanEvent::StateChanged { active: true, .. } => {
                info!(dsn = %self.dsn(), "LAN mode active");
                if self.is_cached() {
                    // Offline session: nothing to fetch from the cloud.
                    self.emit(DeviceEvent::LanStateChanged {
                        active: true,
                        error: None,
                    });
                } else {
                    self.data_source_changed(DataSource::Lan).await;
                }
            }
            LanEvent::StateChanged { active: false, error } => {
                info!(dsn = %self.dsn(), ?error, "LAN mode left");
                if error.is_some() {
                    self.inner.lan_temp_disabled.store(true, Ordering::Relaxed);
                    self.teardown_lan_handle();
                }
                self.data_source_changed(DataSource::Cloud).await;
                self.emit(DeviceEvent::LanStateChanged { active: false, error });
            }
            LanEvent::PropertyUpdate {
                name,
                value,
                metadata,
                ack,
            } => {
                let mut dp = Datapoint::new(value, metadata);
                let acked = ack.is_some();
                if let Some(ack) = ack {
                    dp.id = ack.id;
                    dp.acked_at = Some(now_timestamp());
                    dp.ack_status = Some(ack.status);
                    dp.ack_message = Some(ack.message);
                }
                let mut state = self.inner.state.lock().await;
                match state.properties.merge_datapoint(&name, &dp, DataSource::Lan) {
                    Ok(Some(change)) => {
                        self.publish(&mut state, Change::Property(change), DataSource::Lan);
                        self.cache_properties(&state);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(dsn = %self.dsn(), property = %name, error = %e, "dropping LAN update");
                        return;
                    }
                }
                // Acks repeat identical timestamps within a second, so the
                // waiter keys on this event rather than on a field change.
                if acked {
                    self.emit(DeviceEvent::Acked { name, datapoint: dp });
                }
            }
        }
    }
}

async fn lan_event_pump(
    device: Device,
    mut events: broadcast::Receiver<LanEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => device.handle_lan_event(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(dsn = %device.dsn(), skipped, "LAN event pump lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
