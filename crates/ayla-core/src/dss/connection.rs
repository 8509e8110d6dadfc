// Subscribe/connect cycle and the socket event loop.

use ayla_api::stream_service::frame::HEARTBEAT;
use ayla_api::stream_service::types::SubscriptionRecord;
use ayla_api::stream_service::{StreamFrame, parse_frame};
use ayla_api::websocket::{ABNORMAL_CLOSE, SocketEvent, StreamSocket};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{StreamManager, StreamState};
use crate::cache::{self, CacheKind};
use crate::model::DataSource;

/// Subscribe, connect and pump until the socket closes; reconnect once
/// after the retry delay if the connect retry is armed. Using the retry
/// disarms it until a socket opens again.
pub(super) async fn run_cycle(manager: StreamManager, generation: u64, cancel: CancellationToken) {
    loop {
        let Some(key) = obtain_stream_key(&manager, &cancel).await else {
            break;
        };
        connect_and_pump(&manager, &key, &cancel).await;

        if cancel.is_cancelled() || !manager.connect_retry_armed() {
            break;
        }
        manager.set_connect_retry(false);
        let delay = manager.ctx().config().stream_retry_interval;
        debug!(?delay, "push socket closed, reconnecting");
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    manager.finish_cycle(generation);
    debug!(generation, "push channel cycle ended");
}

// ── Subscription ─────────────────────────────────────────────────────

/// The persisted subscription if one survives, otherwise a fresh one
/// (persisted immediately). A failed creation is retried once if the
/// subscribe retry is armed; the retry stays disarmed until a creation
/// succeeds or the channel is resumed.
async fn obtain_stream_key(manager: &StreamManager, cancel: &CancellationToken) -> Option<String> {
    let ctx = manager.ctx();
    let session = ctx.config().session_name.as_str();

    match cache::load_json::<SubscriptionRecord>(ctx.cache(), CacheKind::StreamKey, session) {
        Ok(Some(sub)) => {
            if let Some(key) = sub.stream_key.clone() {
                debug!("using persisted stream key");
                manager.set_subscription(Some(sub));
                ctx.set_stream_state(StreamState::Initialized);
                return Some(key);
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "could not read persisted stream key"),
    }

    let service = ctx.stream_service()?;
    loop {
        let mut dsns = manager.devices().keys();
        if dsns.is_empty() {
            return None;
        }
        dsns.sort();

        let types = &ctx.config().subscription_types;
        match cancel
            .run_until_cancelled(service.create_subscription(&dsns, types))
            .await?
        {
            Ok(sub) => {
                if let Some(key) = sub.stream_key.clone() {
                    cache::save_json_logged(ctx.cache(), CacheKind::StreamKey, session, &sub);
                    manager.set_subscribe_retry(true);
                    info!(id = ?sub.id, devices = dsns.len(), "push subscription created");
                    manager.set_subscription(Some(sub));
                    ctx.set_stream_state(StreamState::Initialized);
                    return Some(key);
                }
                warn!(id = ?sub.id, "subscription has no stream key");
            }
            Err(e) => warn!(error = %e, "push subscription failed"),
        }

        if !manager.subscribe_retry_armed() {
            ctx.set_stream_state(StreamState::Disconnected);
            return None;
        }
        manager.set_subscribe_retry(false);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(ctx.config().stream_retry_interval) => {}
        }
    }
}

// ── Socket ───────────────────────────────────────────────────────────

async fn connect_and_pump(manager: &StreamManager, key: &str, cancel: &CancellationToken) {
    let ctx = manager.ctx();
    let Some(service) = ctx.stream_service() else {
        return;
    };
    let url = match service.socket_url(key) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "invalid push socket URL");
            forget_stream_key(manager);
            return;
        }
    };

    ctx.set_stream_state(StreamState::Connecting);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let socket = StreamSocket::connect(url, tx, cancel.child_token());

    let config = ctx.config();
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut watch = HeartbeatWatch::new(config.heartbeat_count);
    let mut open = false;

    loop {
        tokio::select! {
            biased;
            event = rx.recv() => match event {
                Some(SocketEvent::Open) => {
                    on_open(manager);
                    open = true;
                    watch.reset();
                    heartbeat.reset();
                }
                Some(SocketEvent::Message(text)) => {
                    handle_message(manager, &socket, &text, &mut watch).await;
                }
                Some(SocketEvent::Closed { code, reason }) => {
                    on_close(manager, open, code, &reason);
                    return;
                }
                None => {
                    on_close(manager, open, ABNORMAL_CLOSE, "socket task ended");
                    return;
                }
            },
            _ = heartbeat.tick(), if open => {
                if watch.tick() {
                    warn!("push heartbeats missed, dropping socket");
                    socket.abort();
                }
            }
        }
    }
}

// ── Heartbeats ───────────────────────────────────────────────────────

/// Heartbeats the server still owes. Each received heartbeat adds one,
/// each timer tick takes one away; going negative means the server has
/// gone quiet.
#[derive(Debug)]
struct HeartbeatWatch {
    budget: i32,
    expected: i32,
}

impl HeartbeatWatch {
    fn new(budget: i32) -> Self {
        Self {
            budget,
            expected: budget,
        }
    }

    fn reset(&mut self) {
        self.expected = self.budget;
    }

    fn received(&mut self) {
        self.expected = self.expected.saturating_add(1);
    }

    /// Returns `true` when the socket should be dropped.
    fn tick(&mut self) -> bool {
        self.expected = self.expected.saturating_sub(1);
        trace!(expected = self.expected, "heartbeat check");
        self.expected < 0
    }
}

async fn handle_message(
    manager: &StreamManager,
    socket: &StreamSocket,
    text: &str,
    watch: &mut HeartbeatWatch,
) {
    match parse_frame(text) {
        StreamFrame::KeepAlive => trace!("keep-alive"),
        StreamFrame::Heartbeat => {
            if let Err(e) = socket.send(HEARTBEAT) {
                debug!(error = %e, "heartbeat echo failed");
            }
            watch.received();
        }
        StreamFrame::Event(event) => {
            let changed = manager.apply_event(&event).await;
            trace!(changed, "push event applied");
        }
        StreamFrame::Invalid(reason) => warn!(%reason, "undecodable push frame"),
    }
}

fn on_open(manager: &StreamManager) {
    let ctx = manager.ctx();
    // The key is single-use once a socket has been opened with it.
    forget_stream_key(manager);
    ctx.set_stream_state(StreamState::Connected);
    manager.set_connect_retry(true);
    info!("push channel connected");

    if !manager.is_paused() {
        notify_devices(manager, DataSource::Dss);
    }
}

fn on_close(manager: &StreamManager, opened: bool, code: u16, reason: &str) {
    manager.ctx().set_stream_state(StreamState::Disconnected);
    manager.set_subscription(None);
    if key_rejected(opened, code, reason) {
        warn!(reason, "stream key rejected, discarding it");
        forget_stream_key(manager);
    }
    info!(code, reason, "push channel disconnected");

    if !manager.is_paused() {
        notify_devices(manager, DataSource::Cloud);
    }
}

/// An expired key fails the handshake with HTTP 401 before the socket
/// ever opens.
fn key_rejected(opened: bool, code: u16, reason: &str) -> bool {
    !opened && code == ABNORMAL_CLOSE && reason.contains("Unauthorized")
}

fn forget_stream_key(manager: &StreamManager) {
    let ctx = manager.ctx();
    if let Err(e) = ctx
        .cache()
        .remove(CacheKind::StreamKey, &ctx.config().session_name)
    {
        warn!(error = %e, "could not remove stream key");
    }
}

/// Tell every device its data source changed, each on its own task.
fn notify_devices(manager: &StreamManager, source: DataSource) {
    for device in manager.devices().snapshot().iter() {
        let device = device.clone();
        tokio::spawn(async move { device.data_source_changed(source).await });
    }
}
