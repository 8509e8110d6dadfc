// Shared fixtures for ayla-core integration tests.
#![allow(clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ayla_api::StaticToken;
use ayla_api::lan::{
    LanAck, LanCommand, LanCommandResult, LanEvent, LanSession, LanSessionFactory, LanTarget,
};
use ayla_core::{Cache, SessionConfig, SessionContext};
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use wiremock::MockServer;

// ── Context ─────────────────────────────────────────────────────────

/// Config pointing every service at `base`, with the push channel off and
/// background polling effectively disabled.
pub fn config(base: &str) -> SessionConfig {
    let url: url::Url = base.parse().unwrap();
    let mut config = SessionConfig::new(url.clone(), url.clone(), url);
    config.allow_dss = false;
    config.poll_interval = Duration::from_secs(3600);
    config.device_poll_interval = Duration::from_secs(3600);
    config.ack_poll_interval = Duration::from_millis(10);
    config
}

pub fn context(
    config: SessionConfig,
    cache: Option<Arc<dyn Cache>>,
    lan: Option<Arc<FakeLanFactory>>,
) -> Arc<SessionContext> {
    let token = Arc::new(StaticToken::new(SecretString::from("token-1")));
    let mut builder = SessionContext::builder(config, token);
    if let Some(cache) = cache {
        builder = builder.cache(cache);
    }
    if let Some(lan) = lan {
        builder = builder.lan_factory(lan);
    }
    builder.build().unwrap()
}

pub fn server_context(server: &MockServer) -> Arc<SessionContext> {
    context(config(&server.uri()), None, None)
}

// ── Wire fixtures ───────────────────────────────────────────────────

pub fn device_json(dsn: &str, has_properties: bool, lan_enabled: bool) -> Value {
    json!({
        "device": {
            "dsn": dsn,
            "key": 1,
            "product_name": format!("Device {dsn}"),
            "connection_status": "Online",
            "lan_ip": "192.168.1.20",
            "lan_enabled": lan_enabled,
            "has_properties": has_properties
        }
    })
}

pub fn property_json(name: &str, base_type: &str, value: Value, ack_enabled: bool) -> Value {
    json!({
        "property": {
            "name": name,
            "base_type": base_type,
            "value": value,
            "ack_enabled": ack_enabled,
            "direction": "input",
            "data_updated_at": "2026-01-01T00:00:00Z"
        }
    })
}

pub fn lan_config_json() -> Value {
    json!({
        "lanip": { "lanip_key_id": 7, "lanip_key": "secret", "keep_alive": 30, "status": "enable" }
    })
}

// ── Fake LAN session ────────────────────────────────────────────────

/// Scripted LAN session. Batches are answered from queued replies, or
/// with `{}` per command when nothing is queued.
pub struct FakeLanSession {
    active: AtomicBool,
    fail_start: AtomicBool,
    /// Acknowledge every datapoint write with a pushed update.
    ack_writes: AtomicBool,
    ack_status: AtomicI64,
    events: broadcast::Sender<LanEvent>,
    replies: Mutex<VecDeque<Vec<LanCommandResult>>>,
    sent: Mutex<Vec<Vec<LanCommand>>>,
}

impl FakeLanSession {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            active: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            ack_writes: AtomicBool::new(false),
            ack_status: AtomicI64::new(200),
            events,
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn queue_reply(&self, reply: Vec<LanCommandResult>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn sent(&self) -> Vec<Vec<LanCommand>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::Relaxed);
    }

    pub fn set_ack_writes(&self, ack: bool) {
        self.ack_writes.store(ack, Ordering::Relaxed);
    }

    pub fn set_ack_status(&self, status: i64) {
        self.ack_status.store(status, Ordering::Relaxed);
    }

    pub fn emit(&self, event: LanEvent) {
        let _ = self.events.send(event);
    }
}

impl LanSession for FakeLanSession {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ayla_api::Error>> {
        Box::pin(async move {
            if self.fail_start.load(Ordering::Relaxed) {
                return Err(ayla_api::Error::Lan {
                    message: "key exchange failed".into(),
                });
            }
            self.active.store(true, Ordering::Relaxed);
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.active.store(false, Ordering::Relaxed);
        })
    }

    fn send(
        &self,
        commands: Vec<LanCommand>,
        _timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<LanCommandResult>, ayla_api::Error>> {
        Box::pin(async move {
            if !self.is_active() {
                return Err(ayla_api::Error::LanInactive);
            }
            self.sent.lock().unwrap().push(commands.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| commands.iter().map(|_| Ok("{}".to_owned())).collect());

            if self.ack_writes.load(Ordering::Relaxed) {
                for cmd in &commands {
                    if let LanCommand::CreateDatapoint { name, value, metadata, .. } = cmd {
                        self.emit(LanEvent::PropertyUpdate {
                            name: name.clone(),
                            value: value.clone(),
                            metadata: metadata.clone(),
                            ack: Some(LanAck {
                                id: Some("lan-1".into()),
                                status: self.ack_status.load(Ordering::Relaxed),
                                message: 0,
                            }),
                        });
                    }
                }
            }
            Ok(reply)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<LanEvent> {
        self.events.subscribe()
    }
}

/// Hands out prepared sessions by DSN; unprepared DSNs get a fresh one.
#[derive(Default)]
pub struct FakeLanFactory {
    sessions: Mutex<HashMap<String, Arc<FakeLanSession>>>,
}

impl FakeLanFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session(&self, dsn: &str) -> Arc<FakeLanSession> {
        Arc::clone(
            self.sessions
                .lock()
                .unwrap()
                .entry(dsn.to_owned())
                .or_insert_with(FakeLanSession::new),
        )
    }
}

impl LanSessionFactory for FakeLanFactory {
    fn create(&self, target: LanTarget) -> Arc<dyn LanSession> {
        self.session(&target.dsn)
    }
}
