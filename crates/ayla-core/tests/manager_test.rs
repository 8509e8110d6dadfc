// Integration tests for `DeviceManager` using wiremock.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use ayla_api::stream_service::types::StreamEvent;
use ayla_core::{
    Cache, CacheKind, ConnectionStatus, CoreError, DataSource, DeviceInfo, DeviceManager,
    DeviceManagerState, ManagerEvent, MemoryCache, Property, PropertyValue,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    FakeLanFactory, config, context, device_json, lan_config_json, property_json, server_context,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn mount_devices(server: &MockServer, devices: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(devices))
        .mount(server)
        .await;
}

fn drain(rx: &mut broadcast::Receiver<ManagerEvent>) -> Vec<ManagerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn states(events: &[ManagerEvent]) -> Vec<DeviceManagerState> {
    events
        .iter()
        .filter_map(|e| match e {
            ManagerEvent::StateChanged { new, .. } => Some(*new),
            _ => None,
        })
        .collect()
}

fn info(dsn: &str) -> DeviceInfo {
    DeviceInfo {
        dsn: dsn.into(),
        ..DeviceInfo::default()
    }
}

// ── Initialization ──────────────────────────────────────────────────

#[tokio::test]
async fn test_init_fetches_properties_only_for_declaring_devices() {
    let server = MockServer::start().await;
    mount_devices(
        &server,
        json!([device_json("AC1", true, false), device_json("AC2", false, false)]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC1/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property_json("Blue_LED", "boolean", json!(1), false),
            property_json("cmd", "string", json!("on"), true)
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC2/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let manager = DeviceManager::new(server_context(&server));
    let mut rx = manager.subscribe();
    manager.start().await.unwrap();

    assert_eq!(manager.state(), DeviceManagerState::Ready);
    assert!(manager.has_initialized());
    assert_eq!(manager.devices().len(), 2);

    let ac1 = manager.device("AC1").unwrap();
    assert_eq!(ac1.property_count().await, 2);
    assert_eq!(
        ac1.property("Blue_LED").await.unwrap().value,
        Some(PropertyValue::Integer(1))
    );
    assert_eq!(manager.device("AC2").unwrap().property_count().await, 0);

    let events = drain(&mut rx);
    assert_eq!(
        states(&events),
        vec![
            DeviceManagerState::FetchingDeviceList,
            DeviceManagerState::FetchingDeviceProperties,
            DeviceManagerState::FetchingLanConfig,
            DeviceManagerState::Ready,
        ]
    );
    let complete = events.iter().find_map(|e| match e {
        ManagerEvent::InitComplete { errors } => Some(Arc::clone(errors)),
        _ => None,
    });
    assert!(complete.unwrap().is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn test_no_declared_properties_skips_property_fetch() {
    let server = MockServer::start().await;
    mount_devices(&server, json!([device_json("AC1", false, false)])).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC1/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let manager = DeviceManager::new(server_context(&server));
    manager.start().await.unwrap();
    assert_eq!(manager.state(), DeviceManagerState::Ready);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_empty_property_list_is_recorded_as_init_error() {
    let server = MockServer::start().await;
    mount_devices(&server, json!([device_json("AC1", true, false)])).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC1/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let manager = DeviceManager::new(server_context(&server));
    manager.start().await.unwrap();

    assert_eq!(manager.state(), DeviceManagerState::Ready);
    let errors = manager.init_errors();
    let err = errors.get("AC1").unwrap();
    assert!(err.to_string().contains("No properties found"));
    manager.shutdown().await;
}

#[tokio::test]
async fn test_device_list_growth_keeps_earlier_init_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([device_json("AC1", true, false)])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_devices(
        &server,
        json!([device_json("AC1", true, false), device_json("AC2", true, false)]),
    )
    .await;
    // AC1 declares properties but has none; it must not be fetched again.
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC1/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC2/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property_json("temp", "decimal", json!(21.5), false)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let manager = DeviceManager::new(server_context(&server));
    manager.start().await.unwrap();
    assert!(manager.init_errors().contains_key("AC1"));

    let change = manager.refresh().await.unwrap();
    assert_eq!(change.added, vec!["AC2".to_owned()]);
    assert_eq!(manager.state(), DeviceManagerState::Ready);
    assert_eq!(manager.device("AC2").unwrap().property_count().await, 1);
    assert!(manager.init_errors().contains_key("AC1"));
    manager.shutdown().await;
}

#[tokio::test]
async fn test_zero_poll_interval_is_rejected_up_front() {
    let mut config = config("http://127.0.0.1:9/");
    config.device_poll_interval = Duration::ZERO;
    let token = Arc::new(ayla_api::StaticToken::new(secrecy::SecretString::from("t")));
    let err = ayla_core::SessionContext::new(config, token).unwrap_err();
    assert!(matches!(err, CoreError::InvalidArgument { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_unauthorized_device_list_moves_to_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid token" })))
        .mount(&server)
        .await;

    let manager = DeviceManager::new(server_context(&server));
    let mut rx = manager.subscribe();
    let err = manager.start().await.unwrap_err();

    assert!(err.is_authentication(), "got {err:?}");
    assert_eq!(manager.state(), DeviceManagerState::Error);
    assert!(!manager.has_initialized());
    assert!(drain(&mut rx).iter().any(|e| matches!(e, ManagerEvent::InitFailed(_))));
}

// ── Offline fallback ────────────────────────────────────────────────

#[tokio::test]
async fn test_network_failure_restores_cached_devices() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let mut cached = info("AC1");
    cached.has_properties = Some(true);
    cache
        .save(CacheKind::Device, "default", &serde_json::to_string(&vec![cached]).unwrap())
        .unwrap();
    let property = Property {
        name: "Blue_LED".into(),
        value: Some(PropertyValue::Text("on".into())),
        ..Property::default()
    };
    cache
        .save(CacheKind::Property, "AC1", &serde_json::to_string(&vec![property]).unwrap())
        .unwrap();

    // Nothing listens on port 9.
    let mut config = config("http://127.0.0.1:9/");
    config.allow_offline_use = true;
    let manager = DeviceManager::new(context(config, Some(cache), None));
    manager.start().await.unwrap();

    assert_eq!(manager.state(), DeviceManagerState::Ready);
    assert!(manager.is_cached_session());
    let device = manager.device("AC1").unwrap();
    assert!(device.is_cached());
    let prop = device.property("Blue_LED").await.unwrap();
    assert_eq!(prop.value, Some(PropertyValue::Text("on".into())));
    assert_eq!(prop.last_update_source, Some(DataSource::Cached));
    manager.shutdown().await;
}

#[tokio::test]
async fn test_network_failure_without_cache_is_error() {
    let mut config = config("http://127.0.0.1:9/");
    config.allow_offline_use = true;
    let manager = DeviceManager::new(context(config, None, None));

    let err = manager.start().await.unwrap_err();
    assert!(err.is_network_or_timeout(), "got {err:?}");
    assert_eq!(manager.state(), DeviceManagerState::Error);
}

#[tokio::test]
async fn test_online_list_is_cached_when_offline_use_allowed() {
    let server = MockServer::start().await;
    mount_devices(&server, json!([device_json("AC1", false, false)])).await;
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let mut config = config(&server.uri());
    config.allow_offline_use = true;

    let manager = DeviceManager::new(context(config, Some(Arc::clone(&cache)), None));
    manager.start().await.unwrap();

    let saved = cache.get(CacheKind::Device, "default").unwrap().unwrap();
    let infos: Vec<DeviceInfo> = serde_json::from_str(&saved).unwrap();
    assert_eq!(infos[0].dsn, "AC1");
    manager.shutdown().await;
}

// ── Merge ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_merge_replaces_missing_devices() {
    let ctx = context(config("http://127.0.0.1:9/"), None, None);
    let manager = DeviceManager::new(ctx);
    manager
        .merge_devices(vec![info("A"), info("B"), info("C")], DataSource::Cloud)
        .await;
    let a = manager.device("A").unwrap();

    let mut rx = manager.subscribe();
    let change = manager
        .merge_devices(vec![info("B"), info("C"), info("D")], DataSource::Cloud)
        .await;

    assert_eq!(change.added, vec!["D".to_owned()]);
    assert_eq!(change.removed, vec!["A".to_owned()]);
    assert!(a.is_shut_down());
    let dsns: Vec<String> = manager.devices().iter().map(|d| d.dsn().to_owned()).collect();
    assert_eq!(dsns, vec!["B", "C", "D"]);

    let list_changes: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, ManagerEvent::DeviceListChanged(_)))
        .collect();
    assert_eq!(list_changes.len(), 1);
}

#[tokio::test]
async fn test_refresh_with_new_device_fetches_its_properties() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([device_json("AC1", false, false)])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            device_json("AC1", false, false),
            device_json("AC2", true, false)
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC2/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property_json("temp", "decimal", json!(21.5), false)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let manager = DeviceManager::new(server_context(&server));
    manager.start().await.unwrap();
    assert_eq!(manager.devices().len(), 1);

    let change = manager.refresh().await.unwrap();
    assert_eq!(change.added, vec!["AC2".to_owned()]);
    assert_eq!(manager.state(), DeviceManagerState::Ready);
    assert_eq!(manager.device("AC2").unwrap().property_count().await, 1);
    manager.shutdown().await;
}

// ── Push events ─────────────────────────────────────────────────────

fn push_event(dsn: &str, name: &str, event_type: &str, value: serde_json::Value) -> StreamEvent {
    serde_json::from_value(json!({
        "seq": "1",
        "metadata": { "dsn": dsn, "property_name": name, "event_type": event_type, "base_type": "string" },
        "datapoint": { "value": value, "acked_at": "2026-01-01T00:00:05Z", "ack_status": 200, "ack_message": 0 }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_plain_push_ignored_for_ack_enabled_property() {
    let server = MockServer::start().await;
    mount_devices(&server, json!([device_json("AC1", true, false)])).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC1/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property_json("cmd", "string", json!("off"), true)
        ])))
        .mount(&server)
        .await;

    let manager = DeviceManager::new(server_context(&server));
    manager.start().await.unwrap();
    let device = manager.device("AC1").unwrap();

    let changed = manager
        .apply_stream_event(&push_event("AC1", "cmd", "datapoint", json!("on")))
        .await;
    assert_eq!(changed, 0);
    assert_eq!(
        device.property("cmd").await.unwrap().value,
        Some(PropertyValue::Text("off".into()))
    );

    let changed = manager
        .apply_stream_event(&push_event("AC1", "cmd", "datapointack", json!("on")))
        .await;
    assert_eq!(changed, 1);
    let prop = device.property("cmd").await.unwrap();
    assert_eq!(prop.value, Some(PropertyValue::Text("on".into())));
    assert_eq!(prop.ack_status, Some(200));
    assert_eq!(prop.last_update_source, Some(DataSource::Dss));
    manager.shutdown().await;
}

#[tokio::test]
async fn test_push_while_lan_active_triggers_no_fetch() {
    let server = MockServer::start().await;
    mount_devices(&server, json!([device_json("AC1", true, true)])).await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC1/properties.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            property_json("Blue_LED", "boolean", json!(0), false)
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC1/lan.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(lan_config_json()))
        .mount(&server)
        .await;

    let lan = FakeLanFactory::new();
    let manager = DeviceManager::new(context(config(&server.uri()), None, Some(Arc::clone(&lan))));
    manager.start().await.unwrap();
    let device = manager.device("AC1").unwrap();
    assert!(device.is_lan_active());

    let changed = manager
        .apply_stream_event(&push_event("AC1", "Blue_LED", "datapoint", json!(1)))
        .await;
    device.data_source_changed(DataSource::Dss).await;

    assert_eq!(changed, 0);
    assert_eq!(
        device.property("Blue_LED").await.unwrap().value,
        Some(PropertyValue::Integer(0))
    );
    assert!(lan.session("AC1").sent().is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn test_connectivity_push_updates_status() {
    let ctx = context(config("http://127.0.0.1:9/"), None, None);
    let manager = DeviceManager::new(ctx);
    manager.merge_devices(vec![info("AC1")], DataSource::Cloud).await;
    let device = manager.device("AC1").unwrap();
    let mut rx = device.subscribe();

    let event: StreamEvent = serde_json::from_value(json!({
        "metadata": { "dsn": "AC1", "event_type": "connectivity" },
        "connection": { "status": "Online", "event_time": "2026-01-01T00:00:00Z" }
    }))
    .unwrap();
    assert_eq!(manager.apply_stream_event(&event).await, 1);
    assert_eq!(device.info().connection_status, ConnectionStatus::Online);
    assert!(rx.try_recv().is_ok());
}

// ── Pause / resume ──────────────────────────────────────────────────

#[tokio::test]
async fn test_pause_and_resume_restore_ready() {
    let server = MockServer::start().await;
    mount_devices(&server, json!([device_json("AC1", false, false)])).await;

    let manager = DeviceManager::new(server_context(&server));
    manager.start().await.unwrap();
    assert!(manager.is_polling());

    manager.pause().await;
    assert_eq!(manager.state(), DeviceManagerState::Paused);
    assert!(!manager.is_polling());
    assert!(!manager.device("AC1").unwrap().is_polling());

    manager.resume().await;
    assert_eq!(manager.state(), DeviceManagerState::Ready);
    assert!(manager.is_polling());
    assert!(manager.device("AC1").unwrap().is_polling());

    manager.shutdown().await;
    assert!(manager.devices().is_empty());
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_cancelled_session_reports_cancelled() {
    let server = MockServer::start().await;
    mount_devices(&server, json!([])).await;
    let ctx = server_context(&server);
    let manager = DeviceManager::new(Arc::clone(&ctx));
    ctx.teardown();

    let err = manager.refresh().await.unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
}
