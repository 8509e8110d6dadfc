// Integration tests for `DeviceServiceClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ayla_api::{DeviceServiceClient, Error, StaticToken};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DeviceServiceClient) {
    let server = MockServer::start().await;
    let token = Arc::new(StaticToken::new(SecretString::from("token-1")));
    let client =
        DeviceServiceClient::from_reqwest(&server.uri(), reqwest::Client::new(), token).unwrap();
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_unwraps_envelopes() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .and(header("authorization", "auth_token token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "device": { "dsn": "AC000W1", "key": 1, "has_properties": true, "lan_enabled": true } },
            { "device": { "dsn": "AC000W2", "key": 2, "has_properties": false, "device_type": "Node" } }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].dsn, "AC000W1");
    assert_eq!(devices[0].lan_enabled, Some(true));
    assert_eq!(devices[1].device_type.as_deref(), Some("Node"));
}

#[tokio::test]
async fn test_list_properties_with_name_filter() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC000W1/properties.json"))
        .and(query_param("names[]", "Blue_LED"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "property": {
                "name": "Blue_LED",
                "base_type": "boolean",
                "value": 1,
                "ack_enabled": false,
                "data_updated_at": "2026-01-01T00:00:00Z"
            } }
        ])))
        .mount(&server)
        .await;

    let names = vec!["Blue_LED".to_owned()];
    let props = client
        .list_properties("AC000W1", Some(&names))
        .await
        .unwrap();

    assert_eq!(props.len(), 1);
    assert_eq!(props[0].name, "Blue_LED");
    assert_eq!(props[0].base_type, "boolean");
    assert_eq!(props[0].value, json!(1));
}

#[tokio::test]
async fn test_create_datapoint_posts_wrapped_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/apiv1/dsns/AC000W1/properties/cmd/datapoints.json"))
        .and(header("x-ayla-source", "Mobile"))
        .and(body_json(json!({
            "datapoint": { "value": "hello", "metadata": { "k": "v" } }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "datapoint": { "id": "dp-1", "value": "hello", "metadata": { "k": "v" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let metadata = BTreeMap::from([("k".to_owned(), "v".to_owned())]);
    let dp = client
        .create_datapoint("AC000W1", "cmd", json!("hello"), Some(metadata))
        .await
        .unwrap();

    assert_eq!(dp.id.as_deref(), Some("dp-1"));
    assert_eq!(dp.value, json!("hello"));
}

#[tokio::test]
async fn test_get_datapoint_by_id() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC000W1/properties/cmd/datapoints/dp-1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "datapoint": { "id": "dp-1", "value": 3, "acked_at": "2026-01-01T00:00:01Z", "ack_status": 200 }
        })))
        .mount(&server)
        .await;

    let dp = client.get_datapoint("AC000W1", "cmd", "dp-1").await.unwrap();
    assert_eq!(dp.ack_status, Some(200));
    assert!(dp.acked_at.is_some());
}

#[tokio::test]
async fn test_get_lan_config() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC000W1/lan.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lanip": { "lanip_key_id": 77, "lanip_key": "secret", "keep_alive": 30, "auto_sync": 1, "status": "enable" }
        })))
        .mount(&server)
        .await;

    let config = client.get_lan_config("AC000W1").await.unwrap();
    assert_eq!(config.lanip_key_id, Some(77));
    assert_eq!(config.status.as_deref(), Some("enable"));
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "Your access token is invalid" })),
        )
        .mount(&server)
        .await;

    let err = client.list_devices().await.unwrap_err();
    match err {
        Error::Authentication { message } => assert!(message.contains("invalid")),
        other => panic!("expected Authentication, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_carries_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/dsns/AC000W1/lan.json"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let err = client.get_lan_config("AC000W1").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, Error::Service { status: 404, .. }));
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/apiv1/devices.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }));
}
