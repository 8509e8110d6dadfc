// Integration tests for `StreamServiceClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ayla_api::stream_service::types::EventType;
use ayla_api::{StaticToken, StreamServiceClient};

async fn setup() -> (MockServer, StreamServiceClient) {
    let server = MockServer::start().await;
    let token = Arc::new(StaticToken::new(SecretString::from("token-1")));
    let client = StreamServiceClient::from_reqwest(
        &server.uri(),
        &server.uri(),
        reqwest::Client::new(),
        token,
    )
    .unwrap();
    (server, client)
}

#[tokio::test]
async fn test_create_subscription_scopes_all_devices() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/subscriptions"))
        .and(body_partial_json(json!({
            "subscription": {
                "dsn": "AC1,AC2",
                "property_name": "*",
                "client_type": "mobile",
                "subscription_type": "datapoint,datapointack"
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "subscription": { "id": 9, "stream_key": "key-9", "dsn": "AC1,AC2" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sub = client
        .create_subscription(
            &["AC1".to_owned(), "AC2".to_owned()],
            &[EventType::Datapoint, EventType::DatapointAck],
        )
        .await
        .unwrap();

    assert_eq!(sub.id, Some(9));
    assert_eq!(sub.stream_key.as_deref(), Some("key-9"));
}

#[tokio::test]
async fn test_get_and_delete_subscription() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/subscriptions/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "subscription": { "id": 9, "stream_key": "key-9" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/subscriptions/9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sub = client.get_subscription(9).await.unwrap();
    assert_eq!(sub.stream_key.as_deref(), Some("key-9"));
    client.delete_subscription(9).await.unwrap();
}

#[tokio::test]
async fn test_socket_url_uses_ws_scheme_for_plain_http() {
    let (server, client) = setup().await;
    let url = client.socket_url("abc").unwrap();
    assert_eq!(url.scheme(), "ws");
    assert!(url.as_str().starts_with(&server.uri().replacen("http", "ws", 1)));
    assert_eq!(url.query(), Some("stream_key=abc"));
}
