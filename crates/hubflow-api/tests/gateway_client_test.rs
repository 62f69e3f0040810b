#![allow(clippy::unwrap_used)]
// Integration tests for `GatewayClient` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hubflow_api::transport::{TlsMode, TransportConfig};
use hubflow_api::{Error, GatewayClient};

// ── Helpers ─────────────────────────────────────────────────────────

const KEY: &str = "0123456789";

async fn setup() -> (MockServer, GatewayClient) {
    let server = MockServer::start().await;
    let client = GatewayClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        SecretString::from(KEY.to_string()),
    );
    (server, client)
}

fn key_path(suffix: &str) -> String {
    if suffix.is_empty() {
        format!("/api/{KEY}")
    } else {
        format!("/api/{KEY}/{suffix}")
    }
}

// ── Snapshot tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_snapshot() {
    let (server, client) = setup().await;

    let body = json!({
        "config": { "name": "Phoscon-GW", "websocketport": 8088 },
        "lights": {
            "1": {
                "name": "Hall",
                "type": "Extended color light",
                "uniqueid": "00:17:88:01:00:bd:c7:b9-0b",
                "state": { "on": false, "bri": 0 }
            }
        },
        "sensors": {
            "3": {
                "name": "Switch",
                "type": "ZHASwitch",
                "state": { "buttonevent": 1002 },
                "config": { "battery": 90 }
            }
        },
        "groups": {
            "7": { "name": "Living", "type": "LightGroup", "state": { "any_on": false } }
        },
        "rules": {},
        "schedules": {}
    });

    Mock::given(method("GET"))
        .and(path(key_path("")))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let state = client.fetch_snapshot().await.unwrap();

    assert_eq!(state.lights.len(), 1);
    assert_eq!(state.lights["1"].name.as_deref(), Some("Hall"));
    assert_eq!(state.sensors["3"].config["battery"], 90);
    assert_eq!(state.groups["7"].device_type.as_deref(), Some("LightGroup"));
    assert_eq!(state.config.unwrap().websocketport, Some(8088));
}

#[tokio::test]
async fn test_fetch_gateway_config() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(key_path("config")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Phoscon-GW",
            "apiversion": "1.16.0",
            "websocketport": 443
        })))
        .mount(&server)
        .await;

    let config = client.fetch_gateway_config().await.unwrap();
    assert_eq!(config.websocketport, Some(443));
    assert_eq!(config.apiversion.as_deref(), Some("1.16.0"));
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_forbidden_maps_to_unauthorized() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(key_path("")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!([
            { "error": { "type": 1, "address": "/", "description": "unauthorized user" } }
        ])))
        .mount(&server)
        .await;

    let result = client.fetch_snapshot().await;
    assert!(
        matches!(result, Err(Error::Unauthorized)),
        "expected Unauthorized, got: {result:?}"
    );
}

#[tokio::test]
async fn test_server_error_maps_to_gateway_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(key_path("")))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let result = client.fetch_snapshot().await;
    match result {
        Err(Error::Gateway { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "busy");
        }
        other => panic!("expected Gateway error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(key_path("")))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"lights\": 42}"))
        .mount(&server)
        .await;

    let result = client.fetch_snapshot().await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}

#[tokio::test]
async fn test_transient_failure_is_retried_once() {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        tls: TlsMode::System,
        timeout: Duration::from_secs(2),
        retries: 1,
    };
    let client = GatewayClient::new(
        Url::parse(&server.uri()).unwrap(),
        SecretString::from(KEY.to_string()),
        &transport,
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path(key_path("")))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(key_path("")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "lights": {} })))
        .mount(&server)
        .await;

    let state = client.fetch_snapshot().await.unwrap();
    assert!(state.lights.is_empty());
}

#[tokio::test]
async fn test_transport_error_does_not_expose_key() {
    // Nothing listens on the discard port.
    let client = GatewayClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9").unwrap(),
        SecretString::from(KEY.to_string()),
    );

    let err = client.fetch_snapshot().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
    assert!(!err.to_string().contains(KEY), "key leaked: {err}");
    assert!(!format!("{err:?}").contains(KEY), "key leaked: {err:?}");
}
