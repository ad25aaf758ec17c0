#![allow(clippy::unwrap_used)]
// Integration tests for the device endpoints using wiremock.

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use neviweb_api::{AttributeUpdate, Credentials, Error, NeviwebClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, NeviwebClient) {
    let server = MockServer::start().await;
    let base = format!("{}/api/", server.uri());
    let client = NeviwebClient::from_reqwest(&base, reqwest::Client::new()).unwrap();
    (server, client)
}

/// Start a server and log the client in with access token `S1`.
async fn setup_connected() -> (MockServer, NeviwebClient) {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session": "S1",
            "iat": Utc::now().timestamp_millis(),
            "refreshToken": "R1"
        })))
        .mount(&server)
        .await;
    client
        .login(&Credentials::new("a@b.c", "pw".to_string().into()))
        .await
        .unwrap();
    (server, client)
}

// ── Session gating ──────────────────────────────────────────────────

#[tokio::test]
async fn test_request_without_session_fails_fast() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let err = client.list_locations().await.unwrap_err();
    assert!(err.is_session_expired(), "got: {err:?}");
}

// ── Directory ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_locations_sends_session_header() {
    let (server, client) = setup_connected().await;

    Mock::given(method("GET"))
        .and(path("/api/locations"))
        .and(header("session-id", "S1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 3, "name": "Maison" },
            { "id": 4, "name": "Chalet" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let locations = client.list_locations().await.unwrap();

    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0].id, 3);
    assert_eq!(locations[1].name, "Chalet");
}

#[tokio::test]
async fn test_list_devices_filters_by_location() {
    let (server, client) = setup_connected().await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(query_param("location$id", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 10, "name": "Salon", "sku": "TH1120RF3000", "location$id": 3 },
            { "id": 11, "name": "GT125", "sku": "GT125" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let devices = client.list_devices(Some(3)).await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].sku, "TH1120RF3000");
    assert_eq!(devices[0].location_id, Some(3));
    assert_eq!(devices[1].location_id, None);
}

// ── Attributes ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_thermostat_attributes() {
    let (server, client) = setup_connected().await;

    Mock::given(method("GET"))
        .and(path("/api/device/10/attribute"))
        .and(query_param(
            "attributes",
            "roomTemperature,outputPercentDisplay,setpointMode,alarmsActive0,roomSetpoint",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "roomTemperature": { "value": 20.5 },
            "outputPercentDisplay": 42,
            "setpointMode": "manual",
            "alarmsActive0": 0,
            "roomSetpoint": 21.0
        })))
        .mount(&server)
        .await;

    let attrs = client.get_thermostat_attributes(10).await.unwrap();

    assert_eq!(attrs.room_temperature.unwrap().value, Some(20.5));
    assert_eq!(attrs.output_percent_display, Some(42.0));
    assert_eq!(attrs.room_setpoint, Some(21.0));
}

#[tokio::test]
async fn test_dimmer_attributes() {
    let (server, client) = setup_connected().await;

    Mock::given(method("GET"))
        .and(path("/api/device/12/attribute"))
        .and(query_param("attributes", "onOff,intensity"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "onOff": "on", "intensity": 60 })),
        )
        .mount(&server)
        .await;

    let attrs = client.get_dimmer_attributes(12).await.unwrap();

    assert_eq!(attrs.on_off.as_deref(), Some("on"));
    assert_eq!(attrs.intensity, Some(60));
}

#[tokio::test]
async fn test_update_attributes_sends_partial_body() {
    let (server, client) = setup_connected().await;

    Mock::given(method("PUT"))
        .and(path("/api/device/11/attribute"))
        .and(header("session-id", "S1"))
        .and(body_json(json!({ "onOff": "off" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "onOff": "off" })))
        .expect(1)
        .mount(&server)
        .await;

    let update = AttributeUpdate {
        on_off: Some("off".into()),
        ..AttributeUpdate::default()
    };
    let answer = client.update_attributes(11, &update).await.unwrap();

    assert_eq!(answer, json!({ "onOff": "off" }));
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_provider_error_payload_is_rejected() {
    let (server, client) = setup_connected().await;

    Mock::given(method("GET"))
        .and(path("/api/device/11/attribute"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "DVCCOMMTO" } })),
        )
        .mount(&server)
        .await;

    let result = client.get_switch_attributes(11).await;

    match result {
        Err(Error::Rejected {
            status,
            code,
            payload,
        }) => {
            assert_eq!(status, 200);
            assert_eq!(code.as_deref(), Some("DVCCOMMTO"));
            assert!(payload.contains("DVCCOMMTO"));
        }
        other => panic!("expected Rejected, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_http_error_is_rejected_and_transient() {
    let (server, client) = setup_connected().await;

    Mock::given(method("GET"))
        .and(path("/api/locations"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = client.list_locations().await.unwrap_err();

    assert!(matches!(err, Error::Rejected { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup_connected().await;

    Mock::given(method("GET"))
        .and(path("/api/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client.list_locations().await.unwrap_err();

    assert!(matches!(err, Error::Deserialization { ref body, .. } if body == "not json"));
}
