#![allow(clippy::unwrap_used)]
// Integration tests for `Controller` against a mocked Neviweb.

use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use neviweb_core::{
    ConnectionState, Controller, ControllerConfig, CoreError, Credentials, DeviceFamily,
    DeviceState, PollIntervals, StateUpdate, SwitchState, SwitchUpdate, ThrottleConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn config(server: &MockServer) -> ControllerConfig {
    let url = Url::parse(&format!("{}/api/", server.uri())).unwrap();
    let mut config = ControllerConfig::new(url, Credentials::new("a@b.c", "pw".to_string().into()));
    config.poll = PollIntervals::DISABLED;
    config.throttle = ThrottleConfig {
        min_spacing: Duration::ZERO,
        ..ThrottleConfig::default()
    };
    config
}

fn login_response(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "session": token,
        "iat": Utc::now().timestamp_millis(),
        "refreshToken": "R1"
    }))
}

async fn mount_account(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(login_response("S1"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Gateway", "sku": "GT125" },
            { "id": 10, "name": "Salon", "sku": "TH1120RF3000" },
            { "id": 11, "name": "Porch", "sku": "SW2500RF" },
            { "id": 12, "name": "Kitchen", "sku": "DM2500RF" }
        ])))
        .mount(server)
        .await;
}

async fn mount_switch_read(server: &MockServer, on_off: &str) {
    Mock::given(method("GET"))
        .and(path("/api/device/11/attribute"))
        .and(query_param("attributes", "onOff"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "onOff": on_off })))
        .mount(server)
        .await;
}

async fn connected(server: &MockServer) -> Controller {
    let controller = Controller::new(config(server)).unwrap();
    controller.connect().await.unwrap();
    controller
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_discovers_supported_devices() {
    let server = MockServer::start().await;
    mount_account(&server).await;

    let controller = connected(&server).await;

    let families: Vec<(i64, DeviceFamily)> = controller
        .devices()
        .iter()
        .map(|d| (d.id, d.family))
        .collect();
    assert_eq!(
        families,
        vec![
            (10, DeviceFamily::Thermostat),
            (11, DeviceFamily::Switch),
            (12, DeviceFamily::Dimmer)
        ]
    );
    assert_eq!(*controller.connection_state().borrow(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_connect_reports_too_many_sessions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "ACCSESSEXC" } })),
        )
        .mount(&server)
        .await;

    let controller = Controller::new(config(&server)).unwrap();
    let result = controller.connect().await;

    assert!(matches!(
        result,
        Err(CoreError::AuthenticationFailed {
            reason: neviweb_api::AuthError::TooManySessions
        })
    ));
    assert_eq!(*controller.connection_state().borrow(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_location_filter_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(login_response("S1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(query_param("location$id", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.location_id = Some(3);
    let controller = Controller::new(config).unwrap();
    controller.connect().await.unwrap();

    assert!(controller.devices().is_empty());
}

#[tokio::test]
async fn test_disconnect_logs_out() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/logout"))
        .and(header("session-id", "S1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    controller.disconnect().await;

    assert_eq!(
        *controller.connection_state().borrow(),
        ConnectionState::Disconnected
    );
    let result = controller.state(11).await;
    assert!(result.unwrap_err().is_session_error());
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_reads_hit_network_once() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/device/10/attribute"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "roomTemperature": { "value": 20.5 },
                    "roomSetpoint": 21.0,
                    "outputPercentDisplay": 0,
                    "setpointMode": "manual"
                }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    let results = join_all((0..5).map(|_| controller.state(10))).await;

    for result in results {
        match result.unwrap() {
            DeviceState::Thermostat(t) => assert_eq!(t.room_temperature, Some(20.5)),
            other => panic!("expected thermostat state, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_first_read_publishes_change() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    mount_switch_read(&server, "on").await;

    let controller = connected(&server).await;
    let mut changes = controller.subscribe();

    controller.state(11).await.unwrap();

    let change = changes.recv().await.unwrap();
    assert_eq!(change.device_id, 11);
    assert_eq!(change.previous, None);
    assert_eq!(change.current, DeviceState::Switch(SwitchState { on: true }));
    assert_eq!(
        controller.cached_state(11),
        Some(DeviceState::Switch(SwitchState { on: true }))
    );
}

#[tokio::test]
async fn test_unknown_device_is_not_found() {
    let server = MockServer::start().await;
    mount_account(&server).await;

    let controller = connected(&server).await;

    assert!(matches!(
        controller.state(999).await,
        Err(CoreError::DeviceNotFound { device_id: 999 })
    ));
}

#[tokio::test]
async fn test_expired_session_triggers_one_relogin() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/device/11/attribute"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "USRSESSEXP" } })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_switch_read(&server, "off").await;

    let controller = connected(&server).await;
    let state = controller.state(11).await.unwrap();

    assert_eq!(state, DeviceState::Switch(SwitchState { on: false }));
    let logins = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/login")
        .count();
    assert_eq!(logins, 2);
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dimmer_intensity_is_submitted_twice() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/device/12/attribute"))
        .and(body_json(json!({ "intensity": 40 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "intensity": 40 })))
        .expect(2)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    controller.set_intensity(12, 40).await.unwrap();
}

#[tokio::test]
async fn test_switch_write_is_submitted_once() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/device/11/attribute"))
        .and(body_json(json!({ "onOff": "on" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "onOff": "on" })))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    controller.set_switch(11, true).await.unwrap();
}

#[tokio::test]
async fn test_wrong_family_write_never_reaches_provider() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    let result = controller
        .update(10, StateUpdate::Switch(SwitchUpdate { on: Some(true) }))
        .await;

    assert!(matches!(
        result,
        Err(CoreError::FamilyMismatch {
            device_id: 10,
            expected: DeviceFamily::Switch,
            actual: DeviceFamily::Thermostat
        })
    ));
}

#[tokio::test]
async fn test_write_rejection_is_surfaced() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/device/10/attribute"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "DVCCOMMTO" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    let result = controller.set_setpoint(10, 21.5).await;

    assert!(matches!(
        result,
        Err(CoreError::Api { ref code, .. }) if code.as_deref() == Some("DVCCOMMTO")
    ));
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_poll_task_publishes_states() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    mount_switch_read(&server, "on").await;

    let mut config = config(&server);
    config.poll = PollIntervals {
        switch: Duration::from_millis(50),
        ..PollIntervals::DISABLED
    };
    let controller = Controller::new(config).unwrap();
    let mut changes = controller.subscribe();
    controller.connect().await.unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.device_id, 11);

    controller.disconnect().await;
}

#[tokio::test]
async fn test_oneshot_logs_in_runs_and_logs_out() {
    let server = MockServer::start().await;
    mount_account(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/locations"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 3, "name": "Home" }])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.poll = PollIntervals::default();
    let locations = Controller::oneshot(config, |c| async move { c.locations().await })
        .await
        .unwrap();

    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].name, "Home");
}
