#![allow(clippy::unwrap_used)]
// Integration tests for login, renewal and logout using wiremock.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use neviweb_api::{AuthError, Credentials, Error, NeviwebClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, NeviwebClient) {
    let server = MockServer::start().await;
    let base = format!("{}/api", server.uri());
    let client = NeviwebClient::from_reqwest(&base, reqwest::Client::new()).unwrap();
    (server, client)
}

fn credentials() -> Credentials {
    Credentials::new("a@b.c", "hunter2".to_string().into())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

async fn mount_login(server: &MockServer, iat: i64) {
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session": "S1",
            "iat": iat,
            "refreshToken": "R1"
        })))
        .mount(server)
        .await;
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success_stores_session() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(body_partial_json(json!({
            "username": "a@b.c",
            "password": "hunter2",
            "interface": "neviweb",
            "stayConnected": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session": "S1",
            "iat": 1_700_000_000_000_i64,
            "refreshToken": "R1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = client.login(&credentials()).await.unwrap();

    assert!(client.session().is_connected());
    assert_eq!(info.issued_at, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    assert_eq!(
        info.expires_at,
        Some(Utc.timestamp_opt(1_700_000_570, 0).unwrap())
    );
}

#[tokio::test]
async fn test_login_too_many_sessions() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "ACCSESSEXC" } })),
        )
        .mount(&server)
        .await;

    let result = client.login(&credentials()).await;

    assert!(
        matches!(result, Err(Error::Auth(AuthError::TooManySessions))),
        "expected TooManySessions, got: {result:?}"
    );
    assert!(!client.session().is_connected());
}

#[tokio::test]
async fn test_login_account_locked() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "USRLOCKED" } })),
        )
        .mount(&server)
        .await;

    let result = client.login(&credentials()).await;

    assert!(matches!(result, Err(Error::Auth(AuthError::AccountLocked))));
    assert!(!client.session().is_connected());
}

#[tokio::test]
async fn test_login_unknown_code_is_preserved() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "USRBADLOGIN" } })),
        )
        .mount(&server)
        .await;

    let err = client.login(&credentials()).await.unwrap_err();
    assert_eq!(err.api_error_code(), Some("USRBADLOGIN"));
}

// ── Expiry ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_is_expired_follows_token_lifetime() {
    let (server, client) = setup().await;
    mount_login(&server, 1_000_000_000_000).await;

    client.login(&credentials()).await.unwrap();

    let issued = Utc.timestamp_opt(1_000_000_000, 0).unwrap();
    let session = client.session();
    assert!(!session.is_expired(issued + chrono::TimeDelta::seconds(569)));
    assert!(session.is_expired(issued + chrono::TimeDelta::seconds(570)));
    assert!(session.is_expired(issued + chrono::TimeDelta::seconds(600)));
}

// ── Renewal ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_requests_renew_once() {
    let (server, client) = setup().await;
    // Issued long ago: the first request finds it expired.
    mount_login(&server, 1_000_000_000_000).await;

    Mock::given(method("POST"))
        .and(path("/api/connect"))
        .and(header("refreshToken", "R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session": "S2",
            "iat": now_millis(),
            "refreshToken": "R2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/locations"))
        .and(header("session-id", "S2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "Home" }])))
        .expect(5)
        .mount(&server)
        .await;

    client.login(&credentials()).await.unwrap();
    let generation = client.session().info().unwrap().generation;

    let results = join_all((0..5).map(|_| client.list_locations())).await;

    for result in results {
        assert_eq!(result.unwrap().len(), 1);
    }
    assert_eq!(client.session().info().unwrap().generation, generation + 1);
}

#[tokio::test]
async fn test_failed_renewal_expires_every_caller() {
    let (server, client) = setup().await;
    mount_login(&server, 1_000_000_000_000).await;

    Mock::given(method("POST"))
        .and(path("/api/connect"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": { "code": "USRSESSEXP" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    client.login(&credentials()).await.unwrap();

    let results = join_all((0..3).map(|_| client.list_locations())).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_session_expired(), "expected SessionExpired, got: {err:?}");
    }
    assert!(!client.session().is_connected());
}

#[tokio::test]
async fn test_logout_during_renewal_stays_logged_out() {
    let (server, client) = setup().await;
    mount_login(&server, 1_000_000_000_000).await;

    Mock::given(method("POST"))
        .and(path("/api/connect"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "session": "S2",
                    "iat": now_millis(),
                    "refreshToken": "R2"
                }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/logout"))
        .and(header("session-id", "S1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    client.login(&credentials()).await.unwrap();

    let (result, logout) = tokio::join!(client.list_locations(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.logout().await
    });

    logout.unwrap();
    let err = result.unwrap_err();
    assert!(err.is_session_expired(), "expected SessionExpired, got: {err:?}");
    assert!(!client.session().is_connected());
}

#[tokio::test]
async fn test_stale_renewal_failure_keeps_fresh_login() {
    let (server, client) = setup().await;

    // First login is long expired, the second one is fresh.
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session": "S1",
            "iat": 1_000_000_000_000_i64,
            "refreshToken": "R1"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session": "S3",
            "iat": now_millis(),
            "refreshToken": "R3"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/connect"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "error": { "code": "USRSESSEXP" } }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/locations"))
        .and(header("session-id", "S3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "Home" }])))
        .expect(1)
        .mount(&server)
        .await;

    client.login(&credentials()).await.unwrap();
    let generation = client.session().generation();

    let (result, relogin) = tokio::join!(client.list_locations(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.login(&credentials()).await
    });

    relogin.unwrap();
    assert!(client.session().is_connected());
    assert_eq!(client.session().generation(), generation + 1);
    assert_eq!(result.unwrap().len(), 1);
}

// ── Logout ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_logout_sends_both_tokens() {
    let (server, client) = setup().await;
    mount_login(&server, now_millis()).await;

    Mock::given(method("GET"))
        .and(path("/api/logout"))
        .and(header("session-id", "S1"))
        .and(header("refreshToken", "R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    client.login(&credentials()).await.unwrap();
    client.logout().await.unwrap();

    assert!(!client.session().is_connected());
    // Second logout has nothing to revoke.
    client.logout().await.unwrap();
}

#[tokio::test]
async fn test_logout_failure_still_disconnects() {
    let (server, client) = setup().await;
    mount_login(&server, now_millis()).await;

    Mock::given(method("GET"))
        .and(path("/api/logout"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    client.login(&credentials()).await.unwrap();
    let result = client.logout().await;

    assert!(matches!(result, Err(Error::Rejected { status: 500, .. })));
    assert!(!client.session().is_connected());
}

#[tokio::test]
async fn test_custom_token_lifetime() {
    let server = MockServer::start().await;
    let base = NeviwebClient::normalize_base_url(&format!("{}/api", server.uri())).unwrap();
    let http = reqwest::Client::new();
    let session = std::sync::Arc::new(
        neviweb_api::SessionManager::new(http.clone(), base.clone())
            .with_lock_wait(Duration::from_millis(50))
            .with_token_lifetime(Duration::from_secs(60)),
    );
    let client = NeviwebClient::with_session(http, base, session);
    mount_login(&server, now_millis()).await;

    let info = client.login(&credentials()).await.unwrap();
    assert_eq!(
        info.expires_at.unwrap() - info.issued_at,
        chrono::TimeDelta::seconds(60)
    );
}
