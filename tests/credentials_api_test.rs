// Integration tests for POST/GET /credentials and POST /credentials/test

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use mockito::{Server, ServerGuard};
use paybridge::api::{create_app, AppState};
use paybridge::config::AppConfig;
use paybridge::credentials::{CredentialStore, GatewayMode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_state(gateway: &ServerGuard) -> AppState {
    let mut config = AppConfig::default();
    config.server.public_base_url = "https://bridge.example".to_string();
    config.gateway.sandbox_base_url = format!("{}/sandbox/api/v3", gateway.url());
    config.gateway.production_base_url = format!("{}/live/api/v3", gateway.url());

    let store = Arc::new(CredentialStore::new(":memory:", &BASE64.encode([2u8; 32])).unwrap());
    AppState::new(&config, store, reqwest::Client::new())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn save_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/credentials")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn credentials(mode: &str, api_key: &str) -> Value {
    json!({
        "tenantId": "loc-1",
        "mode": mode,
        "apiKey": api_key,
        "signingSecret": "S-signing-secret",
        "collectionId": "col-1"
    })
}

/// Successful probe: record verified, secrets masked in the echo.
#[tokio::test]
async fn test_save_credentials_verified() {
    let mut gateway = Server::new_async().await;
    let probe = gateway
        .mock("GET", "/sandbox/api/v3/collections/col-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"col-1","title":"Shop"}"#)
        .create_async()
        .await;

    let app = create_app(create_test_state(&gateway));
    let (status, json) = send(app, save_request(credentials("sandbox", "sandbox-api-key"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["verified"], true);
    assert_eq!(json["mode"], "sandbox");
    assert_eq!(json["apiKey"], "***********-key");
    assert!(!json.to_string().contains("S-signing-secret"));
    probe.assert_async().await;
}

/// Every missing field is listed.
#[tokio::test]
async fn test_save_credentials_validation() {
    let gateway = Server::new_async().await;
    let app = create_app(create_test_state(&gateway));

    let (status, json) = send(app, save_request(json!({ "tenantId": "loc-1" }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation_error");
    assert_eq!(
        json["fields"],
        json!(["mode", "apiKey", "signingSecret", "collectionId"])
    );
}

/// A body that is not JSON gets the structured error body.
#[tokio::test]
async fn test_save_credentials_malformed_body() {
    let gateway = Server::new_async().await;
    let app = create_app(create_test_state(&gateway));

    let request = Request::builder()
        .method("POST")
        .uri("/credentials")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation_error");
}

/// A failed probe is reported, and the record stays stored unverified.
#[tokio::test]
async fn test_failed_probe_flags_record() {
    let mut gateway = Server::new_async().await;
    let _probe = gateway
        .mock("GET", "/live/api/v3/collections/col-1")
        .with_status(401)
        .with_body(r#"{"error":{"type":"Unauthorized"}}"#)
        .create_async()
        .await;

    let state = create_test_state(&gateway);
    let store = Arc::clone(&state.store);
    let app = create_app(state);

    for _ in 0..2 {
        let (status, json) = send(
            app.clone(),
            save_request(credentials("production", "wrong-key")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["kind"], "gateway_error");
    }

    let stored = store
        .get_gateway_credential("loc-1", GatewayMode::Production)
        .unwrap()
        .unwrap();
    assert!(!stored.verified);

    let (status, json) = send(
        app,
        Request::builder()
            .method("GET")
            .uri("/credentials?tenantId=loc-1&mode=production")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["verified"], false);
}

/// Reads are per mode; mode is required.
#[tokio::test]
async fn test_get_credentials() {
    let gateway = Server::new_async().await;
    let state = create_test_state(&gateway);
    state
        .store
        .upsert_gateway_credential(
            "loc-1",
            GatewayMode::Sandbox,
            &paybridge::credentials::GatewayCredentialFields {
                api_key: "sandbox-api-key".to_string(),
                signing_secret: "xsig".to_string(),
                collection_id: "col-1".to_string(),
            },
        )
        .unwrap();
    let app = create_app(state);

    let get = |uri: &str| {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let (status, json) = send(app.clone(), get("/credentials?tenantId=loc-1&mode=sandbox")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["collectionId"], "col-1");
    assert_eq!(json["signingSecret"], "****");

    let (status, json) = send(app.clone(), get("/credentials?tenantId=loc-1&mode=production")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "not_found");

    let (status, json) = send(app, get("/credentials?tenantId=loc-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["fields"], json!(["mode"]));
}

/// Connection test re-probes the stored record.
#[tokio::test]
async fn test_connection_endpoint() {
    let mut gateway = Server::new_async().await;
    let probe = gateway
        .mock("GET", "/sandbox/api/v3/collections/col-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"col-1"}"#)
        .create_async()
        .await;

    let state = create_test_state(&gateway);
    state
        .store
        .upsert_gateway_credential(
            "loc-1",
            GatewayMode::Sandbox,
            &paybridge::credentials::GatewayCredentialFields {
                api_key: "sandbox-api-key".to_string(),
                signing_secret: "xsig".to_string(),
                collection_id: "col-1".to_string(),
            },
        )
        .unwrap();
    let app = create_app(state);

    let (status, json) = send(
        app,
        Request::builder()
            .method("POST")
            .uri("/credentials/test?tenantId=loc-1&mode=sandbox")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["verified"], true);
    probe.assert_async().await;
}
