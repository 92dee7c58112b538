#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use tower::ServiceExt;

use stampcard_core::Config;
use stampcard_render::StampRenderer;
use stampcard_server::lifecycle::{LifecycleManager, LifecyclePolicy};
use stampcard_server::push::RecordingDispatcher;
use stampcard_server::routes::build_router;
use stampcard_server::storage::{PassDatabase, WalletKind};

const PASS_TYPE: &str = "pass.dev.stampcard.loyalty";

struct TestApp {
    router: Router,
    manager: LifecycleManager,
    pass_id: String,
    token: String,
}

async fn app() -> TestApp {
    let config = Config::default();
    let db = PassDatabase::open_in_memory().await.unwrap();
    let manager = LifecycleManager::new(
        db.clone(),
        Arc::new(RecordingDispatcher::new()),
        LifecyclePolicy::default(),
    );
    let pass = manager
        .issue_pass("cust-1", "offer-1", WalletKind::Apple, 10)
        .await
        .unwrap();
    let router = build_router(stampcard_server::app_state(
        &config,
        db,
        StampRenderer::default(),
    ));

    TestApp {
        router,
        manager,
        pass_id: pass.id,
        token: pass.authentication_token,
    }
}

/// Send a request to the app and return (status, headers, body).
async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<serde_json::Value>,
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for &(name, value) in headers {
        builder = builder.header(name, value);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, bytes.to_vec())
}

fn registration_uri(device: &str, serial: &str) -> String {
    format!("/v1/devices/{device}/registrations/{PASS_TYPE}/{serial}")
}

fn auth(token: &str) -> String {
    format!("ApplePass {token}")
}

async fn register(app: &TestApp, device: &str) -> StatusCode {
    let auth = auth(&app.token);
    send(
        app,
        "POST",
        &registration_uri(device, &app.pass_id),
        &[("authorization", &auth)],
        Some(serde_json::json!({ "pushToken": format!("push-{device}") })),
    )
    .await
    .0
}

#[tokio::test]
async fn health_is_ok() {
    let app = app().await;
    let (status, _, body) = send(&app, "GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn register_created_then_existing() {
    let app = app().await;
    assert_eq!(register(&app, "dev-1").await, StatusCode::CREATED);
    assert_eq!(register(&app, "dev-1").await, StatusCode::OK);
}

#[tokio::test]
async fn register_rejects_bad_credentials() {
    let app = app().await;
    let body = || Some(serde_json::json!({ "pushToken": "push" }));
    let uri = registration_uri("dev-1", &app.pass_id);

    let wrong = [("authorization", "ApplePass wrong")];
    let (status, _, _) = send(&app, "POST", &uri, &wrong, body()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, "POST", &uri, &[], body()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let good = auth(&app.token);
    let other_type = format!("/v1/devices/dev-1/registrations/pass.other/{}", app.pass_id);
    let (status, _, _) = send(&app, "POST", &other_type, &[("authorization", &good)], body()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unknown = registration_uri("dev-1", "no-such-pass");
    let (status, _, _) = send(&app, "POST", &unknown, &[("authorization", &good)], body()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn updated_serials_follow_update_tags() {
    let app = app().await;
    let list_uri = format!("/v1/devices/dev-1/registrations/{PASS_TYPE}");

    let (status, _, _) = send(&app, "GET", &list_uri, &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "unknown device");

    register(&app, "dev-1").await;
    let (status, _, body) = send(&app, "GET", &list_uri, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["serialNumbers"], serde_json::json!([app.pass_id]));
    let last = json["lastUpdated"].as_str().unwrap().to_string();

    let since_uri = format!("{list_uri}?passesUpdatedSince={last}");
    let (status, _, _) = send(&app, "GET", &since_uri, &[], None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    app.manager.add_stamps(&app.pass_id, 1).await.unwrap();
    let (status, _, body) = send(&app, "GET", &since_uri, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_ne!(json["lastUpdated"].as_str().unwrap(), last);
}

#[tokio::test]
async fn latest_pass_honours_if_none_match() {
    let app = app().await;
    let uri = format!("/v1/passes/{PASS_TYPE}/{}", app.pass_id);
    let good = auth(&app.token);

    let (status, headers, body) = send(&app, "GET", &uri, &[("authorization", &good)], None).await;
    assert_eq!(status, StatusCode::OK);
    let etag = headers.get(header::ETAG).unwrap().to_str().unwrap().to_string();
    assert!(etag.starts_with('"') && etag.ends_with('"'));
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["serialNumber"], app.pass_id.as_str());
    assert_eq!(json["etag"], etag.as_str());

    let (status, headers, _) = send(
        &app,
        "GET",
        &uri,
        &[("authorization", &good), ("if-none-match", &etag)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert_eq!(headers.get(header::ETAG).unwrap().to_str().unwrap(), etag);

    app.manager.add_stamps(&app.pass_id, 2).await.unwrap();
    let (status, headers, _) = send(
        &app,
        "GET",
        &uri,
        &[("authorization", &good), ("if-none-match", &etag)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(headers.get(header::ETAG).unwrap().to_str().unwrap(), etag);

    let wrong = [("authorization", "ApplePass nope")];
    let (status, _, _) = send(&app, "GET", &uri, &wrong, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unregister_removes_device() {
    let app = app().await;
    register(&app, "dev-1").await;
    let good = auth(&app.token);

    let (status, _, _) = send(
        &app,
        "DELETE",
        &registration_uri("dev-1", &app.pass_id),
        &[("authorization", &good)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let list_uri = format!("/v1/devices/dev-1/registrations/{PASS_TYPE}");
    let (status, _, _) = send(&app, "GET", &list_uri, &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn device_logs_are_accepted() {
    let app = app().await;
    let (status, _, _) = send(
        &app,
        "POST",
        "/v1/log",
        &[],
        Some(serde_json::json!({ "logs": ["Web service error for pass.dev.stampcard.loyalty"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
