// ABOUTME: HTTP-level tests for the axum route shell
// ABOUTME: Covers token issuance, session bootstrap, SSE turns, and the warehouse login flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use axum::body::Body;
use common::{AcceptingConnector, RejectingConnector, ScriptedAgent};
use http::{header, Method, Request, StatusCode};
use jordi_chat_server::identity::TokenCache;
use jordi_chat_server::routes::{self, AppState};
use jordi_chat_server::warehouse::WarehouseConnector;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn build_state(
    connector: Arc<dyn WarehouseConnector>,
    settings: jordi_chat_server::config::WarehouseSettings,
) -> (AppState, common::TestHarness) {
    let harness = common::create_harness(
        Arc::clone(&connector),
        settings.clone(),
        ScriptedAgent::replying("pong"),
    )
    .await;

    let state = AppState {
        orchestrator: Arc::clone(&harness.orchestrator),
        tokens: Arc::clone(&harness.tokens),
        database: Arc::clone(&harness.database),
        connector,
        warehouse: settings,
        identity: None,
        token_cache: Arc::new(TokenCache::new()),
        public_url: "http://localhost:8081".into(),
    };

    (state, harness)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (state, _harness) = build_state(
        Arc::new(RejectingConnector::default()),
        common::warehouse_settings(),
    )
    .await;
    let app = routes::router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_issue_token_returns_chat_url() {
    let (state, harness) = build_state(
        Arc::new(RejectingConnector::default()),
        common::warehouse_settings(),
    )
    .await;
    let app = routes::router(state);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/auth/token",
            json!({"email": "Advisor@X.com", "ttl_minutes": 15}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;

    assert_eq!(body["email"], "advisor@x.com");
    let token = body["token"].as_str().unwrap();
    let claims = harness.tokens.decode_token(token).unwrap();
    assert_eq!(claims.email, "advisor@x.com");
    assert_eq!(claims.exp - claims.iat, 15 * 60);

    let chat_url = body["chat_url"].as_str().unwrap();
    assert!(chat_url.starts_with("http://localhost:8081/chat/session?token="));
}

#[tokio::test]
async fn test_issue_token_clamps_requested_ttl() {
    let (state, harness) = build_state(
        Arc::new(RejectingConnector::default()),
        common::warehouse_settings(),
    )
    .await;
    let app = routes::router(state);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/auth/token",
            json!({"email": "a@x.com", "ttl_minutes": 500}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let claims = harness
        .tokens
        .decode_token(body["token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.exp - claims.iat, 120 * 60);
}

#[tokio::test]
async fn test_issue_token_rejects_invalid_email() {
    let (state, _harness) = build_state(
        Arc::new(RejectingConnector::default()),
        common::warehouse_settings(),
    )
    .await;
    let app = routes::router(state);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/auth/token",
            json!({"email": "not-an-email"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bootstrap_with_valid_token() {
    let (state, harness) = build_state(
        Arc::new(RejectingConnector::default()),
        common::warehouse_settings(),
    )
    .await;
    let app = routes::router(state);

    let token = harness.tokens.create_token("a@x.com", None).unwrap();
    let uri = format!("/chat/session?token={}", urlencoding::encode(&token));

    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["email"], "a@x.com");
    assert!(!body["session_id"].as_str().unwrap().is_empty());
    // No credentials on file and no service account: capability disabled
    assert_eq!(body["warehouse_enabled"], false);
    assert_eq!(body["remediation"]["email"], "a@x.com");
}

#[tokio::test]
async fn test_bootstrap_with_invalid_token_is_unauthorized() {
    let (state, _harness) = build_state(
        Arc::new(RejectingConnector::default()),
        common::warehouse_settings(),
    )
    .await;
    let app = routes::router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/chat/session?token=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_message_streams_events() {
    let (state, harness) = build_state(
        Arc::new(RejectingConnector::default()),
        common::warehouse_settings(),
    )
    .await;
    let app = routes::router(state);

    let token = harness.tokens.create_token("a@x.com", None).unwrap();
    let outcome = harness
        .orchestrator
        .bootstrap(
            &token,
            jordi_chat_server::session::ChatSettings::parse_line("enable_warehouse=false"),
        )
        .await
        .unwrap();

    let uri = format!("/chat/sessions/{}/messages", outcome.session_id);
    let response = app
        .oneshot(json_request(Method::POST, &uri, json!({"content": "hi"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(body.contains("user_message"));
    assert!(body.contains("\"type\":\"done\""));
    assert!(body.contains("pong"));
}

#[tokio::test]
async fn test_send_message_unknown_session_is_not_found() {
    let (state, _harness) = build_state(
        Arc::new(RejectingConnector::default()),
        common::warehouse_settings(),
    )
    .await;
    let app = routes::router(state);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/chat/sessions/unknown/messages",
            json!({"content": "hi"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_settings_endpoint() {
    let (state, harness) = build_state(
        Arc::new(RejectingConnector::default()),
        common::warehouse_settings(),
    )
    .await;
    let app = routes::router(state);

    let token = harness.tokens.create_token("a@x.com", None).unwrap();
    let outcome = harness
        .orchestrator
        .bootstrap(
            &token,
            jordi_chat_server::session::ChatSettings::parse_line("enable_warehouse=false"),
        )
        .await
        .unwrap();

    let uri = format!("/chat/sessions/{}/settings", outcome.session_id);
    let response = app
        .oneshot(json_request(
            Method::PUT,
            &uri,
            json!({"settings": "model=GPT-4.1, temperature=0.3, enable_warehouse=false"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["model"], "GPT-4.1");
    assert_eq!(body["warehouse_enabled"], false);
}

#[tokio::test]
async fn test_warehouse_login_verifies_then_stores() {
    let connector = Arc::new(AcceptingConnector::default());
    let (state, harness) =
        build_state(connector.clone(), common::warehouse_settings()).await;
    let app = routes::router(state);

    let token = harness.tokens.create_token("a@x.com", None).unwrap();
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/warehouse/login",
            json!({"token": token, "username": "wh_user", "password": "wh_pass"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);

    let stored = harness
        .database
        .lookup_warehouse_credentials("a@x.com")
        .await
        .expect("credentials must be stored after verified login");
    assert_eq!(stored.username, "wh_user");
    assert_eq!(stored.password, "wh_pass");
}

#[tokio::test]
async fn test_warehouse_login_rejection_stores_nothing() {
    let connector = Arc::new(RejectingConnector::default());
    let (state, harness) =
        build_state(connector.clone(), common::warehouse_settings()).await;
    let app = routes::router(state);

    let token = harness.tokens.create_token("a@x.com", None).unwrap();
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/warehouse/login",
            json!({"token": token, "username": "wh_user", "password": "bad"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(harness
        .database
        .lookup_warehouse_credentials("a@x.com")
        .await
        .is_none());
}
