//! Remote deconfliction provider against a local mock service.

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tipgate_common::{DeconflictionOutcome, IdentifierType, OverlapType};
use tipgated::deconfliction::{
    DeconflictionError, DeconflictionGate, DeconflictionProvider, DeconflictionQuery,
    RemoteProvider,
};

const API_KEY: &str = "test-key";

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn check_handler(
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", API_KEY))
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })));
    }

    let response = if body["value"] == "known_subject" && body["identifier_type"] == "username" {
        json!({
            "match_found": true,
            "overlap_type": "same_subject",
            "active_investigation": true,
            "coordination_recommended": true,
            "notes": "open case"
        })
    } else {
        json!({ "match_found": false })
    };
    (StatusCode::OK, Json(response))
}

fn query(value: &str) -> DeconflictionQuery {
    DeconflictionQuery {
        identifier_type: IdentifierType::Username,
        value: value.to_string(),
        jurisdiction: Some("WA".to_string()),
    }
}

#[tokio::test]
async fn test_match_and_clear_responses() {
    let base = spawn(Router::new().route("/v1/deconfliction/check", post(check_handler))).await;
    let provider = RemoteProvider::new(&base, API_KEY, Duration::from_secs(2)).unwrap();

    let result = provider.check(&query("known_subject")).await.unwrap();
    assert!(result.is_active_match());
    assert_eq!(result.overlap_type, Some(OverlapType::SameSubject));
    assert_eq!(result.notes, "open case");

    let result = provider.check(&query("someone_else")).await.unwrap();
    assert!(!result.match_found);
}

#[tokio::test]
async fn test_wrong_credentials_is_http_error() {
    let base = spawn(Router::new().route("/v1/deconfliction/check", post(check_handler))).await;
    let provider = RemoteProvider::new(&base, "wrong-key", Duration::from_secs(2)).unwrap();

    let err = provider.check(&query("known_subject")).await.unwrap_err();
    assert!(matches!(err, DeconflictionError::Http { status: 401 }));
}

#[tokio::test]
async fn test_server_error_is_indeterminate() {
    let app = Router::new().route(
        "/v1/deconfliction/check",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base = spawn(app).await;
    let provider = RemoteProvider::new(&base, API_KEY, Duration::from_secs(2)).unwrap();
    let gate = DeconflictionGate::new(Arc::new(provider), Duration::from_secs(2));

    match gate.check(IdentifierType::Email, "a@example.com", None).await {
        DeconflictionOutcome::Indeterminate { reason } => assert!(reason.contains("500")),
        other => panic!("expected indeterminate, got {:?}", other),
    }
}

#[tokio::test]
async fn test_garbled_body_is_decode_error() {
    let app = Router::new().route("/v1/deconfliction/check", post(|| async { "not json" }));
    let base = spawn(app).await;
    let provider = RemoteProvider::new(&base, API_KEY, Duration::from_secs(2)).unwrap();

    let err = provider.check(&query("anyone")).await.unwrap_err();
    assert!(matches!(err, DeconflictionError::Decode(_)));
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let app = Router::new().route(
        "/v1/deconfliction/check",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "match_found": false }))
        }),
    );
    let base = spawn(app).await;
    let timeout = Duration::from_millis(200);

    let provider = RemoteProvider::new(&base, API_KEY, timeout).unwrap();
    let err = provider.check(&query("anyone")).await.unwrap_err();
    assert!(matches!(err, DeconflictionError::Timeout(_)));

    let provider = RemoteProvider::new(&base, API_KEY, timeout).unwrap();
    let gate = DeconflictionGate::new(Arc::new(provider), timeout);
    assert!(gate.check(IdentifierType::Username, "anyone", None).await.is_indeterminate());
}
