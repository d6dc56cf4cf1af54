//! HTTP API routes driven through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use common::{MockBackend, clock, config, orchestrator};
use tollgate_gateway::api::router;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_complete(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/complete")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let gw = Arc::new(orchestrator(config(0.0), &[], clock()));
    let response = router(gw)
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn complete_then_budget_and_usage() {
    let b = Arc::new(MockBackend::ok("openai", "pong", 0.5));
    let gw = Arc::new(orchestrator(config(2.0), &[b], clock()));

    let response = router(Arc::clone(&gw))
        .oneshot(post_complete(json!({ "prompt": "ping" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["text"], "pong");
    assert_eq!(body["backend"], "openai");
    assert_eq!(body["cached"], false);

    let budget = body_json(
        router(Arc::clone(&gw))
            .oneshot(Request::get("/api/budget").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(budget["daily_limit"], 2.0);
    assert_eq!(budget["used"], 0.5);
    assert_eq!(budget["percentage"], 25.0);
    assert_eq!(budget["unlimited"], false);

    let usage = body_json(
        router(Arc::clone(&gw))
            .oneshot(Request::get("/api/usage").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(usage["total_requests"], 1);
    assert_eq!(usage["backends"]["openai"]["requests"], 1);
    assert_eq!(usage["cache"]["size"], 1);
}

#[tokio::test]
async fn providers_listed_in_registry_order() {
    let gw = Arc::new(orchestrator(
        config(0.0),
        &[
            Arc::new(MockBackend::ok("openai", "", 0.0)),
            Arc::new(MockBackend::ok("ollama", "", 0.0).local()),
        ],
        clock(),
    ));

    let body = body_json(
        router(gw)
            .oneshot(Request::get("/api/providers").body(Body::empty()).unwrap())
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(body["count"], 2);
    assert_eq!(body["providers"][0]["name"], "openai");
    assert_eq!(body["providers"][0]["kind"], "remote");
    assert_eq!(body["providers"][1]["name"], "ollama");
    assert_eq!(body["providers"][1]["kind"], "local");
}

#[tokio::test]
async fn budget_exhaustion_is_payment_required() {
    let b = Arc::new(MockBackend::ok("openai", "pong", 5.0));
    let gw = Arc::new(orchestrator(config(1.0), &[b], clock()));

    let response = router(gw)
        .oneshot(post_complete(json!({ "prompt": "ping" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body_json(response).await["kind"], "budget_exceeded");
}

#[tokio::test]
async fn provider_exhaustion_is_service_unavailable() {
    let gw = Arc::new(orchestrator(
        config(0.0),
        &[Arc::new(MockBackend::failing("openai"))],
        clock(),
    ));

    let response = router(gw)
        .oneshot(post_complete(json!({
            "prompt": "ping",
            "options": { "model": "gpt-4o-mini", "force_backend": "remote" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("openai"));
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let gw = Arc::new(orchestrator(config(0.0), &[], clock()));
    let response = router(gw)
        .oneshot(post_complete(json!({ "prompt": "   " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
