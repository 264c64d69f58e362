//! End-to-end checks of the assembled router, driven through `oneshot`
//! against an orchestrator backed by in-process fakes.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use launchpad_core::{Environment, TemplateKind};
use launchpad_orchestrator::testkit::{Harness, Script};

fn router(h: &Harness) -> axum::Router {
    launchpad_api::build_router(h.orchestrator.clone())
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

async fn text(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn json(resp: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&text(resp).await).unwrap()
}

#[tokio::test]
async fn healthz_is_up() {
    let h = Harness::new();
    let resp = router(&h).oneshot(empty_request("GET", "/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json(resp).await["data"], "ok");
}

#[tokio::test]
async fn full_lifecycle_over_http() {
    let h = Harness::new();

    let resp = router(&h)
        .oneshot(json_request(
            "POST",
            "/api/v1/apps",
            serde_json::json!({"name": "Demo", "template": "api"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(json(resp).await["data"]["name"], "demo");

    h.generator.push(Script::file(
        "app.py",
        "from flask import Flask\napp = Flask(__name__)\n",
    ));
    let resp = router(&h)
        .oneshot(json_request(
            "POST",
            "/api/v1/apps/demo/generate",
            serde_json::json!({"description": "hello world api"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let events = text(resp).await;
    assert!(events.contains("event: progress"));
    assert!(events.contains("event: result"));
    assert!(events.contains("\"state\":\"generated\""));

    let resp = router(&h)
        .oneshot(empty_request("POST", "/api/v1/apps/demo/build"))
        .await
        .unwrap();
    let events = text(resp).await;
    assert!(events.contains("event: result"), "{events}");
    assert!(events.contains("\"state\":\"preview_built\""));

    let resp = router(&h)
        .oneshot(empty_request("POST", "/api/v1/apps/demo/publish"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let published = json(resp).await;
    assert_eq!(published["data"]["state"], "published");
    assert_eq!(published["data"]["prod_tag"], published["data"]["preview_tag"]);

    let resp = router(&h)
        .oneshot(empty_request("GET", "/api/v1/apps/demo"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let status = json(resp).await;
    assert_eq!(status["data"]["state"], "published");
    assert!(
        h.cluster
            .live_tag(&Harness::app("demo"), Environment::Production)
            .is_some()
    );

    let resp = router(&h)
        .oneshot(empty_request("GET", "/api/v1/apps"))
        .await
        .unwrap();
    assert_eq!(json(resp).await["data"].as_array().unwrap().len(), 1);

    let resp = router(&h)
        .oneshot(empty_request("DELETE", "/api/v1/apps/demo"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json(resp).await["data"]["state"], "deleted");
    assert!(h.cluster.namespace("app-demo").is_none());
}

#[tokio::test]
async fn rollback_without_body_uses_previous_image() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    let first = h.build("demo").await.preview_tag.unwrap();
    h.publish("demo").await;
    h.build("demo").await;
    h.publish("demo").await;

    let resp = router(&h)
        .oneshot(empty_request("POST", "/api/v1/apps/demo/rollback"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json(resp).await["data"]["prod_tag"], first.to_string());
}

#[tokio::test]
async fn rollback_to_unknown_tag_is_rejected() {
    let h = Harness::new();
    h.generated("demo", TemplateKind::Api).await;
    h.build("demo").await;
    h.publish("demo").await;

    let resp = router(&h)
        .oneshot(json_request(
            "POST",
            "/api/v1/apps/demo/rollback",
            serde_json::json!({"target": "20000101.000000"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["kind"], "rollback_target_missing");
}

#[tokio::test]
async fn failed_generation_streams_an_error_event() {
    let h = Harness::new();
    h.orchestrator.create("demo", TemplateKind::Api).await.unwrap();
    h.generator.push(Script::Fail("upstream overloaded".into()));

    let resp = router(&h)
        .oneshot(json_request(
            "POST",
            "/api/v1/apps/demo/generate",
            serde_json::json!({"description": "hello"}),
        ))
        .await
        .unwrap();
    let events = text(resp).await;
    assert!(events.contains("event: error"));
    assert!(events.contains("generation_failure"));
    assert_eq!(h.record("demo").state.as_str(), "created");
}

#[tokio::test]
async fn unknown_app_is_not_found() {
    let h = Harness::new();
    for (method, uri) in [
        ("GET", "/api/v1/apps/ghost"),
        ("DELETE", "/api/v1/apps/ghost"),
        ("POST", "/api/v1/apps/ghost/publish"),
        ("POST", "/api/v1/apps/ghost/resync"),
    ] {
        let resp = router(&h).oneshot(empty_request(method, uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{method} {uri}");
    }
}

#[tokio::test]
async fn malformed_create_body_is_rejected() {
    let h = Harness::new();
    let resp = router(&h)
        .oneshot(json_request("POST", "/api/v1/apps", serde_json::json!({"name": "demo"})))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn logs_follow_the_requested_environment() {
    let h = Harness::new();
    let app = h.generated("demo", TemplateKind::Api).await;
    h.build("demo").await;
    h.publish("demo").await;
    h.cluster.push_log(&app.name, Environment::Preview, "preview line");
    for n in 0..3 {
        h.cluster.push_log(&app.name, Environment::Production, format!("prod line {n}"));
    }

    let resp = router(&h)
        .oneshot(empty_request("GET", "/api/v1/apps/demo/logs?env=prod&tail=2"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = text(resp).await;
    assert!(!body.contains("prod line 0"));
    assert!(body.contains("prod line 1"));
    assert!(body.contains("prod line 2"));
    assert!(!body.contains("preview line"));

    let resp = router(&h)
        .oneshot(empty_request("GET", "/api/v1/apps/demo/logs?env=staging"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
