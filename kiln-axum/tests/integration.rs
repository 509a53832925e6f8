use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use kiln::{Engine, EngineConfig, Limits};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> Router {
    kiln_axum::router(Arc::new(Engine::new()))
}

async fn post(app: Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/render")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[kiln_testhelpers::test(tokio::test)]
async fn renders_templates() {
    let body = json!({"template": "Hello, <%= name %>!", "data": r#"{"name": "World"}"#});
    let (status, value) = post(app(), body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({"rendered": "Hello, World!"}));
}

#[kiln_testhelpers::test(tokio::test)]
async fn wrong_field_types_are_bad_requests() {
    let (status, value) = post(app(), json!({"template": 3, "data": "{}"}).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value, json!({"error": "Template must be a string", "kind": "validation"}));

    let (status, value) = post(app(), json!({"template": "", "data": {}}).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Data must be a string");
}

#[kiln_testhelpers::test(tokio::test)]
async fn bodies_that_are_not_json_are_rejected_with_a_json_error() {
    let (status, value) = post(app(), "template=x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Request body must be a JSON object");
    assert_eq!(value["kind"], "validation");
}

#[kiln_testhelpers::test(tokio::test)]
async fn invalid_data_reports_the_parser_message() {
    let body = json!({"template": "x", "data": "{\"a\": }"});
    let (status, value) = post(app(), body.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"], "Invalid JSON data");
    assert_eq!(value["kind"], "parse");
    assert!(value["details"].as_str().unwrap().contains("line 1"));
}

#[kiln_testhelpers::test(tokio::test)]
async fn template_failures_carry_their_line() {
    let body = json!({
        "template": "<ul>\n<%= items.map(i => i.x.y) %>\n</ul>",
        "data": r#"{"items": [{}]}"#,
    });
    let (status, mut value) = post(app(), body.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let raw = value["raw"].take();
    assert_eq!(
        raw,
        "template:2\n    1| <ul>\n >> 2| <%= items.map(i => i.x.y) %>\n    3| </ul>\n\n\
         TypeError: Cannot read properties of undefined (reading 'y')"
    );
    value.as_object_mut().unwrap().remove("raw");
    assert_eq!(
        value,
        json!({
            "error": "TypeError: Cannot read properties of undefined (reading 'y')",
            "details": "Error on line 2",
            "kind": "runtime",
            "line": 2,
        })
    );
}

#[kiln_testhelpers::test(tokio::test)]
async fn runaway_templates_do_not_hang_the_service() {
    let engine = Engine::with_config(EngineConfig {
        limits: Limits {
            max_steps: 10_000,
            ..Limits::default()
        },
        ..EngineConfig::default()
    });
    let app = kiln_axum::router(Arc::new(engine));
    let body = json!({"template": "<% while (true) {} %>", "data": "{}"});
    let (status, value) = post(app, body.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["kind"], "runtime");
}

#[kiln_testhelpers::test(tokio::test)]
async fn health_check() {
    let response = app()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
