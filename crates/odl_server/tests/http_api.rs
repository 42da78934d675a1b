//! HTTP API integration tests over in-memory stores and the mock warehouse.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use odl_core::runner::AsyncRunner;
use odl_harness::fixtures::RETAIL_ODL_V1;
use odl_harness::retail_service;
use odl_server::{build_router, AppState};

fn app() -> Router {
    let (service, _warehouse) = retail_service();
    let runner = Arc::new(AsyncRunner::new(4));
    build_router(AppState::new(service, runner))
}

async fn request(router: &Router, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    let request = match body {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn setup_ontology(router: &Router) -> (String, String) {
    let (status, workspace) =
        request(router, "POST", "/workspaces", Some(json!({"name": "acme"}))).await;
    assert_eq!(status, StatusCode::OK);
    let workspace_id = workspace["workspace_id"].as_str().unwrap().to_string();

    let (status, ontology) = request(
        router,
        "POST",
        &format!("/workspaces/{workspace_id}/ontologies"),
        Some(json!({"name": "retail"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ontology_id = ontology["ontology_id"].as_str().unwrap().to_string();
    (workspace_id, ontology_id)
}

async fn await_task(router: &Router, task_id: &str) -> Value {
    for _ in 0..200 {
        let (status, task) = request(router, "GET", &format!("/tasks/{task_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let state = task["state"].as_str().unwrap().to_string();
        if state != "PENDING" && state != "RUNNING" {
            return task;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("task {task_id} never finished");
}

#[tokio::test]
async fn test_health() {
    let (status, body) = request(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_version_lifecycle() {
    let router = app();
    let (_, ontology_id) = setup_ontology(&router).await;

    let odl: Value = serde_json::from_str(RETAIL_ODL_V1).unwrap();
    let (status, version) = request(
        &router,
        "POST",
        &format!("/ontologies/{ontology_id}/versions"),
        Some(json!({"odl": odl, "author": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(version["version_number"], 1);
    assert_eq!(version["content_hash"].as_str().unwrap().len(), 64);

    let (status, latest) = request(
        &router,
        "GET",
        &format!("/ontologies/{ontology_id}/versions/latest"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["version_number"], 1);

    let (status, listed) = request(
        &router,
        "GET",
        &format!("/ontologies/{ontology_id}/versions"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_reference_is_400_with_issue_paths() {
    let router = app();
    let (_, ontology_id) = setup_ontology(&router).await;

    let bad = RETAIL_ODL_V1.replace(
        r#""sourceProperty": "Customer.region""#,
        r#""sourceProperty": "Order.nonexistent""#,
    );
    let odl: Value = serde_json::from_str(&bad).unwrap();
    let (status, body) = request(
        &router,
        "POST",
        &format!("/ontologies/{ontology_id}/versions"),
        Some(json!({"odl": odl})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REFERENCE");
    assert_eq!(body["retryable"], false);
    assert!(body["details"].to_string().contains("sourceProperty"));
}

#[tokio::test]
async fn test_duplicate_content_is_409() {
    let router = app();
    let (_, ontology_id) = setup_ontology(&router).await;
    let odl: Value = serde_json::from_str(RETAIL_ODL_V1).unwrap();

    let path = format!("/ontologies/{ontology_id}/versions");
    let (status, _) = request(&router, "POST", &path, Some(json!({"odl": odl.clone()}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = request(&router, "POST", &path, Some(json!({"odl": odl}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_CONTENT");
}

#[tokio::test]
async fn test_diff_endpoint() {
    let router = app();
    let (_, ontology_id) = setup_ontology(&router).await;
    let path = format!("/ontologies/{ontology_id}/versions");

    let v1: Value = serde_json::from_str(RETAIL_ODL_V1).unwrap();
    request(&router, "POST", &path, Some(json!({"odl": v1}))).await;
    let v2: Value = serde_json::from_str(&odl_harness::fixtures::retail_odl_v2()).unwrap();
    request(&router, "POST", &path, Some(json!({"odl": v2}))).await;

    let (status, diff) = request(
        &router,
        "GET",
        &format!("/ontologies/{ontology_id}/diff?old=1&new=2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(diff["summary"]["has_breaking"], false);
    assert_eq!(diff["changes"].as_array().unwrap().len(), 1);
    assert_eq!(diff["changes"][0]["kind"], "property.added");
}

#[tokio::test]
async fn test_evaluate_and_compile_via_tasks() {
    let router = app();
    let (_, ontology_id) = setup_ontology(&router).await;

    let odl: Value = serde_json::from_str(RETAIL_ODL_V1).unwrap();
    let (_, version) = request(
        &router,
        "POST",
        &format!("/ontologies/{ontology_id}/versions"),
        Some(json!({"odl": odl})),
    )
    .await;
    let version_id = version["version_id"].as_str().unwrap().to_string();

    // Evaluate
    let (status, submitted) = request(
        &router,
        "POST",
        &format!("/versions/{version_id}/evaluate"),
        Some(json!({"profile": "standard"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let task = await_task(&router, submitted["task_id"].as_str().unwrap()).await;
    assert_eq!(task["state"], "SUCCESS");
    assert_eq!(task["result"]["passed"], true);

    // Compile
    let (status, submitted) = request(
        &router,
        "POST",
        &format!("/versions/{version_id}/compile"),
        Some(json!({"view_name": "retail_view"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let task = await_task(&router, submitted["task_id"].as_str().unwrap()).await;
    assert_eq!(task["state"], "SUCCESS");
    let artifact_hash = task["result"]["artifact_hash"].as_str().unwrap().to_string();

    // Fetch the bundle by its content hash.
    let (status, bundle) = request(&router, "GET", &format!("/bundles/{artifact_hash}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let paths: Vec<&str> = bundle["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["path"].as_str().unwrap())
        .collect();
    assert!(paths.contains(&"semantic_model.yaml"));
    assert!(paths.contains(&"verify.sql"));
    assert!(paths.contains(&"deploy.sql"));
    assert!(paths.contains(&"rollback.sql"));
    assert!(paths.contains(&"metadata.json"));
}

#[tokio::test]
async fn test_gate_failure_surfaces_as_failed_task() {
    let router = app();
    let (_, ontology_id) = setup_ontology(&router).await;

    let mut doc: Value = serde_json::from_str(RETAIL_ODL_V1).unwrap();
    doc["targetMapping"]["tableMappings"] = json!({});
    let (_, version) = request(
        &router,
        "POST",
        &format!("/ontologies/{ontology_id}/versions"),
        Some(json!({"odl": doc})),
    )
    .await;
    let version_id = version["version_id"].as_str().unwrap().to_string();

    let (_, submitted) = request(
        &router,
        "POST",
        &format!("/versions/{version_id}/compile"),
        Some(json!({"view_name": "retail_view"})),
    )
    .await;
    let task = await_task(&router, submitted["task_id"].as_str().unwrap()).await;
    assert_eq!(task["state"], "FAILED");
    assert_eq!(task["error"]["code"], "GATE_FAILED");
    assert_eq!(task["error"]["retryable"], false);
}

#[tokio::test]
async fn test_unknown_task_is_404() {
    let router = app();
    let (status, body) = request(
        &router,
        "GET",
        &format!("/tasks/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
