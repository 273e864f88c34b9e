use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use workflow_merge::api::routes::create_router;
use workflow_merge::config::AppConfig;
use workflow_merge::{
    AnalysisPipeline, Comparison, DecisionSet, InMemoryDocumentSource, MatchKind, Workflow,
};

fn orders(cred_id: &str, cred_name: &str, hook_path: &str, api_url: &str) -> Value {
    json!({
        "name": "Orders",
        "id": "orders-wf",
        "nodes": [
            {
                "id": "hook",
                "name": "Incoming order",
                "type": "n8n-nodes-base.webhook",
                "parameters": {"path": hook_path, "httpMethod": "POST"}
            },
            {
                "id": "http",
                "name": "Send to ERP",
                "type": "n8n-nodes-base.httpRequest",
                "parameters": {"url": api_url, "authentication": "genericCredentialType"},
                "credentials": {"httpHeaderAuth": {"id": cred_id, "name": cred_name}}
            },
            {
                "id": "call",
                "name": "Run billing",
                "type": "n8n-nodes-base.executeWorkflow",
                "parameters": {"workflowId": {"__rl": true, "value": "billing-wf", "cachedResultName": "Billing"}}
            }
        ],
        "connections": {"Incoming order": {"main": [[{"node": "Send to ERP", "type": "main", "index": 0}]]}},
        "settings": {"executionOrder": "v1"}
    })
}

fn source() -> InMemoryDocumentSource {
    let billing = json!({"name": "Billing", "id": "billing-wf", "nodes": []});
    InMemoryDocumentSource::new()
        .with_document(
            "main",
            "orders.json",
            orders("erp-prod", "ERP prod", "/orders", "https://erp.example.com/api").to_string(),
        )
        .with_document("main", "billing.json", billing.to_string())
        .with_document(
            "staging",
            "orders.json",
            orders("erp-stage", "ERP staging", "/orders", "https://erp-staging.example.com/api").to_string(),
        )
        .with_document("staging", "billing.json", billing.to_string())
}

fn app() -> axum::Router {
    let pipeline = AnalysisPipeline::from_config(&AppConfig::default(), Arc::new(source()));
    create_router().with_state(Arc::new(pipeline))
}

async fn post(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_analysis_reports_replacement_url_and_call_edge() {
    let pipeline = AnalysisPipeline::from_config(&AppConfig::default(), Arc::new(source()));
    let report = pipeline.analyze(&Comparison::new("main", "staging")).await.unwrap();
    let entities = &report.entities;

    assert_eq!(entities.credentials.len(), 1);
    let cred = &entities.credentials[0];
    assert_eq!(cred.key, "erp-prod");
    assert_eq!(cred.head_id.as_deref(), Some("erp-stage"));
    assert_eq!(cred.matched_by, MatchKind::Replacement);
    assert_eq!(cred.files, vec!["orders.json".to_string()]);

    // The webhook path is unchanged, so only the ERP url is reported.
    assert_eq!(entities.domains.len(), 1);
    assert_eq!(entities.domains[0].base_url.as_deref(), Some("https://erp.example.com/api"));

    // Unchanged call edges are still listed.
    assert_eq!(entities.call_edges.len(), 1);
    let edge = &entities.call_edges[0];
    assert!(edge.in_base && edge.in_head);
    assert_eq!(edge.decision_key(), "Orders->billing-wf");
    assert_eq!(edge.target_workflow_name.as_deref(), Some("Billing"));
}

#[tokio::test]
async fn test_analyze_endpoint() {
    let (status, body) = post(app(), "/analyze", json!({"baseRef": "main", "headRef": "staging"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entities"]["credentials"][0]["key"], json!("erp-prod"));

    let (status, body) = post(app(), "/analyze", json!({"baseRef": "main", "headRef": "missing"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_merge_endpoint_applies_every_decision_kind() {
    let base = orders("erp-prod", "ERP prod", "/orders", "https://erp.example.com/api");
    let head = orders("erp-stage", "ERP staging", "/orders", "https://erp-staging.example.com/api");
    let decisions = json!({
        "credentials": {"erp-prod": "main"},
        "domains": {
            "https://erp-staging.example.com/api": {"selected": "main", "url": "https://erp.example.com/api"},
            "POST /orders (Webhook)": {"selected": "custom", "url": "PUT /orders-v2 (Webhook)"}
        },
        "workflowCalls": {"Orders->billing-wf": "remove"},
        "metadata": {"orders.json-settings": "staging"}
    });

    let (status, body) = post(
        app(),
        "/merge",
        json!({"basePath": "orders.json", "base": base, "head": head, "decisions": decisions}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let merged: Workflow = serde_json::from_value(body["workflow"].clone()).unwrap();
    let http = merged.node_by_name("Send to ERP").unwrap();
    assert_eq!(http.parameters["url"], json!("https://erp.example.com/api"));
    let creds = http.credentials.as_ref().unwrap();
    assert_eq!(creds["httpHeaderAuth"].id.as_deref(), Some("erp-prod"));

    let hook = merged.node_by_name("Incoming order").unwrap();
    assert_eq!(hook.parameters["path"], json!("/orders-v2"));
    assert_eq!(hook.parameters["httpMethod"], json!("PUT"));

    assert!(merged.node_by_name("Run billing").unwrap().is_disabled());
    assert_eq!(merged.connections, Some(head_connections()));

    let content = body["content"].as_str().unwrap();
    assert!(content.ends_with("}\n"));
    assert_eq!(Workflow::from_json(content).unwrap(), merged);
}

#[tokio::test]
async fn test_merge_without_decisions_returns_head() {
    let head = orders("erp-stage", "ERP staging", "/orders", "https://erp-staging.example.com/api");
    let (status, body) = post(
        app(),
        "/merge",
        json!({"basePath": "orders.json", "head": head.clone(), "decisions": DecisionSet::default()}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflow"], head);
}

#[tokio::test]
async fn test_merge_rejects_malformed_documents() {
    let (status, body) = post(
        app(),
        "/merge",
        json!({"basePath": "orders.json", "head": {"name": "no nodes"}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("head"));
}

fn head_connections() -> Value {
    orders("x", "x", "/x", "https://x.example")["connections"].clone()
}
