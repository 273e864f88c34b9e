use axum::{extract::State, http::StatusCode, response::Json, Json as RequestJson};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::MergeError;
use crate::logic::apply::{to_pretty_json, AppliedChange};
use crate::logic::pipeline::AnalysisPipeline;
use crate::model::{AnalysisReport, Comparison, DecisionSet, Workflow};
use crate::store::DocumentSource;

pub type AppState<S> = Arc<AnalysisPipeline<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    /// Path of the document on the base branch; prefixes metadata decision keys.
    pub base_path: String,
    /// Base document. Absent for documents added on the head branch.
    #[serde(default)]
    pub base: Option<Value>,
    pub head: Value,
    #[serde(default)]
    pub decisions: DecisionSet,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub workflow: Workflow,
    /// `workflow` serialised the way it should be written back.
    pub content: String,
    pub changes: Vec<AppliedChange>,
}

fn error_response(e: &MergeError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        MergeError::Parse { .. } => StatusCode::BAD_REQUEST,
        MergeError::NotFound { .. } => StatusCode::NOT_FOUND,
        MergeError::Source(_) => StatusCode::BAD_GATEWAY,
        MergeError::Io(_) | MergeError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(&e.to_string())))
}

pub async fn analyze<S: DocumentSource + 'static>(
    State(pipeline): State<AppState<S>>,
    RequestJson(comparison): RequestJson<Comparison>,
) -> Result<Json<AnalysisReport>, (StatusCode, Json<ErrorResponse>)> {
    match pipeline.analyze(&comparison).await {
        Ok(report) => {
            info!(
                "Analysis {}..{}: {} credential, {} domain, {} call-edge entries",
                comparison.base_ref,
                comparison.head_ref,
                report.entities.credentials.len(),
                report.entities.domains.len(),
                report.entities.call_edges.len()
            );
            Ok(Json(report))
        }
        Err(e) => {
            warn!("Analysis {}..{} failed: {}", comparison.base_ref, comparison.head_ref, e);
            Err(error_response(&e))
        }
    }
}

pub async fn merge<S: DocumentSource + 'static>(
    State(pipeline): State<AppState<S>>,
    RequestJson(request): RequestJson<MergeRequest>,
) -> Result<Json<MergeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let head: Workflow = serde_json::from_value(request.head)
        .map_err(|e| error_response(&MergeError::parse("head", e)))?;
    let base: Workflow = match request.base {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| error_response(&MergeError::parse(request.base_path.as_str(), e)))?,
        None => Workflow {
            name: head.name.clone(),
            id: head.id.clone(),
            nodes: Vec::new(),
            connections: None,
            extra: Map::new(),
        },
    };

    let outcome = pipeline
        .engine()
        .apply_merge_with_report(&request.base_path, &head, &base, &request.decisions);
    let content = to_pretty_json(&outcome.workflow).map_err(|e| error_response(&e))?;
    info!("Merged {} with {} change(s)", request.base_path, outcome.changes.len());

    Ok(Json(MergeResponse {
        workflow: outcome.workflow,
        content,
        changes: outcome.changes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let parse = MergeError::parse("a.json", serde_json::from_str::<Value>("{").unwrap_err());
        assert_eq!(error_response(&parse).0, StatusCode::BAD_REQUEST);

        let missing = MergeError::NotFound {
            reference: "main".to_string(),
            path: "a.json".to_string(),
        };
        let (status, body) = error_response(&missing);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.error.contains("main:a.json"));
    }

    #[test]
    fn test_merge_request_defaults() {
        let request: MergeRequest = serde_json::from_value(serde_json::json!({
            "basePath": "a.json",
            "head": {"name": "A", "nodes": []}
        }))
        .unwrap();
        assert!(request.base.is_none());
        assert!(request.decisions.is_empty());
    }
}
