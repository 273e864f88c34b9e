//! Entities pulled out of a single workflow document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::Id;

/// One credential referenced by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: Id,
    pub name: String,
    /// Key under which the node references the credential (the connector type).
    pub kind: String,
    pub owner_node_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUsage {
    pub node_id: Id,
    pub node_name: String,
    pub node_type: String,
}

/// A credential together with every node that uses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialUsage {
    pub id: Id,
    pub name: String,
    pub kind: String,
    pub usages: Vec<NodeUsage>,
}

/// An occurrence of a URL-shaped value inside a node's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRef {
    pub url: String,
    pub node_id: Id,
    pub node_name: String,
    pub node_type: String,
    /// Dotted/indexed path, e.g. `options.endpoints[1].url`.
    pub parameter_path: String,
}

impl DomainRef {
    /// Identity of the slot this URL lives in. Falls back to the URL itself
    /// when the node carries no id.
    pub fn slot_key(&self) -> String {
        if self.node_id.is_empty() {
            self.url.clone()
        } else {
            format!("{}::{}", self.node_id, self.parameter_path)
        }
    }
}

/// One workflow invoking another through a call node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEdge {
    pub source_workflow: String,
    pub target_workflow_id: Id,
    pub node_id: Id,
    pub node_name: String,
    /// Display name cached inside the call node's parameters, possibly stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_workflow_name: Option<String>,
}

impl CallEdge {
    pub fn key(&self) -> String {
        format!("{}-{}", self.source_workflow, self.target_workflow_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataFieldDiff {
    pub file: String,
    pub key: String,
    pub base_value: Option<Value>,
    pub head_value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeChangeType {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterChange {
    pub key: String,
    pub base_value: Option<Value>,
    pub head_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeParamDiff {
    pub file: String,
    pub node_name: String,
    pub node_type: String,
    pub change_type: NodeChangeType,
    pub parameter_changes: Vec<ParameterChange>,
}

/// Everything the extractor found in one version of one document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExtraction {
    pub name: String,
    pub id: Option<Id>,
    pub credentials: Vec<Credential>,
    pub credential_usage: Vec<CredentialUsage>,
    pub domains: Vec<DomainRef>,
    pub calls: Vec<CallEdge>,
    pub metadata: Map<String, Value>,
    pub secrets: Vec<String>,
}
