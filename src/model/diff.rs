//! Reconciled, cross-file diff entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Credential, Id, MetadataFieldDiff, NodeParamDiff};

/// How a head-side entity was tied to its base-side counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Same id (credentials) or same slot (domains) on both sides.
    #[default]
    Identity,
    /// A node with the same name swapped one credential for another.
    Replacement,
    /// Orphan pairing by file and kind/path. Best effort.
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDiffEntry {
    /// Base id for base-side and replacement entries, head id otherwise.
    pub key: Id,
    pub kind: String,
    pub in_base: bool,
    pub in_head: bool,
    pub base_id: Option<Id>,
    pub base_name: Option<String>,
    pub base_kind: Option<String>,
    pub head_id: Option<Id>,
    pub head_name: Option<String>,
    pub head_kind: Option<String>,
    pub files: Vec<String>,
    /// Head-side nodes using this credential.
    pub head_nodes: Vec<String>,
    pub alternatives: Vec<Credential>,
    pub matched_by: MatchKind,
    /// Set when the heuristic had more than one candidate to pick from.
    pub ambiguous: bool,
}

impl CredentialDiffEntry {
    pub fn is_unchanged(&self) -> bool {
        self.in_base
            && self.in_head
            && self.base_id == self.head_id
            && self.base_name == self.head_name
    }

    pub fn add_file(&mut self, file: &str) {
        push_unique(&mut self.files, file);
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDiffEntry {
    pub key: String,
    pub node_id: Id,
    pub node_name: String,
    pub node_type: String,
    pub parameter_path: String,
    pub in_base: bool,
    pub in_head: bool,
    pub base_url: Option<String>,
    pub head_url: Option<String>,
    pub files: Vec<String>,
    pub matched_by: MatchKind,
    pub ambiguous: bool,
}

impl DomainDiffEntry {
    pub fn is_unchanged(&self) -> bool {
        matches!((&self.base_url, &self.head_url), (Some(b), Some(h)) if b == h)
    }

    pub fn add_file(&mut self, file: &str) {
        push_unique(&mut self.files, file);
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEdgeDiffEntry {
    pub key: String,
    pub source_workflow: String,
    pub target_workflow_id: Id,
    pub target_workflow_name: Option<String>,
    pub in_base: bool,
    pub in_head: bool,
    pub files: Vec<String>,
    pub node_names: Vec<String>,
    /// The target was added in the same change set.
    pub target_added: bool,
}

impl CallEdgeDiffEntry {
    /// Key under which the applier expects a decision for this edge.
    pub fn decision_key(&self) -> String {
        format!("{}->{}", self.source_workflow, self.target_workflow_id)
    }

    pub fn add_file(&mut self, file: &str) {
        push_unique(&mut self.files, file);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedWorkflow {
    pub name: String,
    pub id: Option<Id>,
    pub file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Base,
    Head,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretFinding {
    pub file: String,
    pub branch: Branch,
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataChanges {
    pub file: String,
    pub changes: Vec<MetadataFieldDiff>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNodeChanges {
    pub file: String,
    pub changes: Vec<NodeParamDiff>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEntities {
    pub credentials: Vec<CredentialDiffEntry>,
    pub domains: Vec<DomainDiffEntry>,
    pub call_edges: Vec<CallEdgeDiffEntry>,
    pub metadata: Vec<FileMetadataChanges>,
    pub node_changes: Vec<FileNodeChanges>,
    pub secrets: Vec<SecretFinding>,
    pub added_documents: Vec<AddedWorkflow>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub base_ref: String,
    pub head_ref: String,
    pub generated_at: DateTime<Utc>,
    pub entities: AnalysisEntities,
    /// Files that could not be fetched or parsed and were left out.
    pub skipped_files: Vec<String>,
}

pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
