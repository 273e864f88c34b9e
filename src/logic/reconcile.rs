//! Cross-file reconciliation of extraction results into diff entries.
//!
//! All aggregation state lives in [`ReconcileState`], folded over the files of
//! one comparison. Files are processed in path order, so the outcome does not
//! depend on the order the extractions arrived in.

use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::logic::extract::Extractor;
use crate::logic::heuristics::{OrphanMatcher, SameFileMatcher};
use crate::model::{
    push_unique, AddedWorkflow, AnalysisEntities, Branch, CallEdgeDiffEntry, Credential,
    CredentialDiffEntry, DomainDiffEntry, DomainRef, FileMetadataChanges, FileNodeChanges, FileStatus, Id,
    MatchKind, MetadataFieldDiff, NodeParamDiff, SecretFinding, Workflow, WorkflowExtraction,
};

/// Extraction results for one changed file, both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct FileExtraction {
    pub file: String,
    pub status: FileStatus,
    pub base: Option<WorkflowExtraction>,
    pub head: Option<WorkflowExtraction>,
    /// Base credential id -> head credential id for same-named nodes.
    pub replacements: BTreeMap<Id, Id>,
    pub metadata_changes: Vec<MetadataFieldDiff>,
    pub node_changes: Vec<NodeParamDiff>,
}

impl FileExtraction {
    /// Run the extractor over whichever sides are present.
    pub fn from_workflows(
        extractor: &Extractor,
        file: &str,
        status: FileStatus,
        base: Option<&Workflow>,
        head: Option<&Workflow>,
    ) -> Self {
        let (replacements, metadata_changes, node_changes) = match (base, head) {
            (Some(base), Some(head)) => (
                extractor.credential_replacements(base, head),
                extractor.compare_metadata(file, head, base),
                extractor.compare_nodes(file, head, base),
            ),
            _ => Default::default(),
        };

        // A side missing at its reference degrades a modification.
        let status = match (base, head) {
            (None, Some(_)) => FileStatus::Added,
            (Some(_), None) => FileStatus::Removed,
            _ => status,
        };

        Self {
            file: file.to_string(),
            status,
            base: base.map(|wf| extractor.extract(wf)),
            head: head.map(|wf| extractor.extract(wf)),
            replacements,
            metadata_changes,
            node_changes,
        }
    }

    /// Name of the workflow this file holds, preferring the head version.
    pub fn workflow_name(&self) -> Option<&str> {
        self.head
            .as_ref()
            .or(self.base.as_ref())
            .map(|e| e.name.as_str())
    }
}

/// Credentials of every base-branch workflow, grouped by kind. Source of
/// substitution candidates only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialRegistry {
    by_kind: BTreeMap<String, Vec<Credential>>,
}

impl CredentialRegistry {
    pub fn from_workflows(extractor: &Extractor, workflows: &[Workflow]) -> Self {
        let mut registry = Self::default();
        for workflow in workflows {
            for credential in extractor.extract_credentials(workflow) {
                registry.insert(credential);
            }
        }
        registry
    }

    pub fn insert(&mut self, credential: Credential) {
        let list = self.by_kind.entry(credential.kind.clone()).or_default();
        if !list.iter().any(|c| c.id == credential.id) {
            list.push(credential);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Same-kind credentials other than the excluded ids.
    pub fn alternatives(&self, kind: &str, exclude: &[Option<&Id>]) -> Vec<Credential> {
        self.by_kind
            .get(kind)
            .map(|list| {
                list.iter()
                    .filter(|c| !exclude.iter().any(|ex| *ex == Some(&c.id)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Accumulator threaded through the reconciliation fold.
#[derive(Debug, Default)]
pub struct ReconcileState {
    /// Base id -> head id, first file in path order wins.
    replacement_of: BTreeMap<Id, Id>,
    /// Head id -> base ids it replaced.
    replaced_by: BTreeMap<Id, BTreeSet<Id>>,
    credentials: BTreeMap<String, CredentialDiffEntry>,
    /// Head credential id -> entry key it was paired with by heuristic.
    credential_links: HashMap<Id, String>,
    domains: BTreeMap<String, DomainDiffEntry>,
    /// Head slot key -> entry key it was paired with by heuristic.
    domain_links: HashMap<String, String>,
    workflow_names: BTreeMap<Id, String>,
    added_ids: BTreeSet<Id>,
    call_edges: BTreeMap<String, CallEdgeDiffEntry>,
    metadata: Vec<FileMetadataChanges>,
    node_changes: Vec<FileNodeChanges>,
    secrets: Vec<SecretFinding>,
    added_documents: Vec<AddedWorkflow>,
    pending_credentials: Vec<PendingCredential>,
    pending_domains: Vec<PendingDomain>,
}

/// Head credential left for the orphan pass, with the nodes using it.
#[derive(Debug)]
struct PendingCredential {
    file: String,
    credential: Credential,
    nodes: Vec<String>,
}

#[derive(Debug)]
struct PendingDomain {
    file: String,
    domain: DomainRef,
}

/// Folds per-file extraction results into unified diff entries.
#[derive(Debug)]
pub struct Reconciler {
    matcher: Box<dyn OrphanMatcher>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Box::new(SameFileMatcher))
    }
}

impl Reconciler {
    pub fn new(matcher: Box<dyn OrphanMatcher>) -> Self {
        Self { matcher }
    }

    pub fn reconcile(&self, files: &[FileExtraction], registry: &CredentialRegistry) -> AnalysisEntities {
        let files: Vec<&FileExtraction> = files.iter().sorted_by(|a, b| a.file.cmp(&b.file)).collect();

        let state = files.iter().fold(ReconcileState::default(), |s, f| self.collect_replacements(s, f));
        let state = files.iter().fold(state, |s, f| self.collect_names(s, f));
        let state = files.iter().fold(state, |s, f| self.base_credentials(s, f));
        let state = files.iter().fold(state, |s, f| self.head_credentials(s, f));
        let state = self.orphan_credentials(state);
        let state = files.iter().fold(state, |s, f| self.base_domains(s, f));
        let state = files.iter().fold(state, |s, f| self.head_domains(s, f));
        let state = self.orphan_domains(state);
        let state = files.iter().fold(state, |s, f| self.call_edges(s, f));
        let state = files.iter().fold(state, |s, f| self.file_scoped(s, f));

        finish(state, registry)
    }

    fn collect_replacements(&self, mut state: ReconcileState, file: &FileExtraction) -> ReconcileState {
        for (base_id, head_id) in &file.replacements {
            if let Some(existing) = state.replacement_of.get(base_id) {
                if existing != head_id {
                    warn!(
                        "credential {} replaced by {} in {} but by {} elsewhere; keeping {}",
                        base_id, head_id, file.file, existing, existing
                    );
                }
                continue;
            }
            state.replacement_of.insert(base_id.clone(), head_id.clone());
            state
                .replaced_by
                .entry(head_id.clone())
                .or_default()
                .insert(base_id.clone());
        }
        state
    }

    fn collect_names(&self, mut state: ReconcileState, file: &FileExtraction) -> ReconcileState {
        // Head names are fresher than base names and overwrite them.
        if let Some(base) = &file.base {
            if let Some(id) = &base.id {
                state.workflow_names.entry(id.clone()).or_insert_with(|| base.name.clone());
            }
        }
        if let Some(head) = &file.head {
            if let Some(id) = &head.id {
                state.workflow_names.insert(id.clone(), head.name.clone());
            }
        }
        if file.status == FileStatus::Added {
            if let Some(head) = &file.head {
                if let Some(id) = &head.id {
                    state.added_ids.insert(id.clone());
                }
                state.added_documents.push(AddedWorkflow {
                    name: head.name.clone(),
                    id: head.id.clone(),
                    file: file.file.clone(),
                });
            }
        }
        state
    }

    fn base_credentials(&self, mut state: ReconcileState, file: &FileExtraction) -> ReconcileState {
        let Some(base) = &file.base else {
            return state;
        };
        for cred in &base.credentials {
            let replaced_with = file.replacements.get(&cred.id);
            let entry = state
                .credentials
                .entry(cred.id.clone())
                .or_insert_with(|| CredentialDiffEntry {
                    key: cred.id.clone(),
                    kind: cred.kind.clone(),
                    in_base: true,
                    base_id: Some(cred.id.clone()),
                    base_name: Some(cred.name.clone()),
                    base_kind: Some(cred.kind.clone()),
                    ..Default::default()
                });
            entry.add_file(&file.file);
            if let Some(head_id) = replaced_with {
                if entry.head_id.is_none() {
                    // Confirmed once the head side of the replacement is seen.
                    entry.head_id = Some(head_id.clone());
                    entry.matched_by = MatchKind::Replacement;
                }
            }
        }
        state
    }

    fn head_credentials(&self, mut state: ReconcileState, file: &FileExtraction) -> ReconcileState {
        let Some(head) = &file.head else {
            return state;
        };
        for cred in &head.credentials {
            let nodes = head_node_names(head, &cred.id);

            let sources: Vec<Id> = state
                .replaced_by
                .get(&cred.id)
                .map(|ids| ids.iter().filter(|id| state.credentials.contains_key(*id)).cloned().collect())
                .unwrap_or_default();

            for base_id in &sources {
                if let Some(entry) = state.credentials.get_mut(base_id) {
                    fill_head_side(entry, cred, &file.file, &nodes);
                    entry.matched_by = MatchKind::Replacement;
                }
            }

            if !sources.is_empty() {
                if state.credentials.remove(&cred.id).is_some() {
                    debug!(
                        "dropping self-keyed entry for {}; it is the replacement of {}",
                        cred.id,
                        sources.join(", ")
                    );
                }
                continue;
            }

            if let Some(entry) = state.credentials.get_mut(&cred.id) {
                if entry.head_id.as_ref().map_or(true, |id| id == &cred.id) {
                    fill_head_side(entry, cred, &file.file, &nodes);
                } else {
                    // Replaced elsewhere, still referenced here.
                    entry.add_file(&file.file);
                }
                continue;
            }

            state.pending_credentials.push(PendingCredential {
                file: file.file.clone(),
                credential: cred.clone(),
                nodes,
            });
        }
        state
    }

    /// Head credentials with no replacement or identity match anywhere in the
    /// change set. Runs after every file's identity pass so a heuristic never
    /// claims a base entry that a later file matches exactly.
    fn orphan_credentials(&self, mut state: ReconcileState) -> ReconcileState {
        for pending in std::mem::take(&mut state.pending_credentials) {
            let PendingCredential { file, credential: cred, nodes } = pending;

            if let Some(key) = state.credential_links.get(&cred.id).cloned() {
                if let Some(entry) = state.credentials.get_mut(&key) {
                    entry.add_file(&file);
                    nodes.iter().for_each(|n| push_unique(&mut entry.head_nodes, n));
                }
                continue;
            }

            if let Some(entry) = state.credentials.get_mut(&cred.id) {
                fill_head_side(entry, &cred, &file, &nodes);
                continue;
            }

            if let Some(found) = self.matcher.match_credential(&state.credentials, &file, &cred) {
                if found.is_ambiguous() {
                    warn!(
                        "{}: credential {} ({}) matched {} by heuristic among {} candidates",
                        file, cred.id, cred.kind, found.key, found.candidates
                    );
                } else {
                    info!(
                        "{}: credential {} ({}) matched {} by heuristic",
                        file, cred.id, cred.kind, found.key
                    );
                }
                if let Some(entry) = state.credentials.get_mut(&found.key) {
                    fill_head_side(entry, &cred, &file, &nodes);
                    entry.matched_by = MatchKind::Heuristic;
                    entry.ambiguous = found.is_ambiguous();
                }
                state.credential_links.insert(cred.id.clone(), found.key);
                continue;
            }

            let mut entry = CredentialDiffEntry {
                key: cred.id.clone(),
                kind: cred.kind.clone(),
                ..Default::default()
            };
            fill_head_side(&mut entry, &cred, &file, &nodes);
            state.credentials.insert(cred.id.clone(), entry);
        }
        state
    }

    fn base_domains(&self, mut state: ReconcileState, file: &FileExtraction) -> ReconcileState {
        let Some(base) = &file.base else {
            return state;
        };
        for domain in &base.domains {
            let key = domain.slot_key();
            let entry = state.domains.entry(key.clone()).or_insert_with(|| DomainDiffEntry {
                key,
                node_id: domain.node_id.clone(),
                node_name: domain.node_name.clone(),
                node_type: domain.node_type.clone(),
                parameter_path: domain.parameter_path.clone(),
                in_base: true,
                ..Default::default()
            });
            if entry.base_url.is_none() {
                entry.base_url = Some(domain.url.clone());
            }
            entry.add_file(&file.file);
        }
        state
    }

    fn head_domains(&self, mut state: ReconcileState, file: &FileExtraction) -> ReconcileState {
        let Some(head) = &file.head else {
            return state;
        };
        for domain in &head.domains {
            if let Some(entry) = state.domains.get_mut(&domain.slot_key()) {
                entry.in_head = true;
                if entry.head_url.is_none() {
                    entry.head_url = Some(domain.url.clone());
                }
                entry.add_file(&file.file);
                continue;
            }
            state.pending_domains.push(PendingDomain {
                file: file.file.clone(),
                domain: domain.clone(),
            });
        }
        state
    }

    /// Head URL slots with no base slot of the same key, paired only after
    /// every exact slot match has been taken.
    fn orphan_domains(&self, mut state: ReconcileState) -> ReconcileState {
        for PendingDomain { file, domain } in std::mem::take(&mut state.pending_domains) {
            let slot = domain.slot_key();
            let key = state.domain_links.get(&slot).cloned().unwrap_or_else(|| slot.clone());

            if let Some(entry) = state.domains.get_mut(&key) {
                entry.in_head = true;
                if entry.head_url.is_none() {
                    entry.head_url = Some(domain.url.clone());
                }
                entry.add_file(&file);
                continue;
            }

            if let Some(found) = self.matcher.match_domain(&state.domains, &file, &domain) {
                if found.is_ambiguous() {
                    warn!(
                        "{}: url slot {} matched {} by heuristic among {} candidates",
                        file, slot, found.key, found.candidates
                    );
                } else {
                    info!("{}: url slot {} matched {} by heuristic", file, slot, found.key);
                }
                if let Some(entry) = state.domains.get_mut(&found.key) {
                    entry.in_head = true;
                    entry.head_url = Some(domain.url.clone());
                    entry.matched_by = MatchKind::Heuristic;
                    entry.ambiguous = found.is_ambiguous();
                    entry.add_file(&file);
                }
                state.domain_links.insert(slot, found.key);
                continue;
            }

            state.domains.insert(
                slot.clone(),
                DomainDiffEntry {
                    key: slot,
                    node_id: domain.node_id.clone(),
                    node_name: domain.node_name.clone(),
                    node_type: domain.node_type.clone(),
                    parameter_path: domain.parameter_path.clone(),
                    in_head: true,
                    head_url: Some(domain.url.clone()),
                    files: vec![file.clone()],
                    ..Default::default()
                },
            );
        }
        state
    }

    fn call_edges(&self, mut state: ReconcileState, file: &FileExtraction) -> ReconcileState {
        // Edges are keyed by the file's current workflow name so a renamed
        // caller does not show up as a removed plus an added edge.
        let Some(source) = file.workflow_name().map(str::to_string) else {
            return state;
        };
        let sides = [(Branch::Base, &file.base), (Branch::Head, &file.head)];
        for (branch, side) in sides {
            let Some(extraction) = side else {
                continue;
            };
            for call in &extraction.calls {
                let key = format!("{}-{}", source, call.target_workflow_id);
                let resolved_name = state
                    .workflow_names
                    .get(&call.target_workflow_id)
                    .cloned()
                    .or_else(|| call.target_workflow_name.clone());
                let target_added = state.added_ids.contains(&call.target_workflow_id);

                let entry = state.call_edges.entry(key.clone()).or_insert_with(|| CallEdgeDiffEntry {
                    key,
                    source_workflow: source.clone(),
                    target_workflow_id: call.target_workflow_id.clone(),
                    target_added,
                    ..Default::default()
                });
                if entry.target_workflow_name.is_none() {
                    entry.target_workflow_name = resolved_name;
                }
                match branch {
                    Branch::Base => entry.in_base = true,
                    Branch::Head => entry.in_head = true,
                }
                entry.add_file(&file.file);
                push_unique(&mut entry.node_names, &call.node_name);
            }
        }
        state
    }

    fn file_scoped(&self, mut state: ReconcileState, file: &FileExtraction) -> ReconcileState {
        if !file.metadata_changes.is_empty() {
            state.metadata.push(FileMetadataChanges {
                file: file.file.clone(),
                changes: file.metadata_changes.clone(),
            });
        }
        if !file.node_changes.is_empty() {
            state.node_changes.push(FileNodeChanges {
                file: file.file.clone(),
                changes: file.node_changes.clone(),
            });
        }
        let sides = [(Branch::Base, &file.base), (Branch::Head, &file.head)];
        for (branch, side) in sides {
            if let Some(extraction) = side {
                if !extraction.secrets.is_empty() {
                    state.secrets.push(SecretFinding {
                        file: file.file.clone(),
                        branch,
                        matches: extraction.secrets.clone(),
                    });
                }
            }
        }
        state
    }
}

fn head_node_names(head: &WorkflowExtraction, id: &str) -> Vec<String> {
    head.credential_usage
        .iter()
        .filter(|usage| usage.id == id)
        .flat_map(|usage| usage.usages.iter().map(|u| u.node_name.clone()))
        .collect()
}

fn fill_head_side(entry: &mut CredentialDiffEntry, cred: &Credential, file: &str, nodes: &[String]) {
    entry.in_head = true;
    entry.head_id = Some(cred.id.clone());
    entry.head_name = Some(cred.name.clone());
    entry.head_kind = Some(cred.kind.clone());
    entry.add_file(file);
    for node in nodes {
        push_unique(&mut entry.head_nodes, node);
    }
}

fn finish(state: ReconcileState, registry: &CredentialRegistry) -> AnalysisEntities {
    let credentials = state
        .credentials
        .into_values()
        .filter(|entry| !entry.is_unchanged())
        .map(|mut entry| {
            entry.alternatives =
                registry.alternatives(&entry.kind, &[entry.base_id.as_ref(), entry.head_id.as_ref()]);
            entry.files.sort();
            entry.head_nodes.sort();
            entry
        })
        .collect();

    let domains = state
        .domains
        .into_values()
        .filter(|entry| !entry.is_unchanged())
        .map(|mut entry| {
            entry.files.sort();
            entry
        })
        .collect();

    let call_edges = state
        .call_edges
        .into_values()
        .map(|mut entry| {
            entry.files.sort();
            entry.node_names.sort();
            entry
        })
        .collect();

    AnalysisEntities {
        credentials,
        domains,
        call_edges,
        metadata: state.metadata,
        node_changes: state.node_changes,
        secrets: state.secrets,
        added_documents: state.added_documents,
    }
}
