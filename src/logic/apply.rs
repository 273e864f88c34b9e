//! Applies a decision set to one base/head document pair.
//!
//! The merged document starts as a clone of head; every pass rewrites that
//! clone in place, in the order credentials, urls, call edges, metadata.
//! Decisions that reference something absent from the pair are no-ops.

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::MergeResult;
use crate::logic::extract::{call_target, Extractor};
use crate::logic::walk::visit_objects_mut;
use crate::model::{
    strip_whitespace, CallEdgeAction, CallEdgeDecision, CredentialDecision, DecisionSet,
    MetadataDecision, Node, Workflow,
};

const CALL_TARGET_PARAM: &str = "workflowId";

/// One rewrite performed while applying decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AppliedChange {
    CredentialReverted { node: String, credential_id: String },
    CredentialStripped { node: String, credential_id: String, kinds: Vec<String> },
    CredentialRetargeted { node: String, from: String, to: String },
    UrlRewritten { node: String, from: String, to: String },
    HttpMethodRewritten { node: String, to: String },
    CallDisabled { node: String, disabled: bool },
    CallRetargeted { node: String, to: String },
    MetadataReplaced { key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub workflow: Workflow,
    pub changes: Vec<AppliedChange>,
}

/// A domain decision key or target split into its webhook parts, if it has
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotValue {
    pub method: Option<String>,
    pub value: String,
}

impl SlotValue {
    pub fn parse(raw: &str) -> Self {
        static WEBHOOK: OnceLock<Regex> = OnceLock::new();
        let re = WEBHOOK.get_or_init(|| {
            Regex::new(r"^\s*([A-Za-z]+)\s+(\S+)\s+\(Webhook\)\s*$").expect("static webhook pattern")
        });
        match re.captures(raw) {
            Some(caps) => Self {
                method: Some(caps[1].to_uppercase()),
                value: caps[2].to_string(),
            },
            None => Self {
                method: None,
                value: raw.to_string(),
            },
        }
    }

    fn is_webhook(&self) -> bool {
        self.method.is_some()
    }

    /// Two-tier match: exact first, then ignoring whitespace. Webhook paths
    /// also match without their leading slash.
    fn matches(&self, candidate: &str) -> bool {
        if candidate == self.value {
            return true;
        }
        if self.is_webhook() && candidate.trim_start_matches('/') == self.value.trim_start_matches('/') {
            return true;
        }
        let normalized = strip_whitespace(candidate);
        !normalized.is_empty() && normalized == strip_whitespace(&self.value)
    }

    /// Value to write in place of `original`, keeping its leading-slash style
    /// for webhook paths.
    fn replacement_for(&self, original: &str, target: &SlotValue) -> String {
        if self.is_webhook() && target.is_webhook() {
            let bare = target.value.trim_start_matches('/');
            if original.starts_with('/') {
                format!("/{}", bare)
            } else {
                bare.to_string()
            }
        } else {
            target.value.clone()
        }
    }
}

/// Writes caller decisions back onto documents.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    extractor: Extractor,
}

impl MergeEngine {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }

    /// Merge `head` and `base` under `decisions`. Entries without a decision
    /// keep their head (staging) state.
    pub fn apply_merge(&self, base_path: &str, head: &Workflow, base: &Workflow, decisions: &DecisionSet) -> Workflow {
        self.apply_merge_with_report(base_path, head, base, decisions).workflow
    }

    pub fn apply_merge_with_report(
        &self,
        base_path: &str,
        head: &Workflow,
        base: &Workflow,
        decisions: &DecisionSet,
    ) -> MergeOutcome {
        let mut merged = head.clone();
        let mut changes = Vec::new();

        self.apply_credentials(&mut merged, base, decisions, &mut changes);
        self.apply_domains(&mut merged, decisions, &mut changes);
        self.apply_workflow_calls(&mut merged, base, decisions, &mut changes);
        self.apply_metadata(&mut merged, base_path, head, base, decisions, &mut changes);

        debug!("{}: applied {} change(s)", base_path, changes.len());
        MergeOutcome {
            workflow: merged,
            changes,
        }
    }

    fn apply_credentials(
        &self,
        merged: &mut Workflow,
        base: &Workflow,
        decisions: &DecisionSet,
        changes: &mut Vec<AppliedChange>,
    ) {
        for (credential_id, decision) in &decisions.credentials {
            match decision {
                CredentialDecision::Main => {
                    revert_credential(merged, base, credential_id, changes);
                }
                CredentialDecision::Target {
                    target_id,
                    target_name,
                } => {
                    retarget_credential(merged, credential_id, target_id, target_name.as_deref(), changes);
                }
                CredentialDecision::Staging | CredentialDecision::KeepBoth => {}
            }
        }
    }

    fn apply_domains(&self, merged: &mut Workflow, decisions: &DecisionSet, changes: &mut Vec<AppliedChange>) {
        let rewrites: Vec<(SlotValue, SlotValue)> = decisions
            .domains
            .iter()
            .filter(|(key, decision)| decision.url != **key)
            .map(|(key, decision)| (SlotValue::parse(key), SlotValue::parse(&decision.url)))
            .collect();
        if rewrites.is_empty() {
            return;
        }

        for node in merged.nodes.iter_mut() {
            let webhook_node = self.extractor.is_webhook_node(node);
            let applicable: Vec<&(SlotValue, SlotValue)> = rewrites
                .iter()
                .filter(|(source, _)| webhook_node || !source.is_webhook())
                .collect();
            if applicable.is_empty() {
                continue;
            }
            let node_name = node.name.clone();
            visit_objects_mut(&mut node.parameters, &mut |params| {
                let mut method = None;
                for value in params.values_mut() {
                    let Value::String(current) = value else {
                        continue;
                    };
                    // Keys name original values: a value is rewritten at most
                    // once, so chained or swapped decisions do not cascade.
                    let Some((source, target)) = applicable.iter().find(|(source, _)| source.matches(current)) else {
                        continue;
                    };
                    if source.is_webhook() && target.method.is_some() {
                        method = target.method.clone();
                    }
                    let replacement = source.replacement_for(current, target);
                    if replacement == *current {
                        continue;
                    }
                    debug!("{}: url {} -> {}", node_name, current, replacement);
                    changes.push(AppliedChange::UrlRewritten {
                        node: node_name.clone(),
                        from: current.clone(),
                        to: replacement.clone(),
                    });
                    *current = replacement;
                }

                if !webhook_node {
                    return;
                }
                if let (Some(method), Some(slot)) = (method, params.get_mut("httpMethod")) {
                    if slot.as_str() != Some(method.as_str()) {
                        *slot = Value::String(method.clone());
                        changes.push(AppliedChange::HttpMethodRewritten {
                            node: node_name.clone(),
                            to: method,
                        });
                    }
                }
            });
        }
    }

    fn apply_workflow_calls(
        &self,
        merged: &mut Workflow,
        base: &Workflow,
        decisions: &DecisionSet,
        changes: &mut Vec<AppliedChange>,
    ) {
        let own_names = [merged.name.clone(), base.name.clone()];
        for (key, decision) in &decisions.workflow_calls {
            let (source, target) = match key.rsplit_once("->") {
                Some((source, target)) => (Some(source), target),
                None => (None, key.as_str()),
            };
            if let Some(source) = source {
                if !source.is_empty() && !own_names.iter().any(|n| n == source) {
                    continue;
                }
            }

            for node in merged.nodes.iter_mut() {
                if !self.extractor.is_call_node(node) || !calls_target(node, target) {
                    continue;
                }
                match decision {
                    CallEdgeDecision::Action(CallEdgeAction::Keep) => {}
                    CallEdgeDecision::Action(action) => {
                        let disabled = *action == CallEdgeAction::Remove;
                        if node.is_disabled() != disabled {
                            node.disabled = Some(disabled);
                            debug!("{}: call to {} disabled={}", node.name, target, disabled);
                            changes.push(AppliedChange::CallDisabled {
                                node: node.name.clone(),
                                disabled,
                            });
                        }
                    }
                    CallEdgeDecision::Map(mapping) => {
                        set_call_target(node, &mapping.target_id, mapping.target_name.as_deref());
                        debug!("{}: call {} redirected to {}", node.name, target, mapping.target_id);
                        changes.push(AppliedChange::CallRetargeted {
                            node: node.name.clone(),
                            to: mapping.target_id.clone(),
                        });
                    }
                }
            }
        }
    }

    fn apply_metadata(
        &self,
        merged: &mut Workflow,
        base_path: &str,
        head: &Workflow,
        base: &Workflow,
        decisions: &DecisionSet,
        changes: &mut Vec<AppliedChange>,
    ) {
        let prefix = format!("{}-", base_path);
        for (key, decision) in &decisions.metadata {
            let Some(field) = key.strip_prefix(&prefix) else {
                continue;
            };
            let source = match decision {
                MetadataDecision::Main => base,
                MetadataDecision::Staging => head,
            };
            let Some(value) = source.top_level_field(field) else {
                continue;
            };
            if merged.top_level_field(field).as_ref() == Some(&value) {
                continue;
            }
            if merged.set_top_level_field(field, value) {
                debug!("{}: metadata field {} taken from {:?}", base_path, field, decision);
                changes.push(AppliedChange::MetadataReplaced {
                    key: field.to_string(),
                });
            }
        }
    }
}

/// Serialise a workflow with 2-space indentation and a trailing newline.
pub fn to_pretty_json(workflow: &Workflow) -> MergeResult<String> {
    let mut content = serde_json::to_string_pretty(workflow)?;
    content.push('\n');
    Ok(content)
}

fn revert_credential(merged: &mut Workflow, base: &Workflow, credential_id: &str, changes: &mut Vec<AppliedChange>) {
    let base_nodes: Vec<&Node> = base.nodes.iter().filter(|n| n.uses_credential(credential_id)).collect();

    if base_nodes.is_empty() {
        // Added on staging only: excluding it strips every reference.
        for node in merged.nodes.iter_mut() {
            let kinds = node.strip_credential(credential_id);
            if !kinds.is_empty() {
                debug!("{}: stripped credential {} ({})", node.name, credential_id, kinds.join(", "));
                changes.push(AppliedChange::CredentialStripped {
                    node: node.name.clone(),
                    credential_id: credential_id.to_string(),
                    kinds,
                });
            }
        }
        return;
    }

    for base_node in base_nodes {
        let Some(node) = merged.node_by_name_mut(&base_node.name) else {
            continue;
        };
        let base_binding = base_node.auth_binding();
        let current = node.auth_binding();
        let mut binding = current.clone();
        for (kind, cred) in &base_binding.credentials {
            if cred.id.as_deref() == Some(credential_id) {
                binding.credentials.insert(kind.clone(), cred.clone());
            }
        }
        // Kinds main never had on this node go; other kinds keep their own
        // decisions.
        binding
            .credentials
            .retain(|kind, _| base_binding.credentials.contains_key(kind));
        binding.auth_params = base_binding.auth_params;
        if binding == current {
            continue;
        }
        node.set_auth_binding(binding);
        debug!("{}: credential {} restored from main", node.name, credential_id);
        changes.push(AppliedChange::CredentialReverted {
            node: node.name.clone(),
            credential_id: credential_id.to_string(),
        });
    }
}

fn retarget_credential(
    merged: &mut Workflow,
    credential_id: &str,
    target_id: &str,
    target_name: Option<&str>,
    changes: &mut Vec<AppliedChange>,
) {
    if credential_id == target_id {
        return;
    }
    for node in merged.nodes.iter_mut() {
        let Some(creds) = node.credentials.as_mut() else {
            continue;
        };
        let mut touched = false;
        for cred in creds.values_mut() {
            if cred.id.as_deref() == Some(credential_id) {
                cred.id = Some(target_id.to_string());
                if let Some(name) = target_name {
                    cred.name = name.to_string();
                }
                touched = true;
            }
        }
        if touched {
            debug!("{}: credential {} -> {}", node.name, credential_id, target_id);
            changes.push(AppliedChange::CredentialRetargeted {
                node: node.name.clone(),
                from: credential_id.to_string(),
                to: target_id.to_string(),
            });
        }
    }
}

fn calls_target(node: &Node, target: &str) -> bool {
    node.parameters
        .get(CALL_TARGET_PARAM)
        .and_then(call_target)
        .is_some_and(|(id, _)| id == target)
}

fn set_call_target(node: &mut Node, target_id: &str, target_name: Option<&str>) {
    let Some(params) = node.parameters.as_object_mut() else {
        return;
    };
    match params.get_mut(CALL_TARGET_PARAM) {
        Some(Value::Object(rich)) => {
            rich.insert("value".to_string(), Value::String(target_id.to_string()));
            match target_name {
                Some(name) => {
                    rich.insert("cachedResultName".to_string(), Value::String(name.to_string()));
                }
                None => {
                    rich.remove("cachedResultName");
                }
            }
        }
        Some(slot) => *slot = Value::String(target_id.to_string()),
        None => {}
    }
}
