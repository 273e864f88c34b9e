use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::Id;

/// Caller-chosen resolutions, one per diff entry, in four independent
/// namespaces. Ordered maps keep application order stable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionSet {
    /// Credential id -> decision.
    #[serde(default)]
    pub credentials: BTreeMap<Id, CredentialDecision>,
    /// Original slot value (or `"METHOD /path (Webhook)"`) -> decision.
    #[serde(default)]
    pub domains: BTreeMap<String, DomainDecision>,
    /// `"source->targetId"` -> decision.
    #[serde(default)]
    pub workflow_calls: BTreeMap<String, CallEdgeDecision>,
    /// `"{file}-{key}"` -> source to take the field from.
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataDecision>,
}

impl DecisionSet {
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
            && self.domains.is_empty()
            && self.workflow_calls.is_empty()
            && self.metadata.is_empty()
    }
}

/// Resolution for one credential entry.
///
/// On the wire this is `"staging"`, `"main"`, `"keep-both"`, any other string
/// (taken as an explicit target id), or `{"targetId": .., "targetName": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCredentialDecision", into = "RawCredentialDecision")]
pub enum CredentialDecision {
    Staging,
    Main,
    KeepBoth,
    Target {
        target_id: Id,
        target_name: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawCredentialDecision {
    Choice(String),
    Target {
        #[serde(rename = "targetId")]
        target_id: Id,
        #[serde(rename = "targetName", default, skip_serializing_if = "Option::is_none")]
        target_name: Option<String>,
    },
}

impl From<RawCredentialDecision> for CredentialDecision {
    fn from(raw: RawCredentialDecision) -> Self {
        match raw {
            RawCredentialDecision::Choice(choice) => match choice.as_str() {
                "staging" => CredentialDecision::Staging,
                "main" => CredentialDecision::Main,
                "keep-both" => CredentialDecision::KeepBoth,
                _ => CredentialDecision::Target {
                    target_id: choice,
                    target_name: None,
                },
            },
            RawCredentialDecision::Target {
                target_id,
                target_name,
            } => CredentialDecision::Target {
                target_id,
                target_name,
            },
        }
    }
}

impl From<CredentialDecision> for RawCredentialDecision {
    fn from(decision: CredentialDecision) -> Self {
        match decision {
            CredentialDecision::Staging => RawCredentialDecision::Choice("staging".to_string()),
            CredentialDecision::Main => RawCredentialDecision::Choice("main".to_string()),
            CredentialDecision::KeepBoth => RawCredentialDecision::Choice("keep-both".to_string()),
            CredentialDecision::Target {
                target_id,
                target_name,
            } => RawCredentialDecision::Target {
                target_id,
                target_name,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainSelection {
    Staging,
    Main,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDecision {
    pub selected: DomainSelection,
    /// Value written in place of the original slot value.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallEdgeDecision {
    Action(CallEdgeAction),
    Map(CallEdgeMapping),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallEdgeAction {
    Add,
    Remove,
    Keep,
}

/// Redirect the call to a different workflow id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEdgeMapping {
    pub action: MapAction,
    pub target_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapAction {
    Map,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataDecision {
    Staging,
    Main,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_set_wire_format() {
        let decisions: DecisionSet = serde_json::from_value(json!({
            "credentials": {
                "c1": "main",
                "c2": "keep-both",
                "c3": "staging",
                "c4": "alt-cred",
                "c5": {"targetId": "alt-2", "targetName": "Alt two"}
            },
            "domains": {
                "POST /hook (Webhook)": {"selected": "custom", "url": "PUT /hook2 (Webhook)"}
            },
            "workflowCalls": {
                "Main->abc": "remove",
                "Main->def": {"action": "map", "targetId": "xyz"}
            },
            "metadata": {"orders.json-settings": "main"}
        }))
        .unwrap();

        assert_eq!(decisions.credentials["c1"], CredentialDecision::Main);
        assert_eq!(decisions.credentials["c2"], CredentialDecision::KeepBoth);
        assert_eq!(decisions.credentials["c3"], CredentialDecision::Staging);
        assert_eq!(
            decisions.credentials["c4"],
            CredentialDecision::Target {
                target_id: "alt-cred".to_string(),
                target_name: None
            }
        );
        assert_eq!(
            decisions.credentials["c5"],
            CredentialDecision::Target {
                target_id: "alt-2".to_string(),
                target_name: Some("Alt two".to_string())
            }
        );
        assert_eq!(
            decisions.workflow_calls["Main->abc"],
            CallEdgeDecision::Action(CallEdgeAction::Remove)
        );
        match &decisions.workflow_calls["Main->def"] {
            CallEdgeDecision::Map(mapping) => assert_eq!(mapping.target_id, "xyz"),
            other => panic!("expected mapping, got {:?}", other),
        }
        assert_eq!(decisions.metadata["orders.json-settings"], MetadataDecision::Main);
        assert_eq!(
            decisions.domains["POST /hook (Webhook)"].selected,
            DomainSelection::Custom
        );
    }

    #[test]
    fn test_credential_decision_serializes_back() {
        let value = serde_json::to_value(CredentialDecision::KeepBoth).unwrap();
        assert_eq!(value, json!("keep-both"));
    }

    #[test]
    fn test_empty_object_is_empty_decision_set() {
        let decisions: DecisionSet = serde_json::from_str("{}").unwrap();
        assert!(decisions.is_empty());
    }
}
