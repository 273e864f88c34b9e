use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::model::Id;

/// Parameter keys that select how a node authenticates. They travel with the
/// credential map: changing one without the other leaves the node unusable.
pub const AUTH_PARAM_KEYS: &[&str] = &["authentication", "nodeCredentialType", "genericAuthType"];

/// Top-level keys that belong to the node tree rather than the metadata.
pub const STRUCTURAL_KEYS: &[&str] = &["nodes", "connections"];

/// A workflow definition as stored in version control.
///
/// Unknown top-level fields are kept in `extra` so a parse/serialise cycle
/// does not drop anything the merge never touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub nodes: Vec<Node>,
    /// `Some(Value::Null)` when the document spelled out `"connections": null`.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub connections: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: Id,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<BTreeMap<String, CredentialRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pointer from a node to an externally stored credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCredentialRef", into = "RawCredentialRef")]
pub struct CredentialRef {
    pub id: Option<Id>,
    pub name: String,
    pub extra: Map<String, Value>,
    /// The document carried `"id": null` rather than no id at all.
    null_id: bool,
}

#[derive(Serialize, Deserialize)]
struct RawCredentialRef {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    id: Option<Option<Id>>,
    #[serde(default)]
    name: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawCredentialRef> for CredentialRef {
    fn from(raw: RawCredentialRef) -> Self {
        Self {
            null_id: matches!(raw.id, Some(None)),
            id: raw.id.flatten(),
            name: raw.name,
            extra: raw.extra,
        }
    }
}

impl From<CredentialRef> for RawCredentialRef {
    fn from(cred: CredentialRef) -> Self {
        let id = match cred.id {
            Some(id) => Some(Some(id)),
            None if cred.null_id => Some(None),
            None => None,
        };
        Self {
            id,
            name: cred.name,
            extra: cred.extra,
        }
    }
}

/// Wraps any present value, `null` included, in `Some`. Paired with
/// `#[serde(default)]` so only a missing key yields `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl CredentialRef {
    pub fn new(id: impl Into<Id>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            extra: Map::new(),
            null_id: false,
        }
    }
}

/// A node's credential references together with the parameters that select
/// the authentication method. Always read and written as one value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthBinding {
    pub credentials: BTreeMap<String, CredentialRef>,
    pub auth_params: Map<String, Value>,
}

impl Workflow {
    /// Parse a workflow from JSON text. Documents without a `nodes` array are
    /// rejected.
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_by_name_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }

    /// Read a top-level field by its JSON key.
    pub fn top_level_field(&self, key: &str) -> Option<Value> {
        match key {
            "name" => Some(Value::String(self.name.clone())),
            "id" => self.id.clone().map(Value::String),
            k if STRUCTURAL_KEYS.contains(&k) => None,
            _ => self.extra.get(key).cloned(),
        }
    }

    /// Overwrite a top-level metadata field. Structural keys and values of the
    /// wrong shape for typed fields are ignored; returns whether a write
    /// happened.
    pub fn set_top_level_field(&mut self, key: &str, value: Value) -> bool {
        match key {
            "name" => match value {
                Value::String(name) => {
                    self.name = name;
                    true
                }
                _ => false,
            },
            "id" => match value {
                Value::String(id) => {
                    self.id = Some(id);
                    true
                }
                Value::Null => {
                    self.id = None;
                    true
                }
                _ => false,
            },
            k if STRUCTURAL_KEYS.contains(&k) => false,
            _ => {
                self.extra.insert(key.to_string(), value);
                true
            }
        }
    }
}

impl Node {
    /// Iterate `(kind, credential)` pairs of this node.
    pub fn credential_refs(&self) -> impl Iterator<Item = (&String, &CredentialRef)> {
        self.credentials.iter().flat_map(|creds| creds.iter())
    }

    pub fn uses_credential(&self, id: &str) -> bool {
        self.credential_refs()
            .any(|(_, cred)| cred.id.as_deref() == Some(id))
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    pub fn auth_binding(&self) -> AuthBinding {
        let credentials = self.credentials.clone().unwrap_or_default();
        let mut auth_params = Map::new();
        if let Some(params) = self.parameters.as_object() {
            for key in AUTH_PARAM_KEYS {
                if let Some(value) = params.get(*key) {
                    auth_params.insert(key.to_string(), value.clone());
                }
            }
        }
        AuthBinding {
            credentials,
            auth_params,
        }
    }

    /// Replace this node's credentials with `binding`. Credential kinds missing
    /// from the binding are dropped; auth-method parameters carried by the
    /// binding overwrite the node's, the others are left alone.
    pub fn set_auth_binding(&mut self, binding: AuthBinding) {
        self.credentials = if binding.credentials.is_empty() {
            None
        } else {
            Some(binding.credentials)
        };

        if binding.auth_params.is_empty() {
            return;
        }
        if !self.parameters.is_object() {
            self.parameters = Value::Object(Map::new());
        }
        if let Some(params) = self.parameters.as_object_mut() {
            for (key, value) in binding.auth_params {
                params.insert(key, value);
            }
        }
    }

    /// Remove every credential kind whose id equals `id`. Returns the removed
    /// kinds.
    pub fn strip_credential(&mut self, id: &str) -> Vec<String> {
        let Some(creds) = self.credentials.as_mut() else {
            return Vec::new();
        };
        let removed: Vec<String> = creds
            .iter()
            .filter(|(_, cred)| cred.id.as_deref() == Some(id))
            .map(|(kind, _)| kind.clone())
            .collect();
        for kind in &removed {
            creds.remove(kind);
        }
        if creds.is_empty() {
            self.credentials = None;
        }
        removed
    }
}
