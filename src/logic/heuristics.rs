//! Best-effort pairing of orphaned entries when identities drift.
//!
//! Identity matching happens in the reconciler; these strategies only run
//! when a head-side entity has no identity match. They are isolated behind
//! [`OrphanMatcher`] so they can be swapped or switched off.

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::model::{Credential, CredentialDiffEntry, DomainDiffEntry, DomainRef};

/// A heuristic pairing: the key of the chosen base-side entry and how many
/// equally plausible candidates existed. More than one means the choice was
/// a first-found tie-break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanMatch {
    pub key: String,
    pub candidates: usize,
}

impl OrphanMatch {
    pub fn is_ambiguous(&self) -> bool {
        self.candidates > 1
    }
}

pub trait OrphanMatcher: Debug + Send + Sync {
    fn match_credential(
        &self,
        entries: &BTreeMap<String, CredentialDiffEntry>,
        file: &str,
        head: &Credential,
    ) -> Option<OrphanMatch>;

    fn match_domain(
        &self,
        entries: &BTreeMap<String, DomainDiffEntry>,
        file: &str,
        head: &DomainRef,
    ) -> Option<OrphanMatch>;
}

/// Pairs a head-only entity with a base-only entry from the same file:
/// credentials by kind, domains by node id and then by parameter path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameFileMatcher;

impl OrphanMatcher for SameFileMatcher {
    fn match_credential(
        &self,
        entries: &BTreeMap<String, CredentialDiffEntry>,
        file: &str,
        head: &Credential,
    ) -> Option<OrphanMatch> {
        let candidates: Vec<&String> = entries
            .iter()
            .filter(|(_, e)| {
                e.in_base
                    && !e.in_head
                    && e.head_id.is_none()
                    && e.kind == head.kind
                    && e.files.iter().any(|f| f == file)
            })
            .map(|(key, _)| key)
            .collect();

        first_of(&candidates)
    }

    fn match_domain(
        &self,
        entries: &BTreeMap<String, DomainDiffEntry>,
        file: &str,
        head: &DomainRef,
    ) -> Option<OrphanMatch> {
        let orphans: Vec<(&String, &DomainDiffEntry)> = entries
            .iter()
            .filter(|(_, e)| e.in_base && !e.in_head && e.files.iter().any(|f| f == file))
            .collect();

        let by_node: Vec<&String> = orphans
            .iter()
            .filter(|(_, e)| !head.node_id.is_empty() && e.node_id == head.node_id)
            .map(|(key, _)| *key)
            .collect();
        if !by_node.is_empty() {
            return first_of(&by_node);
        }

        let by_path: Vec<&String> = orphans
            .iter()
            .filter(|(_, e)| e.parameter_path == head.parameter_path)
            .map(|(key, _)| *key)
            .collect();
        first_of(&by_path)
    }
}

/// Never pairs anything: every unmatched head entity becomes its own entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHeuristics;

impl OrphanMatcher for NoHeuristics {
    fn match_credential(
        &self,
        _entries: &BTreeMap<String, CredentialDiffEntry>,
        _file: &str,
        _head: &Credential,
    ) -> Option<OrphanMatch> {
        None
    }

    fn match_domain(
        &self,
        _entries: &BTreeMap<String, DomainDiffEntry>,
        _file: &str,
        _head: &DomainRef,
    ) -> Option<OrphanMatch> {
        None
    }
}

fn first_of(keys: &[&String]) -> Option<OrphanMatch> {
    keys.first().map(|key| OrphanMatch {
        key: (*key).clone(),
        candidates: keys.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_only(key: &str, kind: &str, file: &str) -> CredentialDiffEntry {
        CredentialDiffEntry {
            key: key.to_string(),
            kind: kind.to_string(),
            in_base: true,
            base_id: Some(key.to_string()),
            files: vec![file.to_string()],
            ..Default::default()
        }
    }

    fn head_cred(id: &str, kind: &str) -> Credential {
        Credential {
            id: id.to_string(),
            name: id.to_string(),
            kind: kind.to_string(),
            owner_node_type: "n8n-nodes-base.slack".to_string(),
        }
    }

    #[test]
    fn test_credential_match_requires_same_file_and_kind() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), base_only("a", "slackApi", "one.json"));
        entries.insert("b".to_string(), base_only("b", "githubApi", "one.json"));
        entries.insert("c".to_string(), base_only("c", "slackApi", "two.json"));

        let found = SameFileMatcher
            .match_credential(&entries, "one.json", &head_cred("x", "slackApi"))
            .unwrap();
        assert_eq!(found.key, "a");
        assert!(!found.is_ambiguous());

        assert!(SameFileMatcher
            .match_credential(&entries, "three.json", &head_cred("x", "slackApi"))
            .is_none());
        assert!(NoHeuristics
            .match_credential(&entries, "one.json", &head_cred("x", "slackApi"))
            .is_none());
    }

    #[test]
    fn test_two_orphans_of_same_kind_is_ambiguous() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), base_only("a", "slackApi", "one.json"));
        entries.insert("b".to_string(), base_only("b", "slackApi", "one.json"));

        let found = SameFileMatcher
            .match_credential(&entries, "one.json", &head_cred("x", "slackApi"))
            .unwrap();
        assert_eq!(found.key, "a");
        assert_eq!(found.candidates, 2);
        assert!(found.is_ambiguous());
    }

    #[test]
    fn test_domain_match_prefers_node_id_over_path() {
        let entry = |node_id: &str, path: &str| DomainDiffEntry {
            key: format!("{}::{}", node_id, path),
            node_id: node_id.to_string(),
            parameter_path: path.to_string(),
            in_base: true,
            base_url: Some("https://old.example".to_string()),
            files: vec!["wf.json".to_string()],
            ..Default::default()
        };
        let mut entries = BTreeMap::new();
        entries.insert("n1::url".to_string(), entry("n1", "url"));
        entries.insert("n2::options.url".to_string(), entry("n2", "options.url"));

        let head = DomainRef {
            url: "https://new.example".to_string(),
            node_id: "n2".to_string(),
            node_name: "HTTP".to_string(),
            node_type: "http".to_string(),
            parameter_path: "url".to_string(),
        };
        let found = SameFileMatcher.match_domain(&entries, "wf.json", &head).unwrap();
        assert_eq!(found.key, "n2::options.url");

        let renamed_node = DomainRef {
            node_id: "n9".to_string(),
            ..head
        };
        let found = SameFileMatcher.match_domain(&entries, "wf.json", &renamed_node).unwrap();
        assert_eq!(found.key, "n1::url");
    }
}
