use anyhow::{anyhow, Result};
use log::warn;
use std::collections::{BTreeMap, HashMap};

use crate::model::{ChangedFile, Comparison, Workflow};
use crate::store::traits::{compare_snapshots, DocumentSource};

/// Documents held in memory, keyed by reference and then path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentSource {
    refs: HashMap<String, BTreeMap<String, String>>,
    /// Reported as-is instead of diffing the two snapshots.
    changes: Option<Vec<ChangedFile>>,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, reference: &str, path: &str, content: impl Into<String>) -> Self {
        self.insert(reference, path, content);
        self
    }

    /// Report exactly these changed files, whatever the snapshots hold.
    pub fn with_changed_files(mut self, changes: Vec<ChangedFile>) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn insert(&mut self, reference: &str, path: &str, content: impl Into<String>) {
        self.refs
            .entry(reference.to_string())
            .or_default()
            .insert(path.to_string(), content.into());
    }

    fn snapshot(&self, reference: &str) -> Result<&BTreeMap<String, String>> {
        self.refs
            .get(reference)
            .ok_or_else(|| anyhow!("unknown reference: {}", reference))
    }
}

#[async_trait::async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn fetch_document(&self, reference: &str, path: &str) -> Result<Option<String>> {
        Ok(self.refs.get(reference).and_then(|docs| docs.get(path)).cloned())
    }

    async fn fetch_full_document_set(&self, reference: &str) -> Result<Vec<Workflow>> {
        let docs = self.snapshot(reference)?;
        Ok(docs
            .iter()
            .filter_map(|(path, content)| match Workflow::from_json(content) {
                Ok(workflow) => Some(workflow),
                Err(e) => {
                    warn!("Skipping {}:{} in document set: {}", reference, path, e);
                    None
                }
            })
            .collect())
    }

    async fn list_changed_files(&self, comparison: &Comparison) -> Result<Vec<ChangedFile>> {
        if let Some(changes) = &self.changes {
            return Ok(changes.clone());
        }
        let empty = BTreeMap::new();
        let base = self.refs.get(&comparison.base_ref).unwrap_or(&empty);
        let head = self.snapshot(&comparison.head_ref)?;
        Ok(compare_snapshots(base, head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileStatus;

    #[tokio::test]
    async fn test_fetch_and_list() {
        let source = InMemoryDocumentSource::new()
            .with_document("main", "a.json", r#"{"name": "A", "nodes": []}"#)
            .with_document("staging", "a.json", r#"{"name": "A2", "nodes": []}"#)
            .with_document("staging", "b.json", "not json");

        assert!(source.fetch_document("main", "b.json").await.unwrap().is_none());
        assert!(source.fetch_document("staging", "b.json").await.unwrap().is_some());

        let changed = source
            .list_changed_files(&Comparison::new("main", "staging"))
            .await
            .unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[1].status, FileStatus::Added);

        let all = source.fetch_full_document_set("staging").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "A2");

        assert!(source.fetch_full_document_set("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_explicit_changed_files_are_reported_verbatim() {
        let listed = vec![ChangedFile {
            path: "gone.json".to_string(),
            status: FileStatus::Modified,
        }];
        let source = InMemoryDocumentSource::new()
            .with_document("staging", "a.json", "{}")
            .with_changed_files(listed.clone());

        let changed = source
            .list_changed_files(&Comparison::new("main", "staging"))
            .await
            .unwrap();
        assert_eq!(changed, listed);
    }
}
