use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::model::{ChangedFile, Comparison, Workflow};
use crate::store::traits::{compare_snapshots, DocumentSource};

/// Reads documents from a directory tree where each reference is a
/// sub-directory of `root`, e.g. `workflows/main/orders.json`.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
    extension: String,
}

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, reference: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(reference).join(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            anyhow::bail!("path escapes document root: {}", relative.display());
        }
        Ok(self.root.join(relative))
    }

    /// `relative path -> content` for every matching file under `reference`.
    async fn snapshot(&self, reference: &str) -> Result<BTreeMap<String, String>> {
        let base_dir = self.resolve(reference, "")?;
        let mut docs = BTreeMap::new();
        let mut pending = vec![base_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("failed to read directory {}", dir.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&base_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                docs.insert(key, content);
            }
        }

        debug!("Loaded {} document(s) from {}", docs.len(), base_dir.display());
        Ok(docs)
    }
}

#[async_trait::async_trait]
impl DocumentSource for FsDocumentSource {
    async fn fetch_document(&self, reference: &str, path: &str) -> Result<Option<String>> {
        let full = self.resolve(reference, path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", full.display())),
        }
    }

    async fn fetch_full_document_set(&self, reference: &str) -> Result<Vec<Workflow>> {
        let docs = self.snapshot(reference).await?;
        Ok(docs
            .iter()
            .filter_map(|(path, content)| match Workflow::from_json(content) {
                Ok(workflow) => Some(workflow),
                Err(e) => {
                    warn!("Skipping {}/{} in document set: {}", reference, path, e);
                    None
                }
            })
            .collect())
    }

    async fn list_changed_files(&self, comparison: &Comparison) -> Result<Vec<ChangedFile>> {
        let base = self.snapshot(&comparison.base_ref).await?;
        let head = self.snapshot(&comparison.head_ref).await?;
        Ok(compare_snapshots(&base, &head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileStatus;

    async fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_directories_as_references() {
        let root = std::env::temp_dir().join(format!("workflow-merge-fs-{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&root).await;

        write(&root, "main/orders.json", r#"{"name": "Orders", "nodes": []}"#).await;
        write(&root, "main/old.json", r#"{"name": "Old", "nodes": []}"#).await;
        write(&root, "staging/orders.json", r#"{"name": "Orders v2", "nodes": []}"#).await;
        write(&root, "staging/sub/new.json", r#"{"name": "New", "nodes": []}"#).await;
        write(&root, "staging/notes.txt", "ignored").await;

        let source = FsDocumentSource::new(&root, "json");
        let changed = source
            .list_changed_files(&Comparison::new("main", "staging"))
            .await
            .unwrap();
        let summary: Vec<(&str, FileStatus)> = changed.iter().map(|c| (c.path.as_str(), c.status)).collect();
        assert_eq!(
            summary,
            vec![
                ("old.json", FileStatus::Removed),
                ("orders.json", FileStatus::Modified),
                ("sub/new.json", FileStatus::Added),
            ]
        );

        assert!(source.fetch_document("main", "sub/new.json").await.unwrap().is_none());
        assert!(source.fetch_document("..", "etc/passwd").await.is_err());
        assert_eq!(source.fetch_full_document_set("staging").await.unwrap().len(), 2);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
