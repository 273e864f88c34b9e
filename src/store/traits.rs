use anyhow::Result;

use crate::model::{ChangedFile, Comparison, Workflow};

/// Where documents come from. References name a branch, commit or directory,
/// depending on the implementation.
#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    /// Raw text of one document, or `None` when it does not exist at `reference`.
    async fn fetch_document(&self, reference: &str, path: &str) -> Result<Option<String>>;

    /// Every parseable document under `reference`. Used to offer credential
    /// alternatives, so unparseable documents are left out rather than failing.
    async fn fetch_full_document_set(&self, reference: &str) -> Result<Vec<Workflow>>;

    async fn list_changed_files(&self, comparison: &Comparison) -> Result<Vec<ChangedFile>>;
}

/// Changed files between two `path -> content` snapshots, in path order.
/// Content comparison is exact.
pub fn compare_snapshots<'a, B, H>(base: B, head: H) -> Vec<ChangedFile>
where
    B: IntoIterator<Item = (&'a String, &'a String)>,
    H: IntoIterator<Item = (&'a String, &'a String)>,
{
    use crate::model::FileStatus;
    use std::collections::BTreeMap;

    let base: BTreeMap<&String, &String> = base.into_iter().collect();
    let head: BTreeMap<&String, &String> = head.into_iter().collect();

    let mut changed: Vec<ChangedFile> = head
        .iter()
        .filter_map(|(path, content)| {
            let status = match base.get(path) {
                None => FileStatus::Added,
                Some(old) if old != content => FileStatus::Modified,
                Some(_) => return None,
            };
            Some(ChangedFile {
                path: (*path).clone(),
                status,
            })
        })
        .collect();

    changed.extend(
        base.keys()
            .filter(|path| !head.contains_key(*path))
            .map(|path| ChangedFile {
                path: (*path).clone(),
                status: FileStatus::Removed,
            }),
    );
    changed.sort_by(|a, b| a.path.cmp(&b.path));
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileStatus;
    use std::collections::HashMap;

    #[test]
    fn test_compare_snapshots_classifies_files() {
        let base: HashMap<String, String> = [
            ("a.json".to_string(), "1".to_string()),
            ("b.json".to_string(), "2".to_string()),
            ("c.json".to_string(), "3".to_string()),
        ]
        .into_iter()
        .collect();
        let head: HashMap<String, String> = [
            ("a.json".to_string(), "1".to_string()),
            ("b.json".to_string(), "changed".to_string()),
            ("d.json".to_string(), "4".to_string()),
        ]
        .into_iter()
        .collect();

        let changed = compare_snapshots(&base, &head);
        assert_eq!(
            changed,
            vec![
                ChangedFile { path: "b.json".to_string(), status: FileStatus::Modified },
                ChangedFile { path: "c.json".to_string(), status: FileStatus::Removed },
                ChangedFile { path: "d.json".to_string(), status: FileStatus::Added },
            ]
        );
    }
}
