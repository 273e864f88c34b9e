//! One comparison request from changed-file list to reconciled report.
//!
//! Per-file fetch and extraction fan out on a `JoinSet`; the reconciler then
//! folds the results sequentially in path order.

use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::config::AppConfig;
use crate::error::{MergeError, MergeResult};
use crate::logic::apply::MergeEngine;
use crate::logic::extract::Extractor;
use crate::logic::heuristics::{NoHeuristics, OrphanMatcher, SameFileMatcher};
use crate::logic::reconcile::{CredentialRegistry, FileExtraction, Reconciler};
use crate::model::{AnalysisReport, ChangedFile, Comparison, Workflow};
use crate::store::DocumentSource;

pub struct AnalysisPipeline<S: DocumentSource + ?Sized> {
    source: Arc<S>,
    extractor: Arc<Extractor>,
    reconciler: Reconciler,
    engine: MergeEngine,
    file_extension: Option<String>,
}

impl<S: DocumentSource + ?Sized + 'static> AnalysisPipeline<S> {
    pub fn new(source: Arc<S>, extractor: Extractor, matcher: Box<dyn OrphanMatcher>) -> Self {
        Self {
            source,
            engine: MergeEngine::new(extractor.clone()),
            extractor: Arc::new(extractor),
            reconciler: Reconciler::new(matcher),
            file_extension: None,
        }
    }

    pub fn from_config(config: &AppConfig, source: Arc<S>) -> Self {
        let matcher: Box<dyn OrphanMatcher> = if config.reconcile.heuristics {
            Box::new(SameFileMatcher)
        } else {
            Box::new(NoHeuristics)
        };
        Self::new(source, Extractor::new(config.extraction.clone()), matcher)
            .with_file_extension(&config.source.file_extension)
    }

    /// Only analyse changed files ending in `.{extension}`.
    pub fn with_file_extension(mut self, extension: &str) -> Self {
        self.file_extension = Some(extension.trim_start_matches('.').to_string());
        self
    }

    pub fn engine(&self) -> &MergeEngine {
        &self.engine
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub async fn analyze(&self, comparison: &Comparison) -> MergeResult<AnalysisReport> {
        let changed = self.source.list_changed_files(comparison).await?;
        let changed: Vec<ChangedFile> = changed.into_iter().filter(|f| self.is_document(&f.path)).collect();
        info!(
            "Analysing {} changed document(s) between {} and {}",
            changed.len(),
            comparison.base_ref,
            comparison.head_ref
        );

        let mut tasks = JoinSet::new();
        for file in changed {
            let source = Arc::clone(&self.source);
            let extractor = Arc::clone(&self.extractor);
            let comparison = comparison.clone();
            tasks.spawn(async move {
                let path = file.path.clone();
                let result = extract_file(source.as_ref(), &extractor, &comparison, file).await;
                (path, result)
            });
        }

        let registry = match self.source.fetch_full_document_set(&comparison.base_ref).await {
            Ok(workflows) => CredentialRegistry::from_workflows(&self.extractor, &workflows),
            Err(e) => {
                warn!("Credential registry unavailable for {}: {:#}", comparison.base_ref, e);
                CredentialRegistry::default()
            }
        };

        let mut files = Vec::new();
        let mut skipped_files = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(extraction))) => files.push(extraction),
                Ok((path, Err(e))) => {
                    warn!("Skipping {}: {}", path, e);
                    skipped_files.push(path);
                }
                Err(e) => warn!("Extraction task failed: {}", e),
            }
        }
        skipped_files.sort();

        let entities = self.reconciler.reconcile(&files, &registry);
        debug!(
            "Reconciled {} file(s): {} credential, {} domain, {} call-edge entries",
            files.len(),
            entities.credentials.len(),
            entities.domains.len(),
            entities.call_edges.len()
        );

        Ok(AnalysisReport {
            base_ref: comparison.base_ref.clone(),
            head_ref: comparison.head_ref.clone(),
            generated_at: Utc::now(),
            entities,
            skipped_files,
        })
    }

    fn is_document(&self, path: &str) -> bool {
        match &self.file_extension {
            Some(ext) => path
                .rsplit_once('.')
                .is_some_and(|(_, actual)| actual.eq_ignore_ascii_case(ext)),
            None => true,
        }
    }
}

/// Fetch and parse both sides of one changed file. A side that is missing
/// at its reference is treated as absent; a side that fails to parse fails
/// the whole file.
async fn extract_file<S: DocumentSource + ?Sized>(
    source: &S,
    extractor: &Extractor,
    comparison: &Comparison,
    file: ChangedFile,
) -> MergeResult<FileExtraction> {
    let base = if file.status.has_base() {
        fetch_workflow(source, &comparison.base_ref, &file.path).await?
    } else {
        None
    };
    let head = if file.status.has_head() {
        fetch_workflow(source, &comparison.head_ref, &file.path).await?
    } else {
        None
    };

    if base.is_none() && head.is_none() {
        return Err(MergeError::NotFound {
            reference: format!("{}..{}", comparison.base_ref, comparison.head_ref),
            path: file.path,
        });
    }

    Ok(FileExtraction::from_workflows(
        extractor,
        &file.path,
        file.status,
        base.as_ref(),
        head.as_ref(),
    ))
}

async fn fetch_workflow<S: DocumentSource + ?Sized>(
    source: &S,
    reference: &str,
    path: &str,
) -> MergeResult<Option<Workflow>> {
    let Some(content) = source.fetch_document(reference, path).await? else {
        debug!("{} not present at {}", path, reference);
        return Ok(None);
    };
    Workflow::from_json(&content)
        .map(Some)
        .map_err(|e| MergeError::parse(format!("{}:{}", reference, path), e))
}
