//! Error types for the merge pipeline.

/// Errors that can occur while analysing or merging documents.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A document was not valid workflow JSON.
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// The document source could not list or fetch documents.
    #[error("document source error: {0}")]
    Source(#[from] anyhow::Error),

    /// A document expected on one side of the comparison was missing.
    #[error("document not found: {reference}:{path}")]
    NotFound { reference: String, path: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialising a merged document failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MergeError {
    pub fn parse(file: impl Into<String>, source: serde_json::Error) -> Self {
        MergeError::Parse {
            file: file.into(),
            source,
        }
    }
}

/// Convenience alias for pipeline results.
pub type MergeResult<T> = Result<T, MergeError>;
