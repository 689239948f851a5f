//! Error types for the retrieval pipeline
//!
//! A single structured error type built with thiserror. Every variant keeps
//! enough context for the caller to decide between retrying, reporting to the
//! end user, or aborting a batch job.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for embedding, indexing and retrieval operations
#[derive(Error, Debug)]
pub enum RagError {
    /// Model selection errors
    #[error("Unknown embedding model '{name}'. Supported models: {supported}")]
    ModelNotFound { name: String, supported: String },

    #[error(
        "Index was built with model '{index_model}' but the query asked for '{requested}'. Query with the same model or rebuild the index"
    )]
    ModelMismatch {
        index_model: String,
        requested: String,
    },

    /// Shape errors
    #[error("Vector dimension mismatch at position {position}: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        position: usize,
    },

    #[error("Length mismatch: {vectors} vectors but {records} metadata records")]
    LengthMismatch { vectors: usize, records: usize },

    /// Index state errors
    #[error("No index has been built at '{path}'. Run 'support-rag index' first")]
    IndexNotBuilt { path: PathBuf },

    #[error("Index at '{path}' appears to be corrupted: {reason}")]
    IndexCorrupted { path: PathBuf, reason: String },

    /// Input validation errors
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Model runtime errors
    #[error("Failed to load embedding model '{model}': {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("Embedding generation failed with model '{model}': {reason}")]
    Embedding { model: String, reason: String },

    /// The text generator behind a prompted answer failed
    #[error("Answer generation failed: {reason}")]
    Generation { reason: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: std::time::Duration,
    },

    /// File system errors
    #[error("Storage operation failed on '{path}': {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize '{path}': {source}")]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// I/O and serde errors are not `Clone`; copies keep their kind and message.
impl Clone for RagError {
    fn clone(&self) -> Self {
        match self {
            Self::ModelNotFound { name, supported } => Self::ModelNotFound {
                name: name.clone(),
                supported: supported.clone(),
            },
            Self::ModelMismatch {
                index_model,
                requested,
            } => Self::ModelMismatch {
                index_model: index_model.clone(),
                requested: requested.clone(),
            },
            Self::DimensionMismatch {
                expected,
                actual,
                position,
            } => Self::DimensionMismatch {
                expected: *expected,
                actual: *actual,
                position: *position,
            },
            Self::LengthMismatch { vectors, records } => Self::LengthMismatch {
                vectors: *vectors,
                records: *records,
            },
            Self::IndexNotBuilt { path } => Self::IndexNotBuilt { path: path.clone() },
            Self::IndexCorrupted { path, reason } => Self::corrupted(path.clone(), reason.clone()),
            Self::InvalidArgument { reason } => Self::invalid_argument(reason.clone()),
            Self::ModelLoad { model, reason } => Self::ModelLoad {
                model: model.clone(),
                reason: reason.clone(),
            },
            Self::Embedding { model, reason } => Self::Embedding {
                model: model.clone(),
                reason: reason.clone(),
            },
            Self::Generation { reason } => Self::Generation {
                reason: reason.clone(),
            },
            Self::Timeout { operation, timeout } => Self::Timeout {
                operation: operation.clone(),
                timeout: *timeout,
            },
            Self::Storage { path, source } => Self::storage(
                path.clone(),
                std::io::Error::new(source.kind(), source.to_string()),
            ),
            Self::Serialization { path, source } => Self::Serialization {
                path: path.clone(),
                source: serde_json::Error::io(std::io::Error::other(source.to_string())),
            },
        }
    }
}

impl RagError {
    /// Wrap an I/O error with the path it happened on.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexCorrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            Self::ModelMismatch { .. } => "MODEL_MISMATCH",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::LengthMismatch { .. } => "LENGTH_MISMATCH",
            Self::IndexNotBuilt { .. } => "INDEX_NOT_BUILT",
            Self::IndexCorrupted { .. } => "INDEX_CORRUPTED",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::ModelLoad { .. } => "MODEL_LOAD_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Generation { .. } => "GENERATION_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    /// Whether retrying the same call can succeed without changing inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelLoad { .. }
                | Self::Embedding { .. }
                | Self::Generation { .. }
                | Self::Timeout { .. }
                | Self::Storage { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::ModelNotFound { .. } => vec![
                "Use one of: all-MiniLM-L6-v2, e5-small, e5-large",
                "Check 'embedding.model' in .support-rag/settings.toml",
            ],
            Self::ModelMismatch { .. } => vec![
                "Query with the model shown by 'support-rag info'",
                "Or rebuild with 'support-rag index --model <name>'",
            ],
            Self::DimensionMismatch { .. } => vec![
                "Ensure all vectors come from the same embedding model",
            ],
            Self::LengthMismatch { .. } => vec![
                "Every vector needs exactly one metadata record at the same position",
            ],
            Self::IndexNotBuilt { .. } => vec![
                "Run 'support-rag index' to build the index",
                "Check 'index_path' points at the directory the index was built into",
            ],
            Self::IndexCorrupted { .. } => vec![
                "Run 'support-rag index' to rebuild from scratch",
                "Check for disk errors or concurrent writers in the index directory",
            ],
            Self::ModelLoad { .. } => vec![
                "Ensure you have internet connection for first-time model download",
                "Check that 'embedding.cache_dir' is writable",
            ],
            Self::Timeout { .. } => vec![
                "Retry the operation, the first model download can be slow",
                "Raise 'embedding.load_timeout_secs' or 'retrieval.load_timeout_secs'",
            ],
            Self::Storage { .. } => vec![
                "Check disk space and file permissions",
            ],
            Self::Generation { .. } => vec![
                "Check that the configured text generator is reachable",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for pipeline operations
pub type RagResult<T> = Result<T, RagError>;
