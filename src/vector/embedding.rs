//! Embedding generation.
//!
//! Two seams keep model loading swappable: [`ModelLoader`] turns a model name
//! into a ready [`EmbeddingBackend`], and the backend turns text into raw
//! vectors. [`Embedder`] sits on top, resolving names through the shared
//! [`ModelCache`], batching input and normalizing every output row.
//!
//! The production pair is [`FastEmbedLoader`] / [`FastEmbedBackend`], which
//! download ONNX weights on first use and run inference locally.

use crate::error::{RagError, RagResult};
use crate::vector::{
    EmbeddingModelName, EmbeddingVector, ModelCache, ModelInfo, VectorDimension, normalize,
};
use fastembed::{InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Texts per backend call unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// A loaded model that turns text into raw, unnormalized vectors.
///
/// Implementations must be thread-safe. Output order must match input order.
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of texts, one vector per text.
    fn embed_raw(&self, texts: &[&str]) -> RagResult<Vec<Vec<f32>>>;

    /// Dimension of vectors produced by this backend.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// Loads a backend for a model name. Called at most once per name by the cache.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model: EmbeddingModelName) -> RagResult<Arc<dyn EmbeddingBackend>>;
}

/// fastembed-backed model.
///
/// `TextEmbedding::embed` needs exclusive access, so calls are serialized
/// through a mutex.
pub struct FastEmbedBackend {
    model: Mutex<TextEmbedding>,
    name: EmbeddingModelName,
    dimension: VectorDimension,
}

impl EmbeddingBackend for FastEmbedBackend {
    fn embed_raw(&self, texts: &[&str]) -> RagResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| RagError::Embedding {
                model: self.name.to_string(),
                reason: e.to_string(),
            })
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Loads fastembed models into a local cache directory.
#[derive(Debug, Clone)]
pub struct FastEmbedLoader {
    cache_dir: PathBuf,
    show_download_progress: bool,
}

impl FastEmbedLoader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            show_download_progress: false,
        }
    }

    /// Show fastembed's download bar when weights are fetched.
    #[must_use]
    pub fn with_download_progress(mut self, show: bool) -> Self {
        self.show_download_progress = show;
        self
    }
}

impl ModelLoader for FastEmbedLoader {
    fn load(&self, model: EmbeddingModelName) -> RagResult<Arc<dyn EmbeddingBackend>> {
        tracing::info!(
            target: "embedding",
            model = %model,
            cache_dir = %self.cache_dir.display(),
            "loading embedding model"
        );

        let text_model = TextEmbedding::try_new(
            InitOptions::new(model.fastembed_model())
                .with_cache_dir(self.cache_dir.clone())
                .with_show_download_progress(self.show_download_progress),
        )
        .map_err(|e| RagError::ModelLoad {
            model: model.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Arc::new(FastEmbedBackend {
            model: Mutex::new(text_model),
            name: model,
            dimension: model.dimension(),
        }))
    }
}

/// Embeds texts with a named model, loading it through the shared cache.
///
/// Every returned vector has the model's dimension and unit L2 norm
/// (`v / (‖v‖ + 1e-10)`).
#[derive(Clone)]
pub struct Embedder {
    cache: Arc<ModelCache>,
    batch_size: usize,
}

impl Embedder {
    pub fn new(cache: Arc<ModelCache>) -> Self {
        Self {
            cache,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Embed `texts` with the model called `model_name`.
    ///
    /// The name is checked before anything else, so an unknown model fails
    /// even for an empty batch. An empty batch never loads a model.
    pub fn embed(&self, texts: &[&str], model_name: &str) -> RagResult<Vec<EmbeddingVector>> {
        let model = EmbeddingModelName::parse(model_name)?;
        self.embed_with(texts, model)
    }

    /// Same as [`Embedder::embed`] with an already-parsed model name.
    pub fn embed_with(
        &self,
        texts: &[&str],
        model: EmbeddingModelName,
    ) -> RagResult<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let backend = self.cache.get(model)?;
        let dimension = backend.dimension();
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let raw = backend.embed_raw(batch)?;
            if raw.len() != batch.len() {
                return Err(RagError::Embedding {
                    model: model.to_string(),
                    reason: format!(
                        "backend returned {} vectors for {} texts",
                        raw.len(),
                        batch.len()
                    ),
                });
            }

            for mut vector in raw {
                dimension.validate_vector(&vector, vectors.len())?;
                normalize(&mut vector);
                vectors.push(vector);
            }
        }

        tracing::debug!(
            target: "embedding",
            model = %model,
            count = vectors.len(),
            "embedded texts"
        );
        Ok(vectors)
    }

    /// Embed a single query string.
    pub fn embed_query(&self, query: &str, model: EmbeddingModelName) -> RagResult<EmbeddingVector> {
        self.embed_with(&[query], model)?
            .pop()
            .ok_or_else(|| RagError::Embedding {
                model: model.to_string(),
                reason: "no vector returned for query".to_string(),
            })
    }

    /// Load (or reuse) the model and report its identity.
    pub fn model_info(&self, model: EmbeddingModelName) -> RagResult<ModelInfo> {
        let backend = self.cache.get(model)?;
        Ok(ModelInfo::new(model, backend.dimension()))
    }
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
