//! Corpus → embeddings → published index generation.

use crate::corpus::{Chunk, Chunker, chunk_documents, load_documents};
use crate::display::create_progress_bar;
use crate::error::{RagError, RagResult};
use crate::vector::{
    DEFAULT_BATCH_SIZE, Embedder, EmbeddingModelName, IndexStore, IndexedChunk, ModelInfo,
    VectorIndex,
};
use indicatif::ProgressBar;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub generation: String,
    pub chunk_count: usize,
    pub dimension: usize,
    pub model: EmbeddingModelName,
    pub elapsed: Duration,
}

/// Builds indexes and publishes them through an [`IndexStore`].
///
/// One builder per process, shared by `Arc`. Builds run one at a time; a
/// second caller waits for the first to finish.
pub struct IndexBuilder {
    embedder: Embedder,
    store: IndexStore,
    batch_size: usize,
    show_progress: bool,
    build_lock: Mutex<()>,
}

impl IndexBuilder {
    pub fn new(embedder: Embedder, store: IndexStore) -> Self {
        Self {
            embedder,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
            build_lock: Mutex::new(()),
        }
    }

    /// Texts per embedding call; also the progress bar granularity.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Embed `chunks` with `model_name` and publish them as a new generation.
    ///
    /// An empty `chunks` still produces a valid, empty generation whose
    /// dimension comes from the loaded model.
    pub fn build_index(&self, chunks: Vec<Chunk>, model_name: &str) -> RagResult<BuildReport> {
        let model = EmbeddingModelName::parse(model_name)?;
        let _guard = self.build_lock.lock();
        let started = Instant::now();

        tracing::info!(
            target: "index",
            chunks = chunks.len(),
            model = %model,
            "building index"
        );
        if chunks.is_empty() {
            tracing::warn!(target: "index", "corpus produced no chunks, publishing an empty index");
        }

        let model_info = self.embedder.model_info(model)?;
        let progress = self
            .show_progress
            .then(|| create_progress_bar(chunks.len() as u64, "Embedding chunks"));

        let chunk_count = chunks.len();
        let published = self.embed_and_publish(chunks, model_info, progress.as_ref());
        if let Some(pb) = &progress {
            settle_progress(pb, &published, chunk_count);
        }
        let generation = published?;

        let report = BuildReport {
            generation,
            chunk_count,
            dimension: model_info.dimension.get(),
            model,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            target: "index",
            generation = %report.generation,
            chunks = report.chunk_count,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "index build complete"
        );
        Ok(report)
    }

    /// Load pages from `data_dir`, chunk them and build.
    pub fn build_from_corpus(
        &self,
        data_dir: &Path,
        chunker: &Chunker,
        model_name: &str,
    ) -> RagResult<BuildReport> {
        // Fail fast on a bad name before reading the corpus.
        EmbeddingModelName::parse(model_name)?;

        let documents = load_documents(data_dir)?;
        let chunks = chunk_documents(&documents, chunker);
        tracing::info!(
            target: "index",
            documents = documents.len(),
            chunks = chunks.len(),
            "chunked corpus"
        );
        self.build_index(chunks, model_name)
    }

    /// Everything after the model is known; any failure leaves the active
    /// generation untouched.
    fn embed_and_publish(
        &self,
        chunks: Vec<Chunk>,
        model_info: ModelInfo,
        progress: Option<&ProgressBar>,
    ) -> RagResult<String> {
        let vectors = self.embed_chunks(&chunks, model_info.name, progress)?;
        if vectors.len() != chunks.len() {
            return Err(RagError::LengthMismatch {
                vectors: vectors.len(),
                records: chunks.len(),
            });
        }

        let records = vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| IndexedChunk::new(vector, chunk))
            .collect();
        let index = VectorIndex::build(model_info, records)?;
        self.store.persist(&index)
    }

    fn embed_chunks(
        &self,
        chunks: &[Chunk],
        model: EmbeddingModelName,
        progress: Option<&ProgressBar>,
    ) -> RagResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            vectors.extend(self.embedder.embed_with(&texts, model)?);
            if let Some(pb) = progress {
                pb.inc(batch.len() as u64);
            }
            tracing::debug!(target: "index", batch = batch_no, size = batch.len(), "embedded batch");
        }
        Ok(vectors)
    }
}

fn settle_progress<T>(pb: &ProgressBar, outcome: &RagResult<T>, chunk_count: usize) {
    match outcome {
        Ok(_) => pb.finish_with_message(format!("Indexed {chunk_count} chunks")),
        Err(_) => pb.abandon_with_message("Index build failed"),
    }
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("store", &self.store)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
