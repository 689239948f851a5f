//! Embedding and vector search.
//!
//! Text goes in through [`Embedder`], which resolves model names through a
//! shared [`ModelCache`]. Vectors and their chunks are held together in a
//! [`VectorIndex`] and written to disk as immutable generations by
//! [`IndexStore`].
//!
//! # Architecture
//! Search is exact: every row is scored against the query with an inner
//! product, in parallel. Vectors are unit length, so scores are cosine
//! similarities. Corpora here are a few thousand chunks, well within what a
//! flat scan handles in milliseconds.

mod cache;
mod embedding;
mod index;
mod model;
mod storage;
mod types;

pub use cache::ModelCache;
#[cfg(test)]
pub use embedding::testing;
pub use embedding::{
    DEFAULT_BATCH_SIZE, Embedder, EmbeddingBackend, FastEmbedBackend, FastEmbedLoader,
    ModelLoader,
};
pub use index::{IndexedChunk, VectorIndex};
pub use model::{EmbeddingModelName, ModelInfo};
pub use storage::{
    CURRENT_FILE, IndexManifest, IndexStore, MANIFEST_FILE, METADATA_FILE, VECTORS_FILE,
};
pub use types::{
    EmbeddingVector, NORM_EPSILON, SearchHit, VECTOR_DIMENSION_384, VECTOR_DIMENSION_1024,
    VectorDimension, inner_product, normalize,
};
