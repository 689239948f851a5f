//! Retrieval-augmented answering over a fixed support-site corpus.
//!
//! Scraped pages are chunked, embedded and published as immutable index
//! generations; queries are embedded with the same model and answered from
//! the nearest chunks.

pub mod answer;
pub mod config;
pub mod corpus;
pub mod display;
pub mod error;
pub mod indexing;
pub mod io;
pub mod retrieve;
#[cfg(feature = "http-server")]
pub mod server;
pub mod vector;

// Explicit exports for better API clarity
pub use answer::{
    AnswerGenerator, ExtractiveAnswerer, PromptConfig, PromptedAnswerer, TextGenerator, build_prompt,
};
pub use config::Settings;
pub use corpus::{Chunk, Chunker, ChunkerConfig, Document, chunk_documents, load_documents};
pub use error::{RagError, RagResult};
pub use indexing::{BuildReport, IndexBuilder};
pub use retrieve::{RetrievalResult, Retriever};
pub use vector::{
    Embedder, EmbeddingBackend, EmbeddingModelName, FastEmbedLoader, IndexManifest, IndexStore,
    ModelCache, ModelLoader, VectorIndex,
};
