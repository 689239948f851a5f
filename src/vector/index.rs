//! Exact inner-product index over normalized vectors.
//!
//! Vectors live in one row-major `f32` buffer; row `i` belongs to chunk `i`.
//! The pairing is established once at construction and never changes, since
//! an index is immutable after it is built or loaded.

use crate::corpus::Chunk;
use crate::error::{RagError, RagResult};
use crate::vector::{EmbeddingVector, ModelInfo, SearchHit, VectorDimension, inner_product};
use rayon::prelude::*;
use std::cmp::Ordering;

/// A vector and the chunk it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub vector: EmbeddingVector,
    pub chunk: Chunk,
}

impl IndexedChunk {
    pub fn new(vector: EmbeddingVector, chunk: Chunk) -> Self {
        Self { vector, chunk }
    }
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: ModelInfo,
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
    generation: Option<String>,
}

impl VectorIndex {
    /// Build from paired records, checking every vector's dimension.
    pub fn build(model: ModelInfo, records: Vec<IndexedChunk>) -> RagResult<Self> {
        let dim = model.dimension;
        let mut vectors = Vec::with_capacity(records.len() * dim.get());
        let mut chunks = Vec::with_capacity(records.len());

        for (position, record) in records.into_iter().enumerate() {
            dim.validate_vector(&record.vector, position)?;
            vectors.extend_from_slice(&record.vector);
            chunks.push(record.chunk);
        }

        Ok(Self {
            model,
            vectors,
            chunks,
            generation: None,
        })
    }

    /// Build from separate vector and metadata sequences.
    pub fn from_parts(
        model: ModelInfo,
        vectors: Vec<EmbeddingVector>,
        chunks: Vec<Chunk>,
    ) -> RagResult<Self> {
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
        Self::build(model, records)
    }

    /// Wrap an already-flattened buffer read back from disk.
    pub(crate) fn from_flat(
        model: ModelInfo,
        vectors: Vec<f32>,
        chunks: Vec<Chunk>,
        generation: String,
    ) -> RagResult<Self> {
        let dim = model.dimension.get();
        if vectors.len() != chunks.len() * dim {
            return Err(RagError::LengthMismatch {
                vectors: vectors.len() / dim,
                records: chunks.len(),
            });
        }
        Ok(Self {
            model,
            vectors,
            chunks,
            generation: Some(generation),
        })
    }

    /// Top `top_k` rows by descending inner product with `query`.
    ///
    /// Equal scores keep ascending position order. Returns fewer than `top_k`
    /// hits when the index is smaller, and none when it is empty.
    pub fn search(&self, query: &[f32], top_k: usize) -> RagResult<Vec<SearchHit>> {
        self.model.dimension.validate_vector(query, 0)?;
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .par_chunks_exact(self.model.dimension.get())
            .enumerate()
            .map(|(position, row)| SearchHit {
                score: inner_product(row, query),
                position,
            })
            .collect();

        let k = top_k.min(hits.len());
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank);
            hits.truncate(k);
        }
        hits.sort_unstable_by(rank);
        Ok(hits)
    }

    pub fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let dim = self.model.dimension.get();
        let start = position.checked_mul(dim)?;
        self.vectors.get(start..start + dim)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Row-major vector buffer.
    pub fn as_flat(&self) -> &[f32] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> VectorDimension {
        self.model.dimension
    }

    pub fn model(&self) -> ModelInfo {
        self.model
    }

    /// Generation this index was loaded from or persisted as.
    pub fn generation(&self) -> Option<&str> {
        self.generation.as_deref()
    }

    pub(crate) fn set_generation(&mut self, generation: String) {
        self.generation = Some(generation);
    }
}

fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}
