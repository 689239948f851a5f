//! On-disk index generations.
//!
//! # Layout
//!
//! ```text
//! index_path/
//!   CURRENT                      name of the active generation
//!   gen-20261018T101500.123456Z/
//!     vectors.vec                header + row-major f32 vectors
//!     meta.json                  [{url, title, text}, ...] by position
//!     manifest.json              model, counts, metadata checksum
//! ```
//!
//! # Vector file format
//!
//! - Header (16 bytes): magic `RVEC`, format version, dimension, vector count,
//!   each a little-endian u32
//! - Vectors: `count * dimension` little-endian f32 values, position implicit
//!
//! A generation is written into a staging directory, synced, renamed into
//! place and only then published by atomically replacing `CURRENT`. Readers
//! therefore see either the old generation or the new one, never a mix.

use crate::corpus::Chunk;
use crate::error::{RagError, RagResult};
use crate::vector::{EmbeddingModelName, ModelInfo, VectorDimension, VectorIndex};
use chrono::Utc;
use memmap2::MmapOptions;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Pointer file naming the active generation.
pub const CURRENT_FILE: &str = "CURRENT";
pub const VECTORS_FILE: &str = "vectors.vec";
pub const METADATA_FILE: &str = "meta.json";
pub const MANIFEST_FILE: &str = "manifest.json";

const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";

/// Current vector file format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the vector file header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify vector files.
const MAGIC_BYTES: &[u8; 4] = b"RVEC";

const BYTES_PER_F32: usize = 4;

/// Generations kept on disk after a persist, the active one included.
const DEFAULT_RETAINED_GENERATIONS: usize = 2;

/// Description of one persisted generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Version of the manifest format
    pub version: u32,

    /// Name of the embedding model that produced the vectors
    pub model_name: String,

    pub dimension: usize,

    pub vector_count: usize,

    /// Hex SHA-256 of `meta.json`
    pub metadata_sha256: String,

    /// RFC 3339 creation time
    pub created_at: String,
}

impl IndexManifest {
    const CURRENT_VERSION: u32 = 1;

    fn new(model: ModelInfo, vector_count: usize, metadata_sha256: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            model_name: model.name.to_string(),
            dimension: model.dimension.get(),
            vector_count,
            metadata_sha256,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Reads and writes index generations under one root directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
    retained_generations: usize,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retained_generations: DEFAULT_RETAINED_GENERATIONS,
        }
    }

    /// How many generations survive pruning; at least one.
    #[must_use]
    pub fn with_retained_generations(mut self, count: usize) -> Self {
        self.retained_generations = count.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the active generation, or `None` if nothing was persisted yet.
    pub fn current_generation(&self) -> RagResult<Option<String>> {
        let pointer = self.root.join(CURRENT_FILE);
        let contents = match std::fs::read_to_string(&pointer) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RagError::storage(pointer, e)),
        };

        let name = contents.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(RagError::corrupted(pointer, "CURRENT does not name a generation"));
        }
        Ok(Some(name.to_string()))
    }

    /// Manifest of the active generation without loading vectors.
    pub fn current_manifest(&self) -> RagResult<Option<IndexManifest>> {
        match self.current_generation()? {
            Some(generation) => self.read_manifest(&self.root.join(generation)).map(Some),
            None => Ok(None),
        }
    }

    /// Write `index` as a new generation and make it the active one.
    ///
    /// Returns the generation name. On error the previously active
    /// generation stays active.
    pub fn persist(&self, index: &VectorIndex) -> RagResult<String> {
        std::fs::create_dir_all(&self.root).map_err(|e| RagError::storage(&self.root, e))?;

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|e| RagError::storage(&self.root, e))?;

        write_vectors(&staging.path().join(VECTORS_FILE), index)?;

        let metadata_path = staging.path().join(METADATA_FILE);
        let metadata = serde_json::to_vec(index.chunks()).map_err(|e| RagError::Serialization {
            path: metadata_path.clone(),
            source: e,
        })?;
        write_synced(&metadata_path, &metadata)?;

        let manifest = IndexManifest::new(index.model(), index.len(), sha256_hex(&metadata));
        let manifest_path = staging.path().join(MANIFEST_FILE);
        let manifest_json =
            serde_json::to_vec_pretty(&manifest).map_err(|e| RagError::Serialization {
                path: manifest_path.clone(),
                source: e,
            })?;
        write_synced(&manifest_path, &manifest_json)?;
        sync_dir(staging.path());

        let generation = self.next_generation_name();
        let generation_dir = self.root.join(&generation);
        std::fs::rename(staging.path(), &generation_dir)
            .map_err(|e| RagError::storage(&generation_dir, e))?;
        // The staging path no longer exists; dropping the guard is a no-op.
        drop(staging);
        sync_dir(&self.root);

        if let Err(e) = self.publish(&generation) {
            if let Err(cleanup) = std::fs::remove_dir_all(&generation_dir) {
                tracing::warn!(
                    target: "index",
                    generation = %generation,
                    error = %cleanup,
                    "failed to remove unpublished generation"
                );
            }
            return Err(e);
        }

        tracing::info!(
            target: "index",
            generation = %generation,
            vectors = index.len(),
            dimension = index.dimension().get(),
            model = %index.model().name,
            "published index generation"
        );

        self.prune(&generation);
        Ok(generation)
    }

    /// Load the active generation, or `None` when nothing was persisted.
    pub fn load(&self) -> RagResult<Option<VectorIndex>> {
        let Some(generation) = self.current_generation()? else {
            return Ok(None);
        };
        self.load_generation(&generation).map(Some)
    }

    /// Load a specific generation by name.
    pub fn load_generation(&self, generation: &str) -> RagResult<VectorIndex> {
        let dir = self.root.join(generation);
        if !dir.is_dir() {
            return Err(RagError::corrupted(
                &dir,
                format!("CURRENT points at missing generation '{generation}'"),
            ));
        }

        let manifest = self.read_manifest(&dir)?;
        if manifest.version > IndexManifest::CURRENT_VERSION {
            return Err(RagError::corrupted(
                dir.join(MANIFEST_FILE),
                format!(
                    "manifest version {} is newer than supported version {}",
                    manifest.version,
                    IndexManifest::CURRENT_VERSION
                ),
            ));
        }

        let name = EmbeddingModelName::parse(&manifest.model_name).map_err(|_| {
            RagError::corrupted(
                dir.join(MANIFEST_FILE),
                format!("unknown embedding model '{}'", manifest.model_name),
            )
        })?;
        let dimension = VectorDimension::new(manifest.dimension).map_err(|_| {
            RagError::corrupted(dir.join(MANIFEST_FILE), "manifest dimension is zero")
        })?;

        let vectors = read_vectors(&dir.join(VECTORS_FILE), dimension, manifest.vector_count)?;
        let chunks = read_metadata(&dir.join(METADATA_FILE), &manifest)?;

        tracing::debug!(
            target: "index",
            generation,
            vectors = chunks.len(),
            "loaded index generation"
        );
        VectorIndex::from_flat(
            ModelInfo::new(name, dimension),
            vectors,
            chunks,
            generation.to_string(),
        )
    }

    /// Generation directory names, oldest first.
    pub fn list_generations(&self) -> RagResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RagError::storage(&self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RagError::storage(&self.root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(GENERATION_PREFIX) && entry.path().is_dir() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_manifest(&self, dir: &Path) -> RagResult<IndexManifest> {
        let path = dir.join(MANIFEST_FILE);
        let json = std::fs::read(&path).map_err(|e| RagError::storage(&path, e))?;
        serde_json::from_slice(&json)
            .map_err(|e| RagError::corrupted(&path, format!("unreadable manifest: {e}")))
    }

    fn next_generation_name(&self) -> String {
        let base = format!(
            "{GENERATION_PREFIX}{}",
            Utc::now().format("%Y%m%dT%H%M%S%.6fZ")
        );
        if !self.root.join(&base).exists() {
            return base;
        }
        (1..)
            .map(|n| format!("{base}-{n}"))
            .find(|name| !self.root.join(name).exists())
            .unwrap_or(base)
    }

    fn publish(&self, generation: &str) -> RagResult<()> {
        let pointer = self.root.join(CURRENT_FILE);
        let mut tmp = tempfile::Builder::new()
            .prefix("CURRENT.")
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(|e| RagError::storage(&self.root, e))?;
        writeln!(tmp, "{generation}").map_err(|e| RagError::storage(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| RagError::storage(tmp.path(), e))?;
        tmp.persist(&pointer)
            .map_err(|e| RagError::storage(&pointer, e.error))?;
        sync_dir(&self.root);
        Ok(())
    }

    /// Remove generations beyond the retention count. Never fails the caller.
    fn prune(&self, active: &str) {
        let generations = match self.list_generations() {
            Ok(generations) => generations,
            Err(e) => {
                tracing::warn!(target: "index", error = %e, "could not list generations to prune");
                return;
            }
        };

        let keep = self.retained_generations;
        let stale = generations.len().saturating_sub(keep);
        for name in generations.iter().take(stale).filter(|n| n.as_str() != active) {
            let path = self.root.join(name);
            match std::fs::remove_dir_all(&path) {
                Ok(()) => tracing::debug!(target: "index", generation = %name, "pruned generation"),
                Err(e) => tracing::warn!(
                    target: "index",
                    generation = %name,
                    error = %e,
                    "failed to prune old generation"
                ),
            }
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn write_synced(path: &Path, bytes: &[u8]) -> RagResult<()> {
    let mut file = File::create(path).map_err(|e| RagError::storage(path, e))?;
    file.write_all(bytes).map_err(|e| RagError::storage(path, e))?;
    file.sync_all().map_err(|e| RagError::storage(path, e))
}

fn write_vectors(path: &Path, index: &VectorIndex) -> RagResult<()> {
    let io = |e| RagError::storage(path, e);
    let file = File::create(path).map_err(io)?;
    let mut writer = BufWriter::new(file);

    let dimension = u32::try_from(index.dimension().get())
        .map_err(|_| RagError::invalid_argument("dimension does not fit the vector file header"))?;
    let count = u32::try_from(index.len())
        .map_err(|_| RagError::invalid_argument("too many vectors for the vector file header"))?;

    writer.write_all(MAGIC_BYTES).map_err(io)?;
    writer.write_all(&STORAGE_VERSION.to_le_bytes()).map_err(io)?;
    writer.write_all(&dimension.to_le_bytes()).map_err(io)?;
    writer.write_all(&count.to_le_bytes()).map_err(io)?;
    for value in index.as_flat() {
        writer.write_all(&value.to_le_bytes()).map_err(io)?;
    }

    let file = writer.into_inner().map_err(|e| io(e.into_error()))?;
    file.sync_all().map_err(io)
}

fn read_vectors(path: &Path, dimension: VectorDimension, expected: usize) -> RagResult<Vec<f32>> {
    let file = File::open(path).map_err(|e| RagError::storage(path, e))?;
    let len = file.metadata().map_err(|e| RagError::storage(path, e))?.len() as usize;
    if len < HEADER_SIZE {
        return Err(RagError::corrupted(path, "vector file is shorter than its header"));
    }

    // SAFETY: generations are immutable once published; nothing writes this file.
    let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| RagError::storage(path, e))?;

    if &mmap[0..4] != MAGIC_BYTES {
        return Err(RagError::corrupted(path, "bad magic bytes"));
    }
    let read_u32 = |offset: usize| {
        u32::from_le_bytes([
            mmap[offset],
            mmap[offset + 1],
            mmap[offset + 2],
            mmap[offset + 3],
        ]) as usize
    };
    let version = read_u32(4) as u32;
    let file_dimension = read_u32(8);
    let count = read_u32(12);

    if version != STORAGE_VERSION {
        return Err(RagError::corrupted(
            path,
            format!("unsupported vector file version {version}, expected {STORAGE_VERSION}"),
        ));
    }
    if file_dimension != dimension.get() {
        return Err(RagError::corrupted(
            path,
            format!("vector file dimension {file_dimension} does not match manifest {dimension}"),
        ));
    }
    if count != expected {
        return Err(RagError::corrupted(
            path,
            format!("vector file holds {count} vectors, manifest expects {expected}"),
        ));
    }

    let expected_bytes = count
        .checked_mul(dimension.get())
        .and_then(|n| n.checked_mul(BYTES_PER_F32))
        .ok_or_else(|| {
            RagError::corrupted(
                path,
                format!("{count} vectors of dimension {dimension} overflow the address space"),
            )
        })?;
    let body = &mmap[HEADER_SIZE..];
    if body.len() != expected_bytes {
        return Err(RagError::corrupted(
            path,
            format!("vector data is {} bytes, expected {expected_bytes}", body.len()),
        ));
    }

    Ok(body
        .chunks_exact(BYTES_PER_F32)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn read_metadata(path: &Path, manifest: &IndexManifest) -> RagResult<Vec<Chunk>> {
    let bytes = std::fs::read(path).map_err(|e| RagError::storage(path, e))?;
    if sha256_hex(&bytes) != manifest.metadata_sha256 {
        return Err(RagError::corrupted(path, "metadata checksum mismatch"));
    }

    let chunks: Vec<Chunk> = serde_json::from_slice(&bytes)
        .map_err(|e| RagError::corrupted(path, format!("unreadable metadata: {e}")))?;
    if chunks.len() != manifest.vector_count {
        return Err(RagError::corrupted(
            path,
            format!(
                "{} metadata records for {} vectors",
                chunks.len(),
                manifest.vector_count
            ),
        ));
    }
    Ok(chunks)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(target: "index", dir = %dir.display(), error = %e, "directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::normalize;
    use tempfile::TempDir;

    fn sample_index(rows: usize) -> VectorIndex {
        let model = ModelInfo::new(
            EmbeddingModelName::AllMiniLmL6V2,
            VectorDimension::dimension_384(),
        );
        let vectors = (0..rows)
            .map(|i| {
                let mut v: Vec<f32> = (0..384).map(|j| ((i * 31 + j) % 17) as f32).collect();
                normalize(&mut v);
                v
            })
            .collect();
        let chunks = (0..rows)
            .map(|i| Chunk::new(format!("https://jiopay.com/{i}"), format!("Page {i}"), format!("Body {i}")))
            .collect();
        VectorIndex::from_parts(model, vectors, chunks).unwrap()
    }

    #[test]
    fn test_missing_index_loads_none() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("index"));
        assert!(store.load().unwrap().is_none());
        assert!(store.current_generation().unwrap().is_none());
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let index = sample_index(5);

        let generation = store.persist(&index).unwrap();
        assert_eq!(store.current_generation().unwrap().as_deref(), Some(generation.as_str()));

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded.generation(), Some(generation.as_str()));
        assert_eq!(loaded.as_flat(), index.as_flat());
        assert_eq!(loaded.chunks(), index.chunks());
        assert_eq!(loaded.model(), index.model());
    }

    #[test]
    fn test_metadata_file_is_plain_array() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let generation = store.persist(&sample_index(2)).unwrap();

        let raw = std::fs::read_to_string(tmp.path().join(&generation).join(METADATA_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[1]["url"], "https://jiopay.com/1");
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_index_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        store.persist(&sample_index(0)).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimension().get(), 384);
    }

    #[test]
    fn test_new_generation_replaces_current_and_prunes() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path()).with_retained_generations(2);

        let first = store.persist(&sample_index(1)).unwrap();
        let second = store.persist(&sample_index(2)).unwrap();
        let third = store.persist(&sample_index(3)).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.current_generation().unwrap().as_deref(), Some(third.as_str()));
        assert_eq!(store.load().unwrap().unwrap().len(), 3);

        let generations = store.list_generations().unwrap();
        assert_eq!(generations, [second, third]);
    }

    #[test]
    fn test_no_staging_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        store.persist(&sample_index(1)).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(STAGING_PREFIX) || n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "leftovers: {leftovers:?}");
    }

    #[test]
    fn test_dangling_pointer_is_corrupted() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CURRENT_FILE), "gen-missing\n").unwrap();
        let store = IndexStore::new(tmp.path());
        assert!(matches!(store.load(), Err(RagError::IndexCorrupted { .. })));
    }

    #[test]
    fn test_tampered_metadata_is_corrupted() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let generation = store.persist(&sample_index(2)).unwrap();

        std::fs::write(tmp.path().join(&generation).join(METADATA_FILE), "[]").unwrap();
        match store.load() {
            Err(RagError::IndexCorrupted { reason, .. }) => assert!(reason.contains("checksum")),
            other => panic!("Expected IndexCorrupted, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_magic_is_corrupted() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let generation = store.persist(&sample_index(1)).unwrap();

        let path = tmp.path().join(&generation).join(VECTORS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0..4].copy_from_slice(b"XXXX");
        std::fs::write(&path, bytes).unwrap();

        match store.load() {
            Err(RagError::IndexCorrupted { reason, .. }) => assert!(reason.contains("magic")),
            other => panic!("Expected IndexCorrupted, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_vectors_are_corrupted() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let generation = store.persist(&sample_index(2)).unwrap();

        let path = tmp.path().join(&generation).join(VECTORS_FILE);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

        assert!(matches!(store.load(), Err(RagError::IndexCorrupted { .. })));
    }

    #[test]
    fn test_unknown_model_in_manifest_is_corrupted() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let generation = store.persist(&sample_index(1)).unwrap();

        let path = tmp.path().join(&generation).join(MANIFEST_FILE);
        let mut manifest: IndexManifest =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        manifest.model_name = "bert-base".to_string();
        std::fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        assert!(matches!(store.load(), Err(RagError::IndexCorrupted { .. })));
    }

    #[test]
    fn test_oversized_header_is_corrupted() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let generation = store.persist(&sample_index(1)).unwrap();
        let dir = tmp.path().join(&generation);

        let manifest_path = dir.join(MANIFEST_FILE);
        let mut manifest: IndexManifest =
            serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
        manifest.dimension = u32::MAX as usize;
        manifest.vector_count = u32::MAX as usize;
        std::fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        let vectors_path = dir.join(VECTORS_FILE);
        let mut bytes = std::fs::read(&vectors_path).unwrap();
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&vectors_path, bytes).unwrap();

        match store.load() {
            Err(RagError::IndexCorrupted { reason, .. }) => {
                assert!(reason.contains("overflow"), "reason was: {reason}")
            }
            other => panic!("Expected IndexCorrupted, got {other:?}"),
        }
    }

    #[test]
    fn test_manifest_records_model() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        store.persist(&sample_index(3)).unwrap();

        let manifest = store.current_manifest().unwrap().unwrap();
        assert_eq!(manifest.model_name, "all-MiniLM-L6-v2");
        assert_eq!(manifest.dimension, 384);
        assert_eq!(manifest.vector_count, 3);
        assert_eq!(manifest.metadata_sha256.len(), 64);
    }
}
