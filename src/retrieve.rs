//! Query-time retrieval against the active index generation.

use crate::corpus::Chunk;
use crate::error::{RagError, RagResult};
use crate::vector::{Embedder, EmbeddingModelName, IndexStore, VectorIndex};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Default bound on loading an index generation from disk.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Loads attempted when `CURRENT` keeps moving under a query.
const MAX_LOAD_ATTEMPTS: usize = 3;

/// One ranked chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub score: f32,
    pub meta: Chunk,
}

type LoadedSlot = RwLock<Option<Arc<VectorIndex>>>;

/// One in-flight generation load that every interested query waits on.
struct PendingLoad {
    generation: String,
    outcome: Mutex<Option<RagResult<Arc<VectorIndex>>>>,
    done: Condvar,
}

/// Answers queries from whatever generation `CURRENT` names.
///
/// The loaded index is shared through `Arc`; a newer generation is swapped in
/// on the next query after it is published, while queries already running
/// finish against the index they started with. A generation is read from
/// disk once no matter how many queries ask for it, and a load that outlives
/// its caller's timeout is still swapped in when it completes.
pub struct Retriever {
    embedder: Embedder,
    store: IndexStore,
    loaded: Arc<LoadedSlot>,
    pending: Arc<Mutex<Option<Arc<PendingLoad>>>>,
    loads: Arc<AtomicUsize>,
    load_timeout: Option<Duration>,
}

impl Retriever {
    pub fn new(embedder: Embedder, store: IndexStore) -> Self {
        Self {
            embedder,
            store,
            loaded: Arc::new(RwLock::new(None)),
            pending: Arc::new(Mutex::new(None)),
            loads: Arc::new(AtomicUsize::new(0)),
            load_timeout: Some(DEFAULT_LOAD_TIMEOUT),
        }
    }

    /// Bound index loads. `None` waits indefinitely.
    #[must_use]
    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Top `top_k` chunks for `query`, best first.
    pub fn retrieve(
        &self,
        query: &str,
        model_name: &str,
        top_k: usize,
    ) -> RagResult<Vec<RetrievalResult>> {
        if query.trim().is_empty() {
            return Err(RagError::invalid_argument("query must not be empty"));
        }
        if top_k == 0 {
            return Err(RagError::invalid_argument("top_k must be at least 1"));
        }
        let model = EmbeddingModelName::parse(model_name)?;

        let index = self.current_index()?;
        let index_model = index.model().name;
        if index_model != model {
            return Err(RagError::ModelMismatch {
                index_model: index_model.to_string(),
                requested: model.to_string(),
            });
        }

        let query_vector = self.embedder.embed_query(query, model)?;
        let hits = index.search(&query_vector, top_k)?;

        let results = hits
            .into_iter()
            .map(|hit| {
                index
                    .chunk(hit.position)
                    .map(|meta| RetrievalResult {
                        score: hit.score,
                        meta: meta.clone(),
                    })
                    .ok_or_else(|| {
                        RagError::corrupted(
                            self.store.root(),
                            format!("search returned position {} past the metadata", hit.position),
                        )
                    })
            })
            .collect::<RagResult<Vec<_>>>()?;

        tracing::debug!(
            target: "retrieve",
            top_k,
            returned = results.len(),
            best = results.first().map(|r| r.score),
            "retrieved chunks"
        );
        Ok(results)
    }

    /// Load the active generation unconditionally and swap it in.
    ///
    /// Returns the generation now loaded, or `None` when nothing is persisted.
    pub fn reload(&self) -> RagResult<Option<String>> {
        let Some(generation) = self.store.current_generation()? else {
            *self.loaded.write() = None;
            return Ok(None);
        };
        self.load_shared(&generation, true)?;
        Ok(Some(generation))
    }

    /// Number of generation loads started from disk.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Generation currently held in memory.
    pub fn loaded_generation(&self) -> Option<String> {
        self.loaded
            .read()
            .as_ref()
            .and_then(|index| index.generation().map(str::to_string))
    }

    fn current_index(&self) -> RagResult<Arc<VectorIndex>> {
        let mut attempt = 1;
        loop {
            let Some(generation) = self.store.current_generation()? else {
                return Err(RagError::IndexNotBuilt {
                    path: self.store.root().to_path_buf(),
                });
            };

            if let Some(index) = loaded_if(&self.loaded, &generation) {
                return Ok(index);
            }

            // Loaded outside the lock so queries on the old generation keep going.
            match self.load_shared(&generation, false) {
                Ok(index) => return Ok(index),
                // A newer publish may have pruned the generation mid-load.
                Err(e) if attempt < MAX_LOAD_ATTEMPTS
                    && self.store.current_generation()?.as_deref() != Some(generation.as_str()) =>
                {
                    tracing::debug!(
                        target: "retrieve",
                        generation = %generation,
                        error = %e,
                        "generation replaced while loading, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Load `generation`, joining a load of the same generation already in
    /// flight. `force` skips the check for an already loaded copy.
    fn load_shared(&self, generation: &str, force: bool) -> RagResult<Arc<VectorIndex>> {
        let (pending, fresh) = {
            let mut slot = self.pending.lock();
            if let Some(pending) = slot.as_ref().filter(|p| p.generation == generation) {
                (Arc::clone(pending), false)
            } else {
                // A load that finished just before we took the lock has
                // already swapped its index in.
                if !force && let Some(index) = loaded_if(&self.loaded, generation) {
                    return Ok(index);
                }
                let pending = Arc::new(PendingLoad {
                    generation: generation.to_string(),
                    outcome: Mutex::new(None),
                    done: Condvar::new(),
                });
                *slot = Some(Arc::clone(&pending));
                (pending, true)
            }
        };

        if fresh {
            self.start_load(&pending);
        }
        self.wait_for(&pending)
    }

    fn start_load(&self, pending: &Arc<PendingLoad>) {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let task = LoadTask {
            store: self.store.clone(),
            loaded: Arc::clone(&self.loaded),
            pending_slot: Arc::clone(&self.pending),
            pending: Arc::clone(pending),
        };

        if self.load_timeout.is_none() {
            task.run();
            return;
        }

        let spawned = std::thread::Builder::new()
            .name("index-load".to_string())
            .spawn(move || task.run());
        if let Err(e) = spawned {
            finish(&self.pending, pending, Err(RagError::storage(self.store.root(), e)));
        }
    }

    fn wait_for(&self, pending: &PendingLoad) -> RagResult<Arc<VectorIndex>> {
        let deadline = self.load_timeout.map(|timeout| Instant::now() + timeout);
        let mut outcome = pending.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            match (deadline, self.load_timeout) {
                (Some(deadline), Some(timeout)) => {
                    if pending.done.wait_until(&mut outcome, deadline).timed_out()
                        && outcome.is_none()
                    {
                        tracing::warn!(
                            target: "retrieve",
                            generation = %pending.generation,
                            timeout_ms = timeout.as_millis() as u64,
                            "index load timed out, leaving it to finish in the background"
                        );
                        return Err(RagError::Timeout {
                            operation: format!(
                                "loading index generation '{}'",
                                pending.generation
                            ),
                            timeout,
                        });
                    }
                }
                _ => pending.done.wait(&mut outcome),
            }
        }
    }
}

/// Everything a load needs to finish without the `Retriever` that started it.
struct LoadTask {
    store: IndexStore,
    loaded: Arc<LoadedSlot>,
    pending_slot: Arc<Mutex<Option<Arc<PendingLoad>>>>,
    pending: Arc<PendingLoad>,
}

impl LoadTask {
    fn run(self) {
        let outcome = self
            .store
            .load_generation(&self.pending.generation)
            .map(|index| swap(&self.store, &self.loaded, index));
        finish(&self.pending_slot, &self.pending, outcome);
    }
}

fn finish(
    pending_slot: &Mutex<Option<Arc<PendingLoad>>>,
    pending: &Arc<PendingLoad>,
    outcome: RagResult<Arc<VectorIndex>>,
) {
    *pending.outcome.lock() = Some(outcome);
    pending.done.notify_all();

    let mut slot = pending_slot.lock();
    if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, pending)) {
        *slot = None;
    }
}

fn loaded_if(loaded: &LoadedSlot, generation: &str) -> Option<Arc<VectorIndex>> {
    loaded
        .read()
        .as_ref()
        .filter(|index| index.generation() == Some(generation))
        .map(Arc::clone)
}

/// Install `index` unless the slot already holds the generation `CURRENT`
/// names and `index` is not it. A slow load of a superseded generation never
/// replaces the active one, whatever order the names sort in.
fn swap(store: &IndexStore, loaded: &LoadedSlot, index: VectorIndex) -> Arc<VectorIndex> {
    let index = Arc::new(index);
    let mut slot = loaded.write();
    if let Ok(Some(active)) = store.current_generation()
        && index.generation() != Some(active.as_str())
        && slot
            .as_ref()
            .is_some_and(|current| current.generation() == Some(active.as_str()))
    {
        return index;
    }
    let previous = slot
        .replace(Arc::clone(&index))
        .and_then(|old| old.generation().map(str::to_string));
    drop(slot);

    tracing::info!(
        target: "retrieve",
        generation = index.generation().unwrap_or_default(),
        previous = previous.as_deref().unwrap_or("none"),
        vectors = index.len(),
        "swapped in index generation"
    );
    index
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("store", &self.store)
            .field("loaded_generation", &self.loaded_generation())
            .finish_non_exhaustive()
    }
}
