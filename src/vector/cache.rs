//! Process-wide cache of loaded embedding models.
//!
//! Each model name owns a slot holding its load state. The first caller for a
//! name starts the load; every other caller for that name waits on the same
//! attempt, so a model is loaded at most once. A caller that gives up after
//! the load timeout leaves the attempt running, and its result still fills
//! the slot. Different names load independently.

use crate::error::{RagError, RagResult};
use crate::vector::{EmbeddingBackend, EmbeddingModelName, ModelLoader};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
enum SlotState {
    #[default]
    Empty,
    Loading,
    Ready(Arc<dyn EmbeddingBackend>),
    /// Reason of the most recent failed load; the next caller retries.
    Failed(String),
}

#[derive(Default)]
struct ModelSlot {
    state: Mutex<SlotState>,
    changed: Condvar,
}

pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<EmbeddingModelName, Arc<ModelSlot>>>,
    load_timeout: Option<Duration>,
    loads: Arc<AtomicUsize>,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
            load_timeout: None,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bound how long a caller waits for a load. `None` waits indefinitely.
    #[must_use]
    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Return the backend for `model`, loading it on first use.
    ///
    /// A failed load leaves the slot retryable. A timed-out wait does not
    /// cancel the load; later calls wait on the same attempt.
    pub fn get(&self, model: EmbeddingModelName) -> RagResult<Arc<dyn EmbeddingBackend>> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(model).or_default())
        };
        let deadline = self.load_timeout.map(|timeout| Instant::now() + timeout);

        let mut state = slot.state.lock();
        match &*state {
            SlotState::Ready(backend) => return Ok(Arc::clone(backend)),
            SlotState::Loading => {}
            SlotState::Empty | SlotState::Failed(_) => {
                *state = SlotState::Loading;
                MutexGuard::unlocked(&mut state, || self.start_load(&slot, model))?;
            }
        }

        loop {
            match &*state {
                SlotState::Ready(backend) => return Ok(Arc::clone(backend)),
                SlotState::Failed(reason) => {
                    return Err(RagError::ModelLoad {
                        model: model.to_string(),
                        reason: reason.clone(),
                    });
                }
                SlotState::Empty | SlotState::Loading => {}
            }

            match (deadline, self.load_timeout) {
                (Some(deadline), Some(timeout)) => {
                    if slot.changed.wait_until(&mut state, deadline).timed_out()
                        && !matches!(*state, SlotState::Ready(_) | SlotState::Failed(_))
                    {
                        tracing::warn!(
                            target: "embedding",
                            model = %model,
                            timeout_ms = timeout.as_millis() as u64,
                            "model load timed out, leaving it to finish in the background"
                        );
                        return Err(RagError::Timeout {
                            operation: format!("loading model '{model}'"),
                            timeout,
                        });
                    }
                }
                _ => slot.changed.wait(&mut state),
            }
        }
    }

    /// Run the load inline, or on a helper thread when loads are bounded so
    /// the caller can stop waiting.
    fn start_load(&self, slot: &Arc<ModelSlot>, model: EmbeddingModelName) -> RagResult<()> {
        if self.load_timeout.is_none() {
            complete_load(slot, self.loader.as_ref(), model, &self.loads);
            return Ok(());
        }

        let loader = Arc::clone(&self.loader);
        let loads = Arc::clone(&self.loads);
        let thread_slot = Arc::clone(slot);
        let spawned = std::thread::Builder::new()
            .name(format!("load-{model}"))
            .spawn(move || complete_load(&thread_slot, loader.as_ref(), model, &loads));

        if let Err(e) = spawned {
            let reason = format!("failed to spawn loader thread: {e}");
            *slot.state.lock() = SlotState::Failed(reason.clone());
            slot.changed.notify_all();
            return Err(RagError::ModelLoad {
                model: model.to_string(),
                reason,
            });
        }
        Ok(())
    }

    pub fn is_loaded(&self, model: EmbeddingModelName) -> bool {
        let slot = self.slots.lock().get(&model).cloned();
        slot.is_some_and(|s| matches!(*s.state.lock(), SlotState::Ready(_)))
    }

    /// Number of successful loads since construction.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Drop every cached model. Subsequent calls load again.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

fn complete_load(
    slot: &ModelSlot,
    loader: &dyn ModelLoader,
    model: EmbeddingModelName,
    loads: &AtomicUsize,
) {
    let started = Instant::now();
    let next = match loader.load(model) {
        Ok(backend) => {
            loads.fetch_add(1, Ordering::SeqCst);
            tracing::info!(
                target: "embedding",
                model = %model,
                dimension = backend.dimension().get(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "model ready"
            );
            SlotState::Ready(backend)
        }
        Err(e) => {
            tracing::warn!(target: "embedding", model = %model, error = %e, "model load failed");
            let reason = match e {
                RagError::ModelLoad { reason, .. } => reason,
                other => other.to_string(),
            };
            SlotState::Failed(reason)
        }
    };
    *slot.state.lock() = next;
    slot.changed.notify_all();
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("load_timeout", &self.load_timeout)
            .field("loads", &self.load_count())
            .finish_non_exhaustive()
    }
}
