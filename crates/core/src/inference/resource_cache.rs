use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::inference::domain::inference_model::{Device, InferenceModel, ModelKind};
use crate::inference::domain::model_loader::ModelLoader;
use crate::shared::error::ResourceLoadError;

type CacheKey = (ModelKind, usize);

/// Per-key slot. Loading happens under the slot's own lock so a cold load for
/// one key never blocks acquisition of another.
type Slot = Arc<Mutex<Option<Arc<dyn InferenceModel>>>>;

/// Process-wide table of loaded models, one per (kind, worker slot).
///
/// Constructed once at worker start-up and shared as `Arc<ResourceCache>`.
/// The table mutex is only held while looking up or inserting a slot, never
/// during a load or an inference call.
pub struct ResourceCache {
    loader: Arc<dyn ModelLoader>,
    accelerator_count: usize,
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl ResourceCache {
    pub fn new(loader: Arc<dyn ModelLoader>, accelerator_count: usize) -> Self {
        Self {
            loader,
            accelerator_count,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the handle for `(kind, slot)`, loading it on first use.
    pub fn acquire(
        &self,
        kind: ModelKind,
        slot: usize,
    ) -> Result<Arc<dyn InferenceModel>, ResourceLoadError> {
        let entry = self.slot_for((kind, slot));
        let mut guard = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(model) = guard.as_ref() {
            return Ok(model.clone());
        }

        let device = Device::for_slot(slot, self.accelerator_count);
        if device == Device::Cpu {
            log::warn!("No accelerators configured; loading {kind} model for slot {slot} on CPU");
        }
        log::info!("Loading {kind} model for slot {slot} on {device}");

        let model = self.loader.load(kind, device)?;
        *guard = Some(model.clone());
        Ok(model)
    }

    /// Drop every cached handle. Models still in use elsewhere are freed when
    /// their last reference goes away.
    pub fn release_all(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let released = slots.len();
        slots.clear();
        log::info!("Released {released} cached model slot(s)");
    }

    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .values()
            .filter(|slot| slot.lock().map(|m| m.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_for(&self, key: CacheKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.entry(key).or_default().clone()
    }
}
