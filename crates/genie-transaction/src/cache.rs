//! Memoization of context classification

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::{debug, trace};

use genie_core::Result;
use genie_thingtalk::DialogueState;

use crate::context_info::ContextInfo;

pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

static GLOBAL: LazyLock<ContextCache> = LazyLock::new(|| ContextCache::new(DEFAULT_CACHE_CAPACITY));

fn structural_hash(state: &DialogueState) -> u64 {
    let mut hasher = DefaultHasher::new();
    state.hash(&mut hasher);
    hasher.finish()
}

/// Contexts keyed by the structural hash of their state.
///
/// A hit is confirmed by comparing the stored state, so hash collisions only
/// cost a recomputation. When full, the cache is emptied.
pub struct ContextCache {
    entries: RwLock<HashMap<u64, Arc<ContextInfo>>>,
    capacity: AtomicUsize,
}

impl ContextCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: AtomicUsize::new(capacity.max(1)),
        }
    }

    /// The process-wide cache used by [`ContextInfo::get`].
    pub fn global() -> &'static ContextCache {
        &GLOBAL
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity.max(1), Ordering::Relaxed);
        let mut entries = self.entries.write();
        if entries.len() > self.capacity() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, state: &DialogueState) -> Option<Arc<ContextInfo>> {
        let hash = structural_hash(state);
        let entries = self.entries.read();
        entries
            .get(&hash)
            .filter(|ctx| ctx.state.as_ref() == state)
            .cloned()
    }

    pub fn get_or_compute(
        &self,
        state: &DialogueState,
        compute: impl FnOnce(Arc<DialogueState>) -> Result<ContextInfo>,
    ) -> Result<Arc<ContextInfo>> {
        if let Some(ctx) = self.get(state) {
            trace!(act = %state.dialogue_act, "Context cache hit");
            return Ok(ctx);
        }

        let ctx = Arc::new(compute(Arc::new(state.clone()))?);
        let hash = structural_hash(state);
        let mut entries = self.entries.write();
        // another session may have computed the same state meanwhile
        if let Some(existing) = entries.get(&hash) {
            if existing.state.as_ref() == state {
                return Ok(existing.clone());
            }
        }
        if entries.len() >= self.capacity() {
            debug!(entries = entries.len(), "Context cache full, clearing");
            entries.clear();
        }
        entries.insert(hash, ctx.clone());
        Ok(ctx)
    }

    pub fn invalidate(&self, state: &DialogueState) -> bool {
        let hash = structural_hash(state);
        let mut entries = self.entries.write();
        match entries.get(&hash) {
            Some(ctx) if ctx.state.as_ref() == state => entries.remove(&hash).is_some(),
            _ => false,
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
