// model_cache.rs
//
// Explicit process-wide model cache, injected into the ASR/diarization
// adapters. Owns a bounded map from (kind, tier) to a loaded model, with
// least-recently-used eviction. Loads are serialized so two workers never
// load the same model twice concurrently.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::Mutex;

use crate::config::ModelTier;
use crate::error::Result;

/// What a cached model is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Asr,
    Diarization,
    Denoiser,
    Punctuation,
}

type CacheKey = (ModelKind, ModelTier);
type CachedModel = Arc<dyn Any + Send + Sync>;

struct CacheInner {
    entries: HashMap<CacheKey, CachedModel>,
    /// Keys ordered least-recently-used first.
    lru: Vec<CacheKey>,
}

impl CacheInner {
    fn touch(&mut self, key: CacheKey) {
        self.lru.retain(|k| *k != key);
        self.lru.push(key);
    }
}

/// Bounded, lock-guarded model cache. Read-mostly after warm-up.
pub struct ModelCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ModelCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                lru: Vec::new(),
            }),
        }
    }

    /// Fetch a model, loading it on a miss. The lock is held across the
    /// load, serializing loads and preventing duplicate concurrent loads
    /// of one model.
    pub async fn get_or_load<T, F>(&self, kind: ModelKind, tier: ModelTier, load: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<Arc<T>>,
    {
        let key = (kind, tier);
        let mut inner = self.inner.lock().await;

        if let Some(cached) = inner.entries.get(&key) {
            let model = cached
                .clone()
                .downcast::<T>()
                .expect("cached model type mismatch for key");
            inner.touch(key);
            debug!("Model cache hit: {:?}/{}", kind, tier.code());
            return Ok(model);
        }

        info!("Model cache miss, loading {:?}/{}", kind, tier.code());
        let model = load()?;
        inner.entries.insert(key, model.clone());
        inner.touch(key);

        while inner.entries.len() > self.capacity {
            let evicted = inner.lru.remove(0);
            inner.entries.remove(&evicted);
            info!("Model cache evicted {:?}/{}", evicted.0, evicted.1.code());
        }

        Ok(model)
    }

    /// Drop the least-recently-used entries down to `keep`. Called when
    /// memory pressure is signaled.
    pub async fn shrink_to(&self, keep: usize) {
        let mut inner = self.inner.lock().await;
        while inner.entries.len() > keep {
            let evicted = inner.lru.remove(0);
            inner.entries.remove(&evicted);
            info!("Model cache evicted {:?}/{} under memory pressure", evicted.0, evicted.1.code());
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
