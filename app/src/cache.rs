//! Rendered-meaning caching with LRU eviction

use crate::render::Fragment;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Rendered meanings keyed by headword. Rendering depends on every live
/// translation, so any translation change or reload clears the whole cache.
pub struct RenderCache {
    cache: Mutex<LruCache<String, Arc<Vec<Fragment>>>>,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get_or_render<F>(&self, headword: &str, render: F) -> Arc<Vec<Fragment>>
    where
        F: FnOnce() -> Vec<Fragment>,
    {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(fragments) = cache.get(headword) {
                return Arc::clone(fragments);
            }
        }

        let fragments = Arc::new(render());
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(headword.to_string(), Arc::clone(&fragments));
        }
        fragments
    }

    /// (entries, capacity)
    pub fn stats(&self) -> (usize, usize) {
        self.cache
            .lock()
            .map(|c| (c.len(), c.cap().get()))
            .unwrap_or((0, 0))
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}
