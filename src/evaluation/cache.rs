use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::analyzer::{Language, QueryStructure};

type CacheKey = (Language, String);

/// Memoizes extraction results by exact query text.
///
/// Extraction is a pure function of `(language, text)`, so entries never go
/// stale. A capacity of 0 disables caching.
pub struct ParseCache {
    entries: Option<Mutex<LruCache<CacheKey, Arc<QueryStructure>>>>,
}

impl ParseCache {
    /// Cache holding at most `capacity` structures.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// A cache that stores nothing.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Cached structure for `text`, computing it with `extract` on a miss.
    ///
    /// The lock is not held while `extract` runs.
    pub fn get_or_extract(
        &self,
        language: Language,
        text: &str,
        extract: impl FnOnce() -> QueryStructure,
    ) -> Arc<QueryStructure> {
        let Some(entries) = &self.entries else {
            return Arc::new(extract());
        };
        let key = (language, text.to_string());
        if let Some(hit) = entries.lock().get(&key) {
            return Arc::clone(hit);
        }
        let structure = Arc::new(extract());
        entries.lock().put(key, Arc::clone(&structure));
        structure
    }

    /// Number of cached structures.
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ParseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseCache")
            .field("enabled", &self.entries.is_some())
            .field("len", &self.len())
            .finish()
    }
}
