use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Thread-safe LRU cache for question embeddings
///
/// Chat users tend to rephrase and repeat questions; caching the embedding of
/// each question text saves one embeddings round-trip per repeat.
pub struct QueryEmbeddingCache {
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl QueryEmbeddingCache {
    /// Create a cache holding at most `capacity` embeddings (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a cached embedding, refreshing its recency
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.lock().get(text).cloned()
    }

    pub fn put(&self, text: String, embedding: Vec<f32>) {
        self.lock().put(text, embedding);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Vec<f32>>> {
        // A poisoned cache only ever holds complete entries.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let cache = QueryEmbeddingCache::new(10);
        cache.put("what is in the report?".to_string(), vec![0.5, 0.25]);

        assert_eq!(cache.get("what is in the report?"), Some(vec![0.5, 0.25]));
        assert!(cache.get("something else").is_none());
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = QueryEmbeddingCache::new(2);
        cache.put("first".to_string(), vec![1.0]);
        cache.put("second".to_string(), vec![2.0]);

        // Touch "first" so "second" becomes the eviction candidate
        let _ = cache.get("first");
        cache.put("third".to_string(), vec![3.0]);

        assert!(cache.get("first").is_some());
        assert!(cache.get("second").is_none());
        assert!(cache.get("third").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = QueryEmbeddingCache::new(0);
        assert!(cache.is_empty());
        cache.put("only".to_string(), vec![1.0]);
        cache.put("newer".to_string(), vec![2.0]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("newer").is_some());
    }
}
