use std::num::NonZeroUsize;

use lru::LruCache;

/// LRU cache of encodings keyed by whitespace-normalized text.
///
/// A capacity of zero disables caching: every lookup misses.
pub struct EmbeddingCache<V: Clone = Vec<f32>> {
    entries: Option<LruCache<String, V>>,
    hits: u64,
    misses: u64,
}

/// `"  lối   thoát nạn "` and `"lối thoát nạn"` share an entry.
fn cache_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl<V: Clone> EmbeddingCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self { entries: NonZeroUsize::new(capacity).map(LruCache::new), hits: 0, misses: 0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn get(&mut self, text: &str) -> Option<V> {
        let found = self.entries.as_mut().and_then(|e| e.get(&cache_key(text)).cloned());
        match found {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        found
    }

    pub fn put(&mut self, text: &str, value: V) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(cache_key(text), value);
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_hits_and_misses() {
        let mut cache: EmbeddingCache = EmbeddingCache::new(100);

        assert!(cache.get("lối thoát nạn").is_none());
        cache.put("lối thoát nạn", vec![1.0, 2.0, 3.0]);
        assert_eq!(cache.get("lối thoát nạn"), Some(vec![1.0, 2.0, 3.0]));

        assert_eq!((cache.hits(), cache.misses()), (1, 1));
        assert!((cache.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn whitespace_variants_share_an_entry() {
        let mut cache: EmbeddingCache<u32> = EmbeddingCache::new(8);
        cache.put("  chiều cao\tnhà ", 7);
        assert_eq!(cache.get("chiều cao nhà"), Some(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache: EmbeddingCache = EmbeddingCache::new(2);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        cache.get("a");
        cache.put("c", vec![3.0]); // evicts "b"

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let mut cache: EmbeddingCache<u32> = EmbeddingCache::new(0);
        assert!(!cache.is_enabled());
        cache.put("q", 1);
        assert!(cache.get("q").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.hit_rate(), 0.0);
    }
}
