//! Content-addressed parse cache.
//!
//! Parsing is a pure function of `(language, parser version, file path, text)`,
//! so a result stored under the hash of those inputs can be returned verbatim.

use crate::error::{ParserError, Result};
use crate::types::ParseResult;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// SHA-256 of the parse inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn new(language: &str, parser_version: &str, file_path: &str, text: &str) -> Self {
        let mut hasher = Sha256::new();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        for part in [language, parser_version, file_path, text] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Hit/miss counters of a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Warm-start store for parse results
pub trait ParseCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Arc<ParseResult>>;
    fn put(&self, key: CacheKey, result: Arc<ParseResult>);
    fn stats(&self) -> CacheStats;
}

/// In-memory LRU implementation of [`ParseCache`]
pub struct LruParseCache {
    entries: Mutex<LruCache<CacheKey, Arc<ParseResult>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LruParseCache {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| ParserError::invalid_config("cache capacity must be > 0"))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }
}

impl ParseCache for LruParseCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<ParseResult>> {
        let found = self
            .entries
            .lock()
            .ok()
            .and_then(|mut entries| entries.get(key).cloned());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn put(&self, key: CacheKey, result: Arc<ParseResult>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, result);
        }
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().map(|e| e.len()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(path: &str) -> Arc<ParseResult> {
        Arc::new(ParseResult::unsupported("cobol", path, Duration::ZERO))
    }

    #[test]
    fn key_depends_on_every_input() {
        let base = CacheKey::new("java", "1", "A.java", "class A {}");
        assert_eq!(base, CacheKey::new("java", "1", "A.java", "class A {}"));
        assert_ne!(base, CacheKey::new("java", "2", "A.java", "class A {}"));
        assert_ne!(base, CacheKey::new("java", "1", "B.java", "class A {}"));
        assert_ne!(base, CacheKey::new("rust", "1", "A.java", "class A {}"));
        assert_ne!(base, CacheKey::new("java", "1", "A.java", "class B {}"));
        assert_eq!(base.to_hex().len(), 64);
    }

    #[test]
    fn lru_evicts_oldest_and_counts() {
        let cache = LruParseCache::new(2).unwrap();
        let keys: Vec<_> = (0..3)
            .map(|i| CacheKey::new("java", "1", &format!("{i}.java"), ""))
            .collect();
        for (i, key) in keys.iter().enumerate() {
            cache.put(*key, result(&format!("{i}.java")));
        }
        assert!(cache.get(&keys[0]).is_none());
        assert_eq!(cache.get(&keys[2]).unwrap().file_path(), "2.java");

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 2));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(LruParseCache::new(0).is_err());
    }
}
