//! Engine-lifetime caches
//!
//! Three caches survive across requests: embeddings, per-step retrieval
//! results, and synthesis results. Keys are xxh3 digests of the composite
//! key material; values are stored behind `Arc` so hits hand out cheap
//! clones of immutable results. Moka gives bounded capacity with LRU-style
//! eviction and thread-safe access.

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

use crate::types::{RetrievalResult, SynthesisResult};

/// Incremental digest builder for composite cache keys.
///
/// Fields are delimited so `("ab", "c")` and `("a", "bc")` never collide.
#[derive(Default)]
pub struct CacheKey {
    hasher: Xxh3,
}

impl CacheKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, value: &str) -> Self {
        self.hasher.update(value.as_bytes());
        self.hasher.update(&[0x1f]);
        self
    }

    pub fn field_usize(self, value: usize) -> Self {
        self.field(&value.to_string())
    }

    pub fn field_f64(self, value: f64) -> Self {
        // fixed formatting so 0.7 and 0.70 key identically
        self.field(&format!("{value:.6}"))
    }

    /// Key a sorted view of a string map, order-independent
    pub fn sorted_pairs<'a, I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut sorted: Vec<(&str, &str)> = pairs.into_iter().collect();
        sorted.sort_unstable();
        for (k, v) in sorted {
            self = self.field(k).field(v);
        }
        self
    }

    pub fn finish(self) -> u64 {
        self.hasher.digest()
    }
}

/// Entry counts for cache introspection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub embedding_entries: u64,
    pub retrieval_entries: u64,
    pub synthesis_entries: u64,
}

/// Content-hash -> embedding vector
#[derive(Clone)]
pub struct EmbeddingCache {
    inner: Cache<u64, Arc<Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    pub fn key_for(content: &str) -> u64 {
        CacheKey::new().field(content).finish()
    }

    pub fn get(&self, key: u64) -> Option<Arc<Vec<f32>>> {
        self.inner.get(&key)
    }

    pub fn insert(&self, key: u64, vector: Arc<Vec<f32>>) {
        self.inner.insert(key, vector);
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

/// Per-step retrieval result cache
#[derive(Clone)]
pub struct RetrievalCache {
    inner: Cache<u64, Arc<RetrievalResult>>,
}

impl RetrievalCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    pub fn get(&self, key: u64) -> Option<Arc<RetrievalResult>> {
        self.inner.get(&key)
    }

    pub fn insert(&self, key: u64, result: Arc<RetrievalResult>) {
        self.inner.insert(key, result);
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

/// Synthesis result cache
#[derive(Clone)]
pub struct SynthesisCache {
    inner: Cache<u64, Arc<SynthesisResult>>,
}

impl SynthesisCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    pub fn get(&self, key: u64) -> Option<Arc<SynthesisResult>> {
        self.inner.get(&key)
    }

    pub fn insert(&self, key: u64, result: Arc<SynthesisResult>) {
        self.inner.insert(key, result);
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}
