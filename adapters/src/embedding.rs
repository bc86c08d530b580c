//! Embedder interface and a deterministic in-process implementation
//!
//! The engine consumes an existing embedder; it never trains one. The
//! hashing embedder projects token counts into a fixed-dimension vector,
//! which is enough for the in-memory stores and keeps tests deterministic.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;
use xxhash_rust::xxh3::xxh3_64;

use mimir_core::cache::EmbeddingCache;
use mimir_core::text;

use crate::error::AdapterError;

/// Text -> vector. Implementations must be safe to share across tasks.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, content: &str) -> Result<Vec<f32>, AdapterError>;

    fn dimension(&self) -> usize;
}

/// Deterministic feature-hashing embedder.
///
/// Each token lands in `hash(token) % dimension` with unit weight; the
/// vector is L2-normalized. Identical text always embeds identically.
pub struct HashEmbedder {
    dimension: usize,
    cache: EmbeddingCache,
}

impl HashEmbedder {
    pub fn new(dimension: usize, cache: EmbeddingCache) -> Self {
        Self { dimension, cache }
    }

    fn project(&self, content: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text::tokenize(content) {
            let bucket = (xxh3_64(token.as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, content: &str) -> Result<Vec<f32>, AdapterError> {
        let key = EmbeddingCache::key_for(content);
        if let Some(hit) = self.cache.get(key) {
            trace!(key, "embedding cache hit");
            return Ok((*hit).clone());
        }
        let vector = self.project(content);
        self.cache.insert(key, Arc::new(vector.clone()));
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine similarity of two equal-length vectors, clamped to [0, 1]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(0.0, 1.0) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder() -> HashEmbedder {
        HashEmbedder::new(128, EmbeddingCache::new(16))
    }

    #[tokio::test]
    async fn identical_text_embeds_identically() -> anyhow::Result<()> {
        let e = embedder();
        let a = e.embed("binary search in sorted arrays").await?;
        let b = e.embed("binary search in sorted arrays").await?;
        assert_eq!(a, b);
        Ok(())
    }

    #[tokio::test]
    async fn vectors_are_normalized() -> anyhow::Result<()> {
        let e = embedder();
        let v = e.embed("cache eviction policy").await?;
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        Ok(())
    }

    #[tokio::test]
    async fn related_text_scores_higher_than_unrelated() -> anyhow::Result<()> {
        let e = embedder();
        let q = e.embed("binary search algorithm").await?;
        let near = e.embed("binary search finds a target in a sorted array").await?;
        let far = e.embed("tokio spawns asynchronous tasks onto the runtime").await?;
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
        Ok(())
    }

    #[tokio::test]
    async fn second_embed_hits_the_cache() -> anyhow::Result<()> {
        let cache = EmbeddingCache::new(16);
        let e = HashEmbedder::new(64, cache.clone());
        e.embed("warm me up").await?;
        assert_eq!(cache.entry_count(), 1);
        e.embed("warm me up").await?;
        assert_eq!(cache.entry_count(), 1);
        Ok(())
    }
}
