//! Vector store interface and an in-memory implementation
//!
//! The engine treats similarity search as opaque: text in, scored chunks
//! out, descending, floored at the caller's threshold. The in-memory store
//! backs the CLI and tests; production deployments implement `VectorStore`
//! against their own index.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use mimir_core::text;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::AdapterError;

/// One similarity-search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Similarity in [0, 1]
    pub score: f64,
}

/// Opaque similarity search over the corpus
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Results ordered by score descending; nothing below `threshold`.
    async fn search(
        &self,
        query: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, AdapterError>;
}

struct IndexedEntry {
    id: String,
    content: String,
    metadata: HashMap<String, serde_json::Value>,
    vector: Vec<f32>,
}

/// Corpus held in memory, scored by lexical containment blended with
/// embedding cosine similarity.
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<IndexedEntry>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Add one document to the corpus, embedding it up front
    pub async fn index_document(
        &self,
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), AdapterError> {
        let content = content.into();
        let vector = self.embedder.embed(&content).await?;
        let mut entries = self.entries.write().await;
        entries.push(IndexedEntry {
            id: id.into(),
            content,
            metadata,
            vector,
        });
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Fraction of non-stop-word query tokens present in the content
    fn containment(query: &str, content: &str) -> f64 {
        let query_words: Vec<String> = text::tokenize(query)
            .into_iter()
            .filter(|w| !text::STOP_WORDS.contains(w.as_str()))
            .collect();
        if query_words.is_empty() {
            return 0.0;
        }
        let content_words = text::word_set(content);
        let hits = query_words
            .iter()
            .filter(|w| content_words.contains(w.as_str()))
            .count();
        hits as f64 / query_words.len() as f64
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        query: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, AdapterError> {
        if query.trim().is_empty() {
            warn!("vector search invoked with empty query");
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query).await?;
        let entries = self.entries.read().await;
        let mut hits: Vec<ScoredChunk> = entries
            .iter()
            .map(|entry| {
                let lexical = Self::containment(query, &entry.content);
                let semantic = cosine_similarity(&query_vector, &entry.vector);
                let score = (0.7 * lexical + 0.3 * semantic).clamp(0.0, 1.0);
                ScoredChunk {
                    id: Some(entry.id.clone()),
                    content: entry.content.clone(),
                    metadata: entry.metadata.clone(),
                    score,
                }
            })
            .filter(|chunk| chunk.score >= threshold)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        debug!(query, hits = hits.len(), threshold, "vector search complete");
        Ok(hits)
    }
}
