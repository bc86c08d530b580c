//! Knowledge-graph interface and an in-memory implementation
//!
//! Graph retrieval anchors on entities mentioned in the query and walks
//! outward a bounded number of hops. Path and relationship metadata is
//! passed through untouched so the orchestrator can surface it as
//! `graph_insights`.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::AdapterError;

/// One entity reached by traversal or graph-side semantic search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity_id: String,
    pub description: String,
    /// Relationship on the final edge of the path
    pub relationship: String,
    /// Node ids from anchor to this entity, inclusive
    pub path: Vec<String>,
    pub hops: usize,
    /// Product of edge weights along the path, in [0, 1]
    pub weight: f64,
}

/// Opaque query interface over the knowledge graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Entities reachable from `entity_id` within `max_hops`, strongest
    /// paths first, at most `limit`.
    async fn find_related_entities(
        &self,
        entity_id: &str,
        max_hops: usize,
        limit: usize,
    ) -> Result<Vec<RelatedEntity>, AdapterError>;

    /// Entity lookup by embedding similarity against node descriptions
    async fn semantic_search(
        &self,
        query_embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<RelatedEntity>, AdapterError>;
}

#[derive(Clone)]
struct GraphNode {
    description: String,
    vector: Vec<f32>,
}

#[derive(Clone)]
struct GraphEdge {
    target: String,
    relationship: String,
    weight: f64,
}

/// Adjacency-map graph held in memory. Node ids are matched
/// case-insensitively so query-extracted entities like `BinarySearch`
/// anchor onto `binarysearch` nodes.
pub struct InMemoryGraphStore {
    embedder: Arc<dyn Embedder>,
    nodes: DashMap<String, GraphNode>,
    edges: DashMap<String, Vec<GraphEdge>>,
}

impl InMemoryGraphStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            nodes: DashMap::new(),
            edges: DashMap::new(),
        }
    }

    fn node_key(id: &str) -> String {
        id.trim_end_matches("()").to_lowercase()
    }

    pub async fn add_entity(
        &self,
        id: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), AdapterError> {
        let description = description.into();
        let vector = self.embedder.embed(&description).await?;
        self.nodes
            .insert(Self::node_key(&id.into()), GraphNode { description, vector });
        Ok(())
    }

    /// Directed edge; callers wanting symmetry add both directions
    pub fn add_relation(
        &self,
        from: &str,
        relationship: impl Into<String>,
        to: &str,
        weight: f64,
    ) {
        self.edges
            .entry(Self::node_key(from))
            .or_default()
            .push(GraphEdge {
                target: Self::node_key(to),
                relationship: relationship.into(),
                weight: weight.clamp(0.0, 1.0),
            });
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn find_related_entities(
        &self,
        entity_id: &str,
        max_hops: usize,
        limit: usize,
    ) -> Result<Vec<RelatedEntity>, AdapterError> {
        let anchor = Self::node_key(entity_id);
        if !self.nodes.contains_key(&anchor) {
            debug!(entity = %entity_id, "graph anchor not found");
            return Ok(Vec::new());
        }

        let mut visited: HashSet<String> = HashSet::from([anchor.clone()]);
        let mut queue: VecDeque<(String, Vec<String>, f64, usize)> =
            VecDeque::from([(anchor.clone(), vec![anchor.clone()], 1.0, 0)]);
        let mut reached: Vec<RelatedEntity> = Vec::new();

        while let Some((node, path, weight, hops)) = queue.pop_front() {
            if hops >= max_hops {
                continue;
            }
            let Some(neighbors) = self.edges.get(&node) else {
                continue;
            };
            for edge in neighbors.iter() {
                if !visited.insert(edge.target.clone()) {
                    continue;
                }
                let Some(target_node) = self.nodes.get(&edge.target) else {
                    continue;
                };
                let mut next_path = path.clone();
                next_path.push(edge.target.clone());
                let next_weight = weight * edge.weight;
                reached.push(RelatedEntity {
                    entity_id: edge.target.clone(),
                    description: target_node.description.clone(),
                    relationship: edge.relationship.clone(),
                    path: next_path.clone(),
                    hops: hops + 1,
                    weight: next_weight,
                });
                queue.push_back((edge.target.clone(), next_path, next_weight, hops + 1));
            }
        }

        reached.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        reached.truncate(limit);
        debug!(entity = %entity_id, reached = reached.len(), max_hops, "graph traversal complete");
        Ok(reached)
    }

    async fn semantic_search(
        &self,
        query_embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<RelatedEntity>, AdapterError> {
        let mut hits: Vec<RelatedEntity> = self
            .nodes
            .iter()
            .filter_map(|entry| {
                let similarity = cosine_similarity(query_embedding, &entry.value().vector);
                if similarity >= threshold {
                    Some(RelatedEntity {
                        entity_id: entry.key().clone(),
                        description: entry.value().description.clone(),
                        relationship: "semantic".to_string(),
                        path: vec![entry.key().clone()],
                        hops: 0,
                        weight: similarity,
                    })
                } else {
                    None
                }
            })
            .collect();
        hits.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
