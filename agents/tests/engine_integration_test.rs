//! End-to-end engine tests: plan, retrieve, synthesize, validate, respond.
//!
//! Vector adapters are scripted with canned scores so the pipeline behavior
//! is deterministic; graph scenarios use the real in-memory store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mimir_adapters::embedding::HashEmbedder;
use mimir_adapters::error::AdapterError;
use mimir_adapters::graph::{GraphStore, InMemoryGraphStore, RelatedEntity};
use mimir_adapters::vector::{ScoredChunk, VectorStore};
use mimir_agents::RagEngine;
use mimir_core::cache::EmbeddingCache;
use mimir_core::config::EngineConfig;
use mimir_core::types::{QueryComplexity, QueryRequest, SynthesisStrategy};

/// Returns its canned chunks for every query, ignoring the threshold, so
/// document scores are controlled by the test
struct ScriptedVectorStore {
    chunks: Vec<ScoredChunk>,
}

impl ScriptedVectorStore {
    fn new(chunks: Vec<(&str, &str, f64)>) -> Self {
        Self {
            chunks: chunks
                .into_iter()
                .map(|(id, content, score)| ScoredChunk {
                    id: Some(id.to_string()),
                    content: content.to_string(),
                    metadata: HashMap::new(),
                    score,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl VectorStore for ScriptedVectorStore {
    async fn search(
        &self,
        _query: &str,
        _threshold: f64,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, AdapterError> {
        Ok(self.chunks.iter().take(limit).cloned().collect())
    }
}

struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn search(
        &self,
        _query: &str,
        _threshold: f64,
        _limit: usize,
    ) -> Result<Vec<ScoredChunk>, AdapterError> {
        Err(AdapterError::Unavailable("vector store down".to_string()))
    }
}

struct FailingGraphStore;

#[async_trait]
impl GraphStore for FailingGraphStore {
    async fn find_related_entities(
        &self,
        _entity_id: &str,
        _max_hops: usize,
        _limit: usize,
    ) -> Result<Vec<RelatedEntity>, AdapterError> {
        Err(AdapterError::Unavailable("graph store down".to_string()))
    }

    async fn semantic_search(
        &self,
        _query_embedding: &[f32],
        _threshold: f64,
        _limit: usize,
    ) -> Result<Vec<RelatedEntity>, AdapterError> {
        Err(AdapterError::Unavailable("graph store down".to_string()))
    }
}

/// Simulates a stalled backend for deadline tests
struct SlowVectorStore;

#[async_trait]
impl VectorStore for SlowVectorStore {
    async fn search(
        &self,
        _query: &str,
        _threshold: f64,
        _limit: usize,
    ) -> Result<Vec<ScoredChunk>, AdapterError> {
        tokio::time::sleep(Duration::from_millis(250)).await;
        Ok(Vec::new())
    }
}

fn empty_graph() -> Arc<InMemoryGraphStore> {
    let embedder = Arc::new(HashEmbedder::new(64, EmbeddingCache::new(64)));
    Arc::new(InMemoryGraphStore::new(embedder))
}

fn engine_with(
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
) -> anyhow::Result<RagEngine> {
    Ok(RagEngine::new(EngineConfig::default(), vector, graph)?)
}

#[tokio::test]
async fn simple_factual_query_answers_from_the_top_document() -> anyhow::Result<()> {
    let vector = Arc::new(ScriptedVectorStore::new(vec![(
        "d1",
        "Binary search finds a target in a sorted array. It runs in logarithmic time because \
         each probe halves the remaining range",
        0.92,
    )]));
    let engine = engine_with(vector, empty_graph())?;

    let response = engine
        .query(QueryRequest::new("What is binary search?"))
        .await;

    assert!(response.answer.contains("Binary search"));
    assert!(response.answer.contains("sorted"));
    assert!(response.confidence >= 0.7);
    assert_eq!(response.metadata.complexity, Some(QueryComplexity::Simple));
    assert_eq!(response.metadata.strategy, Some(SynthesisStrategy::Simple));
    assert!(response.metadata.error.is_none());
    assert_eq!(response.sources[0].id.as_deref(), Some("d1"));
    Ok(())
}

#[tokio::test]
async fn moderate_query_uses_the_reasoning_strategy() -> anyhow::Result<()> {
    let vector = Arc::new(ScriptedVectorStore::new(vec![
        (
            "p1",
            "Connection pooling keeps a set of open database sockets ready for reuse. Opening \
             a socket per request wastes time",
            0.72,
        ),
        (
            "p2",
            "A pool manager hands out idle connections and reclaims them after use",
            0.48,
        ),
        (
            "p3",
            "Pool sizing balances socket reuse against idle resource cost",
            0.41,
        ),
    ]));
    let engine = engine_with(vector, empty_graph())?;

    let response = engine
        .query(QueryRequest::new("How does connection pooling work?"))
        .await;

    assert_eq!(response.metadata.complexity, Some(QueryComplexity::Moderate));
    assert_eq!(response.metadata.strategy, Some(SynthesisStrategy::Reasoning));
    assert!(response.answer.contains("pool") || response.answer.contains("Pool"));
    assert!(!response.metadata.reasoning_steps.is_empty());
    // mixed-quality evidence keeps the confidence moderate
    assert!(response.confidence > 0.3 && response.confidence < 0.95);
    Ok(())
}

#[tokio::test]
async fn comparative_query_runs_the_complex_pipeline_with_graph_insights() -> anyhow::Result<()> {
    let vector = Arc::new(ScriptedVectorStore::new(vec![
        (
            "r1",
            "The official documentation recommends REST for simple request response services. \
             REST uses plain HTTP verbs",
            0.85,
        ),
        (
            "r2",
            "def stream(): example of gRPC streaming between microservices with low latency",
            0.78,
        ),
        (
            "r3",
            "Community blog posts report gRPC latency below REST for internal calls",
            0.70,
        ),
    ]));
    let graph = empty_graph();
    graph
        .add_entity("latency", "Time for a request to complete")
        .await?;
    graph
        .add_entity("grpc", "A binary RPC protocol with multiplexed streams")
        .await?;
    graph.add_relation("latency", "affected_by", "grpc", 0.9);
    let engine = engine_with(vector, graph)?;

    let response = engine
        .query(QueryRequest::new(
            "compare REST and gRPC for low-latency services",
        ))
        .await;

    assert_eq!(response.metadata.complexity, Some(QueryComplexity::Complex));
    assert_eq!(
        response.metadata.strategy,
        Some(SynthesisStrategy::Comparative)
    );
    assert!(response.answer.contains("REST"));
    assert!(response.answer.contains("gRPC"));
    assert!(response.metadata.reasoning_steps.len() >= 2);
    assert!(response.graph_insights.contains_key("latency"));
    Ok(())
}

#[tokio::test]
async fn expert_query_plans_four_steps_and_synthesizes_creatively() -> anyhow::Result<()> {
    let vector = Arc::new(ScriptedVectorStore::new(vec![
        (
            "m1",
            "Incremental migration keeps the monolith serving traffic while services split away",
            0.80,
        ),
        (
            "m2",
            "Strangler migration routes traffic to new services behind a gateway",
            0.70,
        ),
        (
            "m3",
            "Service auth tokens must rotate during migration to avoid stale credentials",
            0.65,
        ),
    ]));
    let graph = empty_graph();
    graph
        .add_entity("scalability", "Ability to absorb load by adding capacity")
        .await?;
    graph
        .add_entity("microservices", "Independently deployable services")
        .await?;
    graph.add_relation("scalability", "enabled_by", "microservices", 0.8);
    let engine = engine_with(vector, graph)?;

    let response = engine
        .query(QueryRequest::new(
            "What are the security implications of our microservices migration strategy \
             for scalability?",
        ))
        .await;

    assert_eq!(response.metadata.complexity, Some(QueryComplexity::Expert));
    assert_eq!(response.metadata.strategy, Some(SynthesisStrategy::Creative));
    assert!(!response.answer.is_empty());
    assert!(!response.metadata.reasoning_steps.is_empty());
    assert!(response.confidence > 0.0);
    Ok(())
}

#[tokio::test]
async fn ambiguous_moderate_query_runs_the_clarification_step() -> anyhow::Result<()> {
    let vector = Arc::new(ScriptedVectorStore::new(vec![
        (
            "w1",
            "First the request is parsed into a plan. Then the plan steps retrieve evidence. \
             Next the evidence is composed into an answer",
            0.74,
        ),
        (
            "w2",
            "Validation scores the composed answer before it is returned",
            0.55,
        ),
    ]));
    let engine = engine_with(vector, empty_graph())?;

    let response = engine.query(QueryRequest::new("how does it work")).await;

    assert_eq!(response.metadata.complexity, Some(QueryComplexity::Moderate));
    assert_eq!(response.metadata.strategy, Some(SynthesisStrategy::Reasoning));
    assert!(response.metadata.error.is_none());
    assert!(!response.answer.is_empty());
    assert!(!response.sources.is_empty());
    Ok(())
}

#[tokio::test]
async fn healthy_stores_with_no_hits_give_the_canonical_answer() -> anyhow::Result<()> {
    let vector = Arc::new(ScriptedVectorStore::new(Vec::new()));
    let engine = engine_with(vector, empty_graph())?;

    let response = engine
        .query(QueryRequest::new("What is binary search?"))
        .await;

    // healthy adapters that find nothing are not an outage
    assert!(response.metadata.error.is_none());
    assert!(response
        .answer
        .contains("couldn't find relevant information"));
    assert!((response.confidence - 0.1).abs() < 1e-9);
    assert!(response.sources.is_empty());
    Ok(())
}

#[tokio::test]
async fn response_sources_are_capped_at_ten() -> anyhow::Result<()> {
    let chunks: Vec<(String, String, f64)> = (0..15)
        .map(|i| {
            (
                format!("d{i}"),
                format!("candidate passage {i} contrasting rest and grpc transports"),
                0.9 - i as f64 * 0.02,
            )
        })
        .collect();
    let vector = Arc::new(ScriptedVectorStore::new(
        chunks
            .iter()
            .map(|(id, content, score)| (id.as_str(), content.as_str(), *score))
            .collect(),
    ));
    let engine = engine_with(vector, empty_graph())?;

    let response = engine
        .query(QueryRequest::new(
            "compare REST and gRPC for low-latency services",
        ))
        .await;

    assert!(response.metadata.error.is_none());
    assert_eq!(response.sources.len(), 10);
    Ok(())
}

#[tokio::test]
async fn total_adapter_outage_yields_an_apologetic_error_response() -> anyhow::Result<()> {
    let engine = engine_with(Arc::new(FailingVectorStore), Arc::new(FailingGraphStore))?;

    let response = engine
        .query(QueryRequest::new("What is binary search?"))
        .await;

    assert_eq!(response.confidence, 0.0);
    assert!(response.sources.is_empty());
    assert_eq!(response.metadata.error.as_deref(), Some("empty_results"));
    assert!(
        response.answer.starts_with("I'm sorry")
            || response.answer.starts_with("I apologize")
            || response.answer.starts_with("Unfortunately")
    );
    Ok(())
}

#[tokio::test]
async fn blown_deadline_becomes_a_deadline_error_response() -> anyhow::Result<()> {
    let engine = engine_with(Arc::new(SlowVectorStore), empty_graph())?;

    let mut request = QueryRequest::new("What is binary search?");
    request.deadline = Some(Duration::from_millis(10));
    let response = engine.query(request).await;

    assert_eq!(response.confidence, 0.0);
    assert_eq!(response.metadata.error.as_deref(), Some("deadline_exceeded"));
    Ok(())
}

#[tokio::test]
async fn empty_query_is_rejected_without_touching_adapters() -> anyhow::Result<()> {
    let engine = engine_with(Arc::new(FailingVectorStore), Arc::new(FailingGraphStore))?;

    let response = engine.query(QueryRequest::new("   ")).await;

    assert_eq!(response.confidence, 0.0);
    assert!(response
        .metadata
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("invalid_query")));
    Ok(())
}

#[tokio::test]
async fn stats_count_successes_failures_and_refinements() -> anyhow::Result<()> {
    let vector = Arc::new(ScriptedVectorStore::new(vec![(
        "d1",
        "Binary search finds a target in a sorted array. It runs in logarithmic time because \
         each probe halves the remaining range",
        0.92,
    )]));
    let engine = engine_with(vector, empty_graph())?;

    let ok = engine
        .query(QueryRequest::new("What is binary search?"))
        .await;
    assert!(ok.metadata.error.is_none());
    let failed = engine.query(QueryRequest::new("")).await;
    assert!(failed.metadata.error.is_some());

    let stats = engine.stats().await;
    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.successful_queries, 1);
    // the extractive answer rarely clears every threshold on the first
    // pass, so the single allowed refinement attempt runs
    assert!(stats.refinement_attempts >= 1);
    assert!(stats.avg_confidence > 0.0);
    assert!(stats.avg_response_time >= 0.0);
    Ok(())
}

#[tokio::test]
async fn repeated_query_is_served_from_the_caches() -> anyhow::Result<()> {
    let vector = Arc::new(ScriptedVectorStore::new(vec![(
        "d1",
        "Binary search finds a target in a sorted array. It runs in logarithmic time because \
         each probe halves the remaining range",
        0.92,
    )]));
    let engine = engine_with(vector, empty_graph())?;

    let first = engine
        .query(QueryRequest::new("What is binary search?"))
        .await;
    let second = engine
        .query(QueryRequest::new("What is binary search?"))
        .await;

    assert_eq!(first.answer, second.answer);
    let caches = engine.cache_stats();
    assert!(caches.retrieval_entries >= 1);
    assert!(caches.synthesis_entries >= 1);
    Ok(())
}

#[tokio::test]
async fn session_and_query_type_round_trip_into_the_metadata() -> anyhow::Result<()> {
    let vector = Arc::new(ScriptedVectorStore::new(vec![(
        "d1",
        "Binary search finds a target in a sorted array. It runs in logarithmic time",
        0.92,
    )]));
    let engine = engine_with(vector, empty_graph())?;

    let mut request = QueryRequest::new("What is binary search?");
    request.session_id = Some("session-7".to_string());
    request.query_type = Some("factual".to_string());
    let response = engine.query(request).await;

    assert_eq!(response.metadata.session_id.as_deref(), Some("session-7"));
    assert_eq!(response.metadata.query_type.as_deref(), Some("factual"));
    Ok(())
}
