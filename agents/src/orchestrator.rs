//! Engine orchestrator
//!
//! Owns the four agents and drives the plan -> retrieve -> synthesize ->
//! validate pipeline for each request. `RagEngine::query` never fails: any
//! pipeline error, including a blown deadline, becomes an apologetic
//! response with zero confidence and the root cause in the metadata.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use mimir_adapters::graph::GraphStore;
use mimir_adapters::llm::{HttpLlmClient, LlmClient};
use mimir_adapters::vector::VectorStore;
use mimir_core::cache::{CacheStats, EmbeddingCache, RetrievalCache, SynthesisCache};
use mimir_core::config::EngineConfig;
use mimir_core::error::EngineError;
use mimir_core::types::{
    Document, EngineStatsSnapshot, QueryPlan, QueryRequest, QueryResponse, ResponseMetadata,
    RetrievalResult, RetrievalStrategy, SynthesisResult, ValidationResult,
};

use crate::planner::Planner;
use crate::retriever::{dedup_documents, sort_by_effective_score, Retriever};
use crate::synthesizer::Synthesizer;
use crate::validator::Validator;

/// Cap on supporting documents attached to a response
const MAX_RESPONSE_SOURCES: usize = 10;

/// Error-response phrasings; one is chosen by hashing the root cause so the
/// same failure always reads the same way
const APOLOGIES: [&str; 3] = [
    "I'm sorry, I couldn't process that request.",
    "I apologize, but I wasn't able to answer this question.",
    "Unfortunately, I ran into a problem while answering this question.",
];

/// Cumulative counters behind the engine stats snapshot
#[derive(Debug, Default)]
struct EngineStats {
    total_queries: u64,
    successful_queries: u64,
    refinement_attempts: u64,
    avg_response_time: f64,
    avg_confidence: f64,
}

/// Everything the pipeline produced for one successful request
struct PipelineOutcome {
    plan: QueryPlan,
    results: Vec<Arc<RetrievalResult>>,
    synthesis: SynthesisResult,
    validation: ValidationResult,
}

pub struct RagEngine {
    planner: Planner,
    retriever: Retriever,
    synthesizer: Synthesizer,
    validator: Validator,
    config: EngineConfig,
    embedding_cache: Option<EmbeddingCache>,
    retrieval_cache: Option<RetrievalCache>,
    synthesis_cache: SynthesisCache,
    stats: RwLock<EngineStats>,
}

impl RagEngine {
    /// Build the engine around the given adapters.
    ///
    /// The LLM client is constructed only when the config enables it; the
    /// synthesizer stays fully extractive otherwise.
    pub fn new(
        config: EngineConfig,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
    ) -> anyhow::Result<Self> {
        let retrieval_cache = config
            .retrieval_cache_enabled
            .then(|| RetrievalCache::new(config.retrieval_cache_size));
        let synthesis_cache = SynthesisCache::new(config.synthesis_cache_size);

        let llm: Option<Arc<dyn LlmClient>> = if config.llm.enabled {
            Some(Arc::new(HttpLlmClient::new(config.llm.clone())?))
        } else {
            None
        };

        Ok(Self {
            planner: Planner::new(),
            retriever: Retriever::new(vector, graph, retrieval_cache.clone()),
            synthesizer: Synthesizer::new(llm, Some(synthesis_cache.clone())),
            validator: Validator::new(&config),
            config,
            embedding_cache: None,
            retrieval_cache,
            synthesis_cache,
            stats: RwLock::new(EngineStats::default()),
        })
    }

    /// Register the embedding cache handle so it shows up in cache stats.
    /// The embedder owns its own clone; this one is introspection only.
    pub fn with_embedding_cache(mut self, cache: EmbeddingCache) -> Self {
        self.embedding_cache = Some(cache);
        self
    }

    /// Answer one request end to end. Never returns an error: failures are
    /// folded into an apologetic response with the cause in the metadata.
    pub async fn query(&self, request: QueryRequest) -> QueryResponse {
        let started = Instant::now();
        self.stats.write().await.total_queries += 1;

        let deadline = request
            .deadline
            .unwrap_or_else(|| Duration::from_secs_f64(self.config.request_timeout_secs));

        let outcome = match tokio::time::timeout(deadline, self.run_pipeline(&request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => return self.error_response(&request, error, started),
            Err(_) => return self.error_response(&request, EngineError::Deadline, started),
        };

        let response = self.assemble_response(&request, outcome, started);
        self.record_success(&response).await;
        response
    }

    /// Cumulative engine counters
    pub async fn stats(&self) -> EngineStatsSnapshot {
        let stats = self.stats.read().await;
        EngineStatsSnapshot {
            total_queries: stats.total_queries,
            successful_queries: stats.successful_queries,
            refinement_attempts: stats.refinement_attempts,
            avg_response_time: stats.avg_response_time,
            avg_confidence: stats.avg_confidence,
        }
    }

    /// Entry counts for the three caches
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            embedding_entries: self
                .embedding_cache
                .as_ref()
                .map(|c| c.entry_count())
                .unwrap_or(0),
            retrieval_entries: self
                .retrieval_cache
                .as_ref()
                .map(|c| c.entry_count())
                .unwrap_or(0),
            synthesis_entries: self.synthesis_cache.entry_count(),
        }
    }

    async fn run_pipeline(&self, request: &QueryRequest) -> Result<PipelineOutcome, EngineError> {
        let plan = self
            .planner
            .create_plan(&request.query, &request.user_context)?;

        let results = self.execute_plan(&plan, &request.user_context).await;
        // zero documents means one of two things: every adapter chain
        // failed (an outage, reported as an error response) or the stores
        // were healthy and simply found nothing (the synthesizer's
        // canonical low-confidence answer)
        if results.iter().all(|r| r.documents.is_empty())
            && results.iter().any(|r| r.fallbacks_exhausted)
        {
            return Err(EngineError::EmptyResults);
        }

        let mut synthesis = self
            .synthesizer
            .synthesize(
                &plan.original_query,
                &results,
                plan.synthesis_strategy,
                &request.user_context,
            )
            .await?;
        let mut validation = if synthesis.sources.is_empty() {
            // nothing to score the answer against
            ValidationResult::indeterminate()
        } else {
            self.validator.validate(
                &plan.original_query,
                &synthesis,
                &results,
                &request.user_context,
            )
        };

        for attempt in 0..self.config.max_refinement_attempts {
            if !validation.needs_refinement {
                break;
            }
            debug!(attempt, overall = validation.overall_score, "refining answer");
            self.stats.write().await.refinement_attempts += 1;
            let refined = self
                .synthesizer
                .refine(
                    &plan.original_query,
                    &synthesis,
                    &validation,
                    &results,
                    &request.user_context,
                )
                .await?;
            let revalidation = self.validator.validate(
                &plan.original_query,
                &refined,
                &results,
                &request.user_context,
            );
            if keep_refinement(&validation, &revalidation) {
                synthesis = refined;
                validation = revalidation;
            } else {
                break;
            }
        }

        Ok(PipelineOutcome {
            plan,
            results,
            synthesis,
            validation,
        })
    }

    /// Execute the plan's steps: the dependency-free wave runs concurrently,
    /// the remainder sequentially in emission order. The DAG check at plan
    /// time guarantees every dependency resolves before its dependent runs.
    async fn execute_plan(
        &self,
        plan: &QueryPlan,
        user_context: &HashMap<String, String>,
    ) -> Vec<Arc<RetrievalResult>> {
        let mut resolved: HashMap<usize, Arc<RetrievalResult>> = HashMap::new();

        let (independent, dependent): (Vec<_>, Vec<_>) = plan
            .steps
            .iter()
            .partition(|step| step.dependencies.is_empty());

        let wave = join_all(
            independent
                .iter()
                .map(|step| self.retriever.execute_step(step, user_context, &resolved)),
        )
        .await;
        for result in wave {
            resolved.insert(result.step_id, Arc::new(result));
        }

        for step in dependent {
            let result = self
                .retriever
                .execute_step(step, user_context, &resolved)
                .await;
            resolved.insert(result.step_id, Arc::new(result));
        }

        plan.steps
            .iter()
            .filter_map(|step| resolved.get(&step.step_id).cloned())
            .collect()
    }

    fn assemble_response(
        &self,
        request: &QueryRequest,
        outcome: PipelineOutcome,
        started: Instant,
    ) -> QueryResponse {
        let PipelineOutcome {
            plan,
            results,
            synthesis,
            validation,
        } = outcome;

        let pool: Vec<Document> = results
            .iter()
            .flat_map(|r| r.documents.iter().cloned())
            .collect();
        let mut sources = dedup_documents(pool);
        sort_by_effective_score(&mut sources);
        sources.truncate(MAX_RESPONSE_SOURCES);

        // graph payloads merge in emission order, later steps win
        let mut graph_insights = HashMap::new();
        for result in results
            .iter()
            .filter(|r| r.strategy == RetrievalStrategy::Graph)
        {
            graph_insights.extend(
                result
                    .graph_data
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }

        let confidence =
            (synthesis.confidence + validation.confidence_adjustment).clamp(0.0, 1.0);

        info!(
            plan_id = %plan.plan_id,
            complexity = plan.complexity.as_str(),
            strategy = plan.synthesis_strategy.as_str(),
            confidence,
            valid = validation.is_valid,
            "query answered"
        );

        QueryResponse {
            answer: synthesis.answer,
            confidence,
            sources,
            execution_time: started.elapsed().as_secs_f64(),
            graph_insights,
            metadata: ResponseMetadata {
                complexity: Some(plan.complexity),
                strategy: Some(plan.synthesis_strategy),
                reasoning_steps: synthesis.reasoning_steps,
                error: None,
                session_id: request.session_id.clone(),
                query_type: request.query_type.clone(),
            },
        }
    }

    fn error_response(
        &self,
        request: &QueryRequest,
        error: EngineError,
        started: Instant,
    ) -> QueryResponse {
        let summary = error.summary();
        warn!(error = %summary, "query failed");
        QueryResponse {
            answer: apology_for(&summary).to_string(),
            confidence: 0.0,
            sources: Vec::new(),
            execution_time: started.elapsed().as_secs_f64(),
            graph_insights: HashMap::new(),
            metadata: ResponseMetadata {
                complexity: None,
                strategy: None,
                reasoning_steps: Vec::new(),
                error: Some(summary),
                session_id: request.session_id.clone(),
                query_type: request.query_type.clone(),
            },
        }
    }

    /// Fold the finished response into the rolling averages. Only reached
    /// for successful responses; failures leave the averages untouched.
    async fn record_success(&self, response: &QueryResponse) {
        let mut stats = self.stats.write().await;
        stats.successful_queries += 1;
        let n = stats.successful_queries as f64;
        stats.avg_response_time += (response.execution_time - stats.avg_response_time) / n;
        stats.avg_confidence += (response.confidence - stats.avg_confidence) / n;
    }
}

/// A refined answer replaces the prior one only when its overall score
/// strictly improves; ties keep the original.
fn keep_refinement(prior: &ValidationResult, revised: &ValidationResult) -> bool {
    revised.overall_score > prior.overall_score
}

/// Deterministic apology choice keyed on the failure summary
fn apology_for(summary: &str) -> &'static str {
    APOLOGIES[(xxh3_64(summary.as_bytes()) % APOLOGIES.len() as u64) as usize]
}
