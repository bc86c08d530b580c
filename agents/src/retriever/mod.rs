//! Retrieval agent
//!
//! Executes one plan step at a time: resolves dynamic queries from
//! dependency results, consults the per-step cache, dispatches on the
//! step's strategy, and walks the fallback chain when an adapter fails.
//! Adapter errors never escape this module; an exhausted chain produces an
//! empty result with zero confidence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use mimir_adapters::error::AdapterError;
use mimir_adapters::graph::GraphStore;
use mimir_adapters::vector::VectorStore;
use mimir_core::cache::{CacheKey, RetrievalCache};
use mimir_core::text;
use mimir_core::types::{Document, RetrievalResult, RetrievalStep, RetrievalStrategy};

mod dedup;
mod strategies;

pub use dedup::{dedup_documents, rerank, sort_by_effective_score};

/// Documents plus any graph payload a strategy produced
#[derive(Debug, Default)]
pub(crate) struct StrategyOutput {
    pub documents: Vec<Document>,
    pub graph_data: HashMap<String, serde_json::Value>,
}

pub struct Retriever {
    pub(crate) vector: Arc<dyn VectorStore>,
    pub(crate) graph: Arc<dyn GraphStore>,
    cache: Option<RetrievalCache>,
}

impl Retriever {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        cache: Option<RetrievalCache>,
    ) -> Self {
        Self { vector, graph, cache }
    }

    /// Execute one retrieval step against the adapters.
    ///
    /// `previous` maps step ids to already-resolved results; only declared
    /// dependencies are consulted. The returned documents are ordered by
    /// effective score, descending.
    pub async fn execute_step(
        &self,
        step: &RetrievalStep,
        user_context: &HashMap<String, String>,
        previous: &HashMap<usize, Arc<RetrievalResult>>,
    ) -> RetrievalResult {
        let effective_query = resolve_dynamic_query(step, previous);
        let cache_key = self.cache_key(step, &effective_query, user_context);

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            if let Some(hit) = cache.get(key) {
                debug!(step_id = step.step_id, "retrieval cache hit");
                return (*hit).clone();
            }
        }

        let started = Instant::now();
        let (output, fallbacks_exhausted) = match self
            .run_with_fallbacks(step, &effective_query, user_context)
            .await
        {
            Ok(output) => (output, false),
            Err(_) => (StrategyOutput::default(), true),
        };
        let mut documents = dedup_documents(output.documents);
        sort_by_effective_score(&mut documents);
        documents.truncate(step.max_results);

        let confidence =
            RetrievalResult::compute_confidence(&documents, step.max_results, step.threshold);
        let result = RetrievalResult {
            step_id: step.step_id,
            query_text: effective_query,
            strategy: step.strategy,
            documents,
            confidence,
            execution_time: started.elapsed().as_secs_f64(),
            graph_data: output.graph_data,
            fallbacks_exhausted,
        };

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.insert(key, Arc::new(result.clone()));
        }
        result
    }

    fn cache_key(
        &self,
        step: &RetrievalStep,
        effective_query: &str,
        user_context: &HashMap<String, String>,
    ) -> Option<u64> {
        self.cache.as_ref()?;
        Some(
            CacheKey::new()
                .field(effective_query)
                .field(step.strategy.as_str())
                .field_usize(step.max_results)
                .field_f64(step.threshold)
                .sorted_pairs(
                    user_context
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str())),
                )
                .finish(),
        )
    }

    /// Walk the declared fallback chain until a strategy succeeds or the
    /// chain is exhausted. The final error is returned so the caller can
    /// tell an outage apart from a healthy zero-hit search.
    async fn run_with_fallbacks(
        &self,
        step: &RetrievalStep,
        query: &str,
        user_context: &HashMap<String, String>,
    ) -> Result<StrategyOutput, AdapterError> {
        let mut current = step.strategy;
        loop {
            match self.run_strategy(current, step, query, user_context).await {
                Ok(output) => return Ok(output),
                Err(error) => match fallback_of(current) {
                    Some(next) => {
                        warn!(
                            step_id = step.step_id,
                            strategy = current.as_str(),
                            fallback = next.as_str(),
                            %error,
                            "retrieval strategy failed, falling back"
                        );
                        current = next;
                    }
                    None => {
                        warn!(
                            step_id = step.step_id,
                            strategy = current.as_str(),
                            %error,
                            "retrieval fallbacks exhausted"
                        );
                        return Err(error);
                    }
                },
            }
        }
    }

    async fn run_strategy(
        &self,
        strategy: RetrievalStrategy,
        step: &RetrievalStep,
        query: &str,
        user_context: &HashMap<String, String>,
    ) -> Result<StrategyOutput, AdapterError> {
        match strategy {
            RetrievalStrategy::Direct => {
                self.run_direct(query, step.threshold, step.max_results).await
            }
            RetrievalStrategy::Semantic => {
                self.run_semantic(query, step.threshold, step.max_results, user_context)
                    .await
            }
            RetrievalStrategy::Graph => self.run_graph(query, step.max_results).await,
            RetrievalStrategy::Hybrid => {
                self.run_hybrid(query, step.threshold, step.max_results, user_context)
                    .await
            }
            RetrievalStrategy::Iterative => {
                self.run_iterative(query, step.threshold, step.max_results, user_context)
                    .await
            }
        }
    }
}

/// Declared fallback per strategy; `None` ends the chain
fn fallback_of(strategy: RetrievalStrategy) -> Option<RetrievalStrategy> {
    match strategy {
        RetrievalStrategy::Direct => None,
        RetrievalStrategy::Semantic => Some(RetrievalStrategy::Direct),
        RetrievalStrategy::Graph => Some(RetrievalStrategy::Semantic),
        RetrievalStrategy::Hybrid => Some(RetrievalStrategy::Semantic),
        RetrievalStrategy::Iterative => Some(RetrievalStrategy::Semantic),
    }
}

/// For dynamic-query steps with at least one satisfied dependency, extend
/// the step query with the strongest terms from the dependencies' top
/// documents: word tokens of length >= 4, stop words excluded, at most 5.
fn resolve_dynamic_query(
    step: &RetrievalStep,
    previous: &HashMap<usize, Arc<RetrievalResult>>,
) -> String {
    if !step.metadata.dynamic_query {
        return step.query_text.clone();
    }
    let mut dependency_texts: Vec<&str> = Vec::new();
    for dep in &step.dependencies {
        if let Some(result) = previous.get(dep) {
            for doc in result.documents.iter().take(3) {
                dependency_texts.push(&doc.content);
            }
        }
    }
    if dependency_texts.is_empty() {
        return step.query_text.clone();
    }
    let terms = text::ranked_terms(dependency_texts.into_iter(), 4, 5);
    if terms.is_empty() {
        step.query_text.clone()
    } else {
        format!("{} {}", step.query_text, terms.join(" "))
    }
}
