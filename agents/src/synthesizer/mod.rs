//! Synthesis agent
//!
//! Prepares a reranked document pool from the retrieval results, dispatches
//! on the plan's synthesis strategy, and scores its own confidence.
//! Composition is extractive and deterministic; when a language model is
//! configured, creative synthesis may use it to phrase its insights, falling
//! back to the extractive text on any adapter error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use mimir_adapters::llm::{synthesis_prompt, LlmClient};
use mimir_core::cache::{CacheKey, SynthesisCache};
use mimir_core::error::EngineError;
use mimir_core::text;
use mimir_core::types::{
    Document, RetrievalResult, SynthesisResult, SynthesisStrategy, ValidationResult,
};

use crate::retriever::{dedup_documents, rerank};

mod intent;
mod strategies;

pub use intent::{classify_intent, QueryIntent};
use strategies::{
    compose_comparative, compose_creative, compose_reasoning, compose_simple, ComposedAnswer,
};

/// Answers opening with one of these are floored to minimum confidence
const APOLOGY_PREFIXES: [&str; 4] = ["I'm sorry", "I apologize", "Sorry", "Unfortunately"];

/// Cap on supporting sources attached to a synthesis result
const MAX_SOURCES: usize = 5;

pub struct Synthesizer {
    llm: Option<Arc<dyn LlmClient>>,
    cache: Option<SynthesisCache>,
}

impl Synthesizer {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, cache: Option<SynthesisCache>) -> Self {
        Self { llm, cache }
    }

    /// Compose an answer from the retrieval results under `strategy`.
    pub async fn synthesize(
        &self,
        query: &str,
        retrieval_results: &[Arc<RetrievalResult>],
        strategy: SynthesisStrategy,
        _user_context: &HashMap<String, String>,
    ) -> Result<SynthesisResult, EngineError> {
        let cache_key = self.cache_key(query, strategy, retrieval_results);
        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            if let Some(hit) = cache.get(key) {
                debug!(strategy = strategy.as_str(), "synthesis cache hit");
                return Ok((*hit).clone());
            }
        }

        let started = Instant::now();
        let documents = prepare_documents(query, retrieval_results);
        let composed = self.compose(strategy, query, &documents, &[]).await;
        let result = self.build_result(strategy, composed, documents, started);

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.insert(key, Arc::new(result.clone()));
        }
        Ok(result)
    }

    /// Rerun the prior strategy with the validator's suggestions injected.
    ///
    /// A no-op when the validator did not ask for refinement: the prior
    /// result is returned unchanged. The caller decides whether to keep the
    /// refined answer.
    pub async fn refine(
        &self,
        query: &str,
        prior: &SynthesisResult,
        feedback: &ValidationResult,
        retrieval_results: &[Arc<RetrievalResult>],
        _user_context: &HashMap<String, String>,
    ) -> Result<SynthesisResult, EngineError> {
        if !feedback.needs_refinement {
            return Ok(prior.clone());
        }
        info!(
            strategy = prior.strategy.as_str(),
            suggestions = feedback.suggestions.len(),
            "refining synthesis with validator feedback"
        );
        let started = Instant::now();
        let documents = prepare_documents(query, retrieval_results);
        let composed = self
            .compose(prior.strategy, query, &documents, &feedback.suggestions)
            .await;
        Ok(self.build_result(prior.strategy, composed, documents, started))
    }

    async fn compose(
        &self,
        strategy: SynthesisStrategy,
        query: &str,
        documents: &[Document],
        hints: &[String],
    ) -> ComposedAnswer {
        match strategy {
            SynthesisStrategy::Simple => compose_simple(query, documents, hints),
            SynthesisStrategy::Reasoning => compose_reasoning(query, documents, hints),
            SynthesisStrategy::Comparative => compose_comparative(query, documents, hints),
            SynthesisStrategy::Creative => {
                let mut composed = compose_creative(query, documents, hints);
                if let Some(llm) = &self.llm {
                    composed = self.phrase_with_llm(llm, query, documents, composed).await;
                }
                composed
            }
        }
    }

    /// Ask the model to phrase the extractive insights; keep the extractive
    /// text when the call fails or returns nothing.
    async fn phrase_with_llm(
        &self,
        llm: &Arc<dyn LlmClient>,
        query: &str,
        documents: &[Document],
        mut composed: ComposedAnswer,
    ) -> ComposedAnswer {
        let evidence: Vec<&str> = documents
            .iter()
            .take(MAX_SOURCES)
            .map(|d| d.content.as_str())
            .collect();
        let (prompt, params) = synthesis_prompt(SynthesisStrategy::Creative, query, &evidence);
        match llm.complete(&prompt, &params).await {
            Ok(text) if !text.trim().is_empty() => {
                composed.answer = text.trim().to_string();
                composed
                    .reasoning_steps
                    .push("Phrased insights with the language model".to_string());
                composed
            }
            Ok(_) => composed,
            Err(error) => {
                warn!(%error, "creative phrasing failed, keeping extractive answer");
                composed
            }
        }
    }

    fn build_result(
        &self,
        strategy: SynthesisStrategy,
        composed: ComposedAnswer,
        documents: Vec<Document>,
        started: Instant,
    ) -> SynthesisResult {
        let confidence = compute_confidence(
            &composed.answer,
            composed.reasoning_steps.len(),
            &documents,
        );
        let sources: Vec<Document> = documents.into_iter().take(MAX_SOURCES).collect();
        SynthesisResult {
            answer: composed.answer,
            confidence,
            sources,
            reasoning_steps: composed.reasoning_steps,
            strategy,
            execution_time: started.elapsed().as_secs_f64(),
        }
    }

    fn cache_key(
        &self,
        query: &str,
        strategy: SynthesisStrategy,
        retrieval_results: &[Arc<RetrievalResult>],
    ) -> Option<u64> {
        self.cache.as_ref()?;
        let mut step_ids: Vec<usize> = retrieval_results.iter().map(|r| r.step_id).collect();
        step_ids.sort_unstable();
        let mut key = CacheKey::new().field(query).field(strategy.as_str());
        for id in step_ids {
            key = key.field_usize(id);
        }
        Some(key.finish())
    }
}

/// Union the documents across results, dedup, rerank against the query,
/// and sort by composite score descending.
fn prepare_documents(query: &str, retrieval_results: &[Arc<RetrievalResult>]) -> Vec<Document> {
    let pool: Vec<Document> = retrieval_results
        .iter()
        .flat_map(|r| r.documents.iter().cloned())
        .collect();
    let mut documents = dedup_documents(pool);
    rerank(&mut documents, query);
    documents
}

/// Confidence: capped average document score, a bonus per reasoning step,
/// and a length bonus; floored for apologetic answers. Empty document
/// pools pin the canonical answer at minimum confidence.
fn compute_confidence(answer: &str, reasoning_step_count: usize, documents: &[Document]) -> f64 {
    if documents.is_empty() {
        return 0.1;
    }
    let avg_score = documents.iter().map(|d| d.score).sum::<f64>() / documents.len() as f64;
    let base = avg_score.min(0.8);
    let reasoning_bonus = (reasoning_step_count as f64 * 0.05).min(0.2);
    let length_bonus = (text::word_count(answer) as f64 / 100.0).min(0.1);
    let confidence = (base + reasoning_bonus + length_bonus).clamp(0.1, 1.0);
    if APOLOGY_PREFIXES.iter().any(|p| answer.starts_with(p)) {
        0.1
    } else {
        confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimir_core::types::{DocumentSource, RetrievalStrategy};

    fn result_with_docs(step_id: usize, docs: Vec<Document>) -> Arc<RetrievalResult> {
        Arc::new(RetrievalResult {
            step_id,
            query_text: "q".to_string(),
            strategy: RetrievalStrategy::Semantic,
            documents: docs,
            confidence: 0.8,
            execution_time: 0.0,
            graph_data: HashMap::new(),
            fallbacks_exhausted: false,
        })
    }

    fn doc(id: &str, content: &str, score: f64) -> Document {
        Document::new(Some(id.to_string()), content, score, DocumentSource::SemanticSearch)
    }

    #[tokio::test]
    async fn synthesize_is_idempotent_for_identical_inputs() -> anyhow::Result<()> {
        let synthesizer = Synthesizer::new(None, Some(SynthesisCache::new(8)));
        let results = vec![result_with_docs(
            1,
            vec![doc("d1", "Binary search needs a sorted array to work", 0.9)],
        )];
        let first = synthesizer
            .synthesize("what is binary search", &results, SynthesisStrategy::Simple, &HashMap::new())
            .await?;
        let second = synthesizer
            .synthesize("what is binary search", &results, SynthesisStrategy::Simple, &HashMap::new())
            .await?;
        assert_eq!(first.answer, second.answer);
        assert_eq!(first.confidence, second.confidence);
        Ok(())
    }

    #[tokio::test]
    async fn empty_results_give_canonical_low_confidence_answer() -> anyhow::Result<()> {
        let synthesizer = Synthesizer::new(None, None);
        let results = vec![result_with_docs(1, Vec::new())];
        let out = synthesizer
            .synthesize("anything", &results, SynthesisStrategy::Reasoning, &HashMap::new())
            .await?;
        assert!(out.answer.contains("couldn't find relevant information"));
        assert!((out.confidence - 0.1).abs() < 1e-9);
        assert!(out.sources.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn sources_are_capped_at_five() -> anyhow::Result<()> {
        let docs: Vec<Document> = (0..8)
            .map(|i| doc(&format!("d{i}"), &format!("distinct content body number {i}"), 0.9 - i as f64 * 0.05))
            .collect();
        let synthesizer = Synthesizer::new(None, None);
        let out = synthesizer
            .synthesize("content body", &[result_with_docs(1, docs)], SynthesisStrategy::Simple, &HashMap::new())
            .await?;
        assert_eq!(out.sources.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn refine_is_noop_when_not_requested() -> anyhow::Result<()> {
        let synthesizer = Synthesizer::new(None, None);
        let results = vec![result_with_docs(
            1,
            vec![doc("d1", "Some supporting evidence text here", 0.8)],
        )];
        let prior = synthesizer
            .synthesize("question", &results, SynthesisStrategy::Simple, &HashMap::new())
            .await?;
        let mut feedback = ValidationResult::indeterminate();
        feedback.needs_refinement = false;
        let refined = synthesizer
            .refine("question", &prior, &feedback, &results, &HashMap::new())
            .await?;
        assert_eq!(refined.answer, prior.answer);
        assert_eq!(refined.reasoning_steps, prior.reasoning_steps);
        Ok(())
    }

    #[tokio::test]
    async fn refine_reruns_strategy_with_suggestions() -> anyhow::Result<()> {
        let synthesizer = Synthesizer::new(None, None);
        let results = vec![result_with_docs(
            1,
            vec![doc(
                "d1",
                "Caches speed up reads. Write-through keeps the cache consistent with storage",
                0.8,
            )],
        )];
        let prior = synthesizer
            .synthesize("how do caches help", &results, SynthesisStrategy::Simple, &HashMap::new())
            .await?;
        let mut feedback = ValidationResult::indeterminate();
        feedback.needs_refinement = true;
        feedback.suggestions = vec!["mention write-through consistency storage".to_string()];
        let refined = synthesizer
            .refine("how do caches help", &prior, &feedback, &results, &HashMap::new())
            .await?;
        assert!(refined
            .reasoning_steps
            .iter()
            .any(|s| s.contains("refinement suggestions")));
        Ok(())
    }

    #[test]
    fn apologetic_answers_are_floored() {
        let docs = vec![doc("d1", "irrelevant", 0.9)];
        let c = compute_confidence("I'm sorry, something went wrong", 2, &docs);
        assert!((c - 0.1).abs() < 1e-9);
    }
}
