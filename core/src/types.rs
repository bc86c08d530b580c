//! Core data model for the retrieval-augmented query engine
//!
//! Every entity here is created per-request and treated as immutable once it
//! crosses an agent boundary. Agents receive snapshots and produce new values;
//! the orchestrator owns the aggregates for the lifetime of a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::EngineError;

/// Query complexity level, assigned once by the planner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl QueryComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryComplexity::Simple => "simple",
            QueryComplexity::Moderate => "moderate",
            QueryComplexity::Complex => "complex",
            QueryComplexity::Expert => "expert",
        }
    }
}

/// Retrieval strategy carried by each plan step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RetrievalStrategy {
    Direct,
    Semantic,
    Graph,
    Hybrid,
    Iterative,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Direct => "direct",
            RetrievalStrategy::Semantic => "semantic",
            RetrievalStrategy::Graph => "graph",
            RetrievalStrategy::Hybrid => "hybrid",
            RetrievalStrategy::Iterative => "iterative",
        }
    }
}

/// Synthesis strategy, one per plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SynthesisStrategy {
    Simple,
    Reasoning,
    Comparative,
    Creative,
}

impl SynthesisStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesisStrategy::Simple => "simple",
            SynthesisStrategy::Reasoning => "reasoning",
            SynthesisStrategy::Comparative => "comparative",
            SynthesisStrategy::Creative => "creative",
        }
    }
}

/// Source tag identifying which retrieval path produced a document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DocumentSource {
    DirectSearch,
    SemanticSearch,
    GraphTraversal,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::DirectSearch => "direct_search",
            DocumentSource::SemanticSearch => "semantic_search",
            DocumentSource::GraphTraversal => "graph_traversal",
        }
    }

    /// Weight applied during composite reranking
    pub fn rerank_weight(&self) -> f64 {
        match self {
            DocumentSource::DirectSearch => 1.0,
            DocumentSource::SemanticSearch => 1.2,
            DocumentSource::GraphTraversal => 0.8,
        }
    }

    /// Weight applied by the accuracy dimension when scoring source quality
    pub fn quality_weight(&self) -> f64 {
        match self {
            DocumentSource::SemanticSearch => 1.0,
            DocumentSource::DirectSearch => 0.9,
            DocumentSource::GraphTraversal => 0.8,
        }
    }
}

/// Recognized per-step metadata flags
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepMetadata {
    /// Step query is completed with top terms from dependency results
    #[serde(default)]
    pub dynamic_query: bool,
    /// Step exists to cross-check earlier retrieval rounds
    #[serde(default)]
    pub validation_step: bool,
}

/// Immutable retrieval step specification produced by the planner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalStep {
    /// 1-based emission index, unique within the plan
    pub step_id: usize,
    pub query_text: String,
    pub strategy: RetrievalStrategy,
    pub max_results: usize,
    /// Similarity floor in [0, 1]
    pub threshold: f64,
    /// Step ids this step waits on; must reference earlier steps only
    pub dependencies: Vec<usize>,
    pub metadata: StepMetadata,
}

impl RetrievalStep {
    pub fn new(
        step_id: usize,
        query_text: impl Into<String>,
        strategy: RetrievalStrategy,
        max_results: usize,
        threshold: f64,
    ) -> Self {
        Self {
            step_id,
            query_text: query_text.into(),
            strategy,
            max_results,
            threshold,
            dependencies: Vec::new(),
            metadata: StepMetadata::default(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<usize>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_metadata(mut self, metadata: StepMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Root aggregate: the retrieval DAG plus the synthesis choice for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub plan_id: Uuid,
    pub original_query: String,
    pub complexity: QueryComplexity,
    pub steps: Vec<RetrievalStep>,
    pub synthesis_strategy: SynthesisStrategy,
    /// Advisory estimate in seconds
    pub estimated_time: f64,
    /// Advisory confidence in [0, 1]
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl QueryPlan {
    /// Check the dependency graph: ids are 1-based emission indices and every
    /// dependency must point at a strictly earlier step. That rules out
    /// cycles without a full topological sort.
    pub fn validate_dag(&self) -> Result<(), EngineError> {
        if self.steps.is_empty() {
            return Err(EngineError::PlanInfeasible(
                "plan contains no retrieval steps".to_string(),
            ));
        }
        for (position, step) in self.steps.iter().enumerate() {
            let expected_id = position + 1;
            if step.step_id != expected_id {
                return Err(EngineError::PlanInfeasible(format!(
                    "step at position {} carries id {}",
                    position, step.step_id
                )));
            }
            for &dep in &step.dependencies {
                if dep == 0 || dep >= step.step_id {
                    return Err(EngineError::PlanInfeasible(format!(
                        "step {} depends on non-earlier step {}",
                        step.step_id, dep
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A retrieved text fragment with score and provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Corpus identifier; absent for synthesized fragments (e.g. graph paths)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Similarity score in [0, 1]
    pub score: f64,
    pub source: DocumentSource,
    /// Reweighted score added during reranking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_score: Option<f64>,
}

impl Document {
    pub fn new(
        id: Option<String>,
        content: impl Into<String>,
        score: f64,
        source: DocumentSource,
    ) -> Self {
        Self {
            id,
            content: content.into(),
            metadata: HashMap::new(),
            score,
            source,
            composite_score: None,
        }
    }

    /// Score used for ordering: composite when reranked, raw otherwise
    pub fn effective_score(&self) -> f64 {
        self.composite_score.unwrap_or(self.score)
    }
}

/// Outcome of executing a single retrieval step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub step_id: usize,
    pub query_text: String,
    pub strategy: RetrievalStrategy,
    /// Ordered by effective score, descending
    pub documents: Vec<Document>,
    pub confidence: f64,
    /// Seconds spent executing the step
    pub execution_time: f64,
    /// Pass-through graph payload, populated only by the graph strategy
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub graph_data: HashMap<String, serde_json::Value>,
    /// True when every strategy in the fallback chain failed; an empty
    /// document list without this flag means the adapters were healthy
    /// but found nothing
    #[serde(default)]
    pub fallbacks_exhausted: bool,
}

impl RetrievalResult {
    /// Empty result used when every fallback for a step is exhausted
    pub fn empty(step_id: usize, query_text: &str, strategy: RetrievalStrategy) -> Self {
        Self {
            step_id,
            query_text: query_text.to_string(),
            strategy,
            documents: Vec::new(),
            confidence: 0.0,
            execution_time: 0.0,
            graph_data: HashMap::new(),
            fallbacks_exhausted: true,
        }
    }

    /// Blended confidence: average score, fill ratio against `max_results`,
    /// and the fraction of documents clearing `threshold`.
    pub fn compute_confidence(documents: &[Document], max_results: usize, threshold: f64) -> f64 {
        if documents.is_empty() || max_results == 0 {
            return 0.0;
        }
        let count = documents.len() as f64;
        let avg_score = documents.iter().map(|d| d.score).sum::<f64>() / count;
        let fill = (count / max_results as f64).min(1.0);
        let above = documents.iter().filter(|d| d.score >= threshold).count() as f64 / count;
        0.5 * avg_score + 0.3 * fill + 0.2 * above
    }
}

/// Synthesized answer plus the evidence trail behind it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub answer: String,
    pub confidence: f64,
    /// Supporting documents, capped at 5
    pub sources: Vec<Document>,
    pub reasoning_steps: Vec<String>,
    pub strategy: SynthesisStrategy,
    pub execution_time: f64,
}

/// Quality axes scored by the validator
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum ValidationDimension {
    Accuracy,
    Completeness,
    Relevance,
    Clarity,
    Consistency,
    Factuality,
}

impl ValidationDimension {
    pub const ALL: [ValidationDimension; 6] = [
        ValidationDimension::Accuracy,
        ValidationDimension::Completeness,
        ValidationDimension::Relevance,
        ValidationDimension::Clarity,
        ValidationDimension::Consistency,
        ValidationDimension::Factuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationDimension::Accuracy => "accuracy",
            ValidationDimension::Completeness => "completeness",
            ValidationDimension::Relevance => "relevance",
            ValidationDimension::Clarity => "clarity",
            ValidationDimension::Consistency => "consistency",
            ValidationDimension::Factuality => "factuality",
        }
    }

    /// Default weight in the overall score
    pub fn default_weight(&self) -> f64 {
        match self {
            ValidationDimension::Accuracy => 0.25,
            ValidationDimension::Completeness => 0.15,
            ValidationDimension::Relevance => 0.25,
            ValidationDimension::Clarity => 0.15,
            ValidationDimension::Consistency => 0.10,
            ValidationDimension::Factuality => 0.10,
        }
    }
}

/// Validator verdict on one synthesis result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub overall_score: f64,
    /// BTreeMap keeps dimension iteration order deterministic
    pub dimension_scores: std::collections::BTreeMap<ValidationDimension, f64>,
    pub issues_found: Vec<String>,
    pub suggestions: Vec<String>,
    /// Signed delta in [-0.2, +0.1]; applied by the orchestrator
    pub confidence_adjustment: f64,
    pub needs_refinement: bool,
    pub is_valid: bool,
}

impl ValidationResult {
    /// Indeterminate verdict: not valid, but refinement is pointless
    pub fn indeterminate() -> Self {
        Self {
            overall_score: 0.0,
            dimension_scores: std::collections::BTreeMap::new(),
            issues_found: vec!["validation could not be completed".to_string()],
            suggestions: Vec::new(),
            confidence_adjustment: 0.0,
            needs_refinement: false,
            is_valid: false,
        }
    }
}

/// Inbound query with caller context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    /// Free-form user context; `domain` and `language` feed query expansion
    #[serde(default)]
    pub user_context: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Per-request deadline override
    #[serde(skip)]
    pub deadline: Option<Duration>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            query_type: None,
            user_context: HashMap::new(),
            session_id: None,
            deadline: None,
        }
    }
}

/// Metadata block attached to every response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<QueryComplexity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SynthesisStrategy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning_steps: Vec<String>,
    /// Root-cause summary when the request failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
}

/// Final engine output for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub confidence: f64,
    /// Deduplicated supporting documents, capped at 10
    pub sources: Vec<Document>,
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub graph_insights: HashMap<String, serde_json::Value>,
    pub metadata: ResponseMetadata,
}

/// Point-in-time view of the cumulative engine counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStatsSnapshot {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub refinement_attempts: u64,
    pub avg_response_time: f64,
    pub avg_confidence: f64,
}
