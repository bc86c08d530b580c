//! Query planner
//!
//! Classifies query complexity with a pattern-score ensemble, emits the
//! retrieval step DAG for that complexity, picks the synthesis strategy,
//! and attaches advisory time/confidence estimates. Classification is pure
//! table lookup plus counting, so identical queries always plan identically.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use mimir_core::error::EngineError;
use mimir_core::text;
use mimir_core::types::{
    QueryComplexity, QueryPlan, RetrievalStep, RetrievalStrategy, StepMetadata, SynthesisStrategy,
};

struct ComplexityPatterns {
    simple: Vec<Regex>,
    moderate: Vec<Regex>,
    complex: Vec<Regex>,
    expert: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

/// Compiled once; matched against the lowercased query
static COMPLEXITY_PATTERNS: Lazy<ComplexityPatterns> = Lazy::new(|| ComplexityPatterns {
    simple: compile(&[r"what is", r"define", r"show me", r"\blist\b"]),
    moderate: compile(&[
        r"how (to|do|does)",
        r"explain",
        r"\bcompare\b",
        r"difference between",
    ]),
    complex: compile(&[
        r"why.*better",
        r"optimi[sz]e",
        r"refactor",
        r"architecture",
        r"compare \w+ and \w+",
        r"\blatency\b",
    ]),
    expert: compile(&[
        r"performance.*analysis",
        r"security.*implications",
        r"scalability",
        r"migration.*strategy",
    ]),
});

/// Pronouns that make a moderate query worth a clarification pass
static AMBIGUOUS_PRONOUNS: &[&str] = &["it", "this", "that", "thing", "stuff"];

/// Tokens hinting the query targets concrete code artifacts
static CODE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(function|class|method)\b").unwrap());

pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Planner
    }

    /// Analyze `query` and emit a validated execution plan.
    ///
    /// Fails with `InvalidQuery` only when the query is empty.
    pub fn create_plan(
        &self,
        query: &str,
        context: &HashMap<String, String>,
    ) -> Result<QueryPlan, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::InvalidQuery("query is empty".to_string()));
        }
        debug!(query, context_keys = context.len(), "planning query");

        let complexity = classify_complexity(query);
        let steps = emit_steps(query, complexity);
        let synthesis_strategy = select_synthesis_strategy(query, complexity);
        let estimated_time = estimate_time(&steps, synthesis_strategy);
        let confidence = estimate_confidence(query, complexity, steps.len());

        let plan = QueryPlan {
            plan_id: Uuid::new_v4(),
            original_query: query.to_string(),
            complexity,
            steps,
            synthesis_strategy,
            estimated_time,
            confidence,
            created_at: Utc::now(),
        };
        plan.validate_dag()?;
        info!(
            plan_id = %plan.plan_id,
            complexity = complexity.as_str(),
            steps = plan.steps.len(),
            synthesis = synthesis_strategy.as_str(),
            "plan created"
        );
        Ok(plan)
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

/// Pattern-score ensemble. Each table hit counts once per match; word-count
/// and question-mark adjustments nudge long or multi-part queries upward.
/// Ties resolve toward the higher complexity.
fn classify_complexity(query: &str) -> QueryComplexity {
    let lowered = query.to_lowercase();
    let count = |patterns: &[Regex]| -> usize {
        patterns.iter().map(|p| p.find_iter(&lowered).count()).sum()
    };

    let mut scores = [
        (QueryComplexity::Simple, count(&COMPLEXITY_PATTERNS.simple)),
        (QueryComplexity::Moderate, count(&COMPLEXITY_PATTERNS.moderate)),
        (QueryComplexity::Complex, count(&COMPLEXITY_PATTERNS.complex)),
        (QueryComplexity::Expert, count(&COMPLEXITY_PATTERNS.expert)),
    ];

    let words = text::word_count(query);
    if words > 20 {
        scores[2].1 += 1;
    }
    if words > 30 {
        scores[3].1 += 1;
    }
    if query.matches('?').count() > 1 {
        scores[2].1 += 1;
    }

    let mut best = (QueryComplexity::Simple, 0usize);
    for (complexity, score) in scores {
        if score >= best.1 && score > 0 {
            best = (complexity, score);
        }
    }
    best.0
}

fn emit_steps(query: &str, complexity: QueryComplexity) -> Vec<RetrievalStep> {
    match complexity {
        QueryComplexity::Simple => {
            vec![RetrievalStep::new(1, query, RetrievalStrategy::Direct, 5, 0.8)]
        }
        QueryComplexity::Moderate => {
            let mut steps = vec![RetrievalStep::new(
                1,
                query,
                RetrievalStrategy::Semantic,
                10,
                0.7,
            )];
            if has_ambiguous_pronoun(query) {
                steps.push(
                    RetrievalStep::new(2, query, RetrievalStrategy::Direct, 5, 0.8)
                        .with_dependencies(vec![1]),
                );
            }
            steps
        }
        QueryComplexity::Complex => vec![
            RetrievalStep::new(1, query, RetrievalStrategy::Semantic, 15, 0.6),
            RetrievalStep::new(
                2,
                key_concept_query(query),
                RetrievalStrategy::Graph,
                10,
                0.7,
            )
            .with_dependencies(vec![1]),
            RetrievalStep::new(3, query, RetrievalStrategy::Direct, 5, 0.8)
                .with_dependencies(vec![1, 2])
                .with_metadata(StepMetadata {
                    dynamic_query: true,
                    validation_step: false,
                }),
        ],
        QueryComplexity::Expert => vec![
            RetrievalStep::new(1, query, RetrievalStrategy::Semantic, 20, 0.5),
            RetrievalStep::new(
                2,
                domain_term_query(query),
                RetrievalStrategy::Graph,
                15,
                0.6,
            )
            .with_dependencies(vec![1]),
            RetrievalStep::new(
                3,
                comparative_query(query),
                RetrievalStrategy::Hybrid,
                10,
                0.7,
            )
            .with_dependencies(vec![1, 2]),
            RetrievalStep::new(4, query, RetrievalStrategy::Iterative, 10, 0.7)
                .with_dependencies(vec![1, 2, 3])
                .with_metadata(StepMetadata {
                    dynamic_query: false,
                    validation_step: true,
                }),
        ],
    }
}

fn has_ambiguous_pronoun(query: &str) -> bool {
    let words = text::word_set(query);
    AMBIGUOUS_PRONOUNS.iter().any(|p| words.contains(*p))
}

/// Graph anchor text for complex queries: the key concepts, or the query
/// itself when nothing qualifies
fn key_concept_query(query: &str) -> String {
    let concepts = text::key_concepts(query);
    if concepts.is_empty() {
        query.to_string()
    } else {
        concepts.join(" ")
    }
}

/// Graph anchor text for expert queries: code-shaped tokens first
fn domain_term_query(query: &str) -> String {
    let mut terms = text::call_tokens(query);
    terms.extend(text::camel_case_tokens(query));
    terms.extend(text::dotted_tokens(query));
    if terms.is_empty() {
        return key_concept_query(query);
    }
    terms.join(" ")
}

fn comparative_query(query: &str) -> String {
    format!("compare different approaches: {query}")
}

/// Base table keyed by complexity, then keyword overrides. Complex queries
/// fall back to reasoning unless comparison or creative keywords retain a
/// more specific strategy.
fn select_synthesis_strategy(query: &str, complexity: QueryComplexity) -> SynthesisStrategy {
    let lowered = query.to_lowercase();
    if lowered.contains("compare") || lowered.contains("difference") {
        return SynthesisStrategy::Comparative;
    }
    if lowered.contains("creative") || lowered.contains("innovative") {
        return SynthesisStrategy::Creative;
    }
    match complexity {
        QueryComplexity::Simple => SynthesisStrategy::Simple,
        QueryComplexity::Moderate => SynthesisStrategy::Reasoning,
        QueryComplexity::Complex => SynthesisStrategy::Reasoning,
        QueryComplexity::Expert => SynthesisStrategy::Creative,
    }
}

fn estimate_time(steps: &[RetrievalStep], strategy: SynthesisStrategy) -> f64 {
    let synthesis_base = match strategy {
        SynthesisStrategy::Simple => 0.5,
        SynthesisStrategy::Reasoning => 2.0,
        SynthesisStrategy::Comparative => 3.0,
        SynthesisStrategy::Creative => 4.0,
    };
    let with_deps = steps.iter().filter(|s| !s.dependencies.is_empty()).count();
    1.5 * steps.len() as f64 + synthesis_base + 0.3 * with_deps as f64
}

fn estimate_confidence(query: &str, complexity: QueryComplexity, step_count: usize) -> f64 {
    let mut confidence: f64 = match complexity {
        QueryComplexity::Simple => 0.9,
        QueryComplexity::Moderate => 0.8,
        QueryComplexity::Complex => 0.7,
        QueryComplexity::Expert => 0.6,
    };
    if step_count > 3 {
        confidence -= 0.1;
    }
    if CODE_TOKEN_RE.is_match(&query.to_lowercase()) {
        confidence += 0.1;
    }
    confidence.clamp(0.1, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_for(query: &str) -> QueryPlan {
        Planner::new()
            .create_plan(query, &HashMap::new())
            .unwrap()
    }

    #[test]
    fn empty_query_is_rejected() {
        let err = Planner::new().create_plan("  ", &HashMap::new());
        assert!(matches!(err, Err(EngineError::InvalidQuery(_))));
    }

    #[test]
    fn factual_query_plans_one_direct_step() {
        let plan = plan_for("what is binary search");
        assert_eq!(plan.complexity, QueryComplexity::Simple);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].strategy, RetrievalStrategy::Direct);
        assert_eq!(plan.steps[0].max_results, 5);
        assert!((plan.steps[0].threshold - 0.8).abs() < 1e-9);
        assert_eq!(plan.synthesis_strategy, SynthesisStrategy::Simple);
    }

    #[test]
    fn ambiguous_moderate_query_gets_clarification_step() {
        let plan = plan_for("how does it work");
        assert_eq!(plan.complexity, QueryComplexity::Moderate);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].strategy, RetrievalStrategy::Semantic);
        assert_eq!(plan.steps[1].strategy, RetrievalStrategy::Direct);
        assert_eq!(plan.steps[1].dependencies, vec![1]);
        // the clarification step waits on the semantic pass but runs the
        // user's query as written
        assert!(!plan.steps[1].metadata.dynamic_query);
    }

    #[test]
    fn unambiguous_moderate_query_stays_single_step() {
        let plan = plan_for("explain quicksort partitioning");
        assert_eq!(plan.complexity, QueryComplexity::Moderate);
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn comparative_query_plans_complex_pipeline() {
        let plan = plan_for("compare REST and gRPC for low-latency services");
        assert_eq!(plan.complexity, QueryComplexity::Complex);
        assert_eq!(plan.synthesis_strategy, SynthesisStrategy::Comparative);
        let strategies: Vec<_> = plan.steps.iter().map(|s| s.strategy).collect();
        assert_eq!(
            strategies,
            vec![
                RetrievalStrategy::Semantic,
                RetrievalStrategy::Graph,
                RetrievalStrategy::Direct
            ]
        );
        assert!(plan.steps[2].metadata.dynamic_query);
        assert_eq!(plan.steps[2].dependencies, vec![1, 2]);
    }

    #[test]
    fn expert_query_plans_four_steps_ending_in_validation() {
        let plan = plan_for("refactor authentication for scalability and security");
        assert_eq!(plan.complexity, QueryComplexity::Expert);
        assert_eq!(plan.synthesis_strategy, SynthesisStrategy::Creative);
        assert_eq!(plan.steps.len(), 4);
        let last = plan.steps.last().unwrap();
        assert_eq!(last.strategy, RetrievalStrategy::Iterative);
        assert!(last.metadata.validation_step);
        assert_eq!(last.dependencies, vec![1, 2, 3]);
    }

    #[test]
    fn classification_is_deterministic() {
        let q = "why is columnar storage better for analytics?";
        let first = classify_complexity(q);
        for _ in 0..10 {
            assert_eq!(classify_complexity(q), first);
        }
    }

    #[test]
    fn long_queries_lean_complex() {
        let long = "please walk through every stage of the request lifecycle \
                    covering parsing validation routing middleware handler \
                    execution serialization compression and response delivery details";
        assert!(text::word_count(long) > 20);
        assert_eq!(classify_complexity(long), QueryComplexity::Complex);
    }

    #[test]
    fn multiple_question_marks_nudge_but_do_not_override() {
        // two simple-pattern hits outscore the question-mark bump
        let q = "what is sharding? and what is replication?";
        assert_eq!(classify_complexity(q), QueryComplexity::Simple);
        // with a single simple hit, the bump ties and the tie resolves up
        let q = "what is faster? the cache or the disk?";
        assert_eq!(classify_complexity(q), QueryComplexity::Complex);
    }

    #[test]
    fn advisory_fields_follow_the_formulas() {
        let plan = plan_for("what is binary search");
        // 1 step, no deps, simple synthesis
        assert!((plan.estimated_time - (1.5 + 0.5)).abs() < 1e-9);
        assert!((plan.confidence - 0.9).abs() < 1e-9);

        let plan = plan_for("refactor authentication for scalability and security");
        // 4 steps, 3 with deps, creative synthesis
        assert!((plan.estimated_time - (6.0 + 4.0 + 0.9)).abs() < 1e-9);
        // expert base 0.6 minus step-count penalty
        assert!((plan.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn code_tokens_boost_confidence() {
        let plan = plan_for("what is the main function");
        assert!((plan.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn every_plan_validates_its_dag() {
        for q in [
            "what is a b-tree",
            "how does this work",
            "compare REST and gRPC for low-latency services",
            "refactor authentication for scalability and security",
        ] {
            assert!(plan_for(q).validate_dag().is_ok());
        }
    }
}
