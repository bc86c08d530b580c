//! Validation agent
//!
//! Scores a synthesized answer on six quality dimensions, derives an
//! overall verdict, and decides whether a refinement pass is worth running.
//! All scoring is lexical and deterministic; the validator never calls the
//! language model.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::debug;

use mimir_core::config::EngineConfig;
use mimir_core::text;
use mimir_core::types::{
    Document, RetrievalResult, SynthesisResult, ValidationDimension, ValidationResult,
};

use crate::synthesizer::classify_intent;

/// Contradiction patterns checked against answers and sources
static CONTRADICTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["but.*however", "yes.*no", "always.*never", "all.*none"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// Transition phrases rewarded by the logical-flow score
static TRANSITIONS: &[&str] = &[
    "first", "then", "next", "finally", "because", "therefore", "however",
    "additionally", "for example", "in contrast",
];

/// Hedging words that raise the uncertainty level
static HEDGING_WORDS: &[&str] = &[
    "might", "could", "possibly", "perhaps", "maybe", "unclear", "uncertain", "unknown",
];

/// Validity and refinement thresholds, overridable via configuration
#[derive(Debug, Clone)]
struct QualityThresholds {
    accuracy: f64,
    relevance: f64,
    completeness: f64,
    overall: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            accuracy: 0.8,
            relevance: 0.8,
            completeness: 0.7,
            overall: 0.7,
        }
    }
}

pub struct Validator {
    weights: BTreeMap<ValidationDimension, f64>,
    thresholds: QualityThresholds,
}

impl Validator {
    pub fn new(config: &EngineConfig) -> Self {
        let mut weights = BTreeMap::new();
        for dimension in ValidationDimension::ALL {
            let weight = config
                .dimension_weights
                .get(dimension.as_str())
                .copied()
                .unwrap_or_else(|| dimension.default_weight())
                .clamp(0.0, 1.0);
            weights.insert(dimension, weight);
        }
        let defaults = QualityThresholds::default();
        let threshold = |name: &str, default: f64| {
            config
                .quality_thresholds
                .get(name)
                .copied()
                .unwrap_or(default)
                .clamp(0.0, 1.0)
        };
        Self {
            weights,
            thresholds: QualityThresholds {
                accuracy: threshold("accuracy", defaults.accuracy),
                relevance: threshold("relevance", defaults.relevance),
                completeness: threshold("completeness", defaults.completeness),
                overall: threshold("overall", defaults.overall),
            },
        }
    }

    /// Score `synthesis` against the query and its retrieval evidence.
    ///
    /// An unscorable answer (empty text) yields the indeterminate verdict:
    /// not valid, no refinement requested.
    pub fn validate(
        &self,
        query: &str,
        synthesis: &SynthesisResult,
        _retrieval_results: &[std::sync::Arc<RetrievalResult>],
        _user_context: &HashMap<String, String>,
    ) -> ValidationResult {
        let answer = synthesis.answer.trim();
        if answer.is_empty() {
            return ValidationResult::indeterminate();
        }

        let mut issues: Vec<String> = Vec::new();
        let mut suggestions: Vec<String> = Vec::new();

        let accuracy = score_accuracy(answer, &synthesis.sources, &mut issues, &mut suggestions);
        let completeness = score_completeness(query, answer, &mut issues, &mut suggestions);
        let relevance = score_relevance(query, answer, &mut issues, &mut suggestions);
        let clarity = score_clarity(answer, &mut issues, &mut suggestions);
        let consistency = score_consistency(
            answer,
            &synthesis.reasoning_steps,
            &synthesis.sources,
            &mut issues,
        );
        let factuality = score_factuality(answer, &synthesis.sources, &mut issues);

        let mut dimension_scores = BTreeMap::new();
        dimension_scores.insert(ValidationDimension::Accuracy, accuracy);
        dimension_scores.insert(ValidationDimension::Completeness, completeness);
        dimension_scores.insert(ValidationDimension::Relevance, relevance);
        dimension_scores.insert(ValidationDimension::Clarity, clarity);
        dimension_scores.insert(ValidationDimension::Consistency, consistency);
        dimension_scores.insert(ValidationDimension::Factuality, factuality);

        let weight_sum: f64 = self.weights.values().sum();
        let overall_score = if weight_sum > 0.0 {
            dimension_scores
                .iter()
                .map(|(dim, score)| self.weights[dim] * score)
                .sum::<f64>()
                / weight_sum
        } else {
            0.0
        };

        let is_valid = accuracy >= self.thresholds.accuracy
            && relevance >= self.thresholds.relevance
            && overall_score >= self.thresholds.overall;
        let needs_refinement = accuracy < self.thresholds.accuracy
            || relevance < self.thresholds.relevance
            || completeness < self.thresholds.completeness
            || issues.len() > 3;

        let average = dimension_scores.values().sum::<f64>() / dimension_scores.len() as f64;
        let confidence_adjustment = if average > 0.8 {
            ((average - 0.8) * 0.5).min(0.1)
        } else if average < 0.6 {
            -(((0.6 - average) * 0.5).min(0.2))
        } else {
            0.0
        };

        debug!(
            overall = overall_score,
            accuracy,
            relevance,
            is_valid,
            needs_refinement,
            "validation complete"
        );

        ValidationResult {
            overall_score,
            dimension_scores,
            issues_found: issues,
            suggestions,
            confidence_adjustment,
            needs_refinement,
            is_valid,
        }
    }
}

/// Fraction of answer words present in a source's content
fn support_overlap(answer: &str, source_content: &str) -> f64 {
    let answer_words = text::word_set(answer);
    if answer_words.is_empty() {
        return 0.0;
    }
    let source_words = text::word_set(source_content);
    let shared = answer_words.intersection(&source_words).count();
    shared as f64 / answer_words.len() as f64
}

fn score_accuracy(
    answer: &str,
    sources: &[Document],
    issues: &mut Vec<String>,
    suggestions: &mut Vec<String>,
) -> f64 {
    if sources.is_empty() {
        issues.push("answer has no supporting sources".to_string());
        suggestions.push("retrieve and cite supporting material".to_string());
        return 0.0;
    }
    let n = sources.len() as f64;
    let support: f64 = sources
        .iter()
        .map(|s| support_overlap(answer, &s.content) * s.score)
        .sum::<f64>()
        / n;
    let quality: f64 = sources
        .iter()
        .map(|s| s.score * s.source.quality_weight())
        .sum::<f64>()
        / n;
    let accuracy = 0.6 * support + 0.4 * quality;
    if accuracy < 0.8 {
        issues.push("answer is weakly supported by its sources".to_string());
        suggestions.push("incorporate more material from the retrieved sources".to_string());
    }
    accuracy
}

fn score_completeness(
    query: &str,
    answer: &str,
    issues: &mut Vec<String>,
    suggestions: &mut Vec<String>,
) -> f64 {
    let query_terms: Vec<String> = text::tokenize(query)
        .into_iter()
        .filter(|w| !text::STOP_WORDS.contains(w.as_str()))
        .collect();
    let answer_words = text::word_set(answer);
    let coverage = if query_terms.is_empty() {
        1.0
    } else {
        query_terms
            .iter()
            .filter(|t| answer_words.contains(t.as_str()))
            .count() as f64
            / query_terms.len() as f64
    };

    let words = text::word_count(answer);
    let length_score = (words as f64 / 100.0).min(1.0);
    if words < 20 {
        issues.push("answer may be too brief".to_string());
        suggestions.push("expand the answer with more retrieved detail".to_string());
    } else if words > 2000 {
        issues.push("answer may be too verbose".to_string());
        suggestions.push("trim the answer to the question's scope".to_string());
    }
    0.6 * coverage + 0.4 * length_score
}

fn score_relevance(
    query: &str,
    answer: &str,
    issues: &mut Vec<String>,
    suggestions: &mut Vec<String>,
) -> f64 {
    let semantic_relevance = text::query_overlap(answer, query);
    let intent = classify_intent(query);
    let connectors = intent.connectors();
    let answer_words = text::word_set(answer);
    let intent_alignment = if connectors.is_empty() {
        0.5
    } else {
        connectors
            .iter()
            .filter(|c| answer_words.contains(**c))
            .count() as f64
            / connectors.len() as f64
    };
    let relevance = 0.5 * semantic_relevance + 0.5 * intent_alignment;
    if relevance < 0.8 {
        issues.push("answer may not address the question directly".to_string());
        suggestions.push("address the question's terms explicitly".to_string());
    }
    relevance
}

fn score_clarity(answer: &str, issues: &mut Vec<String>, suggestions: &mut Vec<String>) -> f64 {
    let sentences = text::split_sentences(answer);
    if sentences.is_empty() {
        return 0.0;
    }
    let hard_to_read = sentences
        .iter()
        .filter(|s| {
            let words = text::tokenize(s);
            let long = words.len() > 20;
            let avg_len = if words.is_empty() {
                0.0
            } else {
                words.iter().map(|w| w.len()).sum::<usize>() as f64 / words.len() as f64
            };
            long || avg_len > 8.0
        })
        .count();
    let sentence_clarity = 1.0 - hard_to_read as f64 / sentences.len() as f64;
    if hard_to_read > 0 {
        issues.push("some sentences are hard to read".to_string());
        suggestions.push("split long sentences".to_string());
    }

    let lowered = answer.to_lowercase();
    let found = TRANSITIONS.iter().filter(|t| lowered.contains(**t)).count();
    let logical_flow = (0.4 + 0.2 * found as f64).min(1.0);

    0.4 * sentence_clarity + 0.6 * logical_flow
}

fn contradiction_count(text_block: &str) -> usize {
    let lowered = text_block.to_lowercase();
    CONTRADICTION_PATTERNS
        .iter()
        .filter(|p| p.is_match(&lowered))
        .count()
}

fn score_consistency(
    answer: &str,
    reasoning_steps: &[String],
    sources: &[Document],
    issues: &mut Vec<String>,
) -> f64 {
    let reasoning_text = format!("{} {}", answer, reasoning_steps.join(" "));
    let reasoning_matches = contradiction_count(&reasoning_text);
    let reasoning_consistency = (1.0 - 0.25 * reasoning_matches as f64).max(0.0);

    let sources_text = sources
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let source_matches = contradiction_count(&sources_text);
    let source_consistency = (1.0 - 0.25 * source_matches as f64).max(0.0);

    if reasoning_matches > 0 {
        issues.push("answer contains contradictory phrasing".to_string());
    }
    0.5 * source_consistency + 0.5 * reasoning_consistency
}

fn score_factuality(answer: &str, sources: &[Document], issues: &mut Vec<String>) -> f64 {
    let sentences = text::split_sentences(answer);
    let verified_ratio = if sentences.is_empty() {
        0.0
    } else {
        let verified = sentences
            .iter()
            .filter(|sentence| {
                let sentence_words = text::word_set(sentence);
                sources.iter().any(|source| {
                    let source_words = text::word_set(&source.content);
                    sentence_words.intersection(&source_words).count() >= 2
                })
            })
            .count();
        verified as f64 / sentences.len() as f64
    };

    let words = text::tokenize(answer);
    let hedges = words
        .iter()
        .filter(|w| HEDGING_WORDS.contains(&w.as_str()))
        .count();
    let uncertainty = if words.is_empty() {
        0.0
    } else {
        hedges as f64 / words.len() as f64
    };
    if uncertainty > 0.1 {
        issues.push("answer hedges frequently".to_string());
    }
    verified_ratio * (1.0 - 0.3 * uncertainty)
}
