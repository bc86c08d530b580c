//! Answer composition strategies
//!
//! All four strategies are extractive and deterministic: they select and
//! arrange sentences from the prepared documents. Refinement hints from the
//! validator are woven into the composition pass that produced the answer.

use std::collections::HashMap;

use mimir_core::text;
use mimir_core::types::Document;

use super::intent::{classify_intent, QueryIntent};

/// Minimum sentence length considered for extraction
const MIN_SENTENCE_LEN: usize = 10;

/// Answer text plus the human-readable trail of how it was built
#[derive(Debug, Clone)]
pub struct ComposedAnswer {
    pub answer: String,
    pub reasoning_steps: Vec<String>,
}

/// Canonical answer when no documents survived retrieval
pub fn no_information_answer() -> ComposedAnswer {
    ComposedAnswer {
        answer: "I couldn't find relevant information to answer your question.".to_string(),
        reasoning_steps: vec!["No documents were retrieved".to_string()],
    }
}

/// Sentences from `content` ranked by word overlap with `query`; at most
/// `limit`, returned in original order. Sentences shorter than 10
/// characters are skipped.
fn top_sentences(content: &str, query: &str, limit: usize) -> Vec<String> {
    let query_words = text::word_set(query);
    let mut scored: Vec<(usize, usize, &str)> = text::split_sentences(content)
        .into_iter()
        .enumerate()
        .filter(|(_, s)| s.len() >= MIN_SENTENCE_LEN)
        .map(|(position, sentence)| {
            let overlap = text::word_set(sentence)
                .intersection(&query_words)
                .count();
            (overlap, position, sentence)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let mut picked: Vec<(usize, &str)> = scored
        .into_iter()
        .take(limit)
        .map(|(_, position, sentence)| (position, sentence))
        .collect();
    picked.sort_by_key(|(position, _)| *position);
    picked.into_iter().map(|(_, s)| s.to_string()).collect()
}

/// Best sentences addressing a refinement hint that are not already in the
/// answer
fn hint_sentences(hint: &str, documents: &[Document], answer: &str) -> Option<String> {
    documents
        .iter()
        .take(5)
        .flat_map(|doc| top_sentences(&doc.content, hint, 1))
        .find(|sentence| !answer.contains(sentence.as_str()))
}

fn apply_hints(mut composed: ComposedAnswer, hints: &[String], documents: &[Document]) -> ComposedAnswer {
    if hints.is_empty() {
        return composed;
    }
    let mut added = 0usize;
    for hint in hints {
        if let Some(sentence) = hint_sentences(hint, documents, &composed.answer) {
            composed.answer.push(' ');
            composed.answer.push_str(&sentence);
            composed.answer.push('.');
            added += 1;
        }
    }
    composed
        .reasoning_steps
        .push(format!("Incorporated {added} refinement suggestions"));
    composed
}

/// Top-3 documents, up to two query-relevant sentences each
pub fn compose_simple(query: &str, documents: &[Document], hints: &[String]) -> ComposedAnswer {
    let top: Vec<&Document> = documents.iter().take(3).collect();
    let mut fragments: Vec<String> = Vec::new();
    for doc in &top {
        fragments.extend(top_sentences(&doc.content, query, 2));
    }
    if fragments.is_empty() {
        return no_information_answer();
    }
    // each extracted sentence is restored to a full stop, then the
    // sentences are joined with single spaces
    let answer = fragments
        .iter()
        .map(|sentence| format!("{sentence}."))
        .collect::<Vec<_>>()
        .join(" ");
    let composed = ComposedAnswer {
        answer,
        reasoning_steps: vec![format!("Analyzed {} top documents", top.len())],
    };
    apply_hints(composed, hints, documents)
}

/// Document categories used by the reasoning pipeline
fn categorize(doc: &Document) -> &'static str {
    let lowered = doc.content.to_lowercase();
    if lowered.contains("fn ") || lowered.contains("def ") || lowered.contains("function") {
        "functions"
    } else if lowered.contains("class ") || lowered.contains("struct ") || lowered.contains("impl ")
    {
        "classes"
    } else if lowered.contains("example") || lowered.contains("e.g.") {
        "examples"
    } else if lowered.contains("documentation") || lowered.contains("guide") || lowered.contains("manual")
    {
        "documentation"
    } else {
        "general"
    }
}

const CATEGORY_ORDER: [&str; 5] = ["functions", "classes", "documentation", "examples", "general"];

/// Step-labeled pipeline: intent, categorize, evidence, conclusion
pub fn compose_reasoning(query: &str, documents: &[Document], hints: &[String]) -> ComposedAnswer {
    if documents.is_empty() {
        return no_information_answer();
    }
    let mut reasoning_steps = Vec::new();

    let intent = classify_intent(query);
    reasoning_steps.push(format!("Classified query intent as {}", intent.as_str()));

    let mut categories: HashMap<&'static str, Vec<&Document>> = HashMap::new();
    for doc in documents {
        categories.entry(categorize(doc)).or_default().push(doc);
    }
    reasoning_steps.push(format!(
        "Categorized {} documents into {} groups",
        documents.len(),
        categories.len()
    ));

    let mut evidence: Vec<String> = Vec::new();
    for category in CATEGORY_ORDER {
        let Some(docs) = categories.get(category) else {
            continue;
        };
        for doc in docs.iter().take(3) {
            evidence.extend(top_sentences(&doc.content, query, 2));
        }
    }
    reasoning_steps.push(format!("Extracted {} evidence sentences", evidence.len()));

    if evidence.is_empty() {
        return no_information_answer();
    }

    let answer = match intent {
        QueryIntent::Causal => format!("The cause appears to be: {}.", evidence[0]),
        QueryIntent::Procedural => format!("{}.", evidence.iter().take(3).cloned().collect::<Vec<_>>().join(" -> ")),
        QueryIntent::Comparative => {
            if evidence.len() >= 2 {
                format!("On one hand, {}. On the other, {}.", evidence[0], evidence[1])
            } else {
                format!("{}.", evidence[0])
            }
        }
        QueryIntent::Recommendation => format!("Recommended approach: {}.", evidence[0]),
        QueryIntent::Definition | QueryIntent::Informational => {
            format!("{}.", evidence.iter().take(3).cloned().collect::<Vec<_>>().join(". "))
        }
    };
    reasoning_steps.push(format!(
        "Composed conclusion using the {} template",
        intent.as_str()
    ));

    let composed = ComposedAnswer {
        answer,
        reasoning_steps,
    };
    apply_hints(composed, hints, documents)
}

/// Perspective grouping for comparative synthesis
fn perspective_of(doc: &Document) -> &'static str {
    let lowered = doc.content.to_lowercase();
    let from_metadata = doc
        .metadata
        .get("source_type")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if from_metadata.contains("doc") || lowered.contains("documentation") || lowered.contains("official")
    {
        "official_docs"
    } else if lowered.contains("fn ") || lowered.contains("def ") || lowered.contains("example") {
        "code_examples"
    } else if lowered.contains("forum") || lowered.contains("blog") || lowered.contains("community")
    {
        "community"
    } else {
        "technical"
    }
}

const PERSPECTIVE_ORDER: [&str; 4] = ["official_docs", "code_examples", "community", "technical"];

/// Pairwise perspective comparison, up to three comparison lines
pub fn compose_comparative(query: &str, documents: &[Document], hints: &[String]) -> ComposedAnswer {
    if documents.is_empty() {
        return no_information_answer();
    }
    let mut reasoning_steps = Vec::new();

    let mut perspectives: HashMap<&'static str, Vec<&Document>> = HashMap::new();
    for doc in documents {
        perspectives.entry(perspective_of(doc)).or_default().push(doc);
    }
    let present: Vec<&'static str> = PERSPECTIVE_ORDER
        .into_iter()
        .filter(|p| perspectives.contains_key(p))
        .collect();
    reasoning_steps.push(format!(
        "Grouped {} documents into {} perspectives",
        documents.len(),
        present.len()
    ));

    let side_text = |perspective: &str| -> String {
        perspectives[perspective]
            .iter()
            .take(2)
            .flat_map(|doc| top_sentences(&doc.content, query, 2))
            .take(2)
            .collect::<Vec<_>>()
            .join(". ")
    };

    let mut comparisons: Vec<String> = Vec::new();
    'outer: for (i, a) in present.iter().enumerate() {
        for b in present.iter().skip(i + 1) {
            if comparisons.len() >= 3 {
                break 'outer;
            }
            let left = side_text(a);
            let right = side_text(b);
            if left.is_empty() || right.is_empty() {
                continue;
            }
            comparisons.push(format!("Perspective {a}: {left} | Perspective {b}: {right}"));
        }
    }

    let answer = if comparisons.is_empty() {
        // single perspective; fall back to its strongest evidence
        let evidence = present
            .first()
            .map(|p| side_text(p))
            .unwrap_or_default();
        if evidence.is_empty() {
            return no_information_answer();
        }
        format!("All sources agree. {evidence}.")
    } else {
        reasoning_steps.push(format!("Generated {} comparisons", comparisons.len()));
        format!(
            "Comparing {} perspectives on: {}\n{}",
            present.len(),
            query,
            comparisons.join("\n")
        )
    };

    let composed = ComposedAnswer {
        answer,
        reasoning_steps,
    };
    apply_hints(composed, hints, documents)
}

/// Frequent terms, structural patterns, and cross-document concepts.
/// Falls back to the reasoning pipeline when nothing novel emerges.
pub fn compose_creative(query: &str, documents: &[Document], hints: &[String]) -> ComposedAnswer {
    if documents.is_empty() {
        return no_information_answer();
    }
    let mut reasoning_steps = Vec::new();

    let contents: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
    let frequent = text::ranked_terms(contents.iter().copied(), 5, 10);
    reasoning_steps.push(format!("Identified {} recurring terms", frequent.len()));

    let function_defs: usize = contents.iter().map(|c| c.matches("def ").count() + c.matches("fn ").count()).sum();
    let class_defs: usize = contents.iter().map(|c| c.matches("class ").count()).sum();

    let mut concept_counts: HashMap<String, usize> = HashMap::new();
    for content in &contents {
        for concept in text::camel_case_tokens(content) {
            *concept_counts.entry(concept).or_default() += 1;
        }
    }
    let mut shared_concepts: Vec<String> = concept_counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(concept, _)| concept)
        .collect();
    shared_concepts.sort();

    let mut insights: Vec<String> = Vec::new();
    if frequent.len() >= 2 {
        insights.push(format!(
            "Recurring themes across the sources: {}",
            frequent.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !shared_concepts.is_empty() {
        insights.push(format!(
            "{} appear in multiple sources, suggesting a shared abstraction",
            shared_concepts.join(", ")
        ));
    } else if function_defs + class_defs > 0 {
        insights.push(format!(
            "The sources define {function_defs} functions and {class_defs} classes relevant to the question"
        ));
    }
    insights.truncate(2);

    if insights.is_empty() {
        reasoning_steps.push("No novel connections found; falling back to reasoning".to_string());
        let mut composed = compose_reasoning(query, documents, hints);
        let mut steps = reasoning_steps;
        steps.append(&mut composed.reasoning_steps);
        composed.reasoning_steps = steps;
        return composed;
    }
    reasoning_steps.push(format!("Generated {} insights", insights.len()));

    let supporting: Vec<String> = documents
        .iter()
        .take(2)
        .flat_map(|doc| top_sentences(&doc.content, query, 1))
        .collect();
    let mut answer = insights.join(". ");
    if !supporting.is_empty() {
        answer.push_str(". ");
        answer.push_str(&supporting.join(". "));
        answer.push('.');
    }

    let composed = ComposedAnswer {
        answer,
        reasoning_steps,
    };
    apply_hints(composed, hints, documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimir_core::types::DocumentSource;

    fn doc(id: &str, content: &str, score: f64) -> Document {
        Document::new(Some(id.to_string()), content, score, DocumentSource::SemanticSearch)
    }

    #[test]
    fn simple_extracts_relevant_sentences() {
        let docs = vec![doc(
            "d1",
            "Binary search finds a target in a sorted array. It runs in logarithmic time. Unrelated trailing note",
            0.92,
        )];
        let composed = compose_simple("what is binary search", &docs, &[]);
        assert!(composed.answer.contains("Binary search finds a target"));
        assert_eq!(composed.reasoning_steps, vec!["Analyzed 1 top documents"]);
    }

    #[test]
    fn simple_without_documents_uses_canonical_answer() {
        let composed = compose_simple("anything", &[], &[]);
        assert!(composed.answer.contains("couldn't find relevant information"));
    }

    #[test]
    fn simple_joins_sentences_with_single_spaces() {
        let docs = vec![doc(
            "d1",
            "Quicksort partitions around a pivot. Partitioning runs in linear time",
            0.9,
        )];
        let composed = compose_simple("how fast is quicksort partitioning", &docs, &[]);
        assert_eq!(
            composed.answer,
            "Quicksort partitions around a pivot. Partitioning runs in linear time."
        );
    }

    #[test]
    fn reasoning_uses_causal_template_for_why_queries() {
        let docs = vec![doc(
            "d1",
            "The outage happened after the cache was disabled. Latency rose because every request hit the database",
            0.8,
        )];
        let composed = compose_reasoning("why did latency spike", &docs, &[]);
        assert!(composed.answer.starts_with("The cause appears to be:"));
        assert!(composed.reasoning_steps.len() >= 4);
        assert!(composed.reasoning_steps[0].contains("causal"));
    }

    #[test]
    fn reasoning_joins_procedural_evidence_with_arrows() {
        let docs = vec![doc(
            "d1",
            "First install the toolchain for the build. Then configure the build manifest. Next run the build command",
            0.8,
        )];
        let composed = compose_reasoning("how to build the project", &docs, &[]);
        assert!(composed.answer.contains("->"));
    }

    #[test]
    fn comparative_emits_perspective_lines() {
        let docs = vec![
            doc("d1", "The official documentation recommends REST for simple services", 0.9),
            doc("d2", "def call(): example showing gRPC streaming in services", 0.8),
        ];
        let composed = compose_comparative("compare REST and gRPC services", &docs, &[]);
        assert!(composed.answer.contains("Perspective official_docs:"));
        assert!(composed.answer.contains("| Perspective code_examples:"));
    }

    #[test]
    fn comparative_with_one_perspective_degrades_gracefully() {
        let docs = vec![doc("d1", "Plain technical prose about the query topic here", 0.7)];
        let composed = compose_comparative("query topic", &docs, &[]);
        assert!(composed.answer.starts_with("All sources agree."));
    }

    #[test]
    fn creative_surfaces_recurring_terms() {
        let docs = vec![
            doc("d1", "Sharding splits storage across nodes. Sharding needs routing", 0.8),
            doc("d2", "Routing queries to storage shards balances nodes", 0.7),
        ];
        let composed = compose_creative("scale the storage layer", &docs, &[]);
        assert!(composed.answer.contains("Recurring themes"));
        assert!(!composed.reasoning_steps.is_empty());
    }

    #[test]
    fn creative_falls_back_to_reasoning_without_novelty() {
        let docs = vec![doc("d1", "One short note", 0.5)];
        let composed = compose_creative("tell me things", &docs, &[]);
        assert!(composed
            .reasoning_steps
            .iter()
            .any(|s| s.contains("falling back to reasoning")));
    }

    #[test]
    fn hints_append_new_evidence() {
        let docs = vec![doc(
            "d1",
            "Binary search needs a sorted input. Rotation breaks the sorted precondition entirely",
            0.9,
        )];
        let base = compose_simple("what is binary search", &docs, &[]);
        let refined = compose_simple(
            "what is binary search",
            &docs,
            &["mention the sorted precondition rotation".to_string()],
        );
        assert!(refined.answer.len() >= base.answer.len());
        assert!(refined
            .reasoning_steps
            .iter()
            .any(|s| s.contains("refinement suggestions")));
    }
}
