//! Per-strategy retrieval logic
//!
//! Each strategy maps adapter output into tagged `Document`s. Semantic
//! retrieval expands the query and annotates hits; graph retrieval anchors
//! on query entities; hybrid fans the first three strategies out in
//! parallel and reranks; iterative refines the query across rounds.

use once_cell::sync::Lazy;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use mimir_adapters::error::AdapterError;
use mimir_core::text;
use mimir_core::types::{Document, DocumentSource};

use super::{dedup::dedup_documents, dedup::rerank, Retriever, StrategyOutput};

/// Fixed synonym table used by query expansion
static SYNONYMS: &[(&str, &[&str])] = &[
    ("function", &["method", "procedure", "routine"]),
    ("class", &["object", "type", "structure"]),
    ("error", &["exception", "fault", "failure"]),
    ("async", &["concurrent", "parallel", "nonblocking"]),
];

/// Technical terms the graph strategy recognizes as entity anchors
static TECHNICAL_TERMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "database", "cache", "api", "authentication", "authorization", "encryption",
        "index", "queue", "server", "client", "protocol", "algorithm", "network",
        "storage", "session", "token", "rest", "grpc", "http", "latency", "scalability",
    ]
    .into_iter()
    .collect()
});

/// Hops explored per graph anchor
const GRAPH_MAX_HOPS: usize = 2;

/// Rounds of query refinement for iterative retrieval
const ITERATIVE_MAX_ROUNDS: usize = 3;

impl Retriever {
    pub(crate) async fn run_direct(
        &self,
        query: &str,
        threshold: f64,
        max_results: usize,
    ) -> Result<StrategyOutput, AdapterError> {
        let chunks = self.vector.search(query, threshold, max_results).await?;
        let documents = chunks
            .into_iter()
            .map(|chunk| Document {
                id: chunk.id,
                content: chunk.content,
                metadata: chunk.metadata,
                score: chunk.score,
                source: DocumentSource::DirectSearch,
                composite_score: None,
            })
            .collect();
        Ok(StrategyOutput {
            documents,
            graph_data: HashMap::new(),
        })
    }

    pub(crate) async fn run_semantic(
        &self,
        query: &str,
        threshold: f64,
        max_results: usize,
        user_context: &HashMap<String, String>,
    ) -> Result<StrategyOutput, AdapterError> {
        let expanded = expand_query(query, user_context);
        debug!(original = query, expanded = %expanded, "semantic query expansion");
        let chunks = self.vector.search(&expanded, threshold, max_results).await?;
        let documents = chunks
            .into_iter()
            .map(|chunk| {
                let overlap = text::query_overlap(&chunk.content, query);
                let content_type = classify_content(&chunk.content);
                let mut relevance_factors: Vec<&str> = Vec::new();
                if overlap > 0.0 {
                    relevance_factors.push("keyword_match");
                }
                if chunk.score >= 0.8 {
                    relevance_factors.push("high_similarity");
                }
                if content_type == "function" && query.to_lowercase().contains("function") {
                    relevance_factors.push("function_match");
                }
                let mut metadata = chunk.metadata;
                metadata.insert(
                    "semantic_enrichment".to_string(),
                    json!({
                        "query_overlap": overlap,
                        "content_type": content_type,
                        "relevance_factors": relevance_factors,
                    }),
                );
                Document {
                    id: chunk.id,
                    content: chunk.content,
                    metadata,
                    score: chunk.score,
                    source: DocumentSource::SemanticSearch,
                    composite_score: None,
                }
            })
            .collect();
        Ok(StrategyOutput {
            documents,
            graph_data: HashMap::new(),
        })
    }

    pub(crate) async fn run_graph(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<StrategyOutput, AdapterError> {
        let entities = extract_entities(query);
        if entities.is_empty() {
            return Err(AdapterError::Unavailable(
                "no graph-addressable entities in query".to_string(),
            ));
        }
        let per_entity_limit = (max_results / entities.len()).max(1);
        let mut documents = Vec::new();
        let mut graph_data = HashMap::new();
        for entity in &entities {
            let related = self
                .graph
                .find_related_entities(entity, GRAPH_MAX_HOPS, per_entity_limit)
                .await?;
            if related.is_empty() {
                continue;
            }
            graph_data.insert(
                entity.clone(),
                json!(related
                    .iter()
                    .map(|r| {
                        json!({
                            "entity": r.entity_id,
                            "relationship": r.relationship,
                            "path": r.path,
                            "hops": r.hops,
                            "weight": r.weight,
                        })
                    })
                    .collect::<Vec<_>>()),
            );
            for related_entity in related {
                let mut metadata = HashMap::new();
                metadata.insert("anchor".to_string(), json!(entity));
                metadata.insert(
                    "relationship".to_string(),
                    json!(related_entity.relationship),
                );
                metadata.insert("path".to_string(), json!(related_entity.path));
                metadata.insert("hops".to_string(), json!(related_entity.hops));
                documents.push(Document {
                    id: Some(related_entity.entity_id.clone()),
                    content: format!(
                        "{}: {}",
                        related_entity.entity_id, related_entity.description
                    ),
                    metadata,
                    score: related_entity.weight,
                    source: DocumentSource::GraphTraversal,
                    composite_score: None,
                });
            }
        }
        Ok(StrategyOutput {
            documents,
            graph_data,
        })
    }

    /// Direct, semantic, and graph in parallel, then a composite rerank
    /// over the coalesced pool.
    pub(crate) async fn run_hybrid(
        &self,
        query: &str,
        threshold: f64,
        max_results: usize,
        user_context: &HashMap<String, String>,
    ) -> Result<StrategyOutput, AdapterError> {
        let (direct, semantic, graph) = tokio::join!(
            self.run_direct(query, threshold, max_results),
            self.run_semantic(query, threshold, max_results, user_context),
            self.run_graph(query, max_results),
        );

        let mut pool = Vec::new();
        let mut graph_data = HashMap::new();
        let mut failures = 0usize;
        let mut last_error: Option<AdapterError> = None;
        for outcome in [direct, semantic, graph] {
            match outcome {
                Ok(output) => {
                    pool.extend(output.documents);
                    graph_data.extend(output.graph_data);
                }
                Err(error) => {
                    failures += 1;
                    warn!(%error, "hybrid sub-strategy failed");
                    last_error = Some(error);
                }
            }
        }
        if failures == 3 {
            return Err(last_error.unwrap_or_else(|| {
                AdapterError::Unavailable("all hybrid sub-strategies failed".to_string())
            }));
        }

        let mut documents = dedup_documents(pool);
        rerank(&mut documents, query);
        documents.truncate(max_results);
        Ok(StrategyOutput {
            documents,
            graph_data,
        })
    }

    /// Up to three semantic rounds against an evolving query, stopping
    /// early once enough documents clear the threshold or the refinement
    /// stops adding terms.
    pub(crate) async fn run_iterative(
        &self,
        query: &str,
        threshold: f64,
        max_results: usize,
        user_context: &HashMap<String, String>,
    ) -> Result<StrategyOutput, AdapterError> {
        let target = (max_results / 2).max(1);
        let mut current_query = query.to_string();
        let mut pool: Vec<Document> = Vec::new();

        for round in 0..ITERATIVE_MAX_ROUNDS {
            let output = self
                .run_semantic(&current_query, threshold, max_results, user_context)
                .await?;
            pool.extend(output.documents);

            let above = pool.iter().filter(|d| d.score >= threshold).count();
            debug!(round, above, target, "iterative retrieval round complete");
            if above >= target {
                break;
            }

            let refined = refine_query(&current_query, &pool);
            if refined == current_query {
                break;
            }
            current_query = refined;
        }

        let mut documents = dedup_documents(pool);
        super::sort_by_effective_score(&mut documents);
        documents.truncate(max_results);
        Ok(StrategyOutput {
            documents,
            graph_data: HashMap::new(),
        })
    }
}

/// Append user-context tokens and table synonyms to the query
fn expand_query(query: &str, user_context: &HashMap<String, String>) -> String {
    let query_words = text::word_set(query);
    let mut extras: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = query_words.clone();

    for key in ["domain", "language"] {
        if let Some(value) = user_context.get(key) {
            for token in text::tokenize(value) {
                if seen.insert(token.clone()) {
                    extras.push(token);
                }
            }
        }
    }
    for (keyword, synonyms) in SYNONYMS {
        if query_words.contains(*keyword) {
            for synonym in *synonyms {
                if seen.insert((*synonym).to_string()) {
                    extras.push((*synonym).to_string());
                }
            }
        }
    }

    if extras.is_empty() {
        query.to_string()
    } else {
        format!("{} {}", query, extras.join(" "))
    }
}

/// Coarse content classification used by enrichment annotations
fn classify_content(content: &str) -> &'static str {
    let lowered = content.to_lowercase();
    if lowered.contains("fn ") || lowered.contains("def ") || lowered.contains("function") {
        "function"
    } else if lowered.contains("class ") || lowered.contains("struct ") || lowered.contains("impl ")
    {
        "class"
    } else if lowered.contains("mod ") || lowered.contains("module") || lowered.contains("import")
    {
        "module"
    } else {
        "general"
    }
}

/// Entity anchors: call-syntax tokens, CamelCase identifiers, and known
/// technical terms, in first-occurrence order.
fn extract_entities(query: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut entities: Vec<String> = Vec::new();
    for token in text::call_tokens(query) {
        if seen.insert(token.to_lowercase()) {
            entities.push(token);
        }
    }
    for token in text::camel_case_tokens(query) {
        if seen.insert(token.to_lowercase()) {
            entities.push(token);
        }
    }
    for word in text::tokenize(query) {
        if TECHNICAL_TERMS.contains(word.as_str()) && seen.insert(word.clone()) {
            entities.push(word);
        }
    }
    entities
}

/// Append the three most frequent key terms from the strongest documents
fn refine_query(current: &str, pool: &[Document]) -> String {
    let mut ranked = pool.to_vec();
    super::sort_by_effective_score(&mut ranked);
    let top_contents: Vec<&str> = ranked.iter().take(3).map(|d| d.content.as_str()).collect();
    if top_contents.is_empty() {
        return current.to_string();
    }
    let current_words = text::word_set(current);
    let new_terms: Vec<String> = text::ranked_terms(top_contents.into_iter(), 4, 3)
        .into_iter()
        .filter(|t| !current_words.contains(t))
        .collect();
    if new_terms.is_empty() {
        current.to_string()
    } else {
        format!("{} {}", current, new_terms.join(" "))
    }
}
