//! Document deduplication and composite reranking
//!
//! Dedup keys on ids when both sides have one; otherwise near-duplicate
//! content is detected by Jaccard similarity of word sets. Rerank blends the
//! original score with a per-source weight and a query-overlap bonus.

use std::collections::HashSet;

use mimir_core::text;
use mimir_core::types::Document;

/// Jaccard similarity above which two unidentified documents are the same
const NEAR_DUPLICATE_JACCARD: f64 = 0.8;

/// Drop duplicates, preserving first-seen order.
pub fn dedup_documents(documents: Vec<Document>) -> Vec<Document> {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut kept: Vec<Document> = Vec::with_capacity(documents.len());
    for doc in documents {
        if let Some(id) = &doc.id {
            if !seen_ids.insert(id.clone()) {
                continue;
            }
            kept.push(doc);
            continue;
        }
        let duplicate = kept
            .iter()
            .any(|k| text::jaccard(&k.content, &doc.content) > NEAR_DUPLICATE_JACCARD);
        if !duplicate {
            kept.push(doc);
        }
    }
    kept
}

/// Attach composite scores:
/// `original_score * source_weight + 0.2 * query_overlap`.
pub fn rerank(documents: &mut [Document], query: &str) {
    for doc in documents.iter_mut() {
        let overlap = text::query_overlap(&doc.content, query);
        let composite = doc.score * doc.source.rerank_weight() + 0.2 * overlap;
        doc.composite_score = Some(composite);
    }
    sort_by_effective_score(documents);
}

/// Stable descending sort on the effective score; ties keep original order.
pub fn sort_by_effective_score(documents: &mut [Document]) {
    documents.sort_by(|a, b| {
        b.effective_score()
            .partial_cmp(&a.effective_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
