//! Shared text analysis primitives
//!
//! Single home for tokenization, stop words, and the similarity measures
//! used by retrieval, synthesis, and validation. Keeping the tie-break
//! behavior in one place keeps classification and reranking deterministic.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Word tokens: runs of alphanumerics/underscore
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// CamelCase identifiers with at least two humps
static CAMEL_CASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b").unwrap());

/// Call-syntax tokens such as `connect()`
static CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+\(\)").unwrap());

/// Dot-notation tokens such as `config.timeout`
static DOTTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z_]\w*\.[A-Za-z_]\w*\b").unwrap());

/// Stop words excluded from key-term extraction and coverage scoring
pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with",
        "by", "is", "are", "was", "were", "be", "been", "being", "this", "that", "these",
        "those", "it", "its", "as", "from", "what", "how", "why", "when", "where", "which",
        "who", "whom", "can", "could", "should", "would", "will", "shall", "do", "does",
        "did", "have", "has", "had", "not", "no", "nor", "if", "then", "than", "so", "such",
        "about", "into", "over", "under", "between", "there", "their", "they", "them",
        "you", "your", "our", "we", "i", "me", "my",
    ]
    .into_iter()
    .collect()
});

/// Lowercased word tokens in document order
pub fn tokenize(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Lowercased word set
pub fn word_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Intersection size over query word count, in [0, 1]
pub fn query_overlap(text: &str, query: &str) -> f64 {
    let query_words = word_set(query);
    if query_words.is_empty() {
        return 0.0;
    }
    let text_words = word_set(text);
    let shared = query_words.intersection(&text_words).count();
    shared as f64 / query_words.len() as f64
}

/// Jaccard similarity of the two word sets
pub fn jaccard(a: &str, b: &str) -> f64 {
    let sa = word_set(a);
    let sb = word_set(b);
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    let intersection = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Sentences split on '.', trimmed, empties dropped
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// CamelCase identifiers in first-occurrence order, deduplicated
pub fn camel_case_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    CAMEL_CASE_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// `name()`-style call tokens in first-occurrence order, deduplicated
pub fn call_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    CALL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// `a.b`-style dotted tokens in first-occurrence order, deduplicated
pub fn dotted_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    DOTTED_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Lowercase purely-alphabetic words strictly longer than 4 characters,
/// first-occurrence order, deduplicated. The planner's key-concept extractor.
pub fn key_concepts(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|w| w.len() > 4 && w.chars().all(|c| c.is_ascii_alphabetic()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Frequency-ranked terms across `texts`: words of at least `min_len`
/// characters, stop words excluded, ordered by descending count with
/// first-seen order breaking ties. At most `limit` terms.
pub fn ranked_terms<'a, I>(texts: I, min_len: usize, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;
    for text in texts {
        for word in tokenize(text) {
            if word.len() < min_len || STOP_WORDS.contains(word.as_str()) {
                continue;
            }
            let entry = counts.entry(word).or_insert_with(|| {
                order += 1;
                (0, order)
            });
            entry.0 += 1;
        }
    }
    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(w, (count, first_seen))| (w, count, first_seen))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(limit).map(|(w, _, _)| w).collect()
}

/// Word count after tokenization
pub fn word_count(text: &str) -> usize {
    tokenize(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("Binary Search, O(log n)!"), vec![
            "binary", "search", "o", "log", "n"
        ]);
    }

    #[test]
    fn overlap_is_fraction_of_query_words() {
        let o = query_overlap("binary search finds a target", "what is binary search");
        // query words: what, is, binary, search -> 2 of 4 matched
        assert!((o - 0.5).abs() < 1e-9);
    }

    #[test]
    fn jaccard_identical_and_disjoint() {
        assert!((jaccard("a b c", "a b c") - 1.0).abs() < 1e-9);
        assert_eq!(jaccard("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn camel_case_extraction_skips_plain_words() {
        let toks = camel_case_tokens("use HashMap and BTreeMap, not vec");
        assert_eq!(toks, vec!["HashMap", "BTreeMap"]);
    }

    #[test]
    fn call_and_dotted_tokens() {
        assert_eq!(call_tokens("call connect() then connect()"), vec!["connect()"]);
        assert_eq!(dotted_tokens("set config.timeout now"), vec!["config.timeout"]);
    }

    #[test]
    fn key_concepts_require_length_and_alpha() {
        let c = key_concepts("optimize the database2 index quickly");
        assert_eq!(c, vec!["optimize", "index", "quickly"]);
    }

    #[test]
    fn ranked_terms_order_by_count_then_first_seen() {
        let terms = ranked_terms(
            ["cache cache index", "index cache shard"].into_iter(),
            4,
            3,
        );
        assert_eq!(terms, vec!["cache", "index", "shard"]);
    }

    #[test]
    fn ranked_terms_exclude_stop_words() {
        let terms = ranked_terms(["which about these sentences"].into_iter(), 4, 10);
        assert_eq!(terms, vec!["sentences"]);
    }
}
