//! Query intent classification
//!
//! Shared by reasoning synthesis (conclusion templates) and the validator
//! (intent-alignment connectors). Keyword tables are checked in a fixed
//! order so classification is deterministic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueryIntent {
    Definition,
    Procedural,
    Causal,
    Comparative,
    Recommendation,
    Informational,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Definition => "definition",
            QueryIntent::Procedural => "procedural",
            QueryIntent::Causal => "causal",
            QueryIntent::Comparative => "comparative",
            QueryIntent::Recommendation => "recommendation",
            QueryIntent::Informational => "informational",
        }
    }

    /// Connector words whose presence in an answer signals it actually
    /// addresses this kind of question
    pub fn connectors(&self) -> &'static [&'static str] {
        match self {
            QueryIntent::Definition => &["is", "means"],
            QueryIntent::Procedural => &["first", "then", "next", "step"],
            QueryIntent::Comparative => &["while", "whereas", "compared"],
            QueryIntent::Causal => &["because", "due", "reason"],
            QueryIntent::Recommendation => &["should", "recommend"],
            QueryIntent::Informational => &[],
        }
    }
}

/// Keyword-table classification over the lowercased query.
///
/// Comparative outranks causal so "why is X better than Y" lands on the
/// comparison template rather than the cause template.
pub fn classify_intent(query: &str) -> QueryIntent {
    let lowered = query.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

    if has(&["compare", "difference", "versus", " vs ", "better"]) {
        QueryIntent::Comparative
    } else if has(&["how to", "how do", "how does", "steps to", "guide"]) {
        QueryIntent::Procedural
    } else if has(&["why", "cause", "reason"]) {
        QueryIntent::Causal
    } else if has(&["should", "recommend", "best practice", "suggest"]) {
        QueryIntent::Recommendation
    } else if has(&["what is", "define", "meaning of"]) {
        QueryIntent::Definition
    } else {
        QueryIntent::Informational
    }
}
