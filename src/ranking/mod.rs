//! Query tokenization and relevance ranking.
//!
//! [`tokenize`] turns raw query text into the lowercase, stop-word-free terms
//! used both as insight relevance tags and as ranking query terms.
//! [`classify`] maps terms onto a [`QueryType`] bucket for the performance
//! tracker. The ranker itself lives in [`ranker`].

pub mod ranker;

use crate::insight::types::QueryType;
use std::collections::BTreeSet;

/// Common English stop words stripped during tokenization.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do",
    "does", "for", "from", "had", "has", "have", "how", "i", "if", "in",
    "into", "is", "it", "its", "me", "my", "no", "not", "of", "on", "or",
    "our", "so", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "was", "we", "were", "what", "when",
    "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Terms that mark a query as technical.
const TECHNICAL_TERMS: &[&str] = &[
    "algorithm", "api", "async", "binary", "bug", "cache", "class", "code",
    "compile", "compiler", "concurrency", "container", "cpu", "database",
    "debug", "deploy", "docker", "encryption", "endpoint", "error",
    "exception", "function", "implement", "index", "json", "kernel",
    "latency", "library", "memory", "mutex", "network", "optimize", "parse",
    "protocol", "query", "refactor", "regex", "runtime", "rust", "schema",
    "server", "socket", "sql", "stack", "struct", "syntax", "thread",
    "throughput", "trait", "transaction",
];

/// Terms that mark a query as creative.
const CREATIVE_TERMS: &[&str] = &[
    "brainstorm", "character", "creative", "draft", "essay", "fiction",
    "headline", "imagine", "invent", "lyrics", "metaphor", "name", "novel",
    "poem", "rewrite", "slogan", "song", "story", "tagline", "write",
];

/// Terms that mark a query as analytical.
const ANALYTICAL_TERMS: &[&str] = &[
    "analyze", "assess", "breakdown", "compare", "contrast", "evaluate",
    "evidence", "explain", "implications", "pros", "cons", "reason",
    "summarize", "tradeoff", "tradeoffs", "versus", "weigh", "why",
];

/// Tokenize query text into relevance terms.
///
/// Lowercases, splits on non-alphanumeric boundaries (so `Vec<String>`
/// yields `vec` and `string`), drops stop words and single characters, and
/// deduplicates while preserving first-seen order.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut terms = Vec::new();
    for raw in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
    {
        if raw.len() < 2 || STOP_WORDS.contains(&raw) {
            continue;
        }
        if seen.insert(raw.to_string()) {
            terms.push(raw.to_string());
        }
    }
    terms
}

/// Classify pre-tokenized terms into a routing bucket.
///
/// The bucket with the most marker-term hits wins; ties resolve in the fixed
/// order technical > analytical > creative so classification is
/// deterministic. No hits at all means conversational.
pub fn classify_terms(terms: &[String]) -> QueryType {
    let count = |markers: &[&str]| {
        terms
            .iter()
            .filter(|t| markers.contains(&t.as_str()))
            .count()
    };
    let technical = count(TECHNICAL_TERMS);
    let analytical = count(ANALYTICAL_TERMS);
    let creative = count(CREATIVE_TERMS);

    let best = technical.max(analytical).max(creative);
    if best == 0 {
        QueryType::Conversational
    } else if technical == best {
        QueryType::Technical
    } else if analytical == best {
        QueryType::Analytical
    } else {
        QueryType::Creative
    }
}

/// Tokenize and classify raw query text in one step.
pub fn classify(query: &str) -> QueryType {
    classify_terms(&tokenize(query))
}

/// Count of technical marker terms in a token list (complexity input).
pub fn technical_term_count(terms: &[String]) -> usize {
    terms
        .iter()
        .filter(|t| TECHNICAL_TERMS.contains(&t.as_str()))
        .count()
}

/// Count of code-like tokens in the raw query: fenced blocks, call syntax,
/// statement terminators, path-ish identifiers.
pub fn code_token_count(query: &str) -> usize {
    let mut count = 0;
    count += query.matches("```").count() / 2;
    count += query.matches("()").count();
    count += query.matches("::").count();
    count += query.matches("{}").count();
    count += query.matches(';').count();
    count += query.matches("=>").count();
    count
}
