//! Response quality scoring.
//!
//! [`QualityEvaluator::evaluate`] produces a composite score in `[0, 1]`
//! with length, structure, detail, and coherence sub-scores. Expected length
//! and structure scale with query complexity; deviation is penalized
//! smoothly rather than at hard cutoffs. Self-referential disclaimers and
//! runs of identical consecutive lines are penalized, and the duplicate
//! block is truncated out of the returned response.

use serde::Serialize;

use crate::config::EvaluationConfig;
use crate::ranking;

/// Lowercased markers of self-referential disclaimers.
const DISCLAIMER_MARKERS: &[&str] = &[
    "as an ai",
    "as a language model",
    "as an artificial intelligence",
    "i am just a language model",
    "i'm just an ai",
    "i do not have personal opinions",
];

/// Result of evaluating one candidate response.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Composite quality score in `[0.0, 1.0]`.
    pub score: f64,
    pub length_score: f64,
    pub structure_score: f64,
    pub detail_score: f64,
    pub coherence_score: f64,
    /// The response with duplicate line runs truncated.
    pub cleaned_response: String,
    /// Lines dropped while truncating duplicate runs.
    pub duplicates_removed: usize,
}

/// Scores a produced response against the query that elicited it.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    max_duplicate_run: usize,
}

impl QualityEvaluator {
    pub fn new(config: &EvaluationConfig) -> Self {
        Self {
            max_duplicate_run: config.max_duplicate_run.max(1),
        }
    }

    /// Evaluate `response` for `query` at the given complexity.
    pub fn evaluate(&self, response: &str, query: &str, complexity: f64) -> Evaluation {
        let (cleaned, duplicates_removed) = self.truncate_duplicate_runs(response);

        if cleaned.trim().is_empty() {
            return Evaluation {
                score: 0.0,
                length_score: 0.0,
                structure_score: 0.0,
                detail_score: 0.0,
                coherence_score: 0.0,
                cleaned_response: cleaned,
                duplicates_removed,
            };
        }

        let length_score = length_score(&cleaned, complexity);
        let structure_score = structure_score(&cleaned, complexity);
        let detail_score = detail_score(&cleaned, query, complexity);
        let coherence_score = coherence_score(&cleaned, duplicates_removed);

        let score = (0.3 * length_score
            + 0.25 * structure_score
            + 0.25 * detail_score
            + 0.2 * coherence_score)
            .clamp(0.0, 1.0);

        Evaluation {
            score,
            length_score,
            structure_score,
            detail_score,
            coherence_score,
            cleaned_response: cleaned,
            duplicates_removed,
        }
    }

    /// Truncate runs of more than `max_duplicate_run` identical consecutive
    /// lines, returning the cleaned text and the number of lines dropped.
    fn truncate_duplicate_runs(&self, response: &str) -> (String, usize) {
        let mut kept: Vec<&str> = Vec::new();
        let mut removed = 0;
        let mut run = 0usize;
        let mut prev: Option<&str> = None;

        for line in response.lines() {
            if prev == Some(line) && !line.trim().is_empty() {
                run += 1;
                if run >= self.max_duplicate_run {
                    removed += 1;
                    continue;
                }
            } else {
                run = 0;
            }
            prev = Some(line);
            kept.push(line);
        }
        (kept.join("\n"), removed)
    }
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new(&EvaluationConfig::default())
    }
}

/// Smooth ratio in `(0, 1]`: 1.0 when actual == expected, decaying gently as
/// the two diverge in either direction.
fn smooth_ratio(actual: f64, expected: f64, softness: f64) -> f64 {
    if actual <= 0.0 || expected <= 0.0 {
        return 0.0;
    }
    (actual.min(expected) / actual.max(expected)).powf(softness)
}

fn length_score(response: &str, complexity: f64) -> f64 {
    let expected_chars = 150.0 + complexity * 120.0;
    smooth_ratio(response.len() as f64, expected_chars, 0.4)
}

fn structure_score(response: &str, complexity: f64) -> f64 {
    let paragraphs = response
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .count();
    let bullets = response
        .lines()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("- ") || t.starts_with("* ") || t.starts_with(|c: char| c.is_ascii_digit())
        })
        .count();
    let blocks = (paragraphs + bullets).max(1);
    let expected_blocks = 1.0 + complexity / 2.5;
    smooth_ratio(blocks as f64, expected_blocks, 0.5)
}

fn detail_score(response: &str, query: &str, complexity: f64) -> f64 {
    let terms = ranking::tokenize(response);
    let expected_terms = 10.0 + complexity * 8.0;
    let richness = smooth_ratio(terms.len() as f64, expected_terms, 0.4);

    // A response that never touches the query's vocabulary is thin on
    // detail no matter how long it is.
    let query_terms = ranking::tokenize(query);
    if query_terms.is_empty() {
        return richness;
    }
    let touched = query_terms.iter().filter(|t| terms.contains(t)).count();
    let grounding = 0.5 + 0.5 * (touched as f64 / query_terms.len() as f64);
    (richness * grounding).clamp(0.0, 1.0)
}

fn coherence_score(response: &str, duplicates_removed: usize) -> f64 {
    let lower = response.to_lowercase();
    let disclaimers: usize = DISCLAIMER_MARKERS
        .iter()
        .map(|m| lower.matches(m).count())
        .sum();
    (1.0 - 0.15 * disclaimers as f64 - 0.05 * duplicates_removed as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> QualityEvaluator {
        QualityEvaluator::default()
    }

    #[test]
    fn empty_response_scores_zero() {
        let eval = evaluator().evaluate("", "explain rust", 3.0);
        assert_eq!(eval.score, 0.0);
    }

    #[test]
    fn on_target_response_scores_high() {
        let response = "Rust's borrow checker enforces ownership rules at compile time.\n\n\
                        - Each value has a single owner\n\
                        - Borrows must not outlive the owner\n\n\
                        This prevents use-after-free without a garbage collector.";
        let eval = evaluator().evaluate(response, "explain the rust borrow checker", 2.0);
        assert!(eval.score > 0.7, "score was {}", eval.score);
        assert_eq!(eval.duplicates_removed, 0);
        assert_eq!(eval.cleaned_response, response);
    }

    #[test]
    fn short_answer_to_complex_query_is_penalized_smoothly() {
        let e = evaluator();
        let short = e.evaluate("Use a mutex.", "design a concurrent cache", 8.0);
        let fuller = e.evaluate(
            &"A concurrent cache needs sharded locks and an eviction policy. ".repeat(10),
            "design a concurrent cache",
            8.0,
        );
        assert!(short.length_score < fuller.length_score);
        // Smooth penalty — even a terse answer keeps a nonzero score
        assert!(short.length_score > 0.0);
    }

    #[test]
    fn disclaimers_hurt_coherence() {
        let e = evaluator();
        let clean = e.evaluate(
            "The capital of France is Paris.",
            "capital of france",
            0.5,
        );
        let hedged = e.evaluate(
            "As an AI, I do not have personal opinions, but the capital of France is Paris.",
            "capital of france",
            0.5,
        );
        assert!(hedged.coherence_score < clean.coherence_score);
    }

    #[test]
    fn duplicate_runs_are_truncated() {
        let response = "Here is the answer.\nSame line.\nSame line.\nSame line.\nSame line.\nDone.";
        let eval = evaluator().evaluate(response, "question", 1.0);
        assert_eq!(eval.duplicates_removed, 2);
        assert_eq!(
            eval.cleaned_response,
            "Here is the answer.\nSame line.\nSame line.\nDone."
        );
        assert!(eval.coherence_score < 1.0);
    }

    #[test]
    fn two_identical_lines_are_allowed() {
        let response = "Same line.\nSame line.\nDone.";
        let eval = evaluator().evaluate(response, "question", 1.0);
        assert_eq!(eval.duplicates_removed, 0);
        assert_eq!(eval.cleaned_response, response);
    }

    #[test]
    fn grounded_responses_beat_off_topic_ones() {
        let e = evaluator();
        let on_topic = e.evaluate(
            "Tokio's runtime schedules async tasks across worker threads.",
            "how does the tokio async runtime schedule tasks",
            2.0,
        );
        let off_topic = e.evaluate(
            "Bananas are an excellent source of potassium and fiber.",
            "how does the tokio async runtime schedule tasks",
            2.0,
        );
        assert!(on_topic.detail_score > off_topic.detail_score);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let e = evaluator();
        let long = "word ".repeat(5000);
        for (response, complexity) in [
            ("x", 0.0),
            ("a perfectly ordinary answer about things", 5.0),
            (long.as_str(), 10.0),
        ] {
            let eval = e.evaluate(response, "query", complexity);
            assert!((0.0..=1.0).contains(&eval.score));
        }
    }
}
