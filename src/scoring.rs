//! Pluggable heuristic scoring.
//!
//! The constants driving selection — the complexity formula, the confidence
//! threshold curve, and preference/style matching — live behind
//! [`ScoringStrategy`] so they can be tuned or replaced without touching the
//! router's control flow.

use serde::{Deserialize, Serialize};

use crate::config::RoutingConfig;
use crate::insight::types::{LengthPref, StructurePref, Tone};
use crate::ranking;

/// A model's declared response style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub tone: Tone,
    pub length: LengthPref,
    pub structure: StructurePref,
}

/// What the user asked for, where they asked for anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub tone: Option<Tone>,
    pub length: Option<LengthPref>,
    pub structure: Option<StructurePref>,
}

/// Heuristic scoring seam used by the router.
pub trait ScoringStrategy: Send + Sync {
    /// Query complexity in `[0.0, 10.0]`, monotonic in length,
    /// technical-term count, and code-like tokens.
    fn complexity(&self, query: &str) -> f64;

    /// Minimum repository confidence required to trust historical evidence
    /// over the static fallback, as a function of complexity.
    fn confidence_threshold(&self, complexity: f64) -> f64;

    /// How well a model's declared style satisfies the user's stated
    /// preferences, in `[0.0, 1.0]`. Unstated preferences don't count
    /// against any model.
    fn style_compatibility(&self, prefs: &UserPreferences, style: &StyleProfile) -> f64;
}

/// The default heuristics.
#[derive(Debug, Clone)]
pub struct HeuristicScoring {
    confidence_floor: f64,
    confidence_ceiling: f64,
    complexity_divisor: f64,
}

impl HeuristicScoring {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            confidence_floor: config.confidence_floor,
            confidence_ceiling: config.confidence_ceiling,
            complexity_divisor: config.complexity_divisor,
        }
    }
}

impl Default for HeuristicScoring {
    fn default() -> Self {
        Self::new(&RoutingConfig::default())
    }
}

impl ScoringStrategy for HeuristicScoring {
    fn complexity(&self, query: &str) -> f64 {
        let terms = ranking::tokenize(query);
        let words = query.split_whitespace().count() as f64;
        let technical = ranking::technical_term_count(&terms) as f64;
        let code = ranking::code_token_count(query) as f64;

        (words / 20.0 + 0.8 * technical + 1.2 * code).clamp(0.0, 10.0)
    }

    fn confidence_threshold(&self, complexity: f64) -> f64 {
        // Simple queries demand stronger repository evidence; complex ones
        // tolerate more tentative evidence, since static heuristics are less
        // reliable at high complexity.
        (self.confidence_ceiling - complexity / self.complexity_divisor)
            .max(self.confidence_floor)
    }

    fn style_compatibility(&self, prefs: &UserPreferences, style: &StyleProfile) -> f64 {
        let mut stated = 0u32;
        let mut score = 0.0;

        if let Some(tone) = prefs.tone {
            stated += 1;
            score += match (tone, style.tone) {
                (a, b) if a == b => 1.0,
                // Neutral sits halfway between formal and casual
                (Tone::Neutral, _) | (_, Tone::Neutral) => 0.5,
                _ => 0.0,
            };
        }
        if let Some(length) = prefs.length {
            stated += 1;
            score += match (length, style.length) {
                (a, b) if a == b => 1.0,
                (LengthPref::Medium, _) | (_, LengthPref::Medium) => 0.5,
                _ => 0.0,
            };
        }
        if let Some(structure) = prefs.structure {
            stated += 1;
            score += if structure == style.structure { 1.0 } else { 0.0 };
        }

        if stated == 0 {
            1.0
        } else {
            score / f64::from(stated)
        }
    }
}
