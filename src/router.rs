//! The decision core — model registry and confidence-weighted selection.
//!
//! [`Router::decide`] weighs historical evidence (ranked insights plus
//! tracker statistics) against a complexity-derived confidence threshold.
//! Evidence that clears the threshold selects the historically best model
//! (*repository-guided*); anything else falls back to a deterministic
//! complexity-tier mapping filtered by preference compatibility, with ties
//! broken by each model's fixed declared priority.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::error::{Result, RudderError};
use crate::insight::types::QueryType;
use crate::ranking;
use crate::ranking::ranker::RelevanceRanker;
use crate::scoring::{ScoringStrategy, StyleProfile, UserPreferences};
use crate::tracker::{ComplexityBucket, ModelPerformanceTracker};

/// Capability tier of a registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheap and fast — greetings, short factual asks.
    Light,
    /// The general-purpose default.
    Standard,
    /// The heavyweight reserved for complex queries.
    Heavy,
}

impl ModelTier {
    /// Static complexity-tier mapping for the fallback path.
    pub fn for_bucket(bucket: ComplexityBucket) -> Self {
        match bucket {
            ComplexityBucket::Low => Self::Light,
            ComplexityBucket::Medium => Self::Standard,
            ComplexityBucket::High => Self::Heavy,
        }
    }
}

/// A model known to the router.
#[derive(Debug, Clone)]
pub struct RegisteredModel {
    pub name: String,
    pub tier: ModelTier,
    pub style: StyleProfile,
    /// Fallback tie-break rank — lower wins. Fixed at registration so
    /// fallback selection is deterministic and reproducible.
    pub priority: u32,
}

/// The set of registered models, shared between router and coordinator.
#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<Vec<RegisteredModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, model: RegisteredModel) {
        let mut models = self.models.write().expect("registry poisoned");
        models.retain(|m| m.name != model.name);
        models.push(model);
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().expect("registry poisoned").is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models
            .read()
            .expect("registry poisoned")
            .iter()
            .any(|m| m.name == name)
    }

    pub fn all(&self) -> Vec<RegisteredModel> {
        self.models.read().expect("registry poisoned").clone()
    }
}

/// A recommendation distilled from ranked insights.
#[derive(Debug, Clone, Serialize)]
pub struct StoreRecommendation {
    pub model: String,
    pub confidence: f64,
}

/// The outcome of one routing decision. Transient — one per request.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionContext {
    pub query: String,
    pub query_type: QueryType,
    pub complexity: f64,
    /// The threshold actually used, kept for auditability.
    pub confidence_threshold: f64,
    pub preferences: UserPreferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<StoreRecommendation>,
    /// Chosen model(s), primary first.
    pub selected: Vec<String>,
    /// `true` when historical evidence drove the selection.
    pub repository_guided: bool,
    pub rationale: String,
}

/// Confidence-weighted router.
pub struct Router {
    registry: Arc<ModelRegistry>,
    ranker: Arc<RelevanceRanker>,
    tracker: Arc<ModelPerformanceTracker>,
    scoring: Arc<dyn ScoringStrategy>,
    top_k: usize,
}

impl Router {
    pub fn new(
        registry: Arc<ModelRegistry>,
        ranker: Arc<RelevanceRanker>,
        tracker: Arc<ModelPerformanceTracker>,
        scoring: Arc<dyn ScoringStrategy>,
        top_k: usize,
    ) -> Self {
        Self {
            registry,
            ranker,
            tracker,
            scoring,
            top_k,
        }
    }

    /// Decide which model(s) should serve `query`.
    ///
    /// `multi_model` requests think-tank mode: secondary models are added so
    /// the coordinator can query several and keep the best response.
    pub fn decide(
        &self,
        query: &str,
        user_id: &str,
        preferences: &UserPreferences,
        multi_model: bool,
    ) -> Result<DecisionContext> {
        if self.registry.is_empty() {
            return Err(RudderError::fatal_config("no models registered"));
        }
        if query.trim().is_empty() {
            return Err(RudderError::validation("decide", "empty query", query));
        }

        let complexity = self.scoring.complexity(query);
        let threshold = self.scoring.confidence_threshold(complexity);
        let query_type = ranking::classify(query);
        let bucket = ComplexityBucket::from_score(complexity);

        let recommendation = self.recommend(query, query_type, bucket)?;

        let guided = recommendation
            .as_ref()
            .map(|r| r.confidence >= threshold)
            .unwrap_or(false);

        let (mut selected, rationale) = if guided {
            let rec = recommendation.as_ref().expect("guided implies recommendation");
            (
                vec![rec.model.clone()],
                format!(
                    "repository evidence (confidence {:.2} >= threshold {:.2})",
                    rec.confidence, threshold
                ),
            )
        } else {
            let fallback = self.fallback_order(bucket, preferences);
            let why = match &recommendation {
                Some(rec) => format!(
                    "fallback tier {:?} (repository confidence {:.2} < threshold {:.2})",
                    ModelTier::for_bucket(bucket),
                    rec.confidence,
                    threshold
                ),
                None => format!(
                    "fallback tier {:?} (no repository evidence)",
                    ModelTier::for_bucket(bucket)
                ),
            };
            (vec![fallback[0].clone()], why)
        };

        if multi_model {
            for name in self.fallback_order(bucket, preferences) {
                if selected.len() >= 3 {
                    break;
                }
                if !selected.contains(&name) {
                    selected.push(name);
                }
            }
        }

        debug!(
            user = user_id,
            query_type = %query_type,
            complexity,
            threshold,
            guided,
            primary = %selected[0],
            "routing decision"
        );

        Ok(DecisionContext {
            query: query.to_string(),
            query_type,
            complexity,
            confidence_threshold: threshold,
            preferences: *preferences,
            recommendation,
            selected,
            repository_guided: guided,
            rationale,
        })
    }

    /// Aggregate top-K ranked insights into a repository recommendation,
    /// blended with the tracker's view when the two agree.
    fn recommend(
        &self,
        query: &str,
        query_type: QueryType,
        bucket: ComplexityBucket,
    ) -> Result<Option<StoreRecommendation>> {
        let ranked = self
            .ranker
            .retrieve_insights(query, Some(self.top_k), None)?;

        // weight = relevance score (already folds in feedback quality);
        // evidence = weighted mean of normalized ratings.
        let mut weight: HashMap<&str, f64> = HashMap::new();
        let mut rating: HashMap<&str, f64> = HashMap::new();
        let mut total = 0.0;
        for r in &ranked {
            if !self.registry.contains(&r.insight.model_name) {
                continue; // stale evidence for a model that is no longer registered
            }
            let norm = r
                .insight
                .feedback
                .map(|f| (f.rating - 1.0) / 4.0)
                .unwrap_or(0.5);
            *weight.entry(r.insight.model_name.as_str()).or_default() += r.score;
            *rating.entry(r.insight.model_name.as_str()).or_default() += r.score * norm;
            total += r.score;
        }
        if total <= 0.0 {
            return Ok(None);
        }

        let (best_model, best_weight) = weight
            .iter()
            .max_by(|a, b| {
                a.1.partial_cmp(b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.0.cmp(a.0))
            })
            .map(|(m, w)| (m.to_string(), *w))
            .expect("total > 0 implies entries");

        let share = best_weight / total;
        let avg_rating = rating[best_model.as_str()] / best_weight;
        let mut confidence = share * avg_rating;

        // When the tracker's best model agrees, take the stronger signal.
        if let Some((tracker_model, tracker_confidence)) =
            self.tracker.get_best_model(query_type, bucket)
        {
            if tracker_model == best_model {
                confidence = confidence.max(tracker_confidence);
            }
        }

        Ok(Some(StoreRecommendation {
            model: best_model,
            confidence,
        }))
    }

    /// Candidates for a retry after the primary model failed, in the same
    /// deterministic order the fallback path uses.
    pub(crate) fn fallback_candidates(
        &self,
        bucket: ComplexityBucket,
        preferences: &UserPreferences,
    ) -> Vec<String> {
        self.fallback_order(bucket, preferences)
    }

    /// Deterministic fallback ordering for a complexity bucket:
    /// preferred tier first, then preference compatibility, then the fixed
    /// declared priority, then name. Never randomized.
    fn fallback_order(
        &self,
        bucket: ComplexityBucket,
        preferences: &UserPreferences,
    ) -> Vec<String> {
        let tier = ModelTier::for_bucket(bucket);
        let mut models = self.registry.all();
        models.sort_by(|a, b| {
            let a_tier = (a.tier != tier) as u8;
            let b_tier = (b.tier != tier) as u8;
            let a_compat = self.scoring.style_compatibility(preferences, &a.style);
            let b_compat = self.scoring.style_compatibility(preferences, &b.style);
            a_tier
                .cmp(&b_tier)
                .then_with(|| {
                    b_compat
                        .partial_cmp(&a_compat)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| a.name.cmp(&b.name))
        });
        models.into_iter().map(|m| m.name).collect()
    }
}
