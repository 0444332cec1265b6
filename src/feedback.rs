//! Feedback normalization and distribution.
//!
//! Raw feedback moves through a small state machine:
//! **Received → Normalized → Applied**, or **Failed** (terminal). Applied
//! means the matching insight was amended, the tracker bucket updated, and
//! the ranking cache entries touching the insight's terms invalidated, in
//! that order; a storage error partway through surfaces to the caller with
//! the earlier steps already committed. Failed means no insight matched the
//! message id: the event is logged and discarded with zero state mutation,
//! and is not retried (a permanent caller-side error, not a transient one).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::insight::store::InsightStore;
use crate::insight::types::{Feedback, FeedbackRecord, FeedbackType};
use crate::ranking;
use crate::ranking::ranker::RelevanceRanker;
use crate::tracker::ModelPerformanceTracker;
use std::sync::Arc;

/// Rating a positive thumb maps to, on the 1–5 scale.
const POSITIVE_RATING: f64 = 4.5;
/// Rating a negative thumb maps to.
const NEGATIVE_RATING: f64 = 1.5;

/// Raw feedback as it arrives: a thumb or an explicit rating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSignal {
    Thumb(bool),
    Rating(f64),
}

/// Distribution states. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackState {
    Received,
    Normalized,
    Applied,
    Failed,
}

impl std::fmt::Display for FeedbackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Normalized => "normalized",
            Self::Applied => "applied",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Map a raw signal onto the 1–5 rating scale.
///
/// Idempotent: identical signals always map to identical ratings. Explicit
/// ratings are clamped into range rather than rejected.
pub fn normalize(signal: FeedbackSignal) -> f64 {
    match signal {
        FeedbackSignal::Thumb(true) => POSITIVE_RATING,
        FeedbackSignal::Thumb(false) => NEGATIVE_RATING,
        FeedbackSignal::Rating(rating) => rating.clamp(1.0, 5.0),
    }
}

/// Normalizes feedback and applies it to the store, tracker, and ranking
/// cache.
pub struct FeedbackDistributor {
    store: Arc<InsightStore>,
    tracker: Arc<ModelPerformanceTracker>,
    ranker: Arc<RelevanceRanker>,
}

impl FeedbackDistributor {
    pub fn new(
        store: Arc<InsightStore>,
        tracker: Arc<ModelPerformanceTracker>,
        ranker: Arc<RelevanceRanker>,
    ) -> Self {
        Self {
            store,
            tracker,
            ranker,
        }
    }

    /// Run one feedback event through the state machine.
    ///
    /// Returns `true` when the feedback was applied, `false` when no insight
    /// matched the message id. Storage failures are the only errors.
    pub fn distribute(
        &self,
        user_id: &str,
        message_id: &str,
        signal: FeedbackSignal,
        feedback_type: FeedbackType,
    ) -> Result<bool> {
        debug!(
            state = %FeedbackState::Received,
            user = user_id,
            message_id,
            ?signal,
            "feedback event"
        );

        let record = FeedbackRecord {
            message_id: message_id.to_string(),
            user_id: user_id.to_string(),
            rating: normalize(signal),
            feedback_type,
            timestamp: Utc::now(),
        };
        debug!(state = %FeedbackState::Normalized, rating = record.rating, "feedback normalized");

        let Some(insight) = self.store.get_by_message(message_id)? else {
            // Terminal: no retry, nothing mutated.
            warn!(
                state = %FeedbackState::Failed,
                user = user_id,
                message_id,
                "feedback for unknown message discarded"
            );
            return Ok(false);
        };

        let feedback = Feedback {
            rating: record.rating,
            feedback_type: record.feedback_type,
        };
        let applied = self.store.update_feedback(message_id, feedback)?;
        if !applied {
            // The insight vanished between lookup and update; treat like an
            // unknown id.
            warn!(state = %FeedbackState::Failed, message_id, "insight disappeared before update");
            return Ok(false);
        }

        let query_type = ranking::classify_terms(&insight.tags);
        self.tracker
            .record(&insight.model_name, query_type, record.rating)?;
        self.ranker.invalidate_terms(&insight.tags);

        debug!(
            state = %FeedbackState::Applied,
            message_id,
            model = %insight.model_name,
            query_type = %query_type,
            rating = record.rating,
            "feedback applied"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankingConfig;
    use crate::db;
    use crate::insight::types::{QueryContext, QueryType};
    use std::sync::Mutex;

    struct Fixture {
        store: Arc<InsightStore>,
        tracker: Arc<ModelPerformanceTracker>,
        distributor: FeedbackDistributor,
    }

    fn fixture() -> Fixture {
        let conn = Arc::new(Mutex::new(db::open_memory_database().unwrap()));
        let store = Arc::new(InsightStore::open(conn.clone()).unwrap());
        let tracker = Arc::new(ModelPerformanceTracker::open(conn, 5, &store).unwrap());
        let ranker = Arc::new(RelevanceRanker::new(
            store.clone(),
            &RankingConfig::default(),
        ));
        let distributor =
            FeedbackDistributor::new(store.clone(), tracker.clone(), ranker);
        Fixture {
            store,
            tracker,
            distributor,
        }
    }

    #[test]
    fn normalization_is_idempotent_and_fixed() {
        assert_eq!(normalize(FeedbackSignal::Thumb(true)), 4.5);
        assert_eq!(normalize(FeedbackSignal::Thumb(false)), 1.5);
        assert_eq!(
            normalize(FeedbackSignal::Thumb(true)),
            normalize(FeedbackSignal::Thumb(true))
        );
        assert_eq!(normalize(FeedbackSignal::Rating(3.0)), 3.0);
        assert_eq!(normalize(FeedbackSignal::Rating(7.0)), 5.0);
        assert_eq!(normalize(FeedbackSignal::Rating(-2.0)), 1.0);
    }

    #[test]
    fn positive_thumb_applies_everywhere() {
        let f = fixture();
        let ctx = QueryContext::new("u", 3.0);
        let stored = f
            .store
            .store_insight("model-a", "debug rust async code", "try tokio-console", None, &ctx)
            .unwrap();

        let applied = f
            .distributor
            .distribute("u", &stored.message_id, FeedbackSignal::Thumb(true), FeedbackType::Helpfulness)
            .unwrap();
        assert!(applied);

        // Insight amended
        let insight = f.store.get(stored.id).unwrap().unwrap();
        assert!((insight.feedback.unwrap().rating - 4.5).abs() < f64::EPSILON);

        // Tracker bucket updated for the classified query type
        let stats = f
            .tracker
            .stats_for("model-a", QueryType::Technical)
            .unwrap();
        assert_eq!(stats.sample_count, 1);
        assert!((stats.ewma - 0.875).abs() < 0.001);
    }

    #[test]
    fn unknown_message_id_mutates_nothing() {
        let f = fixture();
        let ctx = QueryContext::new("u", 3.0);
        f.store
            .store_insight("model-a", "debug rust async code", "r", None, &ctx)
            .unwrap();

        let applied = f
            .distributor
            .distribute("u", "not-a-message", FeedbackSignal::Thumb(false), FeedbackType::Other)
            .unwrap();
        assert!(!applied);

        // No tracker bucket was created
        assert!(f.tracker.stats_for("model-a", QueryType::Technical).is_none());
        assert!(f
            .tracker
            .get_best_model(QueryType::Technical, crate::tracker::ComplexityBucket::Low)
            .is_none());
    }

    #[test]
    fn explicit_rating_passes_through() {
        let f = fixture();
        let ctx = QueryContext::new("u", 1.0);
        let stored = f
            .store
            .store_insight("model-b", "write a poem about rivers", "rivers run", None, &ctx)
            .unwrap();

        f.distributor
            .distribute("u", &stored.message_id, FeedbackSignal::Rating(3.0), FeedbackType::Style)
            .unwrap();

        let insight = f.store.get(stored.id).unwrap().unwrap();
        assert!((insight.feedback.unwrap().rating - 3.0).abs() < f64::EPSILON);
        let stats = f.tracker.stats_for("model-b", QueryType::Creative).unwrap();
        assert!((stats.ewma - 0.5).abs() < 0.001);
    }

    #[test]
    fn repeated_feedback_reuses_the_same_insight() {
        let f = fixture();
        let ctx = QueryContext::new("u", 1.0);
        let stored = f
            .store
            .store_insight("model-a", "compare sql databases", "postgres vs mysql", None, &ctx)
            .unwrap();

        // A user can amend their judgement; each event is one more sample
        f.distributor
            .distribute("u", &stored.message_id, FeedbackSignal::Thumb(true), FeedbackType::Helpfulness)
            .unwrap();
        f.distributor
            .distribute("u", &stored.message_id, FeedbackSignal::Thumb(false), FeedbackType::Helpfulness)
            .unwrap();

        let insight = f.store.get(stored.id).unwrap().unwrap();
        assert!((insight.feedback.unwrap().rating - 1.5).abs() < f64::EPSILON);
        let stats = f.tracker.stats_for("model-a", QueryType::Technical).unwrap();
        assert_eq!(stats.sample_count, 2);
    }
}
