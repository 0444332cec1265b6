//! Top-level orchestration.
//!
//! The [`Coordinator`] owns the wiring between the routing core and the
//! external model backends: it decides, invokes the chosen processor(s),
//! evaluates the result, stores the insight, and exposes the sole feedback
//! entry point. Model backends are registered as [`ModelProcessor`]
//! implementations; no network I/O happens inside the core itself, and the
//! caller-imposed timeout wraps only the external call, never the in-memory
//! decision path.

use async_trait::async_trait;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RudderConfig;
use crate::error::{query_hash, Result, RudderError};
use crate::evaluate::QualityEvaluator;
use crate::feedback::{FeedbackDistributor, FeedbackSignal};
use crate::insight::store::InsightStore;
use crate::insight::types::{FeedbackType, QueryContext};
use crate::ranking::ranker::RelevanceRanker;
use crate::router::{ModelRegistry, RegisteredModel, Router};
use crate::scoring::{HeuristicScoring, ScoringStrategy, UserPreferences};
use crate::tracker::{ComplexityBucket, ModelPerformanceTracker};

/// Parameters handed to an external model backend alongside the query.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessParameters {
    pub user_id: String,
    pub preferences: UserPreferences,
    pub complexity: f64,
}

/// Contract for external model backends.
///
/// Implementations are expected to fail with
/// [`RudderError::ModelUnavailable`] when the backend cannot be reached;
/// the coordinator maps its own deadline onto [`RudderError::Timeout`].
#[async_trait]
pub trait ModelProcessor: Send + Sync {
    async fn process(&self, query: &str, params: &ProcessParameters) -> Result<String>;
}

/// One incoming query from the upstream transport.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub user_id: String,
    /// Caller-forced model, bypassing repository guidance.
    pub model_override: Option<String>,
    pub preferences: UserPreferences,
    /// Think-tank mode: query several models and keep the best response.
    pub think_tank: bool,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            model_override: None,
            preferences: UserPreferences::default(),
            think_tank: false,
        }
    }
}

/// What goes back to the upstream transport.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub model_used: String,
    pub repository_guided: bool,
    /// Repository confidence behind the decision (0 when none existed).
    pub confidence: f64,
    pub quality_score: f64,
    pub response: String,
    /// Join key for later feedback on this response.
    pub message_id: String,
    /// `true` when the primary model failed and a fallback served the
    /// response instead.
    pub degraded: bool,
}

/// One feedback event from the upstream transport. The echo fields carry
/// what the transport believes it delivered; they are used for log context
/// only — the stored insight is always the source of truth.
#[derive(Debug, Clone)]
pub struct FeedbackRequest {
    pub user_id: String,
    pub message_id: String,
    pub is_positive: bool,
    pub feedback_type: FeedbackType,
    pub model_used: Option<String>,
    pub query: Option<String>,
    pub response: Option<String>,
}

/// Top-level orchestrator. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    store: Arc<InsightStore>,
    ranker: Arc<RelevanceRanker>,
    tracker: Arc<ModelPerformanceTracker>,
    registry: Arc<ModelRegistry>,
    router: Router,
    evaluator: QualityEvaluator,
    distributor: FeedbackDistributor,
    processors: RwLock<HashMap<String, Arc<dyn ModelProcessor>>>,
    process_timeout: Duration,
}

impl Coordinator {
    /// Wire up the full core over an open database connection, using the
    /// default heuristic scoring.
    pub fn new(config: &RudderConfig, conn: Arc<Mutex<Connection>>) -> Result<Self> {
        Self::with_scoring(config, conn, Arc::new(HeuristicScoring::new(&config.routing)))
    }

    /// As [`Coordinator::new`], with a caller-supplied scoring strategy.
    pub fn with_scoring(
        config: &RudderConfig,
        conn: Arc<Mutex<Connection>>,
        scoring: Arc<dyn ScoringStrategy>,
    ) -> Result<Self> {
        let store = Arc::new(InsightStore::open(conn.clone())?);
        let ranker = Arc::new(RelevanceRanker::new(store.clone(), &config.ranking));
        let tracker = Arc::new(ModelPerformanceTracker::open(
            conn,
            config.routing.sample_floor,
            &store,
        )?);
        let registry = Arc::new(ModelRegistry::new());
        let router = Router::new(
            registry.clone(),
            ranker.clone(),
            tracker.clone(),
            scoring,
            config.routing.top_k,
        );
        let evaluator = QualityEvaluator::new(&config.evaluation);
        let distributor =
            FeedbackDistributor::new(store.clone(), tracker.clone(), ranker.clone());

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                store,
                ranker,
                tracker,
                registry,
                router,
                evaluator,
                distributor,
                processors: RwLock::new(HashMap::new()),
                process_timeout: Duration::from_secs(config.routing.process_timeout_secs),
            }),
        })
    }

    /// Register a model and the processor that backs it.
    pub fn register_model(&self, model: RegisteredModel, processor: Arc<dyn ModelProcessor>) {
        info!(model = %model.name, tier = ?model.tier, "model registered");
        self.inner
            .processors
            .write()
            .expect("processor map poisoned")
            .insert(model.name.clone(), processor);
        self.inner.registry.register(model);
    }

    /// Startup check: at least one model must be registered.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.inner.registry.is_empty() {
            return Err(RudderError::fatal_config("no models registered"));
        }
        Ok(())
    }

    /// Process one query end to end: decide, call the backend(s), evaluate,
    /// store the insight.
    ///
    /// The pipeline runs on a spawned task, so a caller that gives up and
    /// drops this future does not cancel an in-flight model call — the
    /// finished response is still evaluated and stored for future reuse.
    pub async fn process_query(&self, request: QueryRequest) -> Result<QueryOutcome> {
        let inner = self.inner.clone();
        match tokio::spawn(async move { inner.run(request).await }).await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(RudderError::fatal_config(format!(
                "query pipeline task failed: {join_err}"
            ))),
        }
    }

    /// Sole external write entry point into the feedback distributor.
    ///
    /// Returns `true` when the feedback reached an insight, `false` for an
    /// unknown message id (logged, discarded, nothing mutated).
    pub fn record_feedback(&self, request: &FeedbackRequest) -> Result<bool> {
        let signal = FeedbackSignal::Thumb(request.is_positive);
        let applied = self.inner.distributor.distribute(
            &request.user_id,
            &request.message_id,
            signal,
            request.feedback_type,
        )?;
        if !applied {
            // Echo fields only help diagnose the caller-side mismatch.
            warn!(
                message_id = %request.message_id,
                claimed_model = request.model_used.as_deref().unwrap_or("?"),
                query = %request.query.as_deref().map(query_hash).unwrap_or_default(),
                "feedback did not match any stored insight"
            );
        }
        Ok(applied)
    }

    pub fn store(&self) -> Arc<InsightStore> {
        self.inner.store.clone()
    }

    pub fn tracker(&self) -> Arc<ModelPerformanceTracker> {
        self.inner.tracker.clone()
    }
}

impl CoordinatorInner {
    async fn run(&self, request: QueryRequest) -> Result<QueryOutcome> {
        let mut decision = self.router.decide(
            &request.query,
            &request.user_id,
            &request.preferences,
            request.think_tank,
        )?;

        if let Some(ref forced) = request.model_override {
            if !self.registry.contains(forced) {
                return Err(RudderError::validation(
                    "decide",
                    format!("unknown model override '{forced}'"),
                    &request.query,
                ));
            }
            decision.selected = vec![forced.clone()];
            decision.repository_guided = false;
            decision.rationale = "caller override".to_string();
        }

        let params = ProcessParameters {
            user_id: request.user_id.clone(),
            preferences: request.preferences,
            complexity: decision.complexity,
        };

        let (model_used, evaluation, degraded) = if request.think_tank {
            self.run_think_tank(&request, &decision.selected, &params).await?
        } else {
            self.run_single(&request, &decision, &params).await?
        };

        let mut context = QueryContext::new(request.user_id.clone(), decision.complexity);
        context.tone = request.preferences.tone;
        context.length = request.preferences.length;
        context.structure = request.preferences.structure;

        let stored = self.store.store_insight(
            &model_used,
            &request.query,
            &evaluation.cleaned_response,
            None,
            &context,
        )?;
        self.ranker.invalidate_terms(&stored.tags);

        info!(
            model = %model_used,
            guided = decision.repository_guided,
            quality = evaluation.score,
            degraded,
            insight = stored.id,
            "query processed"
        );

        Ok(QueryOutcome {
            model_used,
            repository_guided: decision.repository_guided,
            confidence: decision
                .recommendation
                .as_ref()
                .map(|r| r.confidence)
                .unwrap_or(0.0),
            quality_score: evaluation.score,
            response: evaluation.cleaned_response,
            message_id: stored.message_id,
            degraded,
        })
    }

    /// Single-model path: call the primary, retrying once on a fallback-tier
    /// model when the backend is unavailable or times out.
    async fn run_single(
        &self,
        request: &QueryRequest,
        decision: &crate::router::DecisionContext,
        params: &ProcessParameters,
    ) -> Result<(String, crate::evaluate::Evaluation, bool)> {
        let primary = decision.selected[0].clone();
        match self.call_model(&primary, &request.query, params).await {
            Ok(response) => {
                let evaluation =
                    self.evaluator
                        .evaluate(&response, &request.query, decision.complexity);
                Ok((primary, evaluation, false))
            }
            Err(err) if err.is_retryable() => {
                warn!(model = %primary, error = %err, "primary model failed, retrying on fallback tier");
                let bucket = ComplexityBucket::from_score(decision.complexity);
                let fallback = self
                    .router
                    .fallback_candidates(bucket, &request.preferences)
                    .into_iter()
                    .find(|name| *name != primary)
                    .ok_or_else(|| {
                        RudderError::fatal_config("no fallback model available")
                    })?;
                let response = self.call_model(&fallback, &request.query, params).await?;
                let evaluation =
                    self.evaluator
                        .evaluate(&response, &request.query, decision.complexity);
                Ok((fallback, evaluation, true))
            }
            Err(err) => Err(err),
        }
    }

    /// Think-tank path: query every selected model, evaluate each response
    /// once, keep the best. Fails only when every candidate fails.
    async fn run_think_tank(
        &self,
        request: &QueryRequest,
        candidates: &[String],
        params: &ProcessParameters,
    ) -> Result<(String, crate::evaluate::Evaluation, bool)> {
        let complexity = params.complexity;
        let mut best: Option<(String, crate::evaluate::Evaluation)> = None;
        let mut first_error: Option<RudderError> = None;
        let mut failures = 0usize;

        for name in candidates {
            match self.call_model(name, &request.query, params).await {
                Ok(response) => {
                    let evaluation =
                        self.evaluator.evaluate(&response, &request.query, complexity);
                    let better = best
                        .as_ref()
                        .map(|(_, e)| evaluation.score > e.score)
                        .unwrap_or(true);
                    if better {
                        best = Some((name.clone(), evaluation));
                    }
                }
                Err(err) => {
                    warn!(model = %name, error = %err, "think-tank candidate failed");
                    failures += 1;
                    first_error.get_or_insert(err);
                }
            }
        }

        match best {
            Some((model, evaluation)) => Ok((model, evaluation, failures > 0)),
            None => Err(first_error.expect("no best implies at least one failure")),
        }
    }

    /// Invoke one backend with the caller-imposed deadline around the
    /// external call only.
    async fn call_model(
        &self,
        model: &str,
        query: &str,
        params: &ProcessParameters,
    ) -> Result<String> {
        let processor = {
            let processors = self.processors.read().expect("processor map poisoned");
            processors.get(model).cloned()
        };
        let Some(processor) = processor else {
            return Err(RudderError::ModelUnavailable {
                stage: "process",
                model: model.to_string(),
                reason: "no processor registered".into(),
                query_hash: query_hash(query),
            });
        };

        match tokio::time::timeout(self.process_timeout, processor.process(query, params)).await
        {
            Ok(result) => result,
            Err(_) => Err(RudderError::Timeout {
                stage: "process",
                model: model.to_string(),
                waited_ms: self.process_timeout.as_millis() as u64,
                query_hash: query_hash(query),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::insight::types::{LengthPref, StructurePref, Tone};
    use crate::router::ModelTier;
    use crate::scoring::StyleProfile;

    struct EchoProcessor {
        signature: &'static str,
    }

    #[async_trait]
    impl ModelProcessor for EchoProcessor {
        async fn process(&self, query: &str, _params: &ProcessParameters) -> Result<String> {
            Ok(format!("{}: a considered answer about {}", self.signature, query))
        }
    }

    struct FailingProcessor;

    #[async_trait]
    impl ModelProcessor for FailingProcessor {
        async fn process(&self, query: &str, _params: &ProcessParameters) -> Result<String> {
            Err(RudderError::ModelUnavailable {
                stage: "process",
                model: "broken".into(),
                reason: "connection refused".into(),
                query_hash: query_hash(query),
            })
        }
    }

    struct SlowProcessor;

    #[async_trait]
    impl ModelProcessor for SlowProcessor {
        async fn process(&self, _query: &str, _params: &ProcessParameters) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".into())
        }
    }

    fn style() -> StyleProfile {
        StyleProfile {
            tone: Tone::Neutral,
            length: LengthPref::Medium,
            structure: StructurePref::Prose,
        }
    }

    fn model(name: &str, tier: ModelTier, priority: u32) -> RegisteredModel {
        RegisteredModel {
            name: name.into(),
            tier,
            style: style(),
            priority,
        }
    }

    fn coordinator() -> Coordinator {
        let conn = Arc::new(Mutex::new(db::open_memory_database().unwrap()));
        Coordinator::new(&RudderConfig::default(), conn).unwrap()
    }

    #[tokio::test]
    async fn unconfigured_coordinator_is_not_ready() {
        let coordinator = coordinator();
        assert!(matches!(
            coordinator.ensure_ready().unwrap_err(),
            RudderError::FatalConfiguration { .. }
        ));

        let err = coordinator
            .process_query(QueryRequest::new("hello", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, RudderError::FatalConfiguration { .. }));
    }

    #[tokio::test]
    async fn process_query_stores_an_insight() {
        let coordinator = coordinator();
        coordinator.register_model(
            model("echo", ModelTier::Light, 1),
            Arc::new(EchoProcessor { signature: "echo" }),
        );

        let outcome = coordinator
            .process_query(QueryRequest::new("Hello", "user-1"))
            .await
            .unwrap();

        assert_eq!(outcome.model_used, "echo");
        assert!(!outcome.repository_guided);
        assert!(!outcome.degraded);
        assert!(outcome.response.contains("Hello"));

        let insight = coordinator
            .store()
            .get_by_message(&outcome.message_id)
            .unwrap()
            .unwrap();
        assert_eq!(insight.model_name, "echo");
        assert_eq!(insight.query, "Hello");
        assert_eq!(insight.context.user_id, "user-1");
    }

    #[tokio::test]
    async fn failed_primary_falls_back_and_degrades() {
        let coordinator = coordinator();
        coordinator.register_model(
            model("flaky", ModelTier::Light, 1),
            Arc::new(FailingProcessor),
        );
        coordinator.register_model(
            model("backup", ModelTier::Light, 2),
            Arc::new(EchoProcessor { signature: "backup" }),
        );

        let outcome = coordinator
            .process_query(QueryRequest::new("Hello there", "u"))
            .await
            .unwrap();

        assert_eq!(outcome.model_used, "backup");
        assert!(outcome.degraded);
        assert!(outcome.response.starts_with("backup:"));
    }

    #[tokio::test]
    async fn retry_happens_only_once() {
        let coordinator = coordinator();
        coordinator.register_model(
            model("flaky-1", ModelTier::Light, 1),
            Arc::new(FailingProcessor),
        );
        coordinator.register_model(
            model("flaky-2", ModelTier::Light, 2),
            Arc::new(FailingProcessor),
        );
        coordinator.register_model(
            model("healthy-but-third", ModelTier::Light, 3),
            Arc::new(EchoProcessor { signature: "h" }),
        );

        // Primary fails, the single retry hits flaky-2 and fails too.
        let err = coordinator
            .process_query(QueryRequest::new("Hello there", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, RudderError::ModelUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let conn = Arc::new(Mutex::new(db::open_memory_database().unwrap()));
        let mut config = RudderConfig::default();
        config.routing.process_timeout_secs = 1;
        let coordinator = Coordinator::new(&config, conn).unwrap();
        coordinator.register_model(model("slow", ModelTier::Light, 1), Arc::new(SlowProcessor));

        let err = coordinator
            .process_query(QueryRequest::new("Hello", "u"))
            .await
            .unwrap_err();
        // Only one model registered, so the fallback retry finds no
        // alternative and the configuration error surfaces.
        assert!(matches!(err, RudderError::FatalConfiguration { .. }));
    }

    #[tokio::test]
    async fn think_tank_picks_best_of_surviving_candidates() {
        let coordinator = coordinator();
        coordinator.register_model(
            model("terse", ModelTier::Light, 1),
            Arc::new(EchoProcessor { signature: "terse" }),
        );
        coordinator.register_model(
            model("broken", ModelTier::Standard, 2),
            Arc::new(FailingProcessor),
        );

        let mut request = QueryRequest::new("compare sql and nosql databases", "u");
        request.think_tank = true;
        let outcome = coordinator.process_query(request).await.unwrap();

        assert_eq!(outcome.model_used, "terse");
        assert!(outcome.degraded, "a failed candidate marks the outcome degraded");
    }

    #[tokio::test]
    async fn model_override_bypasses_routing() {
        let coordinator = coordinator();
        coordinator.register_model(
            model("auto", ModelTier::Light, 1),
            Arc::new(EchoProcessor { signature: "auto" }),
        );
        coordinator.register_model(
            model("forced", ModelTier::Heavy, 2),
            Arc::new(EchoProcessor { signature: "forced" }),
        );

        let mut request = QueryRequest::new("Hello", "u");
        request.model_override = Some("forced".into());
        let outcome = coordinator.process_query(request).await.unwrap();
        assert_eq!(outcome.model_used, "forced");
        assert!(!outcome.repository_guided);

        let mut bad = QueryRequest::new("Hello", "u");
        bad.model_override = Some("ghost".into());
        assert!(matches!(
            coordinator.process_query(bad).await.unwrap_err(),
            RudderError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn feedback_round_trip_through_coordinator() {
        let coordinator = coordinator();
        coordinator.register_model(
            model("echo", ModelTier::Light, 1),
            Arc::new(EchoProcessor { signature: "echo" }),
        );

        let outcome = coordinator
            .process_query(QueryRequest::new("debug my rust async code", "u"))
            .await
            .unwrap();

        let applied = coordinator
            .record_feedback(&FeedbackRequest {
                user_id: "u".into(),
                message_id: outcome.message_id.clone(),
                is_positive: true,
                feedback_type: FeedbackType::Helpfulness,
                model_used: Some(outcome.model_used.clone()),
                query: None,
                response: None,
            })
            .unwrap();
        assert!(applied);

        let insight = coordinator
            .store()
            .get_by_message(&outcome.message_id)
            .unwrap()
            .unwrap();
        assert!((insight.feedback.unwrap().rating - 4.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn feedback_for_unknown_message_returns_false() {
        let coordinator = coordinator();
        coordinator.register_model(
            model("echo", ModelTier::Light, 1),
            Arc::new(EchoProcessor { signature: "echo" }),
        );

        let applied = coordinator
            .record_feedback(&FeedbackRequest {
                user_id: "u".into(),
                message_id: "never-issued".into(),
                is_positive: false,
                feedback_type: FeedbackType::Other,
                model_used: None,
                query: Some("some query".into()),
                response: None,
            })
            .unwrap();
        assert!(!applied);
    }
}
