//! End-to-end routing behavior through the coordinator.

mod helpers;

use std::sync::Arc;

use rudder::coordinator::{FeedbackRequest, QueryRequest};
use rudder::error::RudderError;
use rudder::insight::types::FeedbackType;
use rudder::router::ModelTier;

use helpers::{memory_conn, model, three_tier_coordinator, FailingProcessor};

#[tokio::test]
async fn greeting_routes_to_the_light_tier() {
    let coordinator = three_tier_coordinator(memory_conn());

    let outcome = coordinator
        .process_query(QueryRequest::new("Hello", "user-1"))
        .await
        .unwrap();

    assert_eq!(outcome.model_used, "swift");
    assert!(!outcome.repository_guided);
    assert!(!outcome.degraded);
}

#[tokio::test]
async fn complex_technical_query_routes_to_the_heavy_tier() {
    let coordinator = three_tier_coordinator(memory_conn());

    let query = "refactor the async database schema migration; optimize index \
                 latency, debug mutex contention in the runtime cache and \
                 explain the compiler error in this trait impl";
    let outcome = coordinator
        .process_query(QueryRequest::new(query, "user-1"))
        .await
        .unwrap();

    assert_eq!(outcome.model_used, "deep");
}

#[tokio::test]
async fn accumulated_feedback_makes_routing_repository_guided() {
    let coordinator = three_tier_coordinator(memory_conn());

    // Four well-received answers from `deep` on the same topic. The
    // override keeps the light-tier fallback from absorbing the traffic
    // while history builds up.
    for i in 0..4 {
        let mut request = QueryRequest::new(
            format!("debug async rust mutex deadlock {i}"),
            "user-1",
        );
        request.model_override = Some("deep".into());
        let outcome = coordinator.process_query(request).await.unwrap();
        assert!(!outcome.repository_guided);

        let applied = coordinator
            .record_feedback(&FeedbackRequest {
                user_id: "user-1".into(),
                message_id: outcome.message_id,
                is_positive: true,
                feedback_type: FeedbackType::Helpfulness,
                model_used: Some("deep".into()),
                query: None,
                response: None,
            })
            .unwrap();
        assert!(applied);
    }

    // A fresh query on the topic now rides the history instead of the tier
    // mapping (which would have picked a lighter model).
    let outcome = coordinator
        .process_query(QueryRequest::new("debug async rust mutex deadlock", "user-1"))
        .await
        .unwrap();

    assert!(outcome.repository_guided);
    assert_eq!(outcome.model_used, "deep");
    assert!(outcome.confidence > 0.7, "confidence was {}", outcome.confidence);
}

#[tokio::test]
async fn model_override_bypasses_history_and_tiers() {
    let coordinator = three_tier_coordinator(memory_conn());

    let mut request = QueryRequest::new("Hello", "user-1");
    request.model_override = Some("deep".into());
    let outcome = coordinator.process_query(request).await.unwrap();
    assert_eq!(outcome.model_used, "deep");
    assert!(!outcome.repository_guided);

    let mut unknown = QueryRequest::new("Hello", "user-1");
    unknown.model_override = Some("no-such-model".into());
    assert!(matches!(
        coordinator.process_query(unknown).await.unwrap_err(),
        RudderError::Validation { .. }
    ));
}

#[tokio::test]
async fn failed_primary_is_retried_on_a_fallback_model() {
    let coordinator = three_tier_coordinator(memory_conn());
    // Shadow the light tier's first choice with a broken backend.
    coordinator.register_model(
        model("swift", ModelTier::Light, 1),
        Arc::new(FailingProcessor),
    );

    let outcome = coordinator
        .process_query(QueryRequest::new("Hello there", "user-1"))
        .await
        .unwrap();

    assert_ne!(outcome.model_used, "swift");
    assert!(outcome.degraded);
    // The fallback's answer still gets stored for future routing.
    assert_eq!(coordinator.store().count().unwrap(), 1);
}

#[tokio::test]
async fn think_tank_stores_exactly_one_insight() {
    let coordinator = three_tier_coordinator(memory_conn());

    let mut request = QueryRequest::new("compare sql and nosql databases", "user-1");
    request.think_tank = true;
    let outcome = coordinator.process_query(request).await.unwrap();

    assert!(!outcome.response.is_empty());
    assert!(outcome.quality_score > 0.0);
    // Several models answered, but only the winning response is kept.
    assert_eq!(coordinator.store().count().unwrap(), 1);

    let insight = coordinator
        .store()
        .get_by_message(&outcome.message_id)
        .unwrap()
        .unwrap();
    assert_eq!(insight.model_name, outcome.model_used);
}

#[tokio::test]
async fn every_processed_query_is_stored_with_context() {
    let coordinator = three_tier_coordinator(memory_conn());

    for (i, query) in ["Hello", "write a poem about rivers", "debug my rust code"]
        .iter()
        .enumerate()
    {
        let outcome = coordinator
            .process_query(QueryRequest::new(*query, format!("user-{i}")))
            .await
            .unwrap();
        let insight = coordinator
            .store()
            .get_by_message(&outcome.message_id)
            .unwrap()
            .unwrap();
        assert_eq!(insight.query, *query);
        assert_eq!(insight.context.user_id, format!("user-{i}"));
        assert!(insight.feedback.is_none());
    }
    assert_eq!(coordinator.store().count().unwrap(), 3);
}

#[tokio::test]
async fn no_registered_models_is_a_fatal_configuration_error() {
    let conn = memory_conn();
    let coordinator =
        rudder::coordinator::Coordinator::new(&rudder::config::RudderConfig::default(), conn)
            .unwrap();

    let err = coordinator
        .process_query(QueryRequest::new("Hello", "user-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RudderError::FatalConfiguration { .. }));
}
