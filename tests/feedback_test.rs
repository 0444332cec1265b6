//! Feedback distribution through the full stack.

mod helpers;

use rudder::coordinator::{FeedbackRequest, QueryRequest};
use rudder::insight::types::{FeedbackType, QueryType};

use helpers::{memory_conn, three_tier_coordinator};

#[tokio::test]
async fn positive_feedback_reaches_store_and_tracker() {
    let coordinator = three_tier_coordinator(memory_conn());

    let outcome = coordinator
        .process_query(QueryRequest::new("debug my rust async code", "user-1"))
        .await
        .unwrap();

    let applied = coordinator
        .record_feedback(&FeedbackRequest {
            user_id: "user-1".into(),
            message_id: outcome.message_id.clone(),
            is_positive: true,
            feedback_type: FeedbackType::Helpfulness,
            model_used: Some(outcome.model_used.clone()),
            query: Some("debug my rust async code".into()),
            response: Some(outcome.response.clone()),
        })
        .unwrap();
    assert!(applied);

    let insight = coordinator
        .store()
        .get_by_message(&outcome.message_id)
        .unwrap()
        .unwrap();
    let feedback = insight.feedback.unwrap();
    assert!((feedback.rating - 4.5).abs() < f64::EPSILON);
    assert_eq!(feedback.feedback_type, FeedbackType::Helpfulness);

    let stats = coordinator
        .tracker()
        .stats_for(&outcome.model_used, QueryType::Technical)
        .unwrap();
    assert_eq!(stats.sample_count, 1);
    assert!((stats.ewma - 0.875).abs() < 0.001);
}

#[tokio::test]
async fn negative_feedback_drags_the_ewma_down() {
    let coordinator = three_tier_coordinator(memory_conn());

    let outcome = coordinator
        .process_query(QueryRequest::new("debug my rust async code", "user-1"))
        .await
        .unwrap();
    let model = outcome.model_used.clone();

    for is_positive in [true, false, false, false] {
        coordinator
            .record_feedback(&FeedbackRequest {
                user_id: "user-1".into(),
                message_id: outcome.message_id.clone(),
                is_positive,
                feedback_type: FeedbackType::Helpfulness,
                model_used: None,
                query: None,
                response: None,
            })
            .unwrap();
    }

    let stats = coordinator
        .tracker()
        .stats_for(&model, QueryType::Technical)
        .unwrap();
    assert_eq!(stats.sample_count, 4);
    assert!(stats.ewma < 0.4, "ewma was {}", stats.ewma);

    // The stored rating reflects the latest judgement
    let insight = coordinator
        .store()
        .get_by_message(&outcome.message_id)
        .unwrap()
        .unwrap();
    assert!((insight.feedback.unwrap().rating - 1.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn unknown_message_id_is_absorbed_without_side_effects() {
    let coordinator = three_tier_coordinator(memory_conn());

    let outcome = coordinator
        .process_query(QueryRequest::new("debug my rust async code", "user-1"))
        .await
        .unwrap();

    let applied = coordinator
        .record_feedback(&FeedbackRequest {
            user_id: "user-1".into(),
            message_id: "not-a-real-message".into(),
            is_positive: false,
            feedback_type: FeedbackType::Other,
            model_used: Some(outcome.model_used.clone()),
            query: None,
            response: None,
        })
        .unwrap();
    assert!(!applied);

    // Nothing recorded against any model
    assert!(coordinator
        .tracker()
        .stats_for(&outcome.model_used, QueryType::Technical)
        .is_none());
    let insight = coordinator
        .store()
        .get_by_message(&outcome.message_id)
        .unwrap()
        .unwrap();
    assert!(insight.feedback.is_none());
}

#[tokio::test]
async fn feedback_lands_in_the_bucket_for_the_query_type() {
    let coordinator = three_tier_coordinator(memory_conn());

    let outcome = coordinator
        .process_query(QueryRequest::new("write a poem about rivers", "user-1"))
        .await
        .unwrap();
    coordinator
        .record_feedback(&FeedbackRequest {
            user_id: "user-1".into(),
            message_id: outcome.message_id,
            is_positive: true,
            feedback_type: FeedbackType::Style,
            model_used: None,
            query: None,
            response: None,
        })
        .unwrap();

    let tracker = coordinator.tracker();
    assert!(tracker
        .stats_for(&outcome.model_used, QueryType::Creative)
        .is_some());
    assert!(tracker
        .stats_for(&outcome.model_used, QueryType::Technical)
        .is_none());
}
