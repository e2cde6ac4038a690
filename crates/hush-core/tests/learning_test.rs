//! Feedback-driven learning through the engine.

mod common;

use chrono::{Duration, Utc};
use common::{fixture, post, MockTransport, ScriptedLlm, NOTIFY_PLANS};
use hush_core::{
    AnalysisOutcome, AnalyzeOptions, EngineConfig, Feedback, LearnerScheduler, NotificationRate,
};

/// Repeated "not helpful" feedback on lunch notifications suppresses the topic.
#[tokio::test]
async fn test_unhelpful_lunch_feedback_suppresses_topic() {
    let f = fixture(
        ScriptedLlm::new(&[NOTIFY_PLANS]),
        MockTransport::new(),
        EngineConfig::default(),
    );
    post(
        &f.store,
        "m1",
        "bob",
        "Thinking about the offsite agenda",
        Utc::now() - Duration::minutes(2),
    );

    for _ in 0..5 {
        let outcome = f
            .engine
            .analyze("conv-1", "alice", AnalyzeOptions { regenerate: true })
            .await
            .unwrap();
        let decision = outcome.into_decision();
        assert!(decision.notification_text.as_deref().unwrap().contains("lunch"));
        f.engine
            .submit_feedback("alice", &decision.decision_id, Feedback::NotHelpful)
            .unwrap();
    }
    assert_eq!(f.llm.calls(), 5);

    let summary = f.engine.learner().run_all().unwrap();
    assert_eq!(summary.updated, 1);

    let profile = f.engine.get_profile("alice").unwrap().unwrap();
    assert!(profile.suppressed_topics.contains("lunch"));
    assert_eq!(profile.feedback_count, 5);
    assert_eq!(profile.accuracy, 0.0);
    assert_eq!(profile.preferred_notification_rate, NotificationRate::Fewer);

    post(
        &f.store,
        "m2",
        "bob",
        "Anyone up for lunch at the taco place",
        Utc::now(),
    );
    let outcome = f
        .engine
        .analyze("conv-1", "alice", AnalyzeOptions::default())
        .await
        .unwrap();
    let AnalysisOutcome::Inferred(decision) = outcome else {
        panic!("expected a fresh rule decision");
    };
    assert!(!decision.should_notify);
    assert!(decision.reason.contains("lunch"));
    assert_eq!(f.llm.calls(), 5);
}

/// The scheduler runs the same learner on demand.
#[tokio::test]
async fn test_scheduler_run_now_matches_learner() {
    let f = fixture(
        ScriptedLlm::new(&[NOTIFY_PLANS]),
        MockTransport::new(),
        EngineConfig::default(),
    );
    post(&f.store, "m1", "bob", "Thinking about the team outing", Utc::now());
    let decision = f
        .engine
        .analyze_conversation_for_notification("conv-1", "alice")
        .await
        .unwrap();
    f.engine
        .submit_feedback("alice", &decision.decision_id, Feedback::Helpful)
        .unwrap();

    let scheduler = LearnerScheduler::new(f.engine.learner().clone())
        .await
        .unwrap();
    let summary = scheduler.run_now().unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.failed, 0);

    let profile = f.engine.get_profile("alice").unwrap().unwrap();
    assert_eq!(profile.accuracy, 1.0);
    // Below the occurrence threshold, nothing is learned yet.
    assert!(profile.learned_keywords.is_empty());
}
