// crates/driftwatch-control/tests/end_to_end.rs
//
// End-to-end controller scenarios: drift detection through retraining to
// promotion or rejection, against the in-memory registry and audit log.

mod common;

use std::time::Duration;

use common::{age_samples, age_window, HarnessBuilder, RecordingNotifier, Training, MODEL};
use driftwatch_control::{
    CoalesceCause, PromotionOutcome, RejectReason, TriggerOutcome, TriggerState,
};
use driftwatch_core::{AuditEvent, JobStatus, Registry, Stage, TriggerReason};

// ===========================================================================
// Promotion and rejection
// ===========================================================================

#[tokio::test]
async fn drift_retrains_and_promotes_better_candidate() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.91))
        .production(0.88)
        .build()
        .await;
    h.bootstrap().await;

    h.advance(60);
    let verdict = h
        .controller
        .observe_window(age_window(1, 55.0, 200, h.now()))
        .await
        .expect("baseline exists, so a verdict is produced");
    assert!(verdict.exceeded);
    assert!(!verdict.insufficient_data);
    assert!(verdict.affected_features.contains("age"));
    assert!(verdict.score > 0.2);

    let job = h.controller.next_completion().await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.expected_production, Some(1));
    assert!(matches!(job.trigger_reason, TriggerReason::Drift { window_seq: 1, .. }));

    let report = h.controller.complete_job(job).await.unwrap();
    assert_eq!(
        report.outcome,
        PromotionOutcome::Promoted {
            version_id: 2,
            previous: Some(1)
        }
    );

    let production = h.registry.get_production(MODEL).await.unwrap().unwrap();
    assert_eq!(production.version_id, 2);
    assert_eq!(production.metrics.get("accuracy"), Some(0.91));
    let previous = h.registry.get(1).await.unwrap().unwrap();
    assert_eq!(previous.stage, Stage::Archived);

    h.controller.flush_notifications().await;
    let calls = h.notifier.calls();
    assert_eq!(calls.len(), 1, "notifier must be invoked exactly once");
    assert_eq!(calls[0].0, MODEL);
    assert_eq!(calls[0].1, 2);
    assert_eq!(calls[0].2, "s3://datasets/churn/candidate-1");

    // The drifted window is the new reference.
    let baseline = h.registry.baseline(MODEL).await.unwrap().unwrap();
    assert_eq!(baseline.source_window, 1);

    assert_eq!(
        h.audit_kinds(),
        vec![
            "baseline_installed",
            "verdict",
            "trigger_started",
            "job_finished",
            "promotion_decided",
            "baseline_installed",
        ]
    );
    assert_eq!(h.controller.status().production, Some(2));
}

#[tokio::test]
async fn candidate_below_floor_is_rejected_and_archived() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.80))
        .production(0.88)
        .build()
        .await;
    h.bootstrap().await;
    h.advance(60);
    h.controller
        .observe_window(age_window(1, 55.0, 200, h.now()))
        .await;

    let job = h.controller.next_completion().await.unwrap();
    let report = h.controller.complete_job(job).await.unwrap();
    match report.outcome {
        PromotionOutcome::Rejected { version_id, reason } => {
            assert_eq!(version_id, Some(2));
            assert_eq!(reason.code(), "below_min_quality");
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    assert_eq!(h.registry.get_production(MODEL).await.unwrap().unwrap().version_id, 1);
    let rejected = h.registry.get(2).await.unwrap().unwrap();
    assert_eq!(rejected.stage, Stage::Archived);
    assert_eq!(rejected.archive_reason.as_deref(), Some("below_min_quality"));
    assert!(h.notifier.calls().is_empty());

    // Baseline stays on the original reference window.
    assert_eq!(h.registry.baseline(MODEL).await.unwrap().unwrap().source_window, 0);

    let decided = h
        .audit
        .events_for(MODEL)
        .into_iter()
        .find_map(|e| match e {
            AuditEvent::PromotionDecided { promoted, reason, .. } => Some((promoted, reason)),
            _ => None,
        })
        .unwrap();
    assert_eq!(decided, (false, Some("below_min_quality".to_string())));
}

#[tokio::test]
async fn first_candidate_promotes_without_production() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.86)).build().await;
    h.bootstrap().await;

    assert!(matches!(
        h.controller.request_retrain(false),
        TriggerOutcome::Started(_)
    ));
    let job = h.controller.next_completion().await.unwrap();
    assert_eq!(job.expected_production, None);
    let report = h.controller.complete_job(job).await.unwrap();
    assert_eq!(
        report.outcome,
        PromotionOutcome::Promoted {
            version_id: 1,
            previous: None
        }
    );
    h.controller.flush_notifications().await;
    assert_eq!(h.notifier.calls().len(), 1);
}

#[tokio::test]
async fn notifier_failure_does_not_reverse_promotion() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.95))
        .production(0.88)
        .notifier(RecordingNotifier::failing())
        .build()
        .await;
    h.bootstrap().await;
    h.controller.request_retrain(false);

    let job = h.controller.next_completion().await.unwrap();
    let report = h.controller.complete_job(job).await.unwrap();
    assert!(matches!(report.outcome, PromotionOutcome::Promoted { version_id: 2, .. }));
    assert_eq!(h.registry.get_production(MODEL).await.unwrap().unwrap().version_id, 2);
    h.controller.flush_notifications().await;
    assert_eq!(h.notifier.calls().len(), 1);
    assert_eq!(h.count("notification_failed"), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_notifier_does_not_hold_up_the_controller() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.95))
        .production(0.88)
        .notifier(RecordingNotifier::slow(Duration::from_secs(3600)))
        .build()
        .await;
    h.bootstrap().await;
    h.controller.request_retrain(false);
    let job = h.controller.next_completion().await.unwrap();

    let report = tokio::time::timeout(Duration::from_secs(1), h.controller.complete_job(job))
        .await
        .expect("promotion must not wait for the notifier")
        .unwrap();
    assert!(matches!(report.outcome, PromotionOutcome::Promoted { version_id: 2, .. }));

    h.advance(60);
    h.source.push(age_samples(30.0, 200, h.now()));
    let verdict = tokio::time::timeout(Duration::from_secs(1), h.controller.tick())
        .await
        .expect("evaluation must keep running while the notifier is busy")
        .expect("baseline exists, so a verdict is produced");
    assert!(!verdict.exceeded);
    assert_eq!(h.notifier.delivered(), 0);

    h.controller.flush_notifications().await;
    assert_eq!(h.notifier.calls().len(), 1);
    assert_eq!(h.notifier.delivered(), 1);
}

#[tokio::test]
async fn registration_failure_is_audited_before_it_propagates() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.95))
        .production(0.88)
        .refuse_registration()
        .build()
        .await;
    h.bootstrap().await;
    h.controller.request_retrain(false);
    let job = h.controller.next_completion().await.unwrap();
    let job_id = job.id;

    let err = h.controller.complete_job(job).await.unwrap_err();
    assert!(matches!(err, driftwatch_core::DriftwatchError::Storage(_)));

    let decided = h
        .audit
        .events_for(MODEL)
        .into_iter()
        .find_map(|e| match e {
            AuditEvent::PromotionDecided {
                job_id: id,
                candidate,
                promoted,
                reason,
                ..
            } => Some((id, candidate, promoted, reason)),
            _ => None,
        })
        .unwrap();
    assert_eq!(decided.0, job_id);
    assert_eq!(decided.1, None);
    assert!(!decided.2);
    assert!(decided.3.unwrap().starts_with("registration_failed"));

    assert!(h.controller.status().running_job.is_none());
    assert_eq!(h.registry.get_production(MODEL).await.unwrap().unwrap().version_id, 1);
}

#[tokio::test]
async fn lost_promotion_race_is_redecided_against_fresh_production() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.91))
        .production(0.88)
        .build()
        .await;
    h.bootstrap().await;
    h.controller.request_retrain(false);
    let job = h.controller.next_completion().await.unwrap();

    // Another writer swaps production while the job was training.
    let rival = driftwatch_core::ModelVersion::candidate(
        MODEL,
        "s3://models/churn/rival",
        driftwatch_core::Metrics::new().with("accuracy", 0.89),
        None,
        h.now(),
    );
    let rival_id = h.registry.register(rival).await.unwrap();
    h.registry.promote(MODEL, rival_id, Some(1)).await.unwrap();

    let report = h.controller.complete_job(job).await.unwrap();
    assert_eq!(
        report.outcome,
        PromotionOutcome::Promoted {
            version_id: 3,
            previous: Some(rival_id)
        }
    );
    assert_eq!(h.count("promotion_conflict"), 1);
    assert_eq!(h.registry.count_in_stage(MODEL, Stage::Production), 1);
}

#[tokio::test]
async fn lost_race_against_a_better_rival_rejects() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.91))
        .production(0.88)
        .build()
        .await;
    h.bootstrap().await;
    h.controller.request_retrain(false);
    let job = h.controller.next_completion().await.unwrap();

    let rival = driftwatch_core::ModelVersion::candidate(
        MODEL,
        "s3://models/churn/rival",
        driftwatch_core::Metrics::new().with("accuracy", 0.97),
        None,
        h.now(),
    );
    let rival_id = h.registry.register(rival).await.unwrap();
    h.registry.promote(MODEL, rival_id, Some(1)).await.unwrap();

    let report = h.controller.complete_job(job).await.unwrap();
    assert!(matches!(
        report.outcome,
        PromotionOutcome::Rejected {
            reason: RejectReason::Regression { .. },
            ..
        }
    ));
    assert_eq!(
        h.registry.get_production(MODEL).await.unwrap().unwrap().version_id,
        rival_id
    );
}

// ===========================================================================
// Trigger behaviour through the controller
// ===========================================================================

#[tokio::test]
async fn second_verdict_inside_cooldown_is_coalesced_and_audited() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.80))
        .production(0.88)
        .build()
        .await;
    h.bootstrap().await;

    h.advance(60);
    h.controller
        .observe_window(age_window(1, 55.0, 200, h.now()))
        .await;
    let job = h.controller.next_completion().await.unwrap();
    h.controller.complete_job(job).await.unwrap();

    h.advance(1);
    let verdict = h
        .controller
        .observe_window(age_window(2, 55.0, 200, h.now()))
        .await
        .unwrap();
    assert!(verdict.exceeded);
    assert_eq!(h.count("trigger_started"), 1);
    assert_eq!(h.count("trigger_coalesced"), 1);
    assert_eq!(h.procedure.calls(), 1);

    let cause = h
        .audit
        .events_for(MODEL)
        .into_iter()
        .find_map(|e| match e {
            AuditEvent::TriggerCoalesced { cause, .. } => Some(cause),
            _ => None,
        })
        .unwrap();
    assert!(cause.starts_with("cooldown"), "unexpected cause {}", cause);
    assert_eq!(h.controller.status().trigger_state, TriggerState::Cooldown);
}

#[tokio::test]
async fn forced_request_bypasses_cooldown() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.80))
        .production(0.88)
        .build()
        .await;
    h.bootstrap().await;
    h.controller.request_retrain(false);
    let job = h.controller.next_completion().await.unwrap();
    h.controller.complete_job(job).await.unwrap();

    h.advance(5);
    assert!(matches!(
        h.controller.request_retrain(false),
        TriggerOutcome::Coalesced(CoalesceCause::Cooldown { .. })
    ));
    assert!(matches!(
        h.controller.request_retrain(true),
        TriggerOutcome::Started(_)
    ));
}

#[tokio::test]
async fn cooldown_ends_exactly_at_the_interval() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.80))
        .production(0.88)
        .configure(|c| c.cooldown_interval = Duration::from_secs(600))
        .build()
        .await;
    h.bootstrap().await;
    h.controller.request_retrain(false);
    let job = h.controller.next_completion().await.unwrap();
    h.controller.complete_job(job).await.unwrap();

    h.advance(599);
    assert!(matches!(
        h.controller.request_retrain(false),
        TriggerOutcome::Coalesced(_)
    ));
    h.advance(1);
    assert!(matches!(
        h.controller.request_retrain(false),
        TriggerOutcome::Started(_)
    ));
}

#[tokio::test]
async fn sparse_windows_never_trigger() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.95))
        .production(0.88)
        .build()
        .await;
    h.bootstrap().await;

    for seq in 1..5 {
        h.advance(60);
        let verdict = h
            .controller
            .observe_window(age_window(seq, 90.0, 10, h.now()))
            .await
            .unwrap();
        assert!(verdict.insufficient_data);
        assert!(!verdict.exceeded);
    }
    assert_eq!(h.count("trigger_started"), 0);
    assert_eq!(h.count("verdict"), 4);
}

#[tokio::test]
async fn bootstrap_waits_for_a_full_window() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.95)).build().await;
    let sparse = age_window(0, 30.0, 5, h.now());
    assert!(h.controller.observe_window(sparse).await.is_none());
    assert!(h.registry.baseline(MODEL).await.unwrap().is_none());
    assert!(h.controller.status().baseline_fingerprint.is_none());

    h.bootstrap().await;
    assert!(h.controller.status().baseline_fingerprint.is_some());
    assert_eq!(h.count("baseline_installed"), 1);
}

#[tokio::test]
async fn tick_pulls_from_the_feed_and_schedules_periodic_retrain() {
    let mut h = HarnessBuilder::new(Training::Accuracy(0.95))
        .production(0.88)
        .configure(|c| c.periodic_retrain = Some(Duration::from_secs(600)))
        .build()
        .await;

    h.source.push(age_samples(30.0, 200, h.now()));
    h.advance(60);
    assert!(h.controller.tick().await.is_none(), "first full window bootstraps");

    h.source.push(age_samples(30.5, 200, h.now()));
    h.advance(60);
    let verdict = h.controller.tick().await.unwrap();
    assert!(!verdict.exceeded);
    assert_eq!(verdict.window_seq, 1);
    assert_eq!(h.count("trigger_started"), 0);

    h.source.push(age_samples(30.0, 200, h.now()));
    h.advance(600);
    h.controller.tick().await;
    let reason = h
        .audit
        .events_for(MODEL)
        .into_iter()
        .find_map(|e| match e {
            AuditEvent::TriggerStarted { reason, .. } => Some(reason),
            _ => None,
        })
        .unwrap();
    assert_eq!(reason, TriggerReason::Scheduled);
}
