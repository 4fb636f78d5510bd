use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use super::common::*;
use crate::workflows::assessment::client::{ServiceInfo, ServiceStatus};
use crate::workflows::assessment::domain::{FieldValue, FormError, FormField};
use crate::workflows::assessment::orchestrator::{
    AssessError, AssessmentOrchestrator, AssessmentPhase, OrchestratorEvent, OrchestratorSettings,
    RequestKind,
};
use crate::workflows::assessment::session::{keys, Language, Role};

#[tokio::test(start_paused = true)]
async fn first_assessment_records_baseline_and_history() {
    let api = Arc::new(ScriptedApi::with_steps([Step::ok(50, 0.35)]));
    let (mut orchestrator, store) = orchestrator(&api);
    assert_eq!(orchestrator.phase(), AssessmentPhase::Idle);
    assert!(orchestrator.report(Utc::now()).is_none());

    let seq = orchestrator.assess().expect("first assessment is accepted");
    assert_eq!(orchestrator.phase(), AssessmentPhase::Assessing);
    assert!(orchestrator.is_loading());

    let event = orchestrator.next_event().await;
    assert_eq!(
        event,
        OrchestratorEvent::Assessed {
            seq,
            kind: RequestKind::Assessment,
            probability_of_default: 0.35,
            baseline_set: true,
        }
    );
    assert_eq!(orchestrator.phase(), AssessmentPhase::Ready);
    assert!(orchestrator.simulation_enabled());
    assert!(!orchestrator.is_loading());
    assert!(orchestrator.error().is_none());

    let baseline = orchestrator.ledger().baseline().expect("baseline captured");
    assert_eq!(baseline.name, "Baseline");
    assert!(baseline.id.starts_with("baseline-"));
    assert_eq!(baseline.form_input, *orchestrator.form());
    assert_eq!(orchestrator.ledger().history().len(), 1);
    assert_eq!(store.history().len(), 1);
    assert_eq!(orchestrator.baseline_delta(), Some(0.0));
    assert!(orchestrator.report(Utc::now()).is_some());
}

#[tokio::test(start_paused = true)]
async fn later_assessments_keep_the_original_baseline() {
    let api = Arc::new(ScriptedApi::with_steps([
        Step::ok(0, 0.35),
        Step::ok(0, 0.50),
    ]));
    let (mut orchestrator, _store) = orchestrator(&api);

    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;
    orchestrator.assess().expect("accepted once idle");
    let event = orchestrator.next_event().await;

    assert!(matches!(
        event,
        OrchestratorEvent::Assessed {
            baseline_set: false,
            ..
        }
    ));
    let baseline = orchestrator.ledger().baseline().expect("baseline kept");
    assert_eq!(baseline.prediction.probability_of_default, 0.35);
    let delta = orchestrator.baseline_delta().expect("delta available");
    assert!((delta - 15.0).abs() < 1e-9, "delta was {delta}");
    assert_eq!(orchestrator.ledger().history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn duplicate_trigger_is_rejected_while_loading() {
    let api = Arc::new(ScriptedApi::with_steps([Step::ok(300, 0.2)]));
    let (mut orchestrator, _store) = orchestrator(&api);

    orchestrator.assess().expect("accepted");
    assert_eq!(orchestrator.assess(), Err(AssessError::AlreadyInFlight));
    assert_eq!(orchestrator.retry(), Err(AssessError::AlreadyInFlight));

    let events = orchestrator.settle().await;
    assert_eq!(events.len(), 1);
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failure_leaves_state_untouched_and_retry_reuses_payload() {
    let api = Arc::new(ScriptedApi::with_steps([
        Step::fail(0, 503),
        Step::ok(0, 0.41),
    ]));
    let (mut orchestrator, store) = orchestrator(&api);

    orchestrator.assess().expect("accepted");
    match orchestrator.next_event().await {
        OrchestratorEvent::AssessmentFailed { kind, message, .. } => {
            assert_eq!(kind, RequestKind::Assessment);
            assert!(message.contains("503"), "message was {message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(orchestrator.phase(), AssessmentPhase::Idle);
    assert!(orchestrator.prediction().is_none());
    assert!(orchestrator.error().is_some());
    assert!(!orchestrator.simulation_enabled());
    assert!(orchestrator.ledger().baseline().is_none());
    assert!(orchestrator.ledger().history().is_empty());
    assert!(store.storage().raw(keys::HISTORY).is_none());

    orchestrator
        .update_field(FormField::CreditAmount, FieldValue::Number(9_000))
        .expect("valid edit");
    assert!(!orchestrator.simulation_pending());

    orchestrator.retry().expect("retry accepted");
    let event = orchestrator.next_event().await;
    assert!(matches!(event, OrchestratorEvent::Assessed { .. }));
    assert!(orchestrator.error().is_none());

    let calls = api.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].input.credit_amount, 3_000);
}

#[tokio::test(start_paused = true)]
async fn failure_after_success_keeps_previous_prediction() {
    let api = Arc::new(ScriptedApi::with_steps([
        Step::ok(0, 0.30),
        Step::fail(0, 500),
    ]));
    let (mut orchestrator, _store) = orchestrator(&api);

    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;
    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;

    assert_eq!(orchestrator.phase(), AssessmentPhase::Ready);
    assert_eq!(
        orchestrator.prediction().map(|p| p.probability_of_default),
        Some(0.30)
    );
    assert_eq!(orchestrator.ledger().history().len(), 1);
    assert!(orchestrator.error().is_some());
}

#[tokio::test(start_paused = true)]
async fn invalid_edits_are_rejected_without_arming_simulation() {
    let api = Arc::new(ScriptedApi::default());
    let (mut orchestrator, _store) = orchestrator(&api);
    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;

    let result = orchestrator.update_field(FormField::Age, FieldValue::Number(7));
    assert!(matches!(result, Err(FormError::OutOfRange { .. })));
    assert_eq!(orchestrator.form().age, 35);
    assert!(!orchestrator.simulation_pending());
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_coalesce_into_one_simulation() {
    let api = Arc::new(ScriptedApi::default());
    let (mut orchestrator, _store) = orchestrator(&api);
    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;

    let start = Instant::now();
    orchestrator
        .update_field(FormField::CreditAmount, FieldValue::Number(4_000))
        .expect("valid edit");
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator
        .update_field(FormField::CreditAmount, FieldValue::Number(5_000))
        .expect("valid edit");
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator
        .update_field(FormField::Duration, FieldValue::Number(36))
        .expect("valid edit");

    let issued = orchestrator.next_event().await;
    assert_eq!(issued, OrchestratorEvent::SimulationIssued { seq: 2 });
    assert_eq!(orchestrator.phase(), AssessmentPhase::Simulating);

    let applied = orchestrator.next_event().await;
    assert!(matches!(
        applied,
        OrchestratorEvent::Assessed {
            seq: 2,
            kind: RequestKind::Simulation,
            ..
        }
    ));

    let calls = api.calls();
    assert_eq!(calls.len(), 2, "edits must coalesce into a single request");
    let fired_after = calls[1].at - start;
    assert!(fired_after >= Duration::from_millis(800) && fired_after < Duration::from_millis(801));
    assert_eq!(calls[1].input.credit_amount, 5_000);
    assert_eq!(calls[1].input.duration, 36);
    assert_eq!(orchestrator.ledger().history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_response_never_overwrites_a_newer_one() {
    let api = Arc::new(ScriptedApi::with_steps([
        Step::ok(0, 0.30),
        Step::ok(2_000, 0.70),
        Step::ok(10, 0.45),
    ]));
    let (mut orchestrator, _store) = orchestrator(&api);
    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;

    orchestrator
        .update_field(FormField::Duration, FieldValue::Number(36))
        .expect("valid edit");
    assert_eq!(
        orchestrator.next_event().await,
        OrchestratorEvent::SimulationIssued { seq: 2 }
    );

    orchestrator
        .update_field(FormField::CreditAmount, FieldValue::Number(5_000))
        .expect("valid edit");
    assert_eq!(
        orchestrator.next_event().await,
        OrchestratorEvent::SimulationIssued { seq: 3 }
    );

    assert_eq!(
        orchestrator.next_event().await,
        OrchestratorEvent::Assessed {
            seq: 3,
            kind: RequestKind::Simulation,
            probability_of_default: 0.45,
            baseline_set: false,
        }
    );
    assert!(!orchestrator.is_loading());

    assert_eq!(
        orchestrator.next_event().await,
        OrchestratorEvent::StaleDiscarded { seq: 2 }
    );
    assert_eq!(
        orchestrator.prediction().map(|p| p.probability_of_default),
        Some(0.45)
    );
    assert_eq!(orchestrator.stale_discards(), 1);
    assert_eq!(orchestrator.ledger().history().len(), 2);
    assert_eq!(
        orchestrator.ledger().history()[0]
            .prediction
            .probability_of_default,
        0.45
    );
}

#[tokio::test(start_paused = true)]
async fn settle_drives_pending_simulation_to_completion() {
    let api = Arc::new(ScriptedApi::default());
    let (mut orchestrator, _store) = orchestrator(&api);
    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;

    orchestrator
        .update_field(FormField::Purpose, FieldValue::text("education"))
        .expect("valid edit");
    let events = orchestrator.settle().await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], OrchestratorEvent::SimulationIssued { seq: 2 });
    assert!(!orchestrator.simulation_pending());
    assert_eq!(api.calls()[1].input.purpose, "education");
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_pending_simulation() {
    let api = Arc::new(ScriptedApi::default());
    let (mut orchestrator, store) = orchestrator(&api);
    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;

    orchestrator
        .update_field(FormField::Age, FieldValue::Number(22))
        .expect("valid edit");
    assert!(orchestrator.simulation_pending());

    orchestrator.reset_session();
    assert!(!orchestrator.simulation_pending());
    assert_eq!(orchestrator.phase(), AssessmentPhase::Idle);
    assert_eq!(orchestrator.form().age, 35);
    assert!(orchestrator.prediction().is_none());
    assert!(!orchestrator.simulation_enabled());
    assert!(orchestrator.ledger().baseline().is_none());
    assert!(store.baseline().is_none());
    assert!(store.history().is_empty());

    let idle = tokio::time::timeout(Duration::from_secs(5), orchestrator.next_event()).await;
    assert!(idle.is_err(), "nothing should fire after a reset");
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn reset_discards_in_flight_responses() {
    let api = Arc::new(ScriptedApi::with_steps([
        Step::ok(0, 0.30),
        Step::ok(500, 0.90),
    ]));
    let (mut orchestrator, _store) = orchestrator(&api);
    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;

    orchestrator
        .update_field(FormField::Duration, FieldValue::Number(48))
        .expect("valid edit");
    assert_eq!(
        orchestrator.next_event().await,
        OrchestratorEvent::SimulationIssued { seq: 2 }
    );

    orchestrator.reset_session();
    assert!(!orchestrator.is_loading());

    assert_eq!(
        orchestrator.next_event().await,
        OrchestratorEvent::StaleDiscarded { seq: 2 }
    );
    assert!(orchestrator.prediction().is_none());
    assert!(orchestrator.ledger().history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn saving_requires_a_prediction_and_numbers_scenarios() {
    let api = Arc::new(ScriptedApi::default());
    let (mut orchestrator, store) = orchestrator(&api);
    assert!(orchestrator.save_scenario().is_none());

    orchestrator.assess().expect("accepted");
    orchestrator.next_event().await;

    let first = orchestrator.save_scenario().expect("saved");
    let second = orchestrator.save_scenario().expect("saved");
    assert_eq!(first.name, "Scenario 1");
    assert_eq!(second.name, "Scenario 2");
    assert!(first.id.starts_with("scn-"));
    assert_ne!(first.id, second.id);
    assert_eq!(orchestrator.ledger().scenarios()[0], second);
    assert_eq!(store.saved_scenarios().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn health_is_polled_on_a_fixed_interval() {
    let api = Arc::new(ScriptedApi::default());
    api.push_health(Ok(ServiceInfo {
        service: "CrediShield XAI API".to_string(),
        status: None,
    }));
    api.push_health(Err(503));

    let settings = OrchestratorSettings {
        health_interval: Some(Duration::from_secs(15)),
        ..quiet_settings()
    };
    let mut orchestrator =
        AssessmentOrchestrator::new(Arc::clone(&api), memory_store(), settings);
    assert_eq!(*orchestrator.health(), ServiceStatus::Checking);

    assert_eq!(
        orchestrator.next_event().await,
        OrchestratorEvent::HealthChanged(ServiceStatus::Up {
            service: "CrediShield XAI API".to_string()
        })
    );
    let event = orchestrator.next_event().await;
    assert!(matches!(
        event,
        OrchestratorEvent::HealthChanged(ServiceStatus::Down { .. })
    ));
    assert_eq!(orchestrator.health().message(), "Scoring API is offline");

    let probes = api.health_probes();
    assert_eq!(probes[1] - probes[0], Duration::from_secs(15));

    assert_eq!(orchestrator.phase(), AssessmentPhase::Idle);
    assert!(orchestrator.prediction().is_none());
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_health_interval_disables_polling() {
    let api = Arc::new(ScriptedApi::with_steps([Step::ok(50, 0.30)]));
    let settings = OrchestratorSettings {
        health_interval: Some(Duration::ZERO),
        ..quiet_settings()
    };
    let mut orchestrator =
        AssessmentOrchestrator::new(Arc::clone(&api), memory_store(), settings);

    let idle = tokio::time::timeout(Duration::from_secs(60), orchestrator.next_event()).await;
    assert!(idle.is_err(), "no event expected without polling, got {idle:?}");
    assert_eq!(*orchestrator.health(), ServiceStatus::Checking);
    assert!(api.health_probes().is_empty());

    let seq = orchestrator.assess().expect("assessment is accepted");
    assert!(matches!(
        orchestrator.next_event().await,
        OrchestratorEvent::Assessed { seq: done, .. } if done == seq
    ));
    assert_eq!(orchestrator.phase(), AssessmentPhase::Ready);
}

#[tokio::test(start_paused = true)]
async fn preferences_persist_and_rehydrate() {
    let api = Arc::new(ScriptedApi::default());
    let (mut orchestrator, store) = orchestrator(&api);
    assert_eq!(orchestrator.role(), Role::EndUser);
    assert!(orchestrator.tour_open());

    orchestrator.set_language(Language::Hi);
    orchestrator.set_tour_open(false);
    orchestrator.set_role(Role::Analyst);
    assert_eq!(
        orchestrator.next_event().await,
        OrchestratorEvent::OversightRefreshed { succeeded: true }
    );
    let oversight = orchestrator.oversight().expect("analysts see oversight data");
    assert_eq!(oversight.audit_logs.len(), 2);
    assert_eq!(
        store.storage().raw(keys::ROLE).as_deref(),
        Some("\"analyst\"")
    );
    drop(orchestrator);

    let mut reopened =
        AssessmentOrchestrator::new(Arc::clone(&api), store.clone(), quiet_settings());
    assert_eq!(reopened.language(), Language::Hi);
    assert!(!reopened.tour_open());
    assert_eq!(reopened.role(), Role::Analyst);
    reopened.next_event().await;
    assert_eq!(api.oversight_calls(), 2);

    reopened.set_role(Role::EndUser);
    assert!(reopened.oversight().is_none());
    assert_eq!(api.oversight_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn batch_scoring_refreshes_oversight_for_admins() {
    let api = Arc::new(ScriptedApi::default());
    let (mut orchestrator, _store) = orchestrator(&api);
    orchestrator.set_role(Role::Admin);
    orchestrator.next_event().await;

    let rows: Vec<BTreeMap<String, String>> = (0..2)
        .map(|n| BTreeMap::from([("duration".to_string(), format!("{}", 12 + n))]))
        .collect();
    let response = orchestrator.score_batch(&rows).await.expect("batch scored");
    assert_eq!(response.count, 2);
    assert_eq!(api.batch_calls(), 1);

    assert_eq!(
        orchestrator.next_event().await,
        OrchestratorEvent::OversightRefreshed { succeeded: true }
    );
    assert_eq!(api.oversight_calls(), 2);
}
