use super::common::*;
use crate::workflows::triage::conversation::Stage;
use crate::workflows::triage::dialogue::{
    ConclusionPolicy, CONCLUDING_REPLY, RETRY_REPLY, WELCOME_REPLY,
};
use crate::workflows::triage::domain::{CaseId, PatientId, PatientProfile, PriorityLevel};
use crate::workflows::triage::repository::TriageSnapshot;
use crate::workflows::triage::service::{ClinicianDecision, TriageServiceError};
use crate::workflows::triage::{TriageService, TriageStore};
use std::sync::Arc;

#[tokio::test]
async fn completed_intake_is_stored_and_queued() {
    let (service, repository) = build_service();
    complete_intake(&service, "patient-1", "no").await;

    let dashboard = service.dashboard();
    assert_eq!(dashboard.len(), 1);
    assert_eq!(dashboard[0].summary.priority_score, 42);
    assert_eq!(dashboard[0].summary.priority_level, PriorityLevel::Standard);
    assert_eq!(dashboard[0].patient_name, "patient-1");

    let saved = repository.saved();
    assert_eq!(saved.cases.len(), 1);
    assert_eq!(saved.cases[0].symptom_names(), vec!["headache"]);
    assert_eq!(saved.patients.len(), 1);
    assert_eq!(saved.patients[0].medical_history, vec!["none".to_string()]);
    assert_eq!(saved.patients[0].lifestyle_factors.notes, vec!["no".to_string()]);
}

#[tokio::test]
async fn message_replies_report_stage_and_completion_once() {
    let (service, _) = build_service();
    let patient = PatientId::from("patient-1");

    let first = service.handle_message(&patient, "hello").await;
    assert_eq!(first.stage, Stage::CollectingSymptoms);
    assert!(!first.conversation_completed);

    for message in &HEADACHE_INTAKE[1..] {
        service.handle_message(&patient, message).await;
    }
    let closing = service.handle_message(&patient, "no").await;
    assert_eq!(closing.stage, Stage::Completed);
    assert!(closing.conversation_completed);

    let after = service.handle_message(&patient, "thanks").await;
    assert_eq!(after.stage, Stage::Completed);
    assert!(!after.conversation_completed);
    assert_eq!(service.queue().len(), 1);
}

#[tokio::test]
async fn dashboard_uses_registered_names_and_unknown_fallback() {
    let (service, _) = build_service();
    service
        .register_patient(PatientProfile::new(
            PatientId::from("patient-1"),
            "Ada Lovelace",
            36,
            "female",
        ))
        .expect("registered");

    complete_intake(&service, "patient-1", "no").await;
    service
        .queue()
        .enqueue(case_with_score("patient-unregistered", 90));

    let dashboard = service.dashboard();
    assert_eq!(dashboard[0].patient_name, "Unknown Patient");
    assert_eq!(dashboard[1].patient_name, "Ada Lovelace");

    let profile = service
        .patient(&PatientId::from("patient-1"))
        .expect("profile kept");
    assert_eq!(profile.age, 36);
    assert_eq!(profile.medical_history, vec!["none".to_string()]);
}

#[tokio::test]
async fn case_detail_includes_profile_and_breakdown() {
    let (service, _) = build_service();
    complete_intake(&service, "patient-1", "no").await;
    let case_id = service.dashboard()[0].summary.case_id.clone();

    let detail = service.case_detail(&case_id).expect("case present");
    assert!(detail.queued);
    assert_eq!(detail.case.case_id, case_id);
    assert_eq!(detail.score_breakdown.len(), 1);
    assert_eq!(
        detail.patient.map(|profile| profile.name),
        Some("patient-1".to_string())
    );

    match service.case_detail(&CaseId("missing".to_string())) {
        Err(TriageServiceError::CaseNotFound(id)) => assert_eq!(id.0, "missing"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn resolving_a_case_leaves_it_in_storage() {
    let (service, _) = build_service();
    complete_intake(&service, "patient-1", "no").await;
    let case_id = service.dashboard()[0].summary.case_id.clone();

    let decision = ClinicianDecision {
        notes: "Prescribed rest".to_string(),
        schedule_appointment: true,
    };
    service.resolve_case(&case_id, decision.clone()).expect("resolved");
    assert!(service.dashboard().is_empty());

    let detail = service.case_detail(&case_id).expect("still stored");
    assert!(!detail.queued);

    assert!(matches!(
        service.resolve_case(&case_id, decision),
        Err(TriageServiceError::CaseNotFound(_))
    ));
}

#[tokio::test]
async fn stored_cases_are_requeued_on_start() {
    let mut high = case_with_score("patient-a", 85);
    high.created_at = at(2, 9);
    let mut low = case_with_score("patient-b", 20);
    low.created_at = at(1, 9);
    let repository = MemoryRepository::seeded(TriageSnapshot {
        patients: Vec::new(),
        cases: vec![high.clone(), low.clone()],
    });

    let (service, _) = build_service_with(repository, ConclusionPolicy::default());
    let dashboard = service.dashboard();
    assert_eq!(dashboard.len(), 2);
    assert_eq!(dashboard[0].summary.case_id, high.case_id);
    assert_eq!(dashboard[0].summary.submitted_at, at(2, 9));
    assert_eq!(dashboard[1].summary.case_id, low.case_id);
}

#[tokio::test]
async fn storage_failure_at_completion_asks_for_a_retry() {
    let (service, repository) = build_service();
    let patient = PatientId::from("patient-1");
    for message in HEADACHE_INTAKE {
        service.handle_message(&patient, message).await;
    }

    repository.fail_saves(true);
    let reply = service.handle_message(&patient, "yes please").await;
    assert_eq!(reply.reply, RETRY_REPLY);
    assert_eq!(reply.stage, Stage::Summarizing);
    assert!(!reply.conversation_completed);
    assert!(service.queue().is_empty());
    assert!(service.followups().is_empty());
    assert!(service.store().cases().is_empty());
    assert!(service.patient(&patient).is_none());
    let session = service.session(&patient).await.expect("session kept");
    assert_eq!(session.stage(), Stage::Summarizing);

    repository.fail_saves(false);
    let reply = service.handle_message(&patient, "yes please").await;
    assert_eq!(reply.stage, Stage::Completed);
    assert!(reply.conversation_completed);
    assert_eq!(service.queue().len(), 1);
    assert_eq!(service.followups().len(), 1);

    let saved = repository.saved();
    assert_eq!(saved.cases.len(), 1);
    assert_eq!(saved.patients[0].medical_history, vec!["none".to_string()]);
}

#[tokio::test]
async fn unavailable_storage_rejects_registration() {
    let store = Arc::new(TriageStore::open(Arc::new(UnavailableRepository)));
    let service = TriageService::new(store, Arc::new(ScriptedDialogue::default()));
    let patient = PatientId::from("patient-1");

    assert!(matches!(
        service.register_patient(PatientProfile::placeholder(patient.clone())),
        Err(TriageServiceError::Storage(_))
    ));
    assert!(service.patient(&patient).is_none());
}

#[tokio::test]
async fn followups_are_listed_and_started() {
    let (service, _) = build_service();
    complete_intake(&service, "patient-1", "yes please").await;
    complete_intake(&service, "patient-2", "no").await;

    let followups = service.followups();
    assert_eq!(followups.len(), 1);
    assert_eq!(followups[0].patient_id, PatientId::from("patient-1"));
    let lead = followups[0].due_at - chrono::Utc::now();
    assert!(lead > chrono::Duration::days(6) && lead <= chrono::Duration::days(7));

    let prompt = service
        .begin_followup(&PatientId::from("patient-1"))
        .await
        .expect("follow-up starts");
    assert!(prompt.contains("follow-up"));
    assert!(service.followups().is_empty());

    let update = service
        .handle_message(&PatientId::from("patient-1"), "feeling better")
        .await;
    assert_eq!(update.stage, Stage::Completed);
    assert!(!update.conversation_completed);
}

#[tokio::test]
async fn followup_requires_a_completed_intake() {
    let (service, _) = build_service();
    let patient = PatientId::from("patient-1");

    assert!(matches!(
        service.begin_followup(&patient).await,
        Err(TriageServiceError::NoCompletedIntake(_))
    ));

    service.handle_message(&patient, "hello").await;
    assert!(matches!(
        service.begin_followup(&patient).await,
        Err(TriageServiceError::NoCompletedIntake(_))
    ));
}

#[tokio::test]
async fn reset_discards_the_session() {
    let (service, _) = build_service();
    let patient = PatientId::from("patient-1");

    service.handle_message(&patient, "hello").await;
    service.handle_message(&patient, "I have a fever").await;
    let stage = service.session(&patient).await.map(|session| session.stage());
    assert_eq!(stage, Some(Stage::SymptomDetail));

    assert!(service.reset_session(&patient));
    assert!(service.session(&patient).await.is_none());
    assert!(!service.reset_session(&patient));

    let fresh = service.handle_message(&patient, "hello again").await;
    assert_eq!(fresh.stage, Stage::CollectingSymptoms);
}

#[tokio::test]
async fn concurrent_patients_keep_separate_sessions() {
    let (service, _) = build_service();

    let mut tasks = Vec::new();
    for index in 0..8 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let patient = format!("patient-{index}");
            complete_intake(&service, &patient, "no").await;
        }));
    }
    for task in tasks {
        task.await.expect("task completes");
    }

    assert_eq!(service.queue().len(), 8);
    let scores: Vec<u8> = service
        .dashboard()
        .iter()
        .map(|entry| entry.summary.priority_score)
        .collect();
    assert!(scores.iter().all(|score| *score == 42));
}

#[tokio::test]
async fn assisted_intake_opens_with_welcome_without_calling_the_model() {
    let (service, _) = build_service();
    let patient = PatientId::from("patient-1");

    let reply = service.handle_assisted_message(&patient, "hi").await;
    assert_eq!(reply.reply, WELCOME_REPLY);
    assert!(!reply.conversation_completed);

    let reply = service
        .handle_assisted_message(&patient, "I've had a cough for a week")
        .await;
    assert_eq!(reply.reply, "Could you tell me more? (1)");
}

#[tokio::test]
async fn assisted_intake_concludes_on_trigger_phrase() {
    let (service, repository) = build_service();
    let patient = PatientId::from("patient-1");

    service.handle_assisted_message(&patient, "hello").await;
    service
        .handle_assisted_message(&patient, "I have a severe headache since yesterday")
        .await;
    let reply = service
        .handle_assisted_message(&patient, "What is your diagnosis?")
        .await;

    assert_eq!(reply.reply, CONCLUDING_REPLY);
    assert!(reply.conversation_completed);

    let saved = repository.saved();
    assert_eq!(saved.cases.len(), 1);
    let case = &saved.cases[0];
    assert_eq!(case.symptom_names(), vec!["headache"]);
    assert_eq!(case.symptoms()[0].severity(), 9);
    assert_eq!(case.symptoms()[0].duration_days(), 2);
    // 9 * 2 * 1.2 * 2.5
    assert_eq!(case.priority_score(), 54);
    assert_eq!(case.predictions.len(), 1);
    assert_eq!(service.queue().len(), 1);

    let restart = service.handle_assisted_message(&patient, "hello").await;
    assert_eq!(restart.reply, WELCOME_REPLY);
}

#[tokio::test]
async fn assisted_intake_concludes_after_enough_meaningful_turns() {
    let (service, _) = build_service();
    let patient = PatientId::from("patient-1");
    service.handle_assisted_message(&patient, "hello").await;

    let messages = [
        "I keep having nausea after meals",
        "It has been going on for 2 weeks",
        "ok",
        "Mostly in the evenings after dinner",
        "I also get some dizziness standing up",
    ];
    for message in messages {
        let reply = service.handle_assisted_message(&patient, message).await;
        assert!(!reply.conversation_completed, "{message:?} concluded early");
    }

    let reply = service
        .handle_assisted_message(&patient, "Nothing else comes to mind")
        .await;
    assert!(reply.conversation_completed);

    let case = &service.dashboard()[0];
    let detail = service.case_detail(&case.summary.case_id).expect("case");
    assert_eq!(detail.case.symptom_names(), vec!["nausea", "dizziness"]);
    assert_eq!(detail.case.symptoms()[0].duration_days(), 14);
}

#[tokio::test]
async fn assisted_failure_returns_retry_and_keeps_state() {
    let store = Arc::new(TriageStore::open(Arc::new(MemoryRepository::default())));
    let service = TriageService::new(store, Arc::new(FailingDialogue));
    let patient = PatientId::from("patient-1");

    service.handle_assisted_message(&patient, "hello").await;
    let reply = service
        .handle_assisted_message(&patient, "show me the summary")
        .await;

    assert_eq!(reply.reply, RETRY_REPLY);
    assert!(!reply.conversation_completed);
    assert!(service.queue().is_empty());
}

#[tokio::test]
async fn assisted_storage_failure_keeps_the_session_open() {
    let (service, repository) = build_service();
    let patient = PatientId::from("patient-1");
    service.handle_assisted_message(&patient, "hello").await;
    service
        .handle_assisted_message(&patient, "I have a severe headache since yesterday")
        .await;

    repository.fail_saves(true);
    let reply = service
        .handle_assisted_message(&patient, "What is your diagnosis?")
        .await;
    assert_eq!(reply.reply, RETRY_REPLY);
    assert!(!reply.conversation_completed);
    assert!(service.queue().is_empty());

    repository.fail_saves(false);
    let reply = service
        .handle_assisted_message(&patient, "What is your diagnosis?")
        .await;
    assert!(reply.conversation_completed);
    assert_eq!(service.dashboard()[0].summary.priority_score, 54);
    assert_eq!(repository.saved().cases.len(), 1);
}
