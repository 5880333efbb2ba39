use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use triage_engine::workflows::triage::{
    ClinicianDecision, DialogueError, DialogueGenerator, DialogueHistory, DialogueReply,
    PatientId, PatientProfile, PriorityLevel, Stage, StorageError, TriageRepository,
    TriageService, TriageSnapshot, TriageStore,
};

#[derive(Default)]
struct SharedRepository {
    snapshot: Mutex<Option<TriageSnapshot>>,
}

impl TriageRepository for SharedRepository {
    fn load(&self) -> Result<TriageSnapshot, StorageError> {
        self.snapshot
            .lock()
            .expect("repository mutex poisoned")
            .clone()
            .ok_or(StorageError::Missing)
    }

    fn save(&self, snapshot: &TriageSnapshot) -> Result<(), StorageError> {
        *self.snapshot.lock().expect("repository mutex poisoned") = Some(snapshot.clone());
        Ok(())
    }
}

struct OfflineDialogue;

#[async_trait]
impl DialogueGenerator for OfflineDialogue {
    async fn send(
        &self,
        _history: &DialogueHistory,
        _message: &str,
    ) -> Result<DialogueReply, DialogueError> {
        Err(DialogueError::NotConfigured)
    }
}

fn service(
    repository: Arc<SharedRepository>,
) -> TriageService<SharedRepository, OfflineDialogue> {
    let store = Arc::new(TriageStore::open(repository));
    TriageService::new(store, Arc::new(OfflineDialogue))
}

async fn run_intake(
    service: &TriageService<SharedRepository, OfflineDialogue>,
    patient: &PatientId,
    messages: &[&str],
) -> Stage {
    let mut stage = Stage::Greeting;
    for message in messages {
        stage = service.handle_message(patient, message).await.stage;
    }
    stage
}

#[tokio::test]
async fn intake_to_review_survives_a_restart() {
    let repository = Arc::new(SharedRepository::default());
    let first_run = service(repository.clone());

    let severe = PatientId::from("patient-severe");
    first_run
        .register_patient(PatientProfile::new(severe.clone(), "Jane Roe", 52, "female"))
        .expect("registered");

    let stage = run_intake(
        &first_run,
        &severe,
        &[
            "hi",
            "I've had terrible pain in my chest",
            "10, for about 5 weeks",
            "heart surgery in 2019",
            "I smoke daily",
            "no thank you",
        ],
    )
    .await;
    assert_eq!(stage, Stage::Completed);

    let mild = PatientId::from("patient-mild");
    run_intake(
        &first_run,
        &mild,
        &["hello", "a mild rash", "mild, since today", "none", "none", "yes"],
    )
    .await;

    let dashboard = first_run.dashboard();
    assert_eq!(dashboard.len(), 2);
    assert_eq!(dashboard[0].patient_name, "Jane Roe");
    assert_eq!(dashboard[0].summary.priority_level, PriorityLevel::Critical);
    assert_eq!(dashboard[0].summary.priority_score, 100);
    assert_eq!(dashboard[1].summary.priority_level, PriorityLevel::Routine);
    assert_eq!(dashboard[1].summary.priority_score, 10);
    assert_eq!(first_run.followups().len(), 1);

    let critical_case = dashboard[0].summary.case_id.clone();
    first_run
        .resolve_case(
            &critical_case,
            ClinicianDecision {
                notes: "Sent to emergency care".to_string(),
                schedule_appointment: false,
            },
        )
        .expect("resolved");
    assert_eq!(first_run.dashboard().len(), 1);

    let second_run = service(repository);
    assert_eq!(second_run.queue().len(), 2);
    let detail = second_run
        .case_detail(&critical_case)
        .expect("case persisted");
    assert_eq!(detail.case.symptom_names(), vec!["pain"]);
    assert_eq!(detail.case.symptoms()[0].duration_days(), 35);
    let patient = detail.patient.expect("profile persisted");
    assert_eq!(patient.medical_history, vec!["heart surgery in 2019".to_string()]);
    assert_eq!(patient.lifestyle_factors.notes, vec!["I smoke daily".to_string()]);
}
