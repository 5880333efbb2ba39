use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::workflows::triage::dialogue::{
    ConclusionPolicy, DialogueError, DialogueGenerator, DialogueHistory, DialogueReply,
};
use crate::workflows::triage::domain::{PatientCase, PatientId, Prediction, SymptomRecord};
use crate::workflows::triage::repository::{StorageError, TriageRepository, TriageSnapshot};
use crate::workflows::triage::scoring::PriorityAssessment;
use crate::workflows::triage::{TriageService, TriageStore};

pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn symptom(name: &str, severity: i64, duration_days: i64) -> SymptomRecord {
    SymptomRecord::captured(name, severity, duration_days, "reported", at(1, 9))
}

/// A case carrying an already assigned score, for queue ordering tests.
pub(super) fn case_with_score(patient: &str, score: u8) -> PatientCase {
    let mut case = PatientCase::open_at(PatientId::from(patient), at(1, 9));
    case.apply_assessment(&PriorityAssessment::from_score(score));
    case
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    pub(super) snapshot: Arc<Mutex<Option<TriageSnapshot>>>,
    pub(super) saves: AtomicUsize,
    pub(super) failing: AtomicBool,
}

impl MemoryRepository {
    pub(super) fn seeded(snapshot: TriageSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(Some(snapshot))),
            saves: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub(super) fn saved(&self) -> TriageSnapshot {
        self.snapshot
            .lock()
            .expect("repository mutex poisoned")
            .clone()
            .unwrap_or_default()
    }

    pub(super) fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail with `Unavailable` until switched back.
    pub(super) fn fail_saves(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl TriageRepository for MemoryRepository {
    fn load(&self) -> Result<TriageSnapshot, StorageError> {
        self.snapshot
            .lock()
            .expect("repository mutex poisoned")
            .clone()
            .ok_or(StorageError::Missing)
    }

    fn save(&self, snapshot: &TriageSnapshot) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("disk full".to_string()));
        }
        *self.snapshot.lock().expect("repository mutex poisoned") = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(super) struct UnavailableRepository;

impl TriageRepository for UnavailableRepository {
    fn load(&self) -> Result<TriageSnapshot, StorageError> {
        Err(StorageError::Corrupt("unexpected end of input".to_string()))
    }

    fn save(&self, _snapshot: &TriageSnapshot) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk full".to_string()))
    }
}

/// Dialogue double that appends every exchange to a JSON array history.
#[derive(Default)]
pub(super) struct ScriptedDialogue {
    pub(super) calls: AtomicUsize,
}

#[async_trait]
impl DialogueGenerator for ScriptedDialogue {
    async fn send(
        &self,
        history: &DialogueHistory,
        message: &str,
    ) -> Result<DialogueReply, DialogueError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let text = format!("Could you tell me more? ({call})");

        let mut entries = history.as_value().as_array().cloned().unwrap_or_default();
        entries.push(json!({ "role": "user", "content": message }));
        entries.push(json!({ "role": "assistant", "content": text }));

        Ok(DialogueReply {
            text,
            history: DialogueHistory::new(Value::Array(entries)),
        })
    }

    async fn summarize(
        &self,
        _history: &DialogueHistory,
    ) -> Result<Vec<Prediction>, DialogueError> {
        let mut prediction = BTreeMap::new();
        prediction.insert("condition".to_string(), json!("tension headache"));
        prediction.insert("likelihood".to_string(), json!("moderate"));
        Ok(vec![prediction])
    }
}

pub(super) struct FailingDialogue;

#[async_trait]
impl DialogueGenerator for FailingDialogue {
    async fn send(
        &self,
        _history: &DialogueHistory,
        _message: &str,
    ) -> Result<DialogueReply, DialogueError> {
        Err(DialogueError::RequestFailed("connection reset".to_string()))
    }
}

pub(super) type MemoryService = TriageService<MemoryRepository, ScriptedDialogue>;

pub(super) fn build_service() -> (Arc<MemoryService>, Arc<MemoryRepository>) {
    build_service_with(MemoryRepository::default(), ConclusionPolicy::default())
}

pub(super) fn build_service_with(
    repository: MemoryRepository,
    policy: ConclusionPolicy,
) -> (Arc<MemoryService>, Arc<MemoryRepository>) {
    let repository = Arc::new(repository);
    let store = Arc::new(TriageStore::open(repository.clone()));
    let service = TriageService::with_policy(store, Arc::new(ScriptedDialogue::default()), policy);
    (Arc::new(service), repository)
}

/// Messages that walk the scripted intake from first contact to completion.
pub(super) const HEADACHE_INTAKE: &[&str] = &[
    "hello",
    "I have a headache",
    "It's about a 7 and started 2 days ago",
    "none",
    "no",
];

pub(super) async fn complete_intake(service: &MemoryService, patient: &str, closing: &str) {
    let patient_id = PatientId::from(patient);
    for message in HEADACHE_INTAKE {
        service.handle_message(&patient_id, message).await;
    }
    let reply = service.handle_message(&patient_id, closing).await;
    assert!(reply.conversation_completed, "intake should complete");
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json body")
}
