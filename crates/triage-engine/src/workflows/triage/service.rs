use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as SessionLock;
use tracing::{debug, info, warn};

use super::conversation::{ConversationSession, Stage};
use super::dialogue::{
    AssistedSession, ConclusionPolicy, DialogueGenerator, CONCLUDING_REPLY, RETRY_REPLY,
};
use super::domain::{CaseId, PatientCase, PatientId, PatientProfile};
use super::queue::{QueueSummary, TriageQueue};
use super::repository::{StorageError, TriageRepository};
use super::scoring::{self, ScoreComponent};
use super::store::TriageStore;

pub const UNKNOWN_PATIENT_NAME: &str = "Unknown Patient";

/// Reply to one scripted-intake message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReply {
    pub reply: String,
    pub stage: Stage,
    pub conversation_completed: bool,
}

/// Reply to one collaborator-driven intake message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistedReply {
    pub reply: String,
    pub conversation_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardEntry {
    #[serde(flatten)]
    pub summary: QueueSummary,
    pub patient_name: String,
}

/// Full clinician view of one case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseDetail {
    #[serde(flatten)]
    pub case: PatientCase,
    pub patient: Option<PatientProfile>,
    pub score_breakdown: Vec<ScoreComponent>,
    pub queued: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicianDecision {
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub schedule_appointment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowUpView {
    pub patient_id: PatientId,
    pub case_id: CaseId,
    pub due_at: DateTime<Utc>,
}

/// Per-patient sessions, each behind its own async lock.
struct SessionRegistry<S> {
    sessions: Mutex<HashMap<PatientId, Arc<SessionLock<S>>>>,
}

impl<S> SessionRegistry<S> {
    fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PatientId, Arc<SessionLock<S>>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_or_open<F>(&self, patient_id: &PatientId, open: F) -> Arc<SessionLock<S>>
    where
        F: FnOnce() -> S,
    {
        self.lock()
            .entry(patient_id.clone())
            .or_insert_with(|| Arc::new(SessionLock::new(open())))
            .clone()
    }

    fn get(&self, patient_id: &PatientId) -> Option<Arc<SessionLock<S>>> {
        self.lock().get(patient_id).cloned()
    }

    fn remove(&self, patient_id: &PatientId) -> bool {
        self.lock().remove(patient_id).is_some()
    }
}

/// Facts gathered from a finished scripted intake.
struct CompletedIntake {
    case: PatientCase,
    medical_history: Option<String>,
    lifestyle: Option<String>,
    followup_due: Option<DateTime<Utc>>,
}

/// Service composing the case store, triage queue, and intake sessions.
pub struct TriageService<R, D> {
    store: Arc<TriageStore<R>>,
    queue: Arc<TriageQueue>,
    dialogue: Arc<D>,
    policy: ConclusionPolicy,
    sessions: SessionRegistry<ConversationSession>,
    assisted: SessionRegistry<AssistedSession>,
    followups: Mutex<BTreeMap<PatientId, FollowUpView>>,
}

impl<R, D> TriageService<R, D>
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    pub fn new(store: Arc<TriageStore<R>>, dialogue: Arc<D>) -> Self {
        Self::with_policy(store, dialogue, ConclusionPolicy::default())
    }

    /// Build the service and enqueue every stored case, oldest first.
    pub fn with_policy(
        store: Arc<TriageStore<R>>,
        dialogue: Arc<D>,
        policy: ConclusionPolicy,
    ) -> Self {
        let queue = Arc::new(TriageQueue::new());
        for case in store.cases() {
            let submitted_at = case.created_at;
            queue.enqueue_at(case, submitted_at);
        }
        if !queue.is_empty() {
            info!(depth = queue.len(), "triage queue restored from storage");
        }

        Self {
            store,
            queue,
            dialogue,
            policy,
            sessions: SessionRegistry::new(),
            assisted: SessionRegistry::new(),
            followups: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<TriageStore<R>> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<TriageQueue> {
        &self.queue
    }

    pub fn policy(&self) -> &ConclusionPolicy {
        &self.policy
    }

    fn followups_lock(&self) -> MutexGuard<'_, BTreeMap<PatientId, FollowUpView>> {
        self.followups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a patient profile.
    pub fn register_patient(
        &self,
        profile: PatientProfile,
    ) -> Result<PatientProfile, TriageServiceError> {
        self.store.register_patient(profile.clone())?;
        info!(patient_id = %profile.patient_id, "patient registered");
        Ok(profile)
    }

    pub fn patient(&self, patient_id: &PatientId) -> Option<PatientProfile> {
        self.store.patient(patient_id)
    }

    /// Feed one message to the patient's scripted intake, opening a session on first contact.
    ///
    /// A completing turn is committed only once the case is saved. If saving
    /// fails the patient gets the retry reply and the session stays where it was.
    pub async fn handle_message(&self, patient_id: &PatientId, message: &str) -> MessageReply {
        let handle = self
            .sessions
            .get_or_open(patient_id, || ConversationSession::new(patient_id.clone()));
        let mut session = handle.lock().await;

        let mut next = session.clone();
        let outcome = next.process(message);
        if !outcome.intake_completed() {
            *session = next;
            return MessageReply {
                reply: outcome.reply,
                stage: outcome.to,
                conversation_completed: false,
            };
        }

        let intake = CompletedIntake {
            case: next.case().clone(),
            medical_history: next.medical_history().map(str::to_string),
            lifestyle: next.lifestyle().map(str::to_string),
            followup_due: next.followup_due(),
        };
        if let Err(err) = self.file_intake(patient_id, intake) {
            warn!(%patient_id, error = %err, "intake not filed, asking patient to retry");
            return MessageReply {
                reply: RETRY_REPLY.to_string(),
                stage: session.stage(),
                conversation_completed: false,
            };
        }

        *session = next;
        MessageReply {
            reply: outcome.reply,
            stage: outcome.to,
            conversation_completed: true,
        }
    }

    fn file_intake(
        &self,
        patient_id: &PatientId,
        intake: CompletedIntake,
    ) -> Result<(), StorageError> {
        let CompletedIntake {
            case,
            medical_history,
            lifestyle,
            followup_due,
        } = intake;

        self.store.record_intake(case.clone(), |profile| {
            if let Some(history) = medical_history.filter(|text| !text.is_empty()) {
                profile.medical_history.push(history);
            }
            if let Some(lifestyle) = lifestyle.filter(|text| !text.is_empty()) {
                profile.lifestyle_factors.notes.push(lifestyle);
            }
        })?;

        if let Some(due_at) = followup_due {
            self.followups_lock().insert(
                patient_id.clone(),
                FollowUpView {
                    patient_id: patient_id.clone(),
                    case_id: case.case_id.clone(),
                    due_at,
                },
            );
            info!(%patient_id, %due_at, "follow-up scheduled");
        }

        self.submit(case);
        Ok(())
    }

    fn submit(&self, case: PatientCase) {
        info!(
            patient_id = %case.patient_id,
            case_id = %case.case_id,
            priority_score = case.priority_score(),
            priority_level = case.priority_level().label(),
            "case submitted for review"
        );
        self.queue.enqueue(case);
    }

    /// Feed one message to the patient's collaborator-driven intake.
    ///
    /// Collaborator failures yield the retry reply and leave the session as it was.
    pub async fn handle_assisted_message(
        &self,
        patient_id: &PatientId,
        message: &str,
    ) -> AssistedReply {
        loop {
            let handle = self.assisted.get_or_open(patient_id, || {
                AssistedSession::new(patient_id.clone(), Utc::now())
            });
            let mut session = handle.lock().await;

            // Concluded by a concurrent message while this one waited.
            if session.is_concluded() {
                continue;
            }

            if !session.is_opened() {
                debug!(%patient_id, "assisted intake opened");
                return AssistedReply {
                    reply: session.open(message, Utc::now()),
                    conversation_completed: false,
                };
            }

            let reply = match self.dialogue.send(session.history(), message).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(%patient_id, error = %err, "dialogue collaborator failed");
                    return AssistedReply {
                        reply: RETRY_REPLY.to_string(),
                        conversation_completed: false,
                    };
                }
            };

            let text = reply.text.clone();
            let mut next = session.clone();
            next.record_exchange(message, reply, &self.policy, Utc::now());

            if !next.ready_to_conclude(&self.policy, message) {
                *session = next;
                return AssistedReply {
                    reply: text,
                    conversation_completed: false,
                };
            }

            let predictions = match self.dialogue.summarize(next.history()).await {
                Ok(predictions) => predictions,
                Err(err) => {
                    warn!(%patient_id, error = %err, "condition predictions unavailable");
                    Vec::new()
                }
            };

            let case = next.conclude(predictions, Utc::now());
            if let Err(err) = self.store.record_case(case.clone()) {
                warn!(
                    %patient_id,
                    error = %err,
                    "assisted case not filed, asking patient to retry"
                );
                return AssistedReply {
                    reply: RETRY_REPLY.to_string(),
                    conversation_completed: false,
                };
            }

            *session = next;
            self.assisted.remove(patient_id);
            drop(session);

            self.submit(case);
            return AssistedReply {
                reply: CONCLUDING_REPLY.to_string(),
                conversation_completed: true,
            };
        }
    }

    /// Reopen a completed intake for a check-in and return the prompt.
    pub async fn begin_followup(
        &self,
        patient_id: &PatientId,
    ) -> Result<String, TriageServiceError> {
        let handle = self
            .sessions
            .get(patient_id)
            .ok_or_else(|| TriageServiceError::NoCompletedIntake(patient_id.clone()))?;

        let prompt = handle
            .lock()
            .await
            .begin_followup(Utc::now())
            .ok_or_else(|| TriageServiceError::NoCompletedIntake(patient_id.clone()))?;

        self.followups_lock().remove(patient_id);
        info!(%patient_id, "follow-up check-in started");
        Ok(prompt)
    }

    /// Discard every session held for the patient. False if there was none.
    pub fn reset_session(&self, patient_id: &PatientId) -> bool {
        let scripted = self.sessions.remove(patient_id);
        let assisted = self.assisted.remove(patient_id);
        self.followups_lock().remove(patient_id);

        let removed = scripted || assisted;
        if removed {
            debug!(%patient_id, "intake sessions discarded");
        }
        removed
    }

    /// Copy of the patient's scripted session, if one is open.
    pub async fn session(&self, patient_id: &PatientId) -> Option<ConversationSession> {
        let handle = self.sessions.get(patient_id)?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Queue snapshot with patient names for the clinician dashboard.
    pub fn dashboard(&self) -> Vec<DashboardEntry> {
        self.queue
            .list()
            .into_iter()
            .map(|summary| {
                let patient_name = self
                    .store
                    .patient(&summary.patient_id)
                    .map(|profile| profile.name)
                    .unwrap_or_else(|| UNKNOWN_PATIENT_NAME.to_string());
                DashboardEntry {
                    summary,
                    patient_name,
                }
            })
            .collect()
    }

    /// Queued case first, stored case otherwise.
    pub fn case_detail(&self, case_id: &CaseId) -> Result<CaseDetail, TriageServiceError> {
        let queued_case = self.queue.detail(case_id);
        let queued = queued_case.is_some();
        let case = queued_case
            .or_else(|| self.store.case(case_id))
            .ok_or_else(|| TriageServiceError::CaseNotFound(case_id.clone()))?;

        Ok(CaseDetail {
            patient: self.store.patient(&case.patient_id),
            score_breakdown: scoring::breakdown(case.symptoms()),
            queued,
            case,
        })
    }

    /// Record a clinician's decision and take the case off the queue.
    pub fn resolve_case(
        &self,
        case_id: &CaseId,
        decision: ClinicianDecision,
    ) -> Result<(), TriageServiceError> {
        if !self.queue.resolve(case_id) {
            return Err(TriageServiceError::CaseNotFound(case_id.clone()));
        }

        info!(
            %case_id,
            schedule_appointment = decision.schedule_appointment,
            has_notes = !decision.notes.trim().is_empty(),
            "case resolved by clinician"
        );
        Ok(())
    }

    /// Scheduled check-ins, soonest first.
    pub fn followups(&self) -> Vec<FollowUpView> {
        let mut followups: Vec<FollowUpView> = self.followups_lock().values().cloned().collect();
        followups.sort_by(|a, b| {
            a.due_at
                .cmp(&b.due_at)
                .then_with(|| a.patient_id.cmp(&b.patient_id))
        });
        followups
    }
}

/// Error raised by the triage service.
#[derive(Debug, thiserror::Error)]
pub enum TriageServiceError {
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
    #[error("patient {0} has no completed intake")]
    NoCompletedIntake(PatientId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
