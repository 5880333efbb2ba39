use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::dialogue::DialogueGenerator;
use super::domain::{CaseId, LifestyleFactors, PatientId, PatientProfile};
use super::repository::TriageRepository;
use super::service::{ClinicianDecision, TriageService, TriageServiceError};

/// Incoming patient message body. A missing message is treated as empty text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientMessage {
    #[serde(default)]
    pub message: String,
}

/// Registration payload; the id is generated when absent.
#[derive(Debug, Clone, Deserialize)]
pub struct PatientRegistration {
    #[serde(default)]
    pub patient_id: Option<String>,
    pub name: String,
    pub age: u16,
    pub gender: String,
    #[serde(default)]
    pub medical_history: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,
    #[serde(default)]
    pub lifestyle_factors: LifestyleFactors,
}

impl PatientRegistration {
    fn into_profile(self) -> PatientProfile {
        let patient_id = self
            .patient_id
            .filter(|id| !id.trim().is_empty())
            .map(PatientId)
            .unwrap_or_else(PatientId::generate);

        let mut profile = PatientProfile::new(patient_id, self.name, self.age, self.gender);
        profile.medical_history = self.medical_history;
        profile.allergies = self.allergies;
        profile.current_medications = self.current_medications;
        profile.lifestyle_factors = self.lifestyle_factors;
        profile
    }
}

/// Router builder exposing patient intake and clinician review endpoints.
pub fn triage_router<R, D>(service: Arc<TriageService<R, D>>) -> Router
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    Router::new()
        .route("/api/v1/triage/patients", post(register_handler::<R, D>))
        .route(
            "/api/v1/triage/patients/:patient_id/messages",
            post(message_handler::<R, D>),
        )
        .route(
            "/api/v1/triage/patients/:patient_id/assisted-messages",
            post(assisted_message_handler::<R, D>),
        )
        .route(
            "/api/v1/triage/patients/:patient_id/session",
            delete(reset_session_handler::<R, D>),
        )
        .route(
            "/api/v1/triage/patients/:patient_id/followup",
            post(followup_handler::<R, D>),
        )
        .route("/api/v1/triage/queue", get(queue_handler::<R, D>))
        .route(
            "/api/v1/triage/cases/:case_id",
            get(case_detail_handler::<R, D>),
        )
        .route(
            "/api/v1/triage/cases/:case_id/resolve",
            post(resolve_handler::<R, D>),
        )
        .route("/api/v1/triage/followups", get(followups_handler::<R, D>))
        .with_state(service)
}

fn case_not_found() -> Response {
    let payload = json!({
        "error": "case not found",
    });
    (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
}

fn internal_error(error: TriageServiceError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}

pub(crate) async fn register_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
    axum::Json(registration): axum::Json<PatientRegistration>,
) -> Response
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    match service.register_patient(registration.into_profile()) {
        Ok(profile) => (StatusCode::CREATED, axum::Json(profile)).into_response(),
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn message_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
    Path(patient_id): Path<String>,
    axum::Json(body): axum::Json<PatientMessage>,
) -> Response
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    let reply = service
        .handle_message(&PatientId(patient_id), &body.message)
        .await;
    (StatusCode::OK, axum::Json(reply)).into_response()
}

pub(crate) async fn assisted_message_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
    Path(patient_id): Path<String>,
    axum::Json(body): axum::Json<PatientMessage>,
) -> Response
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    let reply = service
        .handle_assisted_message(&PatientId(patient_id), &body.message)
        .await;
    (StatusCode::OK, axum::Json(reply)).into_response()
}

pub(crate) async fn reset_session_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
    Path(patient_id): Path<String>,
) -> Response
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    let reset = service.reset_session(&PatientId(patient_id));
    let payload = json!({
        "reset": reset,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn followup_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
    Path(patient_id): Path<String>,
) -> Response
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    match service.begin_followup(&PatientId(patient_id)).await {
        Ok(prompt) => {
            let payload = json!({
                "reply": prompt,
                "stage": "followup",
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error @ TriageServiceError::NoCompletedIntake(_)) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn queue_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
) -> Response
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    (StatusCode::OK, axum::Json(service.dashboard())).into_response()
}

pub(crate) async fn case_detail_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
    Path(case_id): Path<String>,
) -> Response
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    match service.case_detail(&CaseId(case_id)) {
        Ok(detail) => (StatusCode::OK, axum::Json(detail)).into_response(),
        Err(TriageServiceError::CaseNotFound(_)) => case_not_found(),
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn resolve_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
    Path(case_id): Path<String>,
    axum::Json(decision): axum::Json<ClinicianDecision>,
) -> Response
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    let case_id = CaseId(case_id);
    match service.resolve_case(&case_id, decision) {
        Ok(()) => {
            let payload = json!({
                "case_id": case_id,
                "resolved": true,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(TriageServiceError::CaseNotFound(_)) => case_not_found(),
        Err(other) => internal_error(other),
    }
}

pub(crate) async fn followups_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
) -> Response
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    (StatusCode::OK, axum::Json(service.followups())).into_response()
}
