//! Patient intake and triage.
//!
//! A per-patient conversation collects symptoms into a case, the scorer turns
//! the case into a clinical priority, and the queue orders finished cases for
//! clinician review. Storage and the optional dialogue model are collaborators
//! reached through [`TriageRepository`] and [`DialogueGenerator`].

pub mod conversation;
pub mod dialogue;
pub mod domain;
pub mod lexicon;
pub mod queue;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use conversation::{process, ConversationSession, Speaker, Stage, Turn, TurnOutcome};
pub use dialogue::{
    AssistedSession, ConclusionPolicy, DialogueError, DialogueGenerator, DialogueHistory,
    DialogueReply,
};
pub use domain::{
    CaseId, LifestyleFactors, PatientCase, PatientId, PatientProfile, Prediction, PriorityLevel,
    SymptomRecord,
};
pub use queue::{QueueSummary, TriageQueue};
pub use repository::{StorageError, TriageRepository, TriageSnapshot};
pub use router::triage_router;
pub use scoring::{score, PriorityAssessment, ScoreComponent};
pub use service::{
    AssistedReply, CaseDetail, ClinicianDecision, DashboardEntry, FollowUpView, MessageReply,
    TriageService, TriageServiceError,
};
pub use store::TriageStore;
