//! Per-patient intake dialogue.
//!
//! A session walks a fixed sequence of stages, one patient message per step:
//!
//! ```text
//! Greeting -> CollectingSymptoms -> SymptomDetail -> MedicalHistory
//!          -> Lifestyle -> Summarizing -> Completed (<-> Followup)
//! ```
//!
//! `CollectingSymptoms` repeats until a symptom keyword or a negation cue is
//! found; a negation jumps straight to `MedicalHistory`. Every other stage
//! advances on any input. Processing never fails: unusable input gets a
//! clarifying prompt or a documented default.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::domain::{PatientCase, PatientId, SymptomRecord};
use super::lexicon;
use super::scoring;

pub const FOLLOWUP_INTERVAL_DAYS: i64 = 7;

const GREETING_REPLY: &str = "Hello! I'm your healthcare assistant. I'd like to ask you some \
questions to better understand your health concerns before connecting you with a doctor. \
What symptoms are you experiencing today?";

const NO_SYMPTOMS_REPLY: &str = "Thank you. I understand you're not experiencing specific \
symptoms right now. Let's talk about your medical history. Do you have any chronic conditions \
or significant past medical issues?";

const CLARIFY_REPLY: &str = "I want to make sure I understand your symptoms correctly. Could \
you please describe what you're experiencing in simple terms? For example: headache, fever, \
cough, pain, etc.";

const LIFESTYLE_REPLY: &str = "Thank you for sharing your medical history. A few more \
questions about your lifestyle: Do you smoke, drink alcohol, or have any regular exercise \
routine? Also, how would you rate your stress level?";

const FOLLOWUP_SCHEDULED_REPLY: &str = "Great! I've scheduled a follow-up conversation for one \
week from today. If your condition changes before then, please don't hesitate to reach out. \
Thank you for using our healthcare assistant. Take care!";

const CLOSING_REPLY: &str = "Thank you for using our healthcare assistant. If your condition \
changes or you need further assistance, please don't hesitate to reach out. Take care!";

const COMPLETED_REPLY: &str = "Your intake is complete and has been shared with the healthcare \
team. If anything changes, please don't hesitate to reach out.";

const FOLLOWUP_PROMPT: &str = "Hello again! It's time for your follow-up check-in. How have \
your symptoms been since we last spoke?";

const FOLLOWUP_RECORDED_REPLY: &str =
    "Thank you for the update. I'll make sure this information is added to your records.";

const UNNAMED_SYMPTOM: &str = "unspecified symptom";
const DEFAULT_SYMPTOM_NOTE: &str = "Patient reported symptom";

/// Discrete point in the intake dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Greeting,
    CollectingSymptoms,
    SymptomDetail,
    MedicalHistory,
    Lifestyle,
    Summarizing,
    Completed,
    Followup,
}

impl Stage {
    pub const fn label(self) -> &'static str {
        match self {
            Stage::Greeting => "greeting",
            Stage::CollectingSymptoms => "collecting_symptoms",
            Stage::SymptomDetail => "symptom_detail",
            Stage::MedicalHistory => "medical_history",
            Stage::Lifestyle => "lifestyle",
            Stage::Summarizing => "summarizing",
            Stage::Completed => "completed",
            Stage::Followup => "followup",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Patient,
    Assistant,
}

/// One line of the dialogue transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn patient(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Patient,
            text: text.into(),
            timestamp,
        }
    }

    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            timestamp,
        }
    }
}

/// Result of feeding one message to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    pub from: Stage,
    pub to: Stage,
}

impl TurnOutcome {
    /// True only for the turn that closes the intake (Summarizing -> Completed).
    pub fn intake_completed(&self) -> bool {
        self.from == Stage::Summarizing && self.to.is_terminal()
    }

    pub fn advanced(&self) -> bool {
        self.from != self.to
    }
}

/// A single patient's intake dialogue and the case it is building.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    patient_id: PatientId,
    stage: Stage,
    active_symptom: Option<String>,
    turn_log: Vec<Turn>,
    case: PatientCase,
    medical_history: Option<String>,
    lifestyle: Option<String>,
    followup_due: Option<DateTime<Utc>>,
    followup_updates: Vec<String>,
}

impl ConversationSession {
    pub fn new(patient_id: PatientId) -> Self {
        Self::started_at(patient_id, Utc::now())
    }

    pub fn started_at(patient_id: PatientId, now: DateTime<Utc>) -> Self {
        let case = PatientCase::open_at(patient_id.clone(), now);
        Self {
            patient_id,
            stage: Stage::Greeting,
            active_symptom: None,
            turn_log: Vec::new(),
            case,
            medical_history: None,
            lifestyle: None,
            followup_due: None,
            followup_updates: Vec::new(),
        }
    }

    pub fn patient_id(&self) -> &PatientId {
        &self.patient_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn active_symptom(&self) -> Option<&str> {
        self.active_symptom.as_deref()
    }

    pub fn turn_log(&self) -> &[Turn] {
        &self.turn_log
    }

    pub fn case(&self) -> &PatientCase {
        &self.case
    }

    pub fn medical_history(&self) -> Option<&str> {
        self.medical_history.as_deref()
    }

    pub fn lifestyle(&self) -> Option<&str> {
        self.lifestyle.as_deref()
    }

    pub fn followup_due(&self) -> Option<DateTime<Utc>> {
        self.followup_due
    }

    pub fn followup_updates(&self) -> &[String] {
        &self.followup_updates
    }

    pub fn process(&mut self, incoming: &str) -> TurnOutcome {
        self.process_at(incoming, Utc::now())
    }

    pub fn process_at(&mut self, incoming: &str, now: DateTime<Utc>) -> TurnOutcome {
        let from = self.stage;
        let reply = match from {
            Stage::Greeting => self.handle_greeting(),
            Stage::CollectingSymptoms => self.handle_symptom_collection(incoming),
            Stage::SymptomDetail => self.handle_symptom_detail(incoming, now),
            Stage::MedicalHistory => self.handle_medical_history(incoming),
            Stage::Lifestyle => self.handle_lifestyle(incoming),
            Stage::Summarizing => self.handle_summarizing(incoming, now),
            Stage::Completed => COMPLETED_REPLY.to_string(),
            Stage::Followup => self.handle_followup(incoming),
        };

        self.turn_log.push(Turn::patient(incoming, now));
        self.turn_log.push(Turn::assistant(reply.clone(), now));

        let to = self.stage;
        if from != to {
            debug!(
                patient_id = %self.patient_id,
                from = from.label(),
                to = to.label(),
                "intake stage advanced"
            );
        }

        TurnOutcome { reply, from, to }
    }

    /// Reopen a completed intake for a check-in exchange.
    ///
    /// Returns the check-in prompt, or `None` when the session is not complete.
    pub fn begin_followup(&mut self, now: DateTime<Utc>) -> Option<String> {
        if self.stage != Stage::Completed {
            return None;
        }

        self.stage = Stage::Followup;
        self.turn_log.push(Turn::assistant(FOLLOWUP_PROMPT, now));
        Some(FOLLOWUP_PROMPT.to_string())
    }

    fn handle_greeting(&mut self) -> String {
        self.stage = Stage::CollectingSymptoms;
        GREETING_REPLY.to_string()
    }

    fn handle_symptom_collection(&mut self, incoming: &str) -> String {
        if lexicon::contains_negation(incoming) {
            self.stage = Stage::MedicalHistory;
            return NO_SYMPTOMS_REPLY.to_string();
        }

        match lexicon::first_symptom(incoming) {
            Some(symptom) => {
                self.active_symptom = Some(symptom.to_string());
                self.stage = Stage::SymptomDetail;
                format!(
                    "I understand you're experiencing {symptom}. On a scale of 1-10, how severe \
                     is your {symptom}, and how long have you had it?"
                )
            }
            None => CLARIFY_REPLY.to_string(),
        }
    }

    fn handle_symptom_detail(&mut self, incoming: &str, now: DateTime<Utc>) -> String {
        let name = self
            .active_symptom
            .take()
            .unwrap_or_else(|| UNNAMED_SYMPTOM.to_string());
        let severity = lexicon::infer_severity(incoming);
        let duration_days = lexicon::infer_duration(incoming);
        let note = match incoming.trim() {
            "" => DEFAULT_SYMPTOM_NOTE,
            text => text,
        };

        self.case.add_symptom(SymptomRecord::captured(
            name.clone(),
            i64::from(severity),
            i64::from(duration_days),
            note,
            now,
        ));
        self.stage = Stage::MedicalHistory;

        let unit = if duration_days == 1 { "day" } else { "days" };
        format!(
            "Thank you. I've noted your {name} at {severity}/10 for about {duration_days} {unit}. \
             Do you have any chronic conditions or significant past medical issues?"
        )
    }

    fn handle_medical_history(&mut self, incoming: &str) -> String {
        self.medical_history = Some(incoming.trim().to_string());
        self.stage = Stage::Lifestyle;
        LIFESTYLE_REPLY.to_string()
    }

    fn handle_lifestyle(&mut self, incoming: &str) -> String {
        self.lifestyle = Some(incoming.trim().to_string());

        let assessment = scoring::score(self.case.symptoms());
        self.case.apply_assessment(&assessment);
        self.stage = Stage::Summarizing;

        info!(
            patient_id = %self.patient_id,
            case_id = %self.case.case_id,
            priority_score = assessment.score,
            priority_level = assessment.level.label(),
            "intake assessment computed"
        );

        self.summary()
    }

    fn handle_summarizing(&mut self, incoming: &str, now: DateTime<Utc>) -> String {
        self.stage = Stage::Completed;
        if lexicon::is_affirmative(incoming) {
            self.followup_due = Some(now + Duration::days(FOLLOWUP_INTERVAL_DAYS));
            FOLLOWUP_SCHEDULED_REPLY.to_string()
        } else {
            CLOSING_REPLY.to_string()
        }
    }

    fn handle_followup(&mut self, incoming: &str) -> String {
        self.followup_updates.push(incoming.trim().to_string());
        self.stage = Stage::Completed;
        FOLLOWUP_RECORDED_REPLY.to_string()
    }

    fn summary(&self) -> String {
        let reported = if self.case.symptoms().is_empty() {
            "Based on our conversation, you didn't report any specific symptoms.".to_string()
        } else {
            format!(
                "Based on our conversation, you reported: {}.",
                self.case.symptom_names().join(", ")
            )
        };

        format!(
            "{reported}\n\nPriority: {} ({}/100)\nRecommendation: {}\n\n\
             I'll forward this summary to the healthcare team. They'll review it and contact \
             you about next steps. Would you like me to schedule a follow-up check-in with you \
             in one week?",
            self.case.priority_level().title(),
            self.case.priority_score(),
            self.case.recommendation(),
        )
    }
}

/// Functional form of [`ConversationSession::process`].
pub fn process(mut session: ConversationSession, incoming: &str) -> (String, ConversationSession) {
    let outcome = session.process(incoming);
    (outcome.reply, session)
}
