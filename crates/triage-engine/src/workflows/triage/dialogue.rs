//! Intake driven by an external dialogue-generation collaborator.
//!
//! The collaborator owns the conversation history; the engine stores the
//! blob it hands back and passes it in unchanged on the next call. The engine
//! decides when enough has been gathered and extracts the case from its own
//! transcript with the same lexical cues the scripted intake uses.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conversation::{Speaker, Turn};
use super::domain::{CaseId, PatientCase, PatientId, Prediction, SymptomRecord};
use super::lexicon;
use super::scoring;

pub const WELCOME_REPLY: &str = "Hello! I'm your healthcare assistant. I'd like to understand \
your health concerns today. Could you please describe what symptoms or issues you're \
experiencing?";

pub const CONCLUDING_REPLY: &str = "Thank you for providing all this information. Based on \
what you've shared, I've created a summary for our healthcare team. They'll review it and \
contact you about next steps for your care.";

pub const RETRY_REPLY: &str = "I apologize, but I'm having trouble processing your message \
right now. Could you please try again?";

/// Conversation state owned by the collaborator. Never inspected here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogueHistory(serde_json::Value);

impl DialogueHistory {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueReply {
    pub text: String,
    pub history: DialogueHistory,
}

/// Outbound hook to a conversational model.
#[async_trait]
pub trait DialogueGenerator: Send + Sync {
    async fn send(
        &self,
        history: &DialogueHistory,
        message: &str,
    ) -> Result<DialogueReply, DialogueError>;

    /// Optional condition predictions for a finished conversation.
    async fn summarize(
        &self,
        _history: &DialogueHistory,
    ) -> Result<Vec<Prediction>, DialogueError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error("dialogue service is not configured")]
    NotConfigured,
    #[error("dialogue request failed: {0}")]
    RequestFailed(String),
    #[error("dialogue response parse error: {0}")]
    ParseError(String),
}

/// When a collaborator-driven intake has gathered enough to conclude.
///
/// The thresholds are tunables carried over from the first deployment, not
/// derived values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConclusionPolicy {
    pub min_meaningful_turns: usize,
    pub min_exchanged_turns: usize,
    /// A patient message counts as meaningful when longer than this.
    pub meaningful_min_chars: usize,
    pub trigger_phrases: Vec<String>,
}

impl Default for ConclusionPolicy {
    fn default() -> Self {
        Self {
            min_meaningful_turns: 5,
            min_exchanged_turns: 10,
            meaningful_min_chars: 5,
            trigger_phrases: vec![
                "end conversation".to_string(),
                "what is your diagnosis".to_string(),
                "show me the summary".to_string(),
            ],
        }
    }
}

impl ConclusionPolicy {
    pub fn is_meaningful(&self, message: &str) -> bool {
        message.trim().chars().count() > self.meaningful_min_chars
    }

    pub fn is_trigger(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.trigger_phrases
            .iter()
            .any(|phrase| lowered.contains(phrase.as_str()))
    }
}

/// A patient's collaborator-driven intake in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistedSession {
    patient_id: PatientId,
    case_id: CaseId,
    created_at: DateTime<Utc>,
    history: DialogueHistory,
    transcript: Vec<Turn>,
    opened: bool,
    concluded: bool,
    meaningful_turns: usize,
    exchanged_turns: usize,
}

impl AssistedSession {
    pub fn new(patient_id: PatientId, now: DateTime<Utc>) -> Self {
        Self {
            patient_id,
            case_id: CaseId::generate(),
            created_at: now,
            history: DialogueHistory::default(),
            transcript: Vec::new(),
            opened: false,
            concluded: false,
            meaningful_turns: 0,
            exchanged_turns: 0,
        }
    }

    pub fn patient_id(&self) -> &PatientId {
        &self.patient_id
    }

    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    pub fn history(&self) -> &DialogueHistory {
        &self.history
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    pub fn is_concluded(&self) -> bool {
        self.concluded
    }

    pub fn meaningful_turns(&self) -> usize {
        self.meaningful_turns
    }

    pub fn exchanged_turns(&self) -> usize {
        self.exchanged_turns
    }

    /// First contact: answered with the fixed welcome, the collaborator is not called.
    pub fn open(&mut self, message: &str, now: DateTime<Utc>) -> String {
        self.opened = true;
        self.transcript.push(Turn::patient(message, now));
        self.transcript.push(Turn::assistant(WELCOME_REPLY, now));
        WELCOME_REPLY.to_string()
    }

    /// Store a successful collaborator exchange.
    pub fn record_exchange(
        &mut self,
        message: &str,
        reply: DialogueReply,
        policy: &ConclusionPolicy,
        now: DateTime<Utc>,
    ) {
        if policy.is_meaningful(message) {
            self.meaningful_turns += 1;
        }
        self.exchanged_turns += 2;
        self.history = reply.history;
        self.transcript.push(Turn::patient(message, now));
        self.transcript.push(Turn::assistant(reply.text, now));
    }

    pub fn ready_to_conclude(&self, policy: &ConclusionPolicy, latest: &str) -> bool {
        let enough_gathered = self.meaningful_turns >= policy.min_meaningful_turns
            && self.exchanged_turns >= policy.min_exchanged_turns;
        enough_gathered || policy.is_trigger(latest)
    }

    /// Build and score the case; the session accepts no further messages.
    pub fn conclude(&mut self, predictions: Vec<Prediction>, now: DateTime<Utc>) -> PatientCase {
        self.concluded = true;

        let mut case = PatientCase::open_at(self.patient_id.clone(), self.created_at);
        case.case_id = self.case_id.clone();
        for symptom in extract_symptoms(&self.transcript, now) {
            case.add_symptom(symptom);
        }
        case.predictions = predictions;

        let assessment = scoring::score(case.symptoms());
        case.apply_assessment(&assessment);
        case
    }
}

/// One record per distinct vocabulary keyword the patient mentioned.
///
/// Severity and duration come from the mentioning turn, else the patient's
/// next turn, else the scripted-intake defaults.
pub fn extract_symptoms(transcript: &[Turn], captured_at: DateTime<Utc>) -> Vec<SymptomRecord> {
    let patient_turns: Vec<&str> = transcript
        .iter()
        .filter(|turn| turn.speaker == Speaker::Patient)
        .map(|turn| turn.text.as_str())
        .collect();

    let mut seen = HashSet::new();
    let mut symptoms = Vec::new();

    for (index, text) in patient_turns.iter().enumerate() {
        let next = patient_turns.get(index + 1).copied();
        for keyword in lexicon::find_symptoms(text) {
            if !seen.insert(keyword) {
                continue;
            }

            let severity = lexicon::described_severity(text)
                .or_else(|| next.and_then(lexicon::described_severity))
                .unwrap_or(lexicon::DEFAULT_SEVERITY);
            let duration_days = lexicon::described_duration(text)
                .or_else(|| next.and_then(lexicon::described_duration))
                .unwrap_or(lexicon::DEFAULT_DURATION_DAYS);

            symptoms.push(SymptomRecord::captured(
                keyword,
                i64::from(severity),
                i64::from(duration_days),
                text.trim(),
                captured_at,
            ));
        }
    }

    symptoms
}
