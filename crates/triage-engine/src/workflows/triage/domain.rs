use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::scoring::PriorityAssessment;

pub const MIN_SEVERITY: u8 = 1;
pub const MAX_SEVERITY: u8 = 10;

/// Identifier wrapper for triage cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for patients; owned by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub String);

impl PatientId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Clinical priority bands, highest first. Serialized as the lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    Critical,
    Urgent,
    Standard,
    #[default]
    Routine,
}

impl PriorityLevel {
    pub const fn label(self) -> &'static str {
        match self {
            PriorityLevel::Critical => "critical",
            PriorityLevel::Urgent => "urgent",
            PriorityLevel::Standard => "standard",
            PriorityLevel::Routine => "routine",
        }
    }

    /// Display form used in patient-facing summaries.
    pub const fn title(self) -> &'static str {
        match self {
            PriorityLevel::Critical => "Critical",
            PriorityLevel::Urgent => "Urgent",
            PriorityLevel::Standard => "Standard",
            PriorityLevel::Routine => "Routine",
        }
    }

    /// Persisted records depend on these exact strings.
    pub const fn recommendation(self) -> &'static str {
        match self {
            PriorityLevel::Critical => "immediate medical attention recommended",
            PriorityLevel::Urgent => "schedule within 24-48 hours",
            PriorityLevel::Standard => "schedule within 1-2 weeks",
            PriorityLevel::Routine => "routine scheduling",
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn clamp_severity(raw: i64) -> u8 {
    raw.clamp(MIN_SEVERITY as i64, MAX_SEVERITY as i64) as u8
}

fn clamp_duration(raw: i64) -> u32 {
    raw.clamp(0, u32::MAX as i64) as u32
}

fn deserialize_severity<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(clamp_severity(raw))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(clamp_duration(raw))
}

/// One reported symptom. Values are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomRecord {
    name: String,
    #[serde(deserialize_with = "deserialize_severity")]
    severity: u8,
    #[serde(deserialize_with = "deserialize_duration")]
    duration_days: u32,
    #[serde(default)]
    note: String,
    captured_at: DateTime<Utc>,
}

impl SymptomRecord {
    pub fn new(
        name: impl Into<String>,
        severity: i64,
        duration_days: i64,
        note: impl Into<String>,
    ) -> Self {
        Self::captured(name, severity, duration_days, note, Utc::now())
    }

    pub fn captured(
        name: impl Into<String>,
        severity: i64,
        duration_days: i64,
        note: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            severity: clamp_severity(severity),
            duration_days: clamp_duration(duration_days),
            note: note.into(),
            captured_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    pub fn duration_days(&self) -> u32 {
        self.duration_days
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Opaque key-value record, e.g. a condition prediction from the dialogue collaborator.
pub type Prediction = BTreeMap<String, serde_json::Value>;

/// A single patient's aggregated intake and derived priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientCase {
    pub case_id: CaseId,
    pub patient_id: PatientId,
    pub created_at: DateTime<Utc>,
    symptoms: Vec<SymptomRecord>,
    #[serde(default)]
    priority_score: u8,
    #[serde(default)]
    priority_level: PriorityLevel,
    #[serde(default)]
    recommendation: String,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

impl PatientCase {
    pub fn open(patient_id: PatientId) -> Self {
        Self::open_at(patient_id, Utc::now())
    }

    pub fn open_at(patient_id: PatientId, created_at: DateTime<Utc>) -> Self {
        Self {
            case_id: CaseId::generate(),
            patient_id,
            created_at,
            symptoms: Vec::new(),
            priority_score: 0,
            priority_level: PriorityLevel::Routine,
            recommendation: String::new(),
            predictions: Vec::new(),
        }
    }

    pub fn add_symptom(&mut self, symptom: SymptomRecord) {
        self.symptoms.push(symptom);
    }

    /// Score and level are only ever written together.
    pub fn apply_assessment(&mut self, assessment: &PriorityAssessment) {
        self.priority_score = assessment.score;
        self.priority_level = assessment.level;
        self.recommendation = assessment.recommendation.to_string();
    }

    pub fn symptoms(&self) -> &[SymptomRecord] {
        &self.symptoms
    }

    pub fn symptom_names(&self) -> Vec<&str> {
        self.symptoms.iter().map(SymptomRecord::name).collect()
    }

    pub fn priority_score(&self) -> u8 {
        self.priority_score
    }

    pub fn priority_level(&self) -> PriorityLevel {
        self.priority_level
    }

    pub fn recommendation(&self) -> &str {
        &self.recommendation
    }
}

/// Self-reported lifestyle details; each field stays empty until known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifestyleFactors {
    pub smoking_status: Option<String>,
    pub alcohol_consumption: Option<String>,
    pub exercise_frequency: Option<String>,
    pub stress_level: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Demographics and background kept alongside cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub patient_id: PatientId,
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

impl PatientProfile {
    pub fn new(
        patient_id: PatientId,
        name: impl Into<String>,
        age: u16,
        gender: impl Into<String>,
    ) -> Self {
        Self {
            patient_id,
            name: name.into(),
            age,
            gender: gender.into(),
            medical_history: Vec::new(),
            allergies: Vec::new(),
            current_medications: Vec::new(),
            lifestyle_factors: LifestyleFactors::default(),
        }
    }

    /// Stand-in profile for a patient who reached intake without registering.
    pub fn placeholder(patient_id: PatientId) -> Self {
        let name = patient_id.0.clone();
        Self::new(patient_id, name, 0, "not specified")
    }
}
