//! Deterministic mapping from reported symptoms to a clinical priority.
//!
//! Each symptom contributes `severity * 2 * duration_factor`; the sum is scaled
//! by 2.5, truncated, and capped at 100. Duration factors are held in tenths
//! so the whole computation stays in integers and truncation is exact.

use serde::Serialize;

use super::domain::{PriorityLevel, SymptomRecord};

pub const MAX_SCORE: u8 = 100;
pub const CRITICAL_THRESHOLD: u8 = 80;
pub const URGENT_THRESHOLD: u8 = 60;
pub const STANDARD_THRESHOLD: u8 = 40;

/// Score, band, and recommendation derived from a symptom set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriorityAssessment {
    pub score: u8,
    pub level: PriorityLevel,
    pub recommendation: &'static str,
}

impl PriorityAssessment {
    /// Band an already computed score. Values above 100 are capped.
    pub fn from_score(score: u8) -> Self {
        let score = score.min(MAX_SCORE);
        let level = level_for_score(score);
        Self {
            score,
            level,
            recommendation: level.recommendation(),
        }
    }
}

/// Per-symptom contribution, kept for clinician-facing audit output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreComponent {
    pub symptom: String,
    pub severity: u8,
    pub duration_days: u32,
    pub duration_factor: f32,
    pub contribution: f32,
}

pub fn level_for_score(score: u8) -> PriorityLevel {
    if score >= CRITICAL_THRESHOLD {
        PriorityLevel::Critical
    } else if score >= URGENT_THRESHOLD {
        PriorityLevel::Urgent
    } else if score >= STANDARD_THRESHOLD {
        PriorityLevel::Standard
    } else {
        PriorityLevel::Routine
    }
}

fn duration_factor_tenths(duration_days: u32) -> u64 {
    if duration_days < 2 {
        10
    } else if duration_days < 7 {
        12
    } else if duration_days < 30 {
        15
    } else {
        20
    }
}

fn contribution_tenths(symptom: &SymptomRecord) -> u64 {
    u64::from(symptom.severity()) * 2 * duration_factor_tenths(symptom.duration_days())
}

pub fn score(symptoms: &[SymptomRecord]) -> PriorityAssessment {
    if symptoms.is_empty() {
        return PriorityAssessment::from_score(0);
    }

    let base_tenths: u64 = symptoms.iter().map(contribution_tenths).sum();
    // base * 2.5 == base_tenths * 25 / 100
    let scaled = base_tenths.saturating_mul(25) / 100;
    let score = scaled.min(u64::from(MAX_SCORE)) as u8;

    PriorityAssessment::from_score(score)
}

pub fn breakdown(symptoms: &[SymptomRecord]) -> Vec<ScoreComponent> {
    symptoms
        .iter()
        .map(|symptom| {
            let factor = duration_factor_tenths(symptom.duration_days());
            ScoreComponent {
                symptom: symptom.name().to_string(),
                severity: symptom.severity(),
                duration_days: symptom.duration_days(),
                duration_factor: factor as f32 / 10.0,
                contribution: contribution_tenths(symptom) as f32 / 10.0,
            }
        })
        .collect()
}
