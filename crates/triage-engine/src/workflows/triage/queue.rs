use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::domain::{CaseId, PatientCase, PatientId, PriorityLevel};

/// Dashboard row for one pending case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub case_id: CaseId,
    pub patient_id: PatientId,
    pub priority_level: PriorityLevel,
    pub priority_score: u8,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug)]
struct QueueEntry {
    case: PatientCase,
    submitted_at: DateTime<Utc>,
    sequence: u64,
}

impl QueueEntry {
    fn summary(&self) -> QueueSummary {
        QueueSummary {
            case_id: self.case.case_id.clone(),
            patient_id: self.case.patient_id.clone(),
            priority_level: self.case.priority_level(),
            priority_score: self.case.priority_score(),
            submitted_at: self.submitted_at,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: Vec<QueueEntry>,
    next_sequence: u64,
}

/// Completed cases awaiting clinician review, highest score first.
///
/// Equal scores keep insertion order. A re-enqueued case keeps its original
/// insertion slot so updating it never sends it to the back of its band.
/// Priority does not change while a case waits.
#[derive(Debug, Default)]
pub struct TriageQueue {
    state: Mutex<QueueState>,
}

impl TriageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, case: PatientCase) {
        self.enqueue_at(case, Utc::now());
    }

    pub fn enqueue_at(&self, case: PatientCase, submitted_at: DateTime<Utc>) {
        let mut state = self.lock();
        let case_id = case.case_id.clone();
        let score = case.priority_score();

        let existing = state
            .entries
            .iter()
            .position(|entry| entry.case.case_id == case_id);

        match existing {
            Some(position) => state.entries[position].case = case,
            None => {
                let sequence = state.next_sequence;
                state.next_sequence += 1;
                state.entries.push(QueueEntry {
                    case,
                    submitted_at,
                    sequence,
                });
            }
        }

        state.entries.sort_by(|a, b| {
            b.case
                .priority_score()
                .cmp(&a.case.priority_score())
                .then(a.sequence.cmp(&b.sequence))
        });

        debug!(%case_id, priority_score = score, depth = state.entries.len(), "case enqueued");
    }

    pub fn list(&self) -> Vec<QueueSummary> {
        self.lock().entries.iter().map(QueueEntry::summary).collect()
    }

    pub fn detail(&self, case_id: &CaseId) -> Option<PatientCase> {
        self.lock()
            .entries
            .iter()
            .find(|entry| &entry.case.case_id == case_id)
            .map(|entry| entry.case.clone())
    }

    /// Remove a case once a clinician has acted on it. False if it was not queued.
    pub fn resolve(&self, case_id: &CaseId) -> bool {
        let mut state = self.lock();
        let Some(position) = state
            .entries
            .iter()
            .position(|entry| &entry.case.case_id == case_id)
        else {
            return false;
        };

        state.entries.remove(position);
        debug!(%case_id, depth = state.entries.len(), "case resolved");
        true
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
