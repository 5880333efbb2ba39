use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::domain::{CaseId, PatientCase, PatientId, PatientProfile};
use super::repository::{StorageError, TriageRepository, TriageSnapshot};

#[derive(Debug, Default)]
struct StoreState {
    patients: HashMap<PatientId, PatientProfile>,
    cases: HashMap<CaseId, PatientCase>,
}

impl StoreState {
    fn from_snapshot(snapshot: TriageSnapshot) -> Self {
        let patients = snapshot
            .patients
            .into_iter()
            .map(|profile| (profile.patient_id.clone(), profile))
            .collect();
        let cases = snapshot
            .cases
            .into_iter()
            .map(|case| (case.case_id.clone(), case))
            .collect();
        Self { patients, cases }
    }

    fn snapshot(&self) -> TriageSnapshot {
        let mut patients: Vec<PatientProfile> = self.patients.values().cloned().collect();
        patients.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
        TriageSnapshot {
            patients,
            cases: sorted_cases(self.cases.values()),
        }
    }
}

fn restore<K, V>(map: &mut HashMap<K, V>, key: K, previous: Option<V>)
where
    K: Eq + Hash,
{
    match previous {
        Some(value) => map.insert(key, value),
        None => map.remove(&key),
    };
}

fn sorted_cases<'a>(cases: impl Iterator<Item = &'a PatientCase>) -> Vec<PatientCase> {
    let mut cases: Vec<PatientCase> = cases.cloned().collect();
    cases.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.case_id.cmp(&b.case_id))
    });
    cases
}

/// Owned registry of patient profiles and cases.
///
/// Loads once on construction and writes a full snapshot after every
/// mutation. Writers are serialized by `save_lock` for the whole
/// change-and-save, so snapshots reach the repository in mutation order and
/// a failed save is undone before the next writer runs. Reads only take the
/// state lock.
pub struct TriageStore<R> {
    repository: Arc<R>,
    state: Mutex<StoreState>,
    save_lock: Mutex<()>,
}

impl<R> TriageStore<R>
where
    R: TriageRepository,
{
    /// Open the store. Missing or unreadable data starts an empty store.
    pub fn open(repository: Arc<R>) -> Self {
        let state = match repository.load() {
            Ok(snapshot) => {
                info!(
                    patients = snapshot.patients.len(),
                    cases = snapshot.cases.len(),
                    "triage data loaded"
                );
                StoreState::from_snapshot(snapshot)
            }
            Err(StorageError::Missing) => {
                debug!("no triage data found, starting empty");
                StoreState::default()
            }
            Err(err) => {
                warn!(error = %err, "triage data unreadable, starting empty");
                StoreState::default()
            }
        };

        Self {
            repository,
            state: Mutex::new(state),
            save_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.save_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Save the current state. On failure `undo` reverts the caller's change
    /// in memory. Callers hold the writer guard.
    fn persist_or_undo<U>(&self, undo: U) -> Result<(), StorageError>
    where
        U: FnOnce(&mut StoreState),
    {
        let snapshot = self.lock().snapshot();
        self.repository.save(&snapshot).map_err(|err| {
            warn!(error = %err, "failed to persist triage data, change discarded");
            undo(&mut self.lock());
            err
        })
    }

    /// Add or replace a patient profile.
    pub fn register_patient(&self, profile: PatientProfile) -> Result<(), StorageError> {
        let _writer = self.writer();
        let patient_id = profile.patient_id.clone();
        let previous = self.lock().patients.insert(patient_id.clone(), profile);
        self.persist_or_undo(|state| restore(&mut state.patients, patient_id, previous))
    }

    pub fn patient(&self, patient_id: &PatientId) -> Option<PatientProfile> {
        self.lock().patients.get(patient_id).cloned()
    }

    /// Add or replace a case.
    pub fn record_case(&self, case: PatientCase) -> Result<(), StorageError> {
        let _writer = self.writer();
        let case_id = case.case_id.clone();
        let previous = self.lock().cases.insert(case_id.clone(), case);
        self.persist_or_undo(|state| restore(&mut state.cases, case_id, previous))
    }

    /// Record a finished intake: the case plus `update` applied to the
    /// patient's profile (a placeholder if none exists). Both land in one
    /// snapshot; if it cannot be saved neither is kept.
    pub fn record_intake<F>(
        &self,
        case: PatientCase,
        update: F,
    ) -> Result<PatientProfile, StorageError>
    where
        F: FnOnce(&mut PatientProfile),
    {
        let _writer = self.writer();
        let patient_id = case.patient_id.clone();
        let case_id = case.case_id.clone();

        let (previous_profile, previous_case, updated) = {
            let mut state = self.lock();
            let previous_profile = state.patients.get(&patient_id).cloned();
            let profile = state
                .patients
                .entry(patient_id.clone())
                .or_insert_with(|| PatientProfile::placeholder(patient_id.clone()));
            update(profile);
            let updated = profile.clone();
            let previous_case = state.cases.insert(case_id.clone(), case);
            (previous_profile, previous_case, updated)
        };

        self.persist_or_undo(|state| {
            restore(&mut state.patients, patient_id, previous_profile);
            restore(&mut state.cases, case_id, previous_case);
        })?;
        Ok(updated)
    }

    pub fn case(&self, case_id: &CaseId) -> Option<PatientCase> {
        self.lock().cases.get(case_id).cloned()
    }

    /// A patient's cases, oldest first.
    pub fn cases_for_patient(&self, patient_id: &PatientId) -> Vec<PatientCase> {
        let state = self.lock();
        sorted_cases(
            state
                .cases
                .values()
                .filter(|case| &case.patient_id == patient_id),
        )
    }

    /// Every stored case, oldest first.
    pub fn cases(&self) -> Vec<PatientCase> {
        sorted_cases(self.lock().cases.values())
    }
}
