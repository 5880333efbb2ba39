use serde::{Deserialize, Serialize};

use super::domain::{PatientCase, PatientProfile};

/// Everything the persistence collaborator reads and writes in one go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageSnapshot {
    #[serde(default)]
    pub patients: Vec<PatientProfile>,
    #[serde(default)]
    pub cases: Vec<PatientCase>,
}

/// Storage abstraction so the store can be exercised without a filesystem.
///
/// Implementations are synchronous; callers never hold an engine lock while
/// invoking them.
pub trait TriageRepository: Send + Sync {
    fn load(&self) -> Result<TriageSnapshot, StorageError>;
    fn save(&self, snapshot: &TriageSnapshot) -> Result<(), StorageError>;
}

/// Error enumeration for persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no stored triage data")]
    Missing,
    #[error("stored triage data is corrupt: {0}")]
    Corrupt(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
