use metrics_exporter_prometheus::PrometheusHandle;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use triage_engine::workflows::triage::{
    StorageError, SymptomRecord, TriageRepository, TriageSnapshot,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Snapshot persisted as one pretty-printed JSON document.
///
/// Writes go to a sibling temporary file that is renamed over the target.
#[derive(Debug, Clone)]
pub(crate) struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }
}

impl TriageRepository for JsonFileRepository {
    fn load(&self) -> Result<TriageSnapshot, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(StorageError::Missing),
            Err(err) => return Err(StorageError::Unavailable(err.to_string())),
        };
        serde_json::from_str(&raw).map_err(|err| StorageError::Corrupt(err.to_string()))
    }

    fn save(&self, snapshot: &TriageSnapshot) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(snapshot)
            .map_err(|err| StorageError::Corrupt(err.to_string()))?;
        let staging = self.staging_path();
        fs::write(&staging, body).map_err(|err| StorageError::Unavailable(err.to_string()))?;
        fs::rename(&staging, &self.path).map_err(|err| StorageError::Unavailable(err.to_string()))
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryTriageRepository {
    snapshot: Arc<Mutex<Option<TriageSnapshot>>>,
}

impl TriageRepository for InMemoryTriageRepository {
    fn load(&self) -> Result<TriageSnapshot, StorageError> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| StorageError::Unavailable("repository mutex poisoned".to_string()))?;
        guard.clone().ok_or(StorageError::Missing)
    }

    fn save(&self, snapshot: &TriageSnapshot) -> Result<(), StorageError> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| StorageError::Unavailable("repository mutex poisoned".to_string()))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }
}

/// Parse `name:severity:days`; the name may itself contain spaces.
pub(crate) fn parse_symptom(raw: &str) -> Result<SymptomRecord, String> {
    let mut parts = raw.rsplitn(3, ':');
    let (Some(days), Some(severity), Some(name)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected name:severity:days, got '{raw}'"));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("symptom name missing in '{raw}'"));
    }
    let severity: i64 = severity
        .trim()
        .parse()
        .map_err(|err| format!("failed to parse severity in '{raw}' ({err})"))?;
    let days: i64 = days
        .trim()
        .parse()
        .map_err(|err| format!("failed to parse duration in '{raw}' ({err})"))?;

    Ok(SymptomRecord::new(name, severity, days, "entered on the command line"))
}
