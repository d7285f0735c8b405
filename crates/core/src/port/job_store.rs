// Job Store Port
// Persists job snapshots across daemon restarts so historical runs stay
// queryable. The file store writes a versioned JSON document atomically
// (temp file + rename) to survive crashes mid-write.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::domain::{JobId, JobSnapshot};
use crate::error::{AppError, Result};

/// Job snapshot store interface
pub trait JobStore: Send + Sync {
    /// All persisted snapshots
    fn load(&self) -> Result<HashMap<JobId, JobSnapshot>>;

    /// Upsert one snapshot
    fn save(&self, snapshot: &JobSnapshot) -> Result<()>;
}

const STORE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    jobs: HashMap<JobId, JobSnapshot>,
}

/// File-backed store (production)
pub struct FileJobStore {
    path: PathBuf,
    // Cache of the on-disk document; the file is rewritten whole on save
    cache: Mutex<HashMap<JobId, JobSnapshot>>,
}

impl FileJobStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let jobs = Self::read_document(&path)?;
        Ok(Self {
            path,
            cache: Mutex::new(jobs),
        })
    }

    fn read_document(path: &PathBuf) -> Result<HashMap<JobId, JobSnapshot>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        let doc: StoreDocument = serde_json::from_str(&raw)?;
        if doc.version != STORE_VERSION {
            return Err(AppError::Config(format!(
                "unsupported job store version {} (expected {})",
                doc.version, STORE_VERSION
            )));
        }
        Ok(doc.jobs)
    }

    fn write_document(&self, jobs: &HashMap<JobId, JobSnapshot>) -> Result<()> {
        let doc = StoreDocument {
            version: STORE_VERSION,
            jobs: jobs.clone(),
        };
        let serialized = serde_json::to_string_pretty(&doc)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl JobStore for FileJobStore {
    fn load(&self) -> Result<HashMap<JobId, JobSnapshot>> {
        Ok(self.cache.lock().map_err(poisoned)?.clone())
    }

    fn save(&self, snapshot: &JobSnapshot) -> Result<()> {
        let mut cache = self.cache.lock().map_err(poisoned)?;
        cache.insert(snapshot.job_id.clone(), snapshot.clone());
        self.write_document(&cache)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AppError {
    AppError::Internal("job store lock poisoned".to_string())
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// In-memory store (tests)
    pub struct MemoryJobStore {
        jobs: Mutex<HashMap<JobId, JobSnapshot>>,
    }

    impl MemoryJobStore {
        pub fn new() -> Self {
            Self {
                jobs: Mutex::new(HashMap::new()),
            }
        }
    }

    impl Default for MemoryJobStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl JobStore for MemoryJobStore {
        fn load(&self) -> Result<HashMap<JobId, JobSnapshot>> {
            Ok(self.jobs.lock().map_err(poisoned)?.clone())
        }

        fn save(&self, snapshot: &JobSnapshot) -> Result<()> {
            self.jobs
                .lock()
                .map_err(poisoned)?
                .insert(snapshot.job_id.clone(), snapshot.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobKind, JobParams, JobStatus};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("leadharvest-jobstore-{}-{}.json", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn save_and_reload_round_trips() {
        let path = temp_path("roundtrip");
        let store = FileJobStore::open(&path).unwrap();
        let mut snap = JobSnapshot::new("j1", JobKind::EmailHarvest, JobParams::default(), 1000);
        snap.status = JobStatus::Completed;
        snap.ended_at = Some(2000);
        store.save(&snap).unwrap();

        // Fresh handle reads the file back
        let reopened = FileJobStore::open(&path).unwrap();
        let jobs = reopened.load().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs["j1"].status, JobStatus::Completed);
        assert_eq!(jobs["j1"].ended_at, Some(2000));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_loads_empty() {
        let path = temp_path("missing");
        let store = FileJobStore::open(&path).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let path = temp_path("badversion");
        std::fs::write(&path, r#"{"version": 99, "jobs": {}}"#).unwrap();
        assert!(FileJobStore::open(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn no_temp_file_left_behind() {
        let path = temp_path("tmpclean");
        let store = FileJobStore::open(&path).unwrap();
        let snap = JobSnapshot::new("j1", JobKind::Workflow, JobParams::default(), 0);
        store.save(&snap).unwrap();
        assert!(!path.with_extension("tmp").exists());
        std::fs::remove_file(&path).ok();
    }
}
