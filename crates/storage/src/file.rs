//! JSON-file backed repository: one `<videoId>.json` per job

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::repository::newest_first;
use crate::{JobRecord, JobRepository, JobStatus, StorageError};

/// Error recorded on jobs a previous process left half-done
pub const INTERRUPTED_MESSAGE: &str = "analysis interrupted by a service restart";

/// Durable job ledger in a directory of JSON files.
///
/// Every record is cached in memory; writes go through to disk. `put` and
/// `update` block on file I/O while holding the cache lock, so async callers
/// run them on the blocking pool.
#[derive(Debug)]
pub struct JsonFileRepository {
    dir: PathBuf,
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl JsonFileRepository {
    /// Open (creating if needed) `dir` and load every record in it.
    ///
    /// Jobs persisted as `processing` have no task driving them any more and
    /// are marked failed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut jobs = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_record(&path) {
                Ok(job) => {
                    jobs.insert(job.video_id.clone(), job);
                }
                Err(e) => warn!("Skipping unreadable job file {}: {}", path.display(), e),
            }
        }

        let repo = Self {
            dir,
            jobs: Mutex::new(HashMap::new()),
        };

        for (_, mut job) in jobs {
            if job.status == JobStatus::Processing {
                warn!("Job {} was interrupted, marking failed", job.video_id);
                job.status = JobStatus::Failed;
                job.error = Some(INTERRUPTED_MESSAGE.to_string());
                job.completed_at = Some(Utc::now());
                repo.write(&mut job)?;
            }
            repo.lock()?.insert(job.video_id.clone(), job);
        }

        info!("Loaded {} jobs from {}", repo.lock()?.len(), repo.dir.display());
        Ok(repo)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, JobRecord>>, StorageError> {
        self.jobs
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    fn path_for(&self, video_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", video_id))
    }

    /// Stamp and persist a record via write-then-rename
    fn write(&self, job: &mut JobRecord) -> Result<(), StorageError> {
        job.updated_at = Some(Utc::now());
        let bytes = serde_json::to_vec_pretty(job)?;

        let path = self.path_for(&job.video_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!("Persisted job {} to {}", job.video_id, path.display());
        Ok(())
    }
}

fn load_record(path: &Path) -> Result<JobRecord, StorageError> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

impl JobRepository for JsonFileRepository {
    fn get(&self, video_id: &str) -> Result<Option<JobRecord>, StorageError> {
        Ok(self.lock()?.get(video_id).cloned())
    }

    fn put(&self, mut job: JobRecord) -> Result<(), StorageError> {
        let mut jobs = self.lock()?;
        self.write(&mut job)?;
        jobs.insert(job.video_id.clone(), job);
        Ok(())
    }

    fn update(&self, video_id: &str, apply: &mut dyn FnMut(&mut JobRecord)) -> Result<JobRecord, StorageError> {
        let mut jobs = self.lock()?;
        let mut job = jobs
            .get(video_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(video_id.to_string()))?;
        apply(&mut job);
        self.write(&mut job)?;
        jobs.insert(video_id.to_string(), job.clone());
        Ok(job)
    }

    fn list(&self) -> Result<Vec<JobRecord>, StorageError> {
        let mut jobs: Vec<_> = self.lock()?.values().cloned().collect();
        newest_first(&mut jobs);
        Ok(jobs)
    }
}
