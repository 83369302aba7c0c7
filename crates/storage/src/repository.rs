//! Repository abstraction and in-memory implementation

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::{JobRecord, StorageError};

/// Keyed store of job records.
///
/// `update` is atomic with respect to other calls on the same repository,
/// so concurrent writers never lose each other's changes.
pub trait JobRepository: Send + Sync {
    fn get(&self, video_id: &str) -> Result<Option<JobRecord>, StorageError>;

    /// Insert or replace a record
    fn put(&self, job: JobRecord) -> Result<(), StorageError>;

    /// Apply `apply` to an existing record and return the stored result
    fn update(&self, video_id: &str, apply: &mut dyn FnMut(&mut JobRecord)) -> Result<JobRecord, StorageError>;

    /// All records, newest first
    fn list(&self) -> Result<Vec<JobRecord>, StorageError>;
}

/// Sort newest upload first
pub(crate) fn newest_first(jobs: &mut [JobRecord]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Job repository kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, JobRecord>>, StorageError> {
        self.jobs
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }
}

impl JobRepository for InMemoryRepository {
    fn get(&self, video_id: &str) -> Result<Option<JobRecord>, StorageError> {
        Ok(self.lock()?.get(video_id).cloned())
    }

    fn put(&self, job: JobRecord) -> Result<(), StorageError> {
        debug!("Storing job {} ({:?})", job.video_id, job.status);
        self.lock()?.insert(job.video_id.clone(), job);
        Ok(())
    }

    fn update(&self, video_id: &str, apply: &mut dyn FnMut(&mut JobRecord)) -> Result<JobRecord, StorageError> {
        let mut jobs = self.lock()?;
        let job = jobs
            .get_mut(video_id)
            .ok_or_else(|| StorageError::NotFound(video_id.to_string()))?;
        apply(job);
        Ok(job.clone())
    }

    fn list(&self) -> Result<Vec<JobRecord>, StorageError> {
        let mut jobs: Vec<_> = self.lock()?.values().cloned().collect();
        newest_first(&mut jobs);
        Ok(jobs)
    }
}
