//! Job Orchestrator Implementation

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use metrics::{counter, gauge};
use futures::{Stream, StreamExt};
use storage::{JobRecord, JobRepository, JobStatus, StorageError};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use video_analysis::{AnalysisPipeline, CancelFlag, ProgressBus};
use video_sampler::VideoSource;

use crate::JobError;

/// Analysis level used when a start request does not name one
pub const DEFAULT_ANALYSIS_LEVEL: u8 = 2;

const SUPPORTED_LEVELS: std::ops::RangeInclusive<u8> = 1..=3;

/// Handles of a running analysis
#[derive(Debug, Clone)]
struct ActiveRun {
    cancel: CancelFlag,
    progress: ProgressBus,
}

type ActiveRuns = Arc<Mutex<HashMap<String, ActiveRun>>>;

/// Starts analyses as background tasks and keeps the job ledger current.
///
/// At most one pipeline runs per job id. Job records are only written here;
/// everyone else reads snapshots.
pub struct JobOrchestrator<V: VideoSource> {
    repository: Arc<dyn JobRepository>,
    pipeline: Arc<AnalysisPipeline<V>>,
    uploads_dir: PathBuf,
    active: ActiveRuns,
}

impl<V: VideoSource> JobOrchestrator<V> {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        pipeline: Arc<AnalysisPipeline<V>>,
        uploads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repository,
            pipeline,
            uploads_dir: uploads_dir.into(),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stream an uploaded video to disk and create its `uploaded` job.
    ///
    /// The body is written chunk by chunk, so memory use does not depend on
    /// the upload size. Nothing is left on disk when the upload fails.
    pub async fn store_upload<S, B, E>(
        &self,
        file_name: &str,
        chunks: S,
        max_bytes: u64,
        uploaded_by: Option<String>,
    ) -> Result<JobRecord, JobError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let video_id = Uuid::new_v4().to_string();
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_else(|| ".mp4".to_string());
        let stored_file_name = format!("{}{}", video_id, extension);
        let path = self.uploads_dir.join(&stored_file_name);

        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .map_err(|e| JobError::Upload(e.to_string()))?;

        let size = match write_upload(&path, chunks, max_bytes).await {
            Ok(0) => Err(JobError::EmptyUpload),
            other => other,
        };
        let size = match size {
            Ok(size) => size,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    debug!("No partial upload to remove at {}: {}", path.display(), rm);
                }
                warn!("Upload of {} rejected: {}", file_name, e);
                return Err(e);
            }
        };

        let file_name = if file_name.trim().is_empty() {
            stored_file_name.clone()
        } else {
            file_name.to_string()
        };
        let mut job = JobRecord::uploaded(&video_id, file_name, stored_file_name, path.to_string_lossy(), size);
        job.uploaded_by = uploaded_by;

        let stored = job.clone();
        if let Err(e) = persist(&self.repository, move |repo| repo.put(stored)).await {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                warn!("Could not remove unregistered upload {}: {}", path.display(), rm);
            }
            return Err(e);
        }
        counter!("videos_uploaded_total").increment(1);

        info!("Stored upload {} ({} bytes) as {}", job.file_name, job.size, video_id);
        Ok(job)
    }

    /// Start analysing a job's video in the background.
    ///
    /// Rejected when the job is unknown, its file is gone, or it is already
    /// processing. Completed and failed jobs may be started again.
    pub async fn start(&self, video_id: &str, analysis_level: Option<u8>) -> Result<JobRecord, JobError> {
        let level = analysis_level.unwrap_or(DEFAULT_ANALYSIS_LEVEL);
        if !SUPPORTED_LEVELS.contains(&level) {
            return Err(JobError::InvalidAnalysisLevel(level));
        }

        let job = self
            .repository
            .get(video_id)?
            .ok_or_else(|| JobError::NotFound(video_id.to_string()))?;

        let path = PathBuf::from(&job.video_path);
        if !path.is_file() {
            return Err(JobError::VideoMissing(video_id.to_string()));
        }

        let run = ActiveRun {
            cancel: CancelFlag::new(),
            progress: ProgressBus::default(),
        };
        {
            let mut active = self.lock_active();
            if active.contains_key(video_id) || job.status == JobStatus::Processing {
                return Err(JobError::Conflict(video_id.to_string()));
            }
            active.insert(video_id.to_string(), run.clone());
        }

        let id = video_id.to_string();
        let updated = persist(&self.repository, move |repo| {
            repo.update(&id, &mut |job| {
                job.status = JobStatus::Processing;
                job.progress = 0;
                job.analysis_level = Some(level);
                job.started_at = Some(Utc::now());
                job.completed_at = None;
                job.error = None;
                job.result = None;
            })
        })
        .await;
        let updated = match updated {
            Ok(job) => job,
            Err(e) => {
                self.lock_active().remove(video_id);
                return Err(e);
            }
        };

        counter!("jobs_started_total").increment(1);
        gauge!("jobs_active").increment(1.0);
        info!("Starting analysis of {} (level {})", video_id, level);

        tokio::spawn(drive(
            Arc::clone(&self.repository),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.active),
            video_id.to_string(),
            path,
            run,
        ));

        Ok(updated)
    }

    /// Current snapshot of a job
    pub fn status(&self, video_id: &str) -> Result<JobRecord, JobError> {
        self.repository
            .get(video_id)?
            .ok_or_else(|| JobError::NotFound(video_id.to_string()))
    }

    /// All jobs, newest first
    pub fn list(&self) -> Result<Vec<JobRecord>, JobError> {
        Ok(self.repository.list()?)
    }

    /// Ask a running analysis to stop at the next sample boundary
    pub fn cancel(&self, video_id: &str) -> Result<(), JobError> {
        if let Some(run) = self.lock_active().get(video_id) {
            info!("Cancellation requested for {}", video_id);
            run.cancel.cancel();
            return Ok(());
        }
        match self.repository.get(video_id)? {
            Some(_) => Err(JobError::NotProcessing(video_id.to_string())),
            None => Err(JobError::NotFound(video_id.to_string())),
        }
    }

    /// Live progress of a running analysis
    pub fn subscribe(&self, video_id: &str) -> Option<broadcast::Receiver<u8>> {
        self.lock_active().get(video_id).map(|run| run.progress.subscribe())
    }

    /// Number of analyses currently running
    pub fn active_count(&self) -> usize {
        self.lock_active().len()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveRun>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Copy `chunks` into a new file at `path`, failing once `max_bytes` is exceeded
async fn write_upload<S, B, E>(path: &Path, chunks: S, max_bytes: u64) -> Result<u64, JobError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| JobError::Upload(e.to_string()))?;

    let mut size: u64 = 0;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| JobError::Upload(e.to_string()))?;
        let bytes = chunk.as_ref();
        size += bytes.len() as u64;
        if size > max_bytes {
            return Err(JobError::UploadTooLarge(max_bytes));
        }
        file.write_all(bytes)
            .await
            .map_err(|e| JobError::Upload(e.to_string()))?;
    }

    file.flush().await.map_err(|e| JobError::Upload(e.to_string()))?;
    Ok(size)
}

/// Run a repository write on the blocking pool; file-backed stores do disk I/O
async fn persist<T, F>(repository: &Arc<dyn JobRepository>, op: F) -> Result<T, JobError>
where
    F: FnOnce(&dyn JobRepository) -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let repository = Arc::clone(repository);
    tokio::task::spawn_blocking(move || op(repository.as_ref()))
        .await
        .map_err(|e| JobError::Worker(e.to_string()))?
        .map_err(JobError::from)
}

/// Background task: run the pipeline and write the terminal job state
async fn drive<V: VideoSource>(
    repository: Arc<dyn JobRepository>,
    pipeline: Arc<AnalysisPipeline<V>>,
    active: ActiveRuns,
    video_id: String,
    path: PathBuf,
    run: ActiveRun,
) {
    let recorder = tokio::spawn(record_progress(
        Arc::clone(&repository),
        video_id.clone(),
        run.progress.subscribe(),
    ));

    let outcome = pipeline.run(&video_id, &path, &run.progress, &run.cancel).await;

    // Dropping every bus handle lets the recorder drain and stop
    active
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .remove(&video_id);
    drop(run);
    if let Err(e) = recorder.await {
        warn!("Progress recorder for {} failed: {}", video_id, e);
    }
    gauge!("jobs_active").decrement(1.0);

    let id = video_id.clone();
    let written = match outcome {
        Ok(result) => {
            counter!("jobs_completed_total").increment(1);
            persist(&repository, move |repo| {
                let mut result = Some(result);
                repo.update(&id, &mut |job| {
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    job.result = result.take();
                    job.error = None;
                    job.completed_at = Some(Utc::now());
                })
            })
            .await
        }
        Err(e) => {
            counter!("jobs_failed_total").increment(1);
            error!("Analysis of {} failed: {}", video_id, e);
            let message = e.to_string();
            persist(&repository, move |repo| {
                repo.update(&id, &mut |job| {
                    job.status = JobStatus::Failed;
                    job.error = Some(message.clone());
                    job.result = None;
                    job.completed_at = Some(Utc::now());
                })
            })
            .await
        }
    };

    match written {
        Ok(job) => info!("Job {} finished as {:?}", video_id, job.status),
        Err(e) => error!("Failed to persist final state of {}: {}", video_id, e),
    }
}

/// Persist progress while the job is processing, never moving it backwards
async fn record_progress(repository: Arc<dyn JobRepository>, video_id: String, mut rx: broadcast::Receiver<u8>) {
    loop {
        let pct = match rx.recv().await {
            Ok(pct) => pct.min(100),
            Err(RecvError::Lagged(skipped)) => {
                debug!("Progress recorder for {} skipped {} updates", video_id, skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match repository.get(&video_id) {
            Ok(Some(job)) if job.status == JobStatus::Processing && pct > job.progress => {}
            Ok(_) => continue,
            Err(e) => {
                warn!("Failed to read job {}: {}", video_id, e);
                continue;
            }
        }

        let id = video_id.clone();
        let written = persist(&repository, move |repo| {
            repo.update(&id, &mut |job| {
                if job.status == JobStatus::Processing && pct > job.progress {
                    job.progress = pct;
                }
            })
        })
        .await;
        if let Err(e) = written {
            warn!("Failed to persist progress of {}: {}", video_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dms::{DmsConfig, FrameAnalyzer, ScriptedDetector};
    use std::time::Duration;
    use storage::InMemoryRepository;
    use video_analysis::RiskLevel;
    use video_sampler::ScriptedSource;

    struct Harness {
        orchestrator: JobOrchestrator<ScriptedSource>,
        dir: tempfile::TempDir,
    }

    fn harness(source: ScriptedSource, detector: ScriptedDetector) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = FrameAnalyzer::new(DmsConfig::default(), Arc::new(detector));
        let pipeline = AnalysisPipeline::new(source, Arc::new(analyzer));
        let orchestrator = JobOrchestrator::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(pipeline),
            dir.path().join("videos"),
        );
        Harness { orchestrator, dir }
    }

    fn chunks(data: &'static [u8]) -> impl Stream<Item = Result<&'static [u8], std::io::Error>> {
        futures::stream::iter(data.chunks(4).map(Ok).collect::<Vec<_>>())
    }

    async fn wait_terminal(orchestrator: &JobOrchestrator<ScriptedSource>, video_id: &str) -> JobRecord {
        for _ in 0..500 {
            let job = orchestrator.status(video_id).unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", video_id);
    }

    #[tokio::test]
    async fn test_upload_creates_job() {
        let h = harness(ScriptedSource::new(1.0, 25.0), ScriptedDetector::no_face());
        let job = h
            .orchestrator
            .store_upload("Night Drive.MOV", chunks(b"fake video"), u64::MAX, Some("user-7".into()))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Uploaded);
        assert_eq!(job.progress, 0);
        assert_eq!(job.size, 10);
        assert_eq!(job.file_name, "Night Drive.MOV");
        assert!(job.stored_file_name.ends_with(".mov"));
        assert_eq!(job.uploaded_by.as_deref(), Some("user-7"));
        assert!(Path::new(&job.video_path).is_file());
    }

    #[tokio::test]
    async fn test_rejected_uploads_leave_no_file() {
        let h = harness(ScriptedSource::new(1.0, 25.0), ScriptedDetector::no_face());
        let uploads = h.dir.path().join("videos");

        let err = h
            .orchestrator
            .store_upload("big.mp4", chunks(b"0123456789abcdef"), 10, None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::UploadTooLarge(10)));

        let err = h
            .orchestrator
            .store_upload("empty.mp4", chunks(b""), 10, None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::EmptyUpload));

        let broken = futures::stream::iter(vec![
            Ok(&b"part"[..]),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
        ]);
        let err = h.orchestrator.store_upload("cut.mp4", broken, 1024, None).await.unwrap_err();
        assert!(matches!(err, JobError::Upload(msg) if msg.contains("client went away")));

        assert_eq!(std::fs::read_dir(&uploads).unwrap().count(), 0);
        assert!(h.orchestrator.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completed_job() {
        let h = harness(ScriptedSource::new(10.0, 30.0), ScriptedDetector::constant(0.15, 0.1));
        let job = h.orchestrator.store_upload("drive.mp4", chunks(b"x"), u64::MAX, None).await.unwrap();

        let started = h.orchestrator.start(&job.video_id, None).await.unwrap();
        assert_eq!(started.status, JobStatus::Processing);
        assert_eq!(started.analysis_level, Some(DEFAULT_ANALYSIS_LEVEL));

        let done = wait_terminal(&h.orchestrator, &job.video_id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.error.is_none());
        let result = done.result.unwrap();
        assert_eq!(result.id, job.video_id);
        assert_eq!(result.metrics.total_eyes_closed_events, 1);
        assert!(matches!(result.metrics.risk_level, RiskLevel::High | RiskLevel::Critical));
        assert_eq!(h.orchestrator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_marks_job_failed() {
        let source = ScriptedSource::new(10.0, 30.0).with_probe_error("Invalid data found when processing input");
        let h = harness(source, ScriptedDetector::constant(0.35, 0.1));
        let job = h.orchestrator.store_upload("broken.mp4", chunks(b"garbage"), u64::MAX, None).await.unwrap();

        h.orchestrator.start(&job.video_id, Some(1)).await.unwrap();
        let done = wait_terminal(&h.orchestrator, &job.video_id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.result.is_none());
        let error = done.error.unwrap();
        assert!(error.starts_with("Failed to probe video"));
        assert!(error.contains("Invalid data found"));
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_last_progress() {
        let source = ScriptedSource::new(10.0, 30.0).with_decode_error_at(25);
        let h = harness(source, ScriptedDetector::constant(0.15, 0.1));
        let job = h.orchestrator.store_upload("drive.mp4", chunks(b"x"), u64::MAX, None).await.unwrap();

        h.orchestrator.start(&job.video_id, None).await.unwrap();
        let done = wait_terminal(&h.orchestrator, &job.video_id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.result.is_none());
        assert!(done.progress < 100);
        assert!(done.error.unwrap().starts_with("Failed to decode video"));
    }

    #[tokio::test]
    async fn test_start_rejections() {
        let source = ScriptedSource::new(10.0, 30.0).with_frame_delay(Duration::from_millis(20));
        let h = harness(source, ScriptedDetector::constant(0.35, 0.1));

        assert!(matches!(h.orchestrator.start("unknown", None).await, Err(JobError::NotFound(_))));

        let job = h.orchestrator.store_upload("drive.mp4", chunks(b"x"), u64::MAX, None).await.unwrap();
        assert!(matches!(
            h.orchestrator.start(&job.video_id, Some(7)).await,
            Err(JobError::InvalidAnalysisLevel(7))
        ));

        h.orchestrator.start(&job.video_id, None).await.unwrap();
        assert!(matches!(h.orchestrator.start(&job.video_id, None).await, Err(JobError::Conflict(_))));
        assert_eq!(h.orchestrator.active_count(), 1);

        h.orchestrator.cancel(&job.video_id).unwrap();
        wait_terminal(&h.orchestrator, &job.video_id).await;
    }

    #[tokio::test]
    async fn test_missing_video_file() {
        let h = harness(ScriptedSource::new(1.0, 25.0), ScriptedDetector::no_face());
        let job = h.orchestrator.store_upload("drive.mp4", chunks(b"x"), u64::MAX, None).await.unwrap();
        std::fs::remove_file(&job.video_path).unwrap();

        assert!(matches!(
            h.orchestrator.start(&job.video_id, None).await,
            Err(JobError::VideoMissing(_))
        ));
        assert_eq!(h.orchestrator.status(&job.video_id).unwrap().status, JobStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let source = ScriptedSource::new(10.0, 30.0).with_frame_delay(Duration::from_millis(20));
        let h = harness(source, ScriptedDetector::constant(0.35, 0.1));
        let job = h.orchestrator.store_upload("drive.mp4", chunks(b"x"), u64::MAX, None).await.unwrap();

        h.orchestrator.start(&job.video_id, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.orchestrator.cancel(&job.video_id).unwrap();

        let done = wait_terminal(&h.orchestrator, &job.video_id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("Analysis cancelled"));
        assert!(done.result.is_none());

        assert!(matches!(
            h.orchestrator.cancel(&job.video_id),
            Err(JobError::NotProcessing(_))
        ));
        assert!(matches!(h.orchestrator.cancel("unknown"), Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let source = ScriptedSource::new(4.0, 25.0).with_frame_delay(Duration::from_millis(5));
        let h = harness(source, ScriptedDetector::constant(0.35, 0.1));
        let job = h.orchestrator.store_upload("drive.mp4", chunks(b"x"), u64::MAX, None).await.unwrap();

        h.orchestrator.start(&job.video_id, None).await.unwrap();
        let mut rx = h.orchestrator.subscribe(&job.video_id).unwrap();

        let mut observed = vec![0u8];
        loop {
            let job = h.orchestrator.status(&job.video_id).unwrap();
            observed.push(job.progress);
            if job.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(3)).await;
        }

        assert!(observed.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(observed.last(), Some(&100));
        // Live subscribers see the same stream
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_restart_after_completion() {
        let h = harness(ScriptedSource::new(2.0, 25.0), ScriptedDetector::constant(0.35, 0.8));
        let job = h.orchestrator.store_upload("drive.mp4", chunks(b"x"), u64::MAX, None).await.unwrap();

        h.orchestrator.start(&job.video_id, None).await.unwrap();
        let first = wait_terminal(&h.orchestrator, &job.video_id).await;

        let restarted = h.orchestrator.start(&job.video_id, Some(3)).await.unwrap();
        assert_eq!(restarted.progress, 0);
        assert!(restarted.result.is_none());
        let second = wait_terminal(&h.orchestrator, &job.video_id).await;

        assert_eq!(second.analysis_level, Some(3));
        let (a, b) = (first.result.unwrap(), second.result.unwrap());
        assert_eq!(a.events, b.events);
        assert_eq!(a.metrics, b.metrics);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let h = harness(ScriptedSource::new(1.0, 25.0), ScriptedDetector::no_face());
        let first = h.orchestrator.store_upload("a.mp4", chunks(b"x"), u64::MAX, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = h.orchestrator.store_upload("b.mp4", chunks(b"x"), u64::MAX, None).await.unwrap();

        let ids: Vec<_> = h.orchestrator.list().unwrap().into_iter().map(|j| j.video_id).collect();
        assert_eq!(ids, vec![second.video_id, first.video_id]);
    }
}
