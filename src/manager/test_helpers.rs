//! Shared test helpers: a scripted job service and manager construction.

use crate::client::JobApi;
use crate::config::Config;
use crate::db::Database;
use crate::error::JobError;
use crate::manager::FetchManager;
use crate::types::{JobId, JobRequest, RemoteJobStatus, RemoteStatus};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// What the fake does when asked for a result file
#[derive(Clone, Debug)]
pub(crate) enum TransferBehavior {
    /// Write `bytes` bytes, reporting progress in `steps` increments
    Write { bytes: usize, steps: usize },
    /// Fail with this error without touching the destination
    Fail(JobError),
    /// Never finish until cancelled
    Stall,
    /// Sleep (cancellably), then write `bytes` bytes in one go
    Delayed { delay: Duration, bytes: usize },
}

/// File body the fake writes for `job_id`: the id's bytes repeated to `len`
pub(crate) fn body_for(job_id: &JobId, len: usize) -> Vec<u8> {
    job_id.as_str().bytes().cycle().take(len).collect()
}

async fn write_result(job_id: &JobId, destination: &Path, bytes: usize) -> u64 {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(destination, body_for(job_id, bytes))
        .await
        .unwrap();
    bytes as u64
}

/// Build a status snapshot
pub(crate) fn status(tag: RemoteStatus, progress: f64, message: &str) -> RemoteJobStatus {
    RemoteJobStatus {
        status: tag,
        progress,
        message: message.to_string(),
        download_url: None,
        title: None,
        filename: None,
        extractor: None,
    }
}

/// A `completed` snapshot carrying result metadata
pub(crate) fn completed(title: &str, filename: &str) -> RemoteJobStatus {
    RemoteJobStatus {
        title: Some(title.to_string()),
        filename: Some(filename.to_string()),
        extractor: Some("youtube".to_string()),
        ..status(RemoteStatus::Completed, 1.0, "Done")
    }
}

/// Job id the fake assigns to a request: `job-<last URL segment>`
pub(crate) fn job_id_for(url: &str) -> JobId {
    JobId(format!("job-{}", url.rsplit('/').next().unwrap_or(url)))
}

/// In-memory job service driven by per-job scripts
///
/// Each poll pops the next scripted response for the job; once the script is
/// exhausted the fake keeps answering `running`.
pub(crate) struct FakeJobApi {
    submit_error: Option<JobError>,
    scripts: Mutex<HashMap<JobId, VecDeque<Result<RemoteJobStatus, JobError>>>>,
    log: Option<String>,
    transfer: TransferBehavior,
    poll_delay: Duration,
    pub(crate) submit_calls: AtomicUsize,
    pub(crate) log_calls: AtomicUsize,
    pub(crate) transfer_calls: AtomicUsize,
    poll_calls: Mutex<HashMap<JobId, usize>>,
}

impl FakeJobApi {
    pub(crate) fn new() -> Self {
        Self {
            submit_error: None,
            scripts: Mutex::new(HashMap::new()),
            log: Some("[fake] remote log".to_string()),
            transfer: TransferBehavior::Write {
                bytes: 4096,
                steps: 8,
            },
            poll_delay: Duration::ZERO,
            submit_calls: AtomicUsize::new(0),
            log_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            poll_calls: Mutex::new(HashMap::new()),
        }
    }

    /// Script the poll responses of the job created for `url`
    pub(crate) fn script(
        self,
        url: &str,
        responses: Vec<Result<RemoteJobStatus, JobError>>,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(job_id_for(url), responses.into());
        self
    }

    pub(crate) fn rejecting_submissions(mut self, error: JobError) -> Self {
        self.submit_error = Some(error);
        self
    }

    pub(crate) fn with_log(mut self, log: Option<&str>) -> Self {
        self.log = log.map(String::from);
        self
    }

    pub(crate) fn with_transfer(mut self, behavior: TransferBehavior) -> Self {
        self.transfer = behavior;
        self
    }

    /// Delay every poll response, keeping a poll in flight for a while
    pub(crate) fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub(crate) fn poll_calls(&self, url: &str) -> usize {
        self.poll_calls
            .lock()
            .unwrap()
            .get(&job_id_for(url))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
            + self.poll_calls.lock().unwrap().values().sum::<usize>()
            + self.log_calls.load(Ordering::SeqCst)
            + self.transfer_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobApi for FakeJobApi {
    async fn submit(&self, request: &JobRequest) -> Result<JobId, JobError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match &self.submit_error {
            Some(error) => Err(error.clone()),
            None => Ok(job_id_for(&request.url)),
        }
    }

    async fn poll_once(&self, job_id: &JobId) -> Result<RemoteJobStatus, JobError> {
        *self
            .poll_calls
            .lock()
            .unwrap()
            .entry(job_id.clone())
            .or_insert(0) += 1;

        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Ok(status(RemoteStatus::Running, 0.5, "Downloading")))
    }

    async fn fetch_log(&self, _job_id: &JobId) -> Result<String, JobError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .clone()
            .ok_or_else(|| JobError::Network("log unavailable".to_string()))
    }

    async fn transfer(
        &self,
        job_id: &JobId,
        destination: &Path,
        progress: &watch::Sender<f64>,
        cancel: &CancellationToken,
    ) -> Result<u64, JobError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        match &self.transfer {
            TransferBehavior::Write { bytes, steps } => {
                let steps = (*steps).max(1);
                for step in 1..=steps {
                    if cancel.is_cancelled() {
                        return Err(JobError::Cancelled);
                    }
                    progress.send_replace(step as f64 / steps as f64);
                    tokio::task::yield_now().await;
                }
                Ok(write_result(job_id, destination, *bytes).await)
            }
            TransferBehavior::Delayed { delay, bytes } => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(JobError::Cancelled),
                    _ = tokio::time::sleep(*delay) => {}
                }
                progress.send_replace(1.0);
                Ok(write_result(job_id, destination, *bytes).await)
            }
            TransferBehavior::Fail(error) => Err(error.clone()),
            TransferBehavior::Stall => {
                cancel.cancelled().await;
                Err(JobError::Cancelled)
            }
        }
    }
}

/// Config tuned for fast tests, rooted in `dir`
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("history.sqlite");
    config.download.download_dir = dir.join("downloads");
    config.download.progress_throttle = Duration::from_millis(5);
    config.polling.interval = Duration::from_millis(2);
    config.polling.max_attempts = 100;
    config.api.log_fetch_timeout = Duration::from_secs(1);
    config
}

/// Helper to create a test manager backed by `api` and a temp database.
/// Returns the manager, the shared fake and the tempdir (which must be kept alive).
pub(crate) async fn create_test_manager(
    api: FakeJobApi,
) -> (FetchManager, Arc<FakeJobApi>, tempfile::TempDir) {
    create_test_manager_with(api, |_| {}).await
}

/// [`create_test_manager`] with a chance to adjust the config first
pub(crate) async fn create_test_manager_with(
    api: FakeJobApi,
    tweak: impl FnOnce(&mut Config),
) -> (FetchManager, Arc<FakeJobApi>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    tweak(&mut config);

    std::fs::create_dir_all(&config.download.download_dir).unwrap();
    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();

    let api = Arc::new(api);
    let manager = FetchManager::with_api(config, api.clone(), Arc::new(db));
    (manager, api, temp_dir)
}
