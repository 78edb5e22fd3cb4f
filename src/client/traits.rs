//! The job API seam

use crate::error::JobError;
use crate::types::{JobId, JobRequest, RemoteJobStatus};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Operations against the remote job service
///
/// Implementations are stateless with respect to jobs and never retry; retry
/// policy belongs to the poller.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Submit a new job and return the server-issued id
    ///
    /// Fails with [`JobError::Submission`] when the service answers outside
    /// 200-299 or the body carries no job id, and with [`JobError::Network`]
    /// when no response arrives at all.
    async fn submit(&self, request: &JobRequest) -> Result<JobId, JobError>;

    /// Fetch one status snapshot
    ///
    /// Transport and decode failures are [`JobError::Network`].
    async fn poll_once(&self, job_id: &JobId) -> Result<RemoteJobStatus, JobError>;

    /// Fetch the diagnostic log of a job
    ///
    /// Best-effort: callers log and ignore failures.
    async fn fetch_log(&self, job_id: &JobId) -> Result<String, JobError>;

    /// Stream the result file of a finished job to `destination`
    ///
    /// Sends the received fraction on `progress` as bytes arrive, but only when
    /// the expected size is known. Any pre-existing file at `destination` is
    /// replaced only once the whole body has been written; on failure or when
    /// `cancel` fires no partial file is left behind and the destination is
    /// untouched. Returns the number of bytes written.
    async fn transfer(
        &self,
        job_id: &JobId,
        destination: &Path,
        progress: &watch::Sender<f64>,
        cancel: &CancellationToken,
    ) -> Result<u64, JobError>;
}
