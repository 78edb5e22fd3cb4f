//! reqwest implementation of [`JobApi`]

use super::traits::JobApi;
use super::transfer::stream_to_file;
use crate::config::ApiConfig;
use crate::error::{Error, JobError, Result};
use crate::types::{JobId, JobRequest, RemoteJobStatus};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Body of a successful `POST /api/download`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
}

/// Body of `GET /api/log/{jobId}`
#[derive(Debug, Deserialize)]
struct LogResponse {
    #[serde(default)]
    log: String,
}

/// HTTP client for the remote job service
///
/// Holds two connection pools: one bounded by the per-request timeout for the
/// small JSON calls, one bounded by the whole-transfer timeout for result files.
///
/// # Examples
///
/// ```
/// use fetchy_dl::client::JobClient;
/// use fetchy_dl::config::ApiConfig;
///
/// let config = ApiConfig {
///     base_url: "https://jobs.example.com".to_string(),
///     ..ApiConfig::default()
/// };
/// let client = JobClient::new(&config).unwrap();
/// assert_eq!(client.base_url().as_str(), "https://jobs.example.com/");
/// ```
#[derive(Clone, Debug)]
pub struct JobClient {
    base_url: url::Url,
    client: reqwest::Client,
    transfer_client: reqwest::Client,
}

impl JobClient {
    /// Build a client for the service described by `config`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unusable base URL and [`Error::Network`]
    /// if the HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = url::Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", config.base_url, e),
            key: Some("api.base_url".to_string()),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config {
                message: format!("base URL '{}' cannot carry a path", config.base_url),
                key: Some("api.base_url".to_string()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let transfer_client = reqwest::Client::builder()
            .timeout(config.transfer_timeout)
            .build()?;

        Ok(Self {
            base_url,
            client,
            transfer_client,
        })
    }

    /// Base URL every endpoint is resolved against
    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    /// `{base}/api/{segments...}`, each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> url::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments.iter().copied());
        }
        url
    }
}

/// Pull a human-readable reason out of an error response body
fn rejection_message(status: reqwest::StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message", "detail"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(String::from))
        });

    from_json
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request rejected")
                .to_string()
        })
}

#[async_trait]
impl JobApi for JobClient {
    async fn submit(&self, request: &JobRequest) -> std::result::Result<JobId, JobError> {
        let url = self.endpoint(&["download"]);
        tracing::debug!(url = %request.url, endpoint = %url, "Submitting job");

        let response = self.client.post(url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Submission {
                status: Some(status.as_u16()),
                message: rejection_message(status, &body),
            });
        }

        let body: SubmitResponse = response.json().await.map_err(|e| JobError::Submission {
            status: Some(status.as_u16()),
            message: format!("response carried no job id: {}", e),
        })?;

        if body.job_id.trim().is_empty() {
            return Err(JobError::Submission {
                status: Some(status.as_u16()),
                message: "service returned an empty job id".to_string(),
            });
        }

        Ok(JobId(body.job_id))
    }

    async fn poll_once(&self, job_id: &JobId) -> std::result::Result<RemoteJobStatus, JobError> {
        let response = self
            .client
            .get(self.endpoint(&["status", job_id.as_str()]))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobError::Network(format!(
                "status check for job {} returned HTTP {}",
                job_id, status
            )));
        }

        response
            .json::<RemoteJobStatus>()
            .await
            .map_err(|e| JobError::Network(format!("undecodable status response: {}", e)))
    }

    async fn fetch_log(&self, job_id: &JobId) -> std::result::Result<String, JobError> {
        let response = self
            .client
            .get(self.endpoint(&["log", job_id.as_str()]))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobError::Network(format!(
                "log fetch for job {} returned HTTP {}",
                job_id, status
            )));
        }

        let body: LogResponse = response
            .json()
            .await
            .map_err(|e| JobError::Network(format!("undecodable log response: {}", e)))?;
        Ok(body.log)
    }

    async fn transfer(
        &self,
        job_id: &JobId,
        destination: &Path,
        progress: &watch::Sender<f64>,
        cancel: &CancellationToken,
    ) -> std::result::Result<u64, JobError> {
        let request = self
            .transfer_client
            .get(self.endpoint(&["download", job_id.as_str()]))
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
            response = request => response.map_err(|e| {
                JobError::Transfer(format!("request for job {} failed: {}", job_id, JobError::from(e)))
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(JobError::Transfer(format!(
                "result of job {} returned HTTP {}",
                job_id, status
            )));
        }

        let bytes = stream_to_file(response, job_id, destination, progress, cancel).await?;
        tracing::debug!(job_id = %job_id, bytes, path = %destination.display(), "Result file written");
        Ok(bytes)
    }
}
