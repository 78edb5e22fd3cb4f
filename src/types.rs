//! Core types for fetchy-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::RequestDefaults;

/// Server-issued identifier of a remote job
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Locally generated identifier of a task in the registry
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user asked the remote service to produce.
///
/// Serializes to the exact body of `POST /api/download`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// Source media URL
    pub url: String,
    /// Target resolution (e.g. "1080p")
    pub quality: String,
    /// Extract audio only
    pub audio_only: bool,
    /// Container or audio format (e.g. "mp4", "mp3")
    pub format: String,
    /// Audio bitrate in kbps, as the service expects it
    pub bitrate: String,
    /// Embed metadata tags
    pub embed_metadata: bool,
    /// Embed thumbnail artwork
    pub embed_thumbnail: bool,
    /// Strip sponsor segments
    pub remove_sponsors: bool,
    /// Embed subtitles
    pub embed_subtitles: bool,
    /// Embed chapter markers
    pub embed_chapters: bool,
}

impl JobRequest {
    /// Request for `url` using the built-in defaults
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_defaults(url, &RequestDefaults::default())
    }

    /// Request for `url` using the given defaults
    pub fn with_defaults(url: impl Into<String>, defaults: &RequestDefaults) -> Self {
        Self {
            url: url.into(),
            quality: defaults.quality.clone(),
            audio_only: false,
            format: defaults.format.clone(),
            bitrate: defaults.bitrate.clone(),
            embed_metadata: defaults.embed_metadata,
            embed_thumbnail: defaults.embed_thumbnail,
            remove_sponsors: defaults.remove_sponsors,
            embed_subtitles: defaults.embed_subtitles,
            embed_chapters: defaults.embed_chapters,
        }
    }

    /// Override the target resolution
    #[must_use]
    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    /// Switch to audio-only extraction with the given format and bitrate
    #[must_use]
    pub fn audio(mut self, format: impl Into<String>, bitrate: impl Into<String>) -> Self {
        self.audio_only = true;
        self.format = format.into();
        self.bitrate = bitrate.into();
        self
    }

    /// Override the container format
    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Toggle sponsor-segment removal
    #[must_use]
    pub fn remove_sponsors(mut self, enabled: bool) -> Self {
        self.remove_sponsors = enabled;
        self
    }

    /// Toggle subtitle embedding
    #[must_use]
    pub fn embed_subtitles(mut self, enabled: bool) -> Self {
        self.embed_subtitles = enabled;
        self
    }

    /// Toggle chapter embedding
    #[must_use]
    pub fn embed_chapters(mut self, enabled: bool) -> Self {
        self.embed_chapters = enabled;
        self
    }
}

/// Remote job status tag, decoded at the HTTP boundary.
///
/// Tags the service invents later land in [`RemoteStatus::Unrecognized`]
/// instead of silently aliasing "running".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemoteStatus {
    /// Waiting in the service's queue
    Queued,
    /// Extraction/conversion in progress
    Running,
    /// Result file is ready to fetch
    Completed,
    /// Service gave up on the job
    Failed,
    /// Any other tag, kept verbatim
    Unrecognized(String),
}

impl RemoteStatus {
    /// Whether this tag ends the polling phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Completed | RemoteStatus::Failed)
    }

    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            RemoteStatus::Queued => "queued",
            RemoteStatus::Running => "running",
            RemoteStatus::Completed => "completed",
            RemoteStatus::Failed => "failed",
            RemoteStatus::Unrecognized(tag) => tag,
        }
    }
}

impl From<String> for RemoteStatus {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "queued" => RemoteStatus::Queued,
            "running" => RemoteStatus::Running,
            "completed" => RemoteStatus::Completed,
            "failed" => RemoteStatus::Failed,
            _ => RemoteStatus::Unrecognized(tag),
        }
    }
}

impl From<RemoteStatus> for String {
    fn from(status: RemoteStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Snapshot returned by `GET /api/status/{jobId}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJobStatus {
    /// Status tag
    pub status: RemoteStatus,
    /// Fractional progress reported by the service
    #[serde(default)]
    pub progress: f64,
    /// Human-readable status message
    #[serde(default)]
    pub message: String,
    /// Where the service exposes the result
    #[serde(default)]
    pub download_url: Option<String>,
    /// Media title, once known
    #[serde(default)]
    pub title: Option<String>,
    /// Result filename, once known
    #[serde(default)]
    pub filename: Option<String>,
    /// Name of the extractor handling the URL
    #[serde(default)]
    pub extractor: Option<String>,
}

/// Local state-machine phase of a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Created, waiting to submit
    Queued,
    /// Submission request in flight
    Submitting,
    /// Waiting for the service to finish
    Polling,
    /// Fetching the result file
    Transferring,
    /// File is on disk
    Succeeded,
    /// Ended with an error
    Failed,
    /// Cancelled by the user or by shutdown
    Cancelled,
    /// Poll attempt ceiling exceeded
    TimedOut,
}

impl Phase {
    /// No further transitions happen from a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::Succeeded | Phase::Failed | Phase::Cancelled | Phase::TimedOut
        )
    }

    /// Short name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Queued => "queued",
            Phase::Submitting => "submitting",
            Phase::Polling => "polling",
            Phase::Transferring => "transferring",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::Cancelled => "cancelled",
            Phase::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of one task, as published to observers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Registry id
    pub id: TaskId,
    /// Current phase
    pub phase: Phase,
    /// Progress within the current phase (0.0 to 1.0, restarts at transfer)
    pub phase_progress: f64,
    /// Combined progress across polling and transfer (0.0 to 1.0, never regresses)
    pub progress: f64,
    /// Short uppercase status text
    pub status: String,
    /// Remote job id once submitted
    pub job_id: Option<JobId>,
    /// Title reported by the service, if any
    pub title: Option<String>,
    /// Final file location on success
    pub local_path: Option<PathBuf>,
    /// Failure reason on a failed terminal phase
    pub error: Option<String>,
}

impl TaskSnapshot {
    /// Initial snapshot of a freshly queued task
    pub fn queued(id: TaskId) -> Self {
        Self {
            id,
            phase: Phase::Queued,
            phase_progress: 0.0,
            progress: 0.0,
            status: "QUEUED".to_string(),
            job_id: None,
            title: None,
            local_path: None,
            error: None,
        }
    }
}

/// Terminal status stored with a history entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    /// Not started
    Pending,
    /// In flight when recorded
    Downloading,
    /// File delivered
    Completed,
    /// Job failed or timed out
    Failed,
    /// Cancelled by the user
    Cancelled,
    /// Interrupted by the host (shutdown)
    Aborted,
}

impl HistoryStatus {
    /// Column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Pending => "pending",
            HistoryStatus::Downloading => "downloading",
            HistoryStatus::Completed => "completed",
            HistoryStatus::Failed => "failed",
            HistoryStatus::Cancelled => "cancelled",
            HistoryStatus::Aborted => "aborted",
        }
    }
}

impl std::str::FromStr for HistoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(HistoryStatus::Pending),
            "downloading" => Ok(HistoryStatus::Downloading),
            "completed" => Ok(HistoryStatus::Completed),
            "failed" => Ok(HistoryStatus::Failed),
            "cancelled" => Ok(HistoryStatus::Cancelled),
            "aborted" => Ok(HistoryStatus::Aborted),
            other => Err(format!("unknown history status '{}'", other)),
        }
    }
}

/// Durable record of one job outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique identifier
    pub id: Uuid,
    /// Display title
    pub title: String,
    /// Source URL
    pub url: String,
    /// Service label (extractor or host)
    pub service: String,
    /// When the outcome was recorded
    pub created_at: DateTime<Utc>,
    /// Terminal status
    pub status: HistoryStatus,
    /// Local file path on success
    pub local_path: Option<PathBuf>,
}

impl HistoryEntry {
    /// New entry stamped with a fresh id and the current time
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        service: impl Into<String>,
        status: HistoryStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            url: url.into(),
            service: service.into(),
            created_at: Utc::now(),
            status,
            local_path: None,
        }
    }

    /// Attach the local file path
    #[must_use]
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Override the creation time
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

/// Event emitted during a task's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task appended to the registry
    TaskAdded {
        /// Task ID
        id: TaskId,
        /// Source URL
        url: String,
    },

    /// Task moved to a new phase
    PhaseChanged {
        /// Task ID
        id: TaskId,
        /// New phase
        phase: Phase,
        /// Status text at the transition
        status: String,
    },

    /// Throttled progress update
    Progress {
        /// Task ID
        id: TaskId,
        /// Current phase
        phase: Phase,
        /// Combined progress (0.0 to 1.0)
        progress: f64,
    },

    /// Task reached a terminal phase
    Finished {
        /// Task ID
        id: TaskId,
        /// Terminal phase
        phase: Phase,
        /// File location on success
        local_path: Option<PathBuf>,
        /// Failure reason otherwise
        error: Option<String>,
    },

    /// Task removed from the registry
    TaskRemoved {
        /// Task ID
        id: TaskId,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_request_serializes_to_wire_field_names() {
        let request = JobRequest::new("https://example.com/watch?v=1")
            .audio("mp3", "320")
            .remove_sponsors(true);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["url"], "https://example.com/watch?v=1");
        assert_eq!(json["audioOnly"], true);
        assert_eq!(json["format"], "mp3");
        assert_eq!(json["bitrate"], "320");
        assert_eq!(json["embedMetadata"], true);
        assert_eq!(json["embedThumbnail"], true);
        assert_eq!(json["removeSponsors"], true);
        assert_eq!(json["embedSubtitles"], false);
        assert_eq!(json["embedChapters"], false);
        assert_eq!(json["quality"], "1080p");
    }

    #[test]
    fn remote_status_decodes_known_and_unknown_tags() {
        let body = r#"{"status":"completed","progress":1.0,"message":"done","filename":"a.mp4"}"#;
        let status: RemoteJobStatus = serde_json::from_str(body).unwrap();
        assert_eq!(status.status, RemoteStatus::Completed);
        assert_eq!(status.filename.as_deref(), Some("a.mp4"));
        assert!(status.title.is_none());

        let body = r#"{"status":"complete","progress":0.4,"message":"?"}"#;
        let status: RemoteJobStatus = serde_json::from_str(body).unwrap();
        assert_eq!(
            status.status,
            RemoteStatus::Unrecognized("complete".to_string())
        );
        assert!(!status.status.is_terminal());
    }

    #[test]
    fn remote_status_tolerates_missing_optional_fields() {
        let status: RemoteJobStatus = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(status.status, RemoteStatus::Queued);
        assert_eq!(status.progress, 0.0);
        assert!(status.message.is_empty());
    }

    #[test]
    fn history_status_parses_every_column_value() {
        for status in [
            HistoryStatus::Pending,
            HistoryStatus::Downloading,
            HistoryStatus::Completed,
            HistoryStatus::Failed,
            HistoryStatus::Cancelled,
            HistoryStatus::Aborted,
        ] {
            assert_eq!(status.as_str().parse::<HistoryStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<HistoryStatus>().is_err());
    }

    #[test]
    fn terminal_phases() {
        assert!(Phase::Succeeded.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Cancelled.is_terminal());
        assert!(Phase::TimedOut.is_terminal());
        assert!(!Phase::Polling.is_terminal());
        assert!(!Phase::Transferring.is_terminal());
    }
}
