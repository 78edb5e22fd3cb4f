//! Configuration types for fetchy-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Remote job API connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the job service, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout for submit, status and log calls (default: 120s)
    #[serde(default = "default_request_timeout", with = "duration_millis_serde")]
    pub request_timeout: Duration,

    /// Whole-transfer timeout for fetching the result file (default: 300s)
    #[serde(default = "default_transfer_timeout", with = "duration_millis_serde")]
    pub transfer_timeout: Duration,

    /// Upper bound on the diagnostic log fetch at a terminal transition (default: 10s)
    #[serde(default = "default_log_fetch_timeout", with = "duration_millis_serde")]
    pub log_fetch_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            transfer_timeout: default_transfer_timeout(),
            log_fetch_timeout: default_log_fetch_timeout(),
        }
    }
}

/// Status polling behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between status checks (default: 500ms)
    #[serde(default = "default_poll_interval", with = "duration_millis_serde")]
    pub interval: Duration,

    /// Maximum status checks before giving up (default: 600, i.e. five minutes)
    #[serde(default = "default_max_poll_attempts")]
    pub max_attempts: u32,

    /// Consecutive failed status checks tolerated before the job fails (default: 10)
    ///
    /// Each failed check still consumes one attempt.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Treat a status tag outside the known vocabulary as a failure (default: false)
    ///
    /// When false the tag is logged and polling continues until the attempt ceiling.
    #[serde(default)]
    pub fail_on_unknown_status: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            max_attempts: default_max_poll_attempts(),
            max_consecutive_errors: default_max_consecutive_errors(),
            fail_on_unknown_status: false,
        }
    }
}

/// Local download behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory result files are written to (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Minimum spacing between observer-visible progress updates (default: 100ms)
    #[serde(default = "default_progress_throttle", with = "duration_millis_serde")]
    pub progress_throttle: Duration,

    /// Share of the combined progress bar given to the file transfer (default: 0.5)
    #[serde(default = "default_transfer_weight")]
    pub transfer_weight: f64,

    /// Cap on simultaneously running jobs (None = unlimited)
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            progress_throttle: default_progress_throttle(),
            transfer_weight: default_transfer_weight(),
            max_concurrent_jobs: None,
        }
    }
}

/// History store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./fetchy.sqlite")
    ///
    /// Point this at a location shared with any extension process that also submits jobs.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// How long a writer waits on a locked database (default: 5s)
    #[serde(default = "default_busy_timeout", with = "duration_millis_serde")]
    pub busy_timeout: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout: default_busy_timeout(),
        }
    }
}

/// Defaults applied by [`JobRequest::with_defaults`](crate::types::JobRequest::with_defaults)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestDefaults {
    /// Target resolution (default: "1080p")
    #[serde(default = "default_quality")]
    pub quality: String,

    /// Container format (default: "mp4")
    #[serde(default = "default_format")]
    pub format: String,

    /// Audio bitrate (default: "192")
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Embed metadata (default: true)
    #[serde(default = "default_true")]
    pub embed_metadata: bool,

    /// Embed thumbnail (default: true)
    #[serde(default = "default_true")]
    pub embed_thumbnail: bool,

    /// Remove sponsor segments (default: false)
    #[serde(default)]
    pub remove_sponsors: bool,

    /// Embed subtitles (default: false)
    #[serde(default)]
    pub embed_subtitles: bool,

    /// Embed chapters (default: false)
    #[serde(default)]
    pub embed_chapters: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            format: default_format(),
            bitrate: default_bitrate(),
            embed_metadata: true,
            embed_thumbnail: true,
            remove_sponsors: false,
            embed_subtitles: false,
            embed_chapters: false,
        }
    }
}

/// Main configuration for [`FetchManager`](crate::FetchManager)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote job API
    #[serde(default)]
    pub api: ApiConfig,

    /// Status polling
    #[serde(default)]
    pub polling: PollingConfig,

    /// Local downloads
    #[serde(default)]
    pub download: DownloadConfig,

    /// History store
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Request defaults
    #[serde(default)]
    pub defaults: RequestDefaults,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Reject settings the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(Error::Config {
                message: format!("invalid base URL '{}'", self.api.base_url),
                key: Some("api.base_url".to_string()),
            });
        }
        if self.polling.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("polling.max_attempts".to_string()),
            });
        }
        if !(0.0..=1.0).contains(&self.download.transfer_weight) {
            return Err(Error::Config {
                message: format!(
                    "transfer_weight must be within 0.0..=1.0, got {}",
                    self.download.transfer_weight
                ),
                key: Some("download.transfer_weight".to_string()),
            });
        }
        if self.download.max_concurrent_jobs == Some(0) {
            return Err(Error::Config {
                message: "max_concurrent_jobs must be at least 1 when set".to_string(),
                key: Some("download.max_concurrent_jobs".to_string()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_transfer_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_log_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_max_poll_attempts() -> u32 {
    600
}

fn default_max_consecutive_errors() -> u32 {
    10
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_progress_throttle() -> Duration {
    Duration::from_millis(100)
}

fn default_transfer_weight() -> f64 {
    0.5
}

fn default_database_path() -> PathBuf {
    PathBuf::from("fetchy.sqlite")
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_quality() -> String {
    "1080p".to_string()
}

fn default_format() -> String {
    "mp4".to_string()
}

fn default_bitrate() -> String {
    "192".to_string()
}

fn default_true() -> bool {
    true
}

// Millisecond Duration serialization helper
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
