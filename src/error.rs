//! Error types for fetchy-dl
//!
//! This module provides error handling for the library, including:
//! - The top-level [`Error`] returned by public operations
//! - [`DatabaseError`] for history-store lifecycle failures
//! - [`JobError`], the terminal failure taxonomy of a single download job

use thiserror::Error;

/// Result type alias for fetchy-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fetchy-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A download job reached a failed terminal state
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Task not found in the registry
    #[error("task not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Why a single job ended without a file on disk.
///
/// Every variant surfaces to observers as a terminal task state plus its
/// `Display` text; none is retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Remote service rejected the submission (bad URL, unsupported source, non-2xx)
    #[error("submission rejected: {message}")]
    Submission {
        /// HTTP status returned by the service, if a response was received
        status: Option<u16>,
        /// Reason reported by the service or the decoder
        message: String,
    },

    /// Transport failure or undecodable response during any call
    #[error("network failure: {0}")]
    Network(String),

    /// Remote service explicitly reported the job as failed
    #[error("{message}")]
    RemoteFailure {
        /// Message reported by the service
        message: String,
    },

    /// Poll attempt ceiling exceeded before a terminal remote status
    #[error("timed out after {attempts} status checks")]
    Timeout {
        /// Number of poll attempts made
        attempts: u32,
    },

    /// Writing the result file locally failed
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// User-initiated abort
    #[error("cancelled")]
    Cancelled,
}

impl JobError {
    /// Machine-readable code for this failure
    pub fn error_code(&self) -> &'static str {
        match self {
            JobError::Submission { .. } => "submission_rejected",
            JobError::Network(_) => "network_error",
            JobError::RemoteFailure { .. } => "remote_failure",
            JobError::Timeout { .. } => "timed_out",
            JobError::Transfer(_) => "transfer_error",
            JobError::Cancelled => "cancelled",
        }
    }

    /// True for user-initiated cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }
}

impl From<reqwest::Error> for JobError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            JobError::Network(format!("request timed out: {}", e))
        } else if e.is_connect() {
            JobError::Network(format!("connection failed: {}", e))
        } else {
            JobError::Network(e.to_string())
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_job_error_has_a_distinct_code() {
        let errors = [
            JobError::Submission {
                status: Some(400),
                message: "unsupported URL".into(),
            },
            JobError::Network("reset".into()),
            JobError::RemoteFailure {
                message: "extractor error".into(),
            },
            JobError::Timeout { attempts: 600 },
            JobError::Transfer("disk full".into()),
            JobError::Cancelled,
        ];

        let mut codes: Vec<&str> = errors.iter().map(JobError::error_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len(), "error codes must be unique");
    }

    #[test]
    fn remote_failure_displays_the_remote_message_verbatim() {
        let err = JobError::RemoteFailure {
            message: "extractor error".into(),
        };
        assert_eq!(err.to_string(), "extractor error");
    }

    #[test]
    fn timeout_mentions_attempt_count() {
        let err = JobError::Timeout { attempts: 600 };
        assert!(err.to_string().contains("600"));
    }

    #[test]
    fn only_cancelled_reports_is_cancelled() {
        assert!(JobError::Cancelled.is_cancelled());
        assert!(!JobError::Network("x".into()).is_cancelled());
    }

    #[test]
    fn job_error_converts_into_top_level_error() {
        let err: Error = JobError::Transfer("short read".into()).into();
        assert!(matches!(err, Error::Job(JobError::Transfer(_))));
        assert!(err.to_string().contains("short read"));
    }

    #[test]
    fn config_error_display_includes_message() {
        let err = Error::Config {
            message: "max_attempts must be positive".into(),
            key: Some("polling.max_attempts".into()),
        };
        assert_eq!(
            err.to_string(),
            "configuration error: max_attempts must be positive"
        );
    }
}
