//! Remote job API access
//!
//! The core abstraction is the [`JobApi`] trait: the four HTTP operations a job
//! needs (submit, status, log, result transfer). The manager only ever talks to
//! the service through it, so pollers can be driven by a scripted implementation
//! in tests.
//!
//! - [`JobClient`]: reqwest implementation against the `/api/*` endpoints
//!
//! ## Usage
//!
//! ```no_run
//! use fetchy_dl::client::{JobApi, JobClient};
//! use fetchy_dl::config::ApiConfig;
//! use fetchy_dl::types::JobRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JobClient::new(&ApiConfig::default())?;
//!
//!     let job_id = client.submit(&JobRequest::new("https://example.com/watch?v=1")).await?;
//!     let status = client.poll_once(&job_id).await?;
//!     println!("{}: {:.0}%", status.status.as_str(), status.progress * 100.0);
//!     Ok(())
//! }
//! ```

mod http;
mod traits;
mod transfer;

pub use http::JobClient;
pub use traits::JobApi;
pub use transfer::partial_path;
