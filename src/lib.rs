//! # fetchy-dl
//!
//! Backend library for apps that hand media URLs to a remote extraction
//! service and collect the resulting files.
//!
//! ## Design Philosophy
//!
//! fetchy-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Observers subscribe to task snapshots and events instead of polling
//! - **Bounded** - Every job ends in a terminal phase, with exactly one history entry
//!
//! A [`FetchManager`] keeps a registry of tasks. Each task is driven by its own
//! poller: submit the request, poll the remote job at a fixed interval, transfer
//! the result file, then record the outcome in a SQLite history store.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetchy_dl::{Config, FetchManager, JobRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.api.base_url = "http://192.168.1.20:8080".to_string();
//!
//!     let manager = FetchManager::new(config).await?;
//!
//!     let handle = manager
//!         .add_download(JobRequest::new("https://vimeo.com/123").audio("mp3", "192"))
//!         .await?;
//!
//!     let mut updates = handle.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let snapshot = updates.borrow_and_update().clone();
//!         println!("{} {:.0}% {}", snapshot.phase, snapshot.progress * 100.0, snapshot.status);
//!         if snapshot.phase.is_terminal() {
//!             break;
//!         }
//!     }
//!
//!     let finished = handle.wait().await;
//!     println!("saved to {:?}", finished.local_path);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP client for the remote job service
pub mod client;
/// Configuration types
pub mod config;
/// History persistence layer
pub mod db;
/// Error types
pub mod error;
/// Task registry and job orchestration (decomposed into focused submodules)
pub mod manager;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use client::{JobApi, JobClient};
pub use config::Config;
pub use db::Database;
pub use error::{DatabaseError, Error, JobError, Result};
pub use manager::{DestinationPolicy, DownloadDirPolicy, FetchManager, TaskHandle};
pub use types::{
    Event, HistoryEntry, HistoryStatus, JobId, JobRequest, Phase, RemoteJobStatus, RemoteStatus,
    TaskId, TaskSnapshot,
};

/// Helper function to run the manager with graceful signal handling.
///
/// Waits for a termination signal and then calls the manager's `shutdown()` method,
/// which cancels live tasks and records them as aborted.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use fetchy_dl::{FetchManager, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = FetchManager::new(Config::default()).await?;
///     manager.add_url("https://vimeo.com/123").await?;
///
///     run_with_shutdown(manager).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: FetchManager) -> Result<()> {
    wait_for_signal().await;
    manager.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
