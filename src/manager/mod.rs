//! Job registry and per-job orchestration, split into focused submodules.
//!
//! The [`FetchManager`] struct and its methods are organized by domain:
//! - [`control`] - Registry queries, cancellation, removal and shutdown
//! - [`history`] - Read/delete access to recorded job outcomes
//! - [`poller`] - The submit/poll/transfer state machine of a single job
//! - [`progress`] - Combined-progress arithmetic and the throttled publisher
//! - [`task`] - Task state and the [`TaskHandle`] observers hold
//! - [`destination`] - Where result files land

mod control;
mod destination;
mod history;
mod poller;
mod progress;
mod task;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use destination::{DestinationPolicy, DownloadDirPolicy};
use destination::DestinationClaims;
pub use task::TaskHandle;

use crate::client::{JobApi, JobClient};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{Event, JobRequest, TaskId};
use poller::{PollerContext, run_poller};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use task::Task;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Live task collection and admission state
#[derive(Clone)]
pub(crate) struct Registry {
    /// Tasks in insertion order; entries stay after they finish until removed
    pub(crate) tasks: Arc<tokio::sync::Mutex<Vec<TaskHandle>>>,
    /// Next task id
    pub(crate) next_id: Arc<AtomicU64>,
    /// Cap on simultaneously running jobs, if configured
    pub(crate) concurrent_limit: Option<Arc<tokio::sync::Semaphore>>,
    /// Cleared by shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Result paths held by tasks that have not finished yet
    pub(crate) claims: DestinationClaims,
}

/// Main entry point (cloneable - all fields are Arc-wrapped)
///
/// Owns the set of live tasks, hands each one to its own poller, and exposes
/// the history store to the presentation layer.
#[derive(Clone)]
pub struct FetchManager {
    /// History store
    ///
    /// Public for integration tests and for embedders that query history directly
    pub db: Arc<Database>,
    pub(crate) api: Arc<dyn JobApi>,
    pub(crate) config: Arc<Config>,
    pub(crate) destinations: Arc<dyn DestinationPolicy>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) registry: Registry,
}

impl FetchManager {
    /// Create a manager talking to the service in `config.api`
    ///
    /// Validates the configuration, creates the download directory, opens
    /// (and migrates) the history database and builds the HTTP client.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let db = Database::from_config(&config.persistence).await?;
        let api = JobClient::new(&config.api)?;

        tracing::info!(
            base_url = %config.api.base_url,
            download_dir = %config.download.download_dir.display(),
            database = %config.persistence.database_path.display(),
            "Fetch manager initialized"
        );

        Ok(Self::with_api(config, Arc::new(api), Arc::new(db)))
    }

    /// Create a manager from already-built services
    ///
    /// Results land in `config.download.download_dir` through a
    /// [`DownloadDirPolicy`]; replace it with
    /// [`with_destination_policy`](FetchManager::with_destination_policy).
    pub fn with_api(config: Config, api: Arc<dyn JobApi>, db: Arc<Database>) -> Self {
        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let destinations: Arc<dyn DestinationPolicy> =
            Arc::new(DownloadDirPolicy::new(config.download.download_dir.clone()));

        let concurrent_limit = config
            .download
            .max_concurrent_jobs
            .filter(|limit| *limit > 0)
            .map(|limit| Arc::new(tokio::sync::Semaphore::new(limit)));

        let registry = Registry {
            tasks: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            concurrent_limit,
            accepting_new: Arc::new(AtomicBool::new(true)),
            claims: DestinationClaims::default(),
        };

        Self {
            db,
            api,
            config: Arc::new(config),
            destinations,
            event_tx,
            registry,
        }
    }

    /// Replace the destination policy used for tasks added from now on
    #[must_use]
    pub fn with_destination_policy(mut self, policy: Arc<dyn DestinationPolicy>) -> Self {
        self.destinations = policy;
        self
    }

    /// Subscribe to task events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls more than 1000 events behind receives `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fetchy_dl::{FetchManager, Config, Event};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let manager = FetchManager::new(Config::default()).await?;
    ///
    ///     let mut events = manager.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             if let Event::Finished { id, phase, .. } = event {
    ///                 println!("task {} ended {}", id, phase);
    ///             }
    ///         }
    ///     });
    ///
    ///     manager.add_url("https://example.com/watch?v=1").await?;
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Add a download and start it immediately
    ///
    /// The task is appended to the registry in the `Queued` phase and its
    /// poller is spawned before this returns. With a concurrency cap the task
    /// waits in `Queued` for a free slot and can be cancelled while waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once [`shutdown`](FetchManager::shutdown) started.
    pub async fn add_download(&self, request: JobRequest) -> Result<TaskHandle> {
        let handle = {
            let mut tasks = self.registry.tasks.lock().await;
            if !self.registry.accepting_new.load(Ordering::SeqCst) {
                return Err(Error::ShuttingDown);
            }

            let id = TaskId(self.registry.next_id.fetch_add(1, Ordering::SeqCst));
            let handle = TaskHandle::new(Arc::new(Task::new(id, request)));
            tasks.push(handle.clone());
            handle
        };

        tracing::info!(
            task_id = %handle.id(),
            url = %handle.request().url,
            audio_only = handle.request().audio_only,
            format = %handle.request().format,
            "Download added"
        );
        self.emit_event(Event::TaskAdded {
            id: handle.id(),
            url: handle.request().url.clone(),
        });

        tokio::spawn(run_poller(handle.task.clone(), self.poller_context()));

        Ok(handle)
    }

    /// [`add_download`](FetchManager::add_download) with the configured request defaults
    pub async fn add_url(&self, url: impl Into<String>) -> Result<TaskHandle> {
        self.add_download(JobRequest::with_defaults(url, &self.config.defaults))
            .await
    }

    fn poller_context(&self) -> PollerContext {
        PollerContext {
            api: self.api.clone(),
            db: self.db.clone(),
            config: self.config.clone(),
            destinations: self.destinations.clone(),
            event_tx: self.event_tx.clone(),
            concurrent_limit: self.registry.concurrent_limit.clone(),
            claims: self.registry.claims.clone(),
        }
    }
}
