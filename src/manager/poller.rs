//! Job state machine driving one task from submission to a terminal phase.
//!
//! Phases:
//! 1. Wait for a concurrency slot (only when a cap is configured)
//! 2. Submit the request
//! 3. Poll the remote status at a fixed interval, bounded by an attempt ceiling
//! 4. Transfer the result file
//! 5. Publish the terminal snapshot and write exactly one history entry

use super::destination::{ClaimedDestination, DestinationClaims, DestinationPolicy};
use super::progress::{clamp_fraction, combined_progress, spawn_progress_publisher};
use super::task::{CancelReason, Task};
use crate::client::JobApi;
use crate::config::Config;
use crate::db::Database;
use crate::error::JobError;
use crate::types::{
    Event, HistoryEntry, HistoryStatus, JobId, Phase, RemoteJobStatus, RemoteStatus, TaskSnapshot,
};
use crate::utils::{failure_title, labelled_title, service_label};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio_util::sync::CancellationToken;

/// Lines kept in a task's local journal
const JOURNAL_CAPACITY: usize = 200;

/// Shared services a poller needs, cloned out of the manager
#[derive(Clone)]
pub(crate) struct PollerContext {
    pub(crate) api: Arc<dyn JobApi>,
    pub(crate) db: Arc<Database>,
    pub(crate) config: Arc<Config>,
    pub(crate) destinations: Arc<dyn DestinationPolicy>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) concurrent_limit: Option<Arc<Semaphore>>,
    pub(crate) claims: DestinationClaims,
}

/// A delivered result file
struct Delivery {
    path: PathBuf,
    bytes: u64,
    status: RemoteJobStatus,
}

/// Run `fut` unless `cancel` fires first
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, JobError>>,
) -> Result<T, JobError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobError::Cancelled),
        result = fut => result,
    }
}

/// Uppercase status line for a remote snapshot
fn remote_status_text(status: &RemoteJobStatus) -> String {
    let message = status.message.trim();
    if message.is_empty() {
        status.status.as_str().to_uppercase()
    } else {
        message.to_uppercase()
    }
}

/// Drive `task` to completion. Never fails: every outcome ends as a terminal
/// snapshot plus a history entry.
pub(crate) async fn run_poller(task: Arc<Task>, ctx: PollerContext) {
    let publisher = spawn_progress_publisher(
        task.clone(),
        ctx.event_tx.clone(),
        ctx.config.download.progress_throttle,
    );

    let mut poller = Poller {
        cancel: task.cancel_token(),
        task,
        ctx,
        journal: Vec::new(),
        job_id: None,
        remote: None,
        destination: None,
    };

    let result = match poller.acquire_slot().await {
        Ok(_permit) => poller.drive().await,
        Err(e) => Err(e),
    };

    publisher.abort();
    poller.finish(result).await;
}

struct Poller {
    task: Arc<Task>,
    ctx: PollerContext,
    cancel: CancellationToken,
    journal: Vec<String>,
    job_id: Option<JobId>,
    remote: Option<RemoteJobStatus>,
    /// Held until the history entry is written
    destination: Option<ClaimedDestination>,
}

impl Poller {
    fn note(&mut self, line: impl Into<String>) {
        if self.journal.len() == JOURNAL_CAPACITY {
            self.journal.remove(0);
        }
        self.journal.push(line.into());
    }

    async fn acquire_slot(&self) -> Result<Option<OwnedSemaphorePermit>, JobError> {
        let Some(limit) = self.ctx.concurrent_limit.clone() else {
            return Ok(None);
        };

        until_cancelled(&self.cancel, async move {
            limit
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|_| JobError::Cancelled)
        })
        .await
    }

    /// Move to `phase` and show it to observers right away
    fn transition(&mut self, phase: Phase, status: &str) {
        let weight = self.ctx.config.download.transfer_weight;
        let changed = self.task.update(|s| {
            s.phase = phase;
            s.phase_progress = 0.0;
            s.progress = s.progress.max(combined_progress(phase, 0.0, weight));
            s.status = status.to_string();
        });
        if !changed {
            return;
        }

        self.note(format!("{}: {}", phase, status));
        if self.task.flush() {
            tracing::debug!(task_id = %self.task.id, phase = %phase, status, "Task phase changed");
            self.ctx
                .event_tx
                .send(Event::PhaseChanged {
                    id: self.task.id,
                    phase,
                    status: status.to_string(),
                })
                .ok();
        }
    }

    /// Raise phase progress to `fraction`; never moves backwards
    fn report_progress(&self, fraction: f64, status: Option<String>) {
        let weight = self.ctx.config.download.transfer_weight;
        self.task.update(|s| {
            if let Some(fraction) = clamp_fraction(fraction) {
                s.phase_progress = s.phase_progress.max(fraction);
                s.progress = s
                    .progress
                    .max(combined_progress(s.phase, s.phase_progress, weight));
            }
            if let Some(status) = status {
                s.status = status;
            }
        });
    }

    async fn drive(&mut self) -> Result<Delivery, JobError> {
        self.transition(Phase::Submitting, "SUBMITTING");

        let job_id =
            until_cancelled(&self.cancel, self.ctx.api.submit(&self.task.request)).await?;
        tracing::info!(
            task_id = %self.task.id,
            job_id = %job_id,
            url = %self.task.request.url,
            "Job submitted"
        );
        self.note(format!("submitted as job {}", job_id));
        self.job_id = Some(job_id.clone());
        self.task.update(|s| s.job_id = Some(job_id.clone()));

        self.transition(Phase::Polling, "QUEUED");
        let status = self.poll_until_done(&job_id).await?;

        let wanted = self
            .ctx
            .destinations
            .destination(&self.task.request, &job_id, &status);
        let claimed = self.ctx.claims.claim(wanted);
        let destination = claimed.path().to_path_buf();
        self.destination = Some(claimed);

        self.transition(Phase::Transferring, "FETCHING FILE");
        let bytes = self.transfer(&job_id, &destination).await?;

        Ok(Delivery {
            path: destination,
            bytes,
            status,
        })
    }

    async fn poll_until_done(&mut self, job_id: &JobId) -> Result<RemoteJobStatus, JobError> {
        let interval = self.ctx.config.polling.interval;
        let max_attempts = self.ctx.config.polling.max_attempts.max(1);
        let max_errors = self.ctx.config.polling.max_consecutive_errors.max(1);
        let fail_on_unknown = self.ctx.config.polling.fail_on_unknown_status;

        let mut consecutive_errors = 0u32;
        for attempt in 1..=max_attempts {
            match until_cancelled(&self.cancel, self.ctx.api.poll_once(job_id)).await {
                Ok(status) => {
                    consecutive_errors = 0;
                    tracing::debug!(
                        task_id = %self.task.id,
                        job_id = %job_id,
                        attempt,
                        status = status.status.as_str(),
                        progress = status.progress,
                        "Polled job status"
                    );
                    self.observe(&status);

                    match status.status.clone() {
                        RemoteStatus::Completed => return Ok(status),
                        RemoteStatus::Failed => {
                            let message = status.message.trim();
                            return Err(JobError::RemoteFailure {
                                message: if message.is_empty() {
                                    "remote job failed".to_string()
                                } else {
                                    message.to_string()
                                },
                            });
                        }
                        RemoteStatus::Unrecognized(tag) => {
                            tracing::warn!(
                                task_id = %self.task.id,
                                job_id = %job_id,
                                status = %tag,
                                "Unrecognized remote status"
                            );
                            if fail_on_unknown {
                                return Err(JobError::RemoteFailure {
                                    message: format!("unrecognized remote status '{}'", tag),
                                });
                            }
                        }
                        RemoteStatus::Queued | RemoteStatus::Running => {}
                    }
                }
                Err(JobError::Cancelled) => return Err(JobError::Cancelled),
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(
                        task_id = %self.task.id,
                        job_id = %job_id,
                        attempt,
                        consecutive_errors,
                        error = %e,
                        "Status check failed"
                    );
                    self.note(format!("status check {} failed: {}", attempt, e));
                    if consecutive_errors >= max_errors {
                        return Err(e);
                    }
                }
            }

            if attempt < max_attempts {
                until_cancelled(&self.cancel, async {
                    tokio::time::sleep(interval).await;
                    Ok(())
                })
                .await?;
            }
        }

        Err(JobError::Timeout {
            attempts: max_attempts,
        })
    }

    /// Fold one remote snapshot into the task
    fn observe(&mut self, status: &RemoteJobStatus) {
        let text = remote_status_text(status);
        if self.journal.last() != Some(&text) {
            self.note(text.clone());
        }

        if let Some(title) = status.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let title = title.to_string();
            self.task.update(|s| s.title = Some(title));
        }
        self.report_progress(status.progress, Some(text));
        self.remote = Some(status.clone());
    }

    async fn transfer(
        &mut self,
        job_id: &JobId,
        destination: &Path,
    ) -> Result<u64, JobError> {
        let (progress_tx, mut progress_rx) = watch::channel(0.0_f64);

        let result = {
            let transfer =
                self.ctx
                    .api
                    .transfer(job_id, destination, &progress_tx, &self.cancel);
            tokio::pin!(transfer);

            loop {
                tokio::select! {
                    result = &mut transfer => break result,
                    Ok(()) = progress_rx.changed() => {
                        let fraction = *progress_rx.borrow_and_update();
                        self.report_progress(fraction, None);
                    }
                }
            }
        };

        // The last chunk may land together with completion
        if progress_rx.has_changed().unwrap_or(false) {
            let fraction = *progress_rx.borrow_and_update();
            self.report_progress(fraction, None);
        }

        match &result {
            Ok(bytes) => {
                self.note(format!("fetched {} bytes", bytes));
            }
            Err(e) if !e.is_cancelled() => {
                tracing::warn!(
                    task_id = %self.task.id,
                    job_id = %job_id,
                    path = %destination.display(),
                    error = %e,
                    "Transfer failed"
                );
            }
            Err(_) => {}
        }
        result
    }

    /// Publish the terminal state, record history, release waiters
    async fn finish(mut self, result: Result<Delivery, JobError>) {
        let (phase, status_text, error) = match &result {
            Ok(_) => (Phase::Succeeded, "COMPLETED".to_string(), None),
            Err(JobError::Cancelled) => (Phase::Cancelled, "CANCELLED".to_string(), None),
            Err(e @ JobError::Timeout { .. }) => {
                (Phase::TimedOut, format!("ERROR: {}", e), Some(e.to_string()))
            }
            Err(e) => (Phase::Failed, format!("ERROR: {}", e), Some(e.to_string())),
        };

        let mut terminal = self.task.working();
        terminal.phase = phase;
        terminal.status = status_text.clone();
        terminal.error = error.clone();
        if let Ok(delivery) = &result {
            terminal.phase_progress = 1.0;
            terminal.progress = 1.0;
            terminal.local_path = Some(delivery.path.clone());
        }
        self.task.update(|s| *s = terminal.clone());
        self.task.publish(terminal);

        // A cancel that raced the last step wins
        let final_snapshot = self.task.snapshot();
        if final_snapshot.phase == Phase::Cancelled
            && let Ok(delivery) = &result
        {
            if let Err(e) = tokio::fs::remove_file(&delivery.path).await {
                tracing::warn!(
                    task_id = %self.task.id,
                    path = %delivery.path.display(),
                    error = %e,
                    "Failed to remove result of cancelled task"
                );
            }
        }

        self.note(final_snapshot.status.clone());
        match final_snapshot.phase {
            Phase::Succeeded => tracing::info!(
                task_id = %self.task.id,
                job_id = ?self.job_id.as_ref().map(JobId::as_str),
                path = ?final_snapshot.local_path,
                bytes = result.as_ref().map(|d| d.bytes).unwrap_or(0),
                "Download complete"
            ),
            Phase::Cancelled => tracing::info!(
                task_id = %self.task.id,
                reason = ?self.task.cancel_reason(),
                "Download cancelled"
            ),
            _ => tracing::warn!(
                task_id = %self.task.id,
                job_id = ?self.job_id.as_ref().map(JobId::as_str),
                error = ?final_snapshot.error,
                "Download failed"
            ),
        }

        let delivery = result.ok();
        let entry = self.history_entry(&final_snapshot, delivery.as_ref());
        let log = self.collect_log(final_snapshot.phase).await;
        if let Err(e) = self.ctx.db.insert_history(&entry, Some(&log)).await {
            tracing::warn!(
                task_id = %self.task.id,
                error = %e,
                "Failed to record job outcome in history"
            );
        }

        self.ctx
            .event_tx
            .send(Event::Finished {
                id: self.task.id,
                phase: final_snapshot.phase,
                local_path: final_snapshot.local_path.clone(),
                error: final_snapshot.error.clone(),
            })
            .ok();

        drop(self.destination.take());
        self.task.mark_settled();
    }

    fn history_entry(&self, snapshot: &TaskSnapshot, delivery: Option<&Delivery>) -> HistoryEntry {
        let url = &self.task.request.url;
        let remote = delivery.map(|d| &d.status).or(self.remote.as_ref());
        let service = service_label(url, remote.and_then(|r| r.extractor.as_deref()));
        let remote_title = remote
            .and_then(|r| r.title.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);

        let (title, status) = match snapshot.phase {
            Phase::Succeeded => {
                let title = remote_title
                    .or_else(|| {
                        remote
                            .and_then(|r| r.filename.as_deref())
                            .map(str::trim)
                            .filter(|f| !f.is_empty())
                            .map(String::from)
                    })
                    .or_else(|| {
                        delivery
                            .and_then(|d| d.path.file_name())
                            .map(|n| n.to_string_lossy().into_owned())
                    })
                    .unwrap_or_else(|| labelled_title("Download", url));
                (title, HistoryStatus::Completed)
            }
            Phase::Cancelled => {
                let status = match self.task.cancel_reason() {
                    Some(CancelReason::Shutdown) => HistoryStatus::Aborted,
                    _ => HistoryStatus::Cancelled,
                };
                let title = remote_title.unwrap_or_else(|| labelled_title("Cancelled", url));
                (title, status)
            }
            _ => (failure_title(url), HistoryStatus::Failed),
        };

        let entry = HistoryEntry::new(title, url.clone(), service, status);
        match (&snapshot.local_path, snapshot.phase) {
            (Some(path), Phase::Succeeded) => entry.with_local_path(path.clone()),
            _ => entry,
        }
    }

    /// Remote log when it can be had, the local journal otherwise
    ///
    /// A cancelled job issues no further network calls, so it always uses the journal.
    async fn collect_log(&self, phase: Phase) -> String {
        let journal = self.journal.join("\n");
        if phase == Phase::Cancelled {
            return journal;
        }
        let Some(job_id) = &self.job_id else {
            return journal;
        };

        let timeout: Duration = self.ctx.config.api.log_fetch_timeout;
        match tokio::time::timeout(timeout, self.ctx.api.fetch_log(job_id)).await {
            Ok(Ok(log)) if !log.trim().is_empty() => log,
            Ok(Ok(_)) => journal,
            Ok(Err(e)) => {
                tracing::warn!(task_id = %self.task.id, job_id = %job_id, error = %e, "Log fetch failed");
                journal
            }
            Err(_) => {
                tracing::warn!(
                    task_id = %self.task.id,
                    job_id = %job_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Log fetch timed out"
                );
                journal
            }
        }
    }
}
