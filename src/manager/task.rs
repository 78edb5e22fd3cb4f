//! In-memory task state and the handle observers hold

use crate::types::{JobRequest, Phase, TaskId, TaskSnapshot};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

/// Why a task was cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CancelReason {
    /// The caller asked for it
    User,
    /// The manager is shutting down
    Shutdown,
}

impl CancelReason {
    fn status_text(self) -> &'static str {
        match self {
            CancelReason::User => "CANCELLED",
            CancelReason::Shutdown => "ABORTED",
        }
    }
}

/// Ordering used to refuse stale snapshots
fn phase_rank(phase: Phase) -> u8 {
    match phase {
        Phase::Queued => 0,
        Phase::Submitting => 1,
        Phase::Polling => 2,
        Phase::Transferring => 3,
        Phase::Succeeded | Phase::Failed | Phase::Cancelled | Phase::TimedOut => 4,
    }
}

/// One job's live state
///
/// `working` is written by the poller on every change; `published` is what
/// observers see and only moves forward. The progress publisher copies one
/// into the other at the throttle rate, phase transitions copy immediately.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) request: JobRequest,
    working: watch::Sender<TaskSnapshot>,
    published: watch::Sender<TaskSnapshot>,
    settled: watch::Sender<bool>,
    cancel_token: CancellationToken,
    cancel_reason: OnceLock<CancelReason>,
}

impl Task {
    pub(crate) fn new(id: TaskId, request: JobRequest) -> Self {
        let initial = TaskSnapshot::queued(id);
        let (working, _) = watch::channel(initial.clone());
        let (published, _) = watch::channel(initial);
        let (settled, _) = watch::channel(false);

        Self {
            id,
            request,
            working,
            published,
            settled,
            cancel_token: CancellationToken::new(),
            cancel_reason: OnceLock::new(),
        }
    }

    /// Latest observer-visible snapshot
    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        self.published.borrow().clone()
    }

    /// Latest unthrottled snapshot
    pub(crate) fn working(&self) -> TaskSnapshot {
        self.working.borrow().clone()
    }

    pub(crate) fn watch_working(&self) -> watch::Receiver<TaskSnapshot> {
        self.working.subscribe()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub(crate) fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_reason.get().copied()
    }

    pub(crate) fn is_settled(&self) -> bool {
        *self.settled.borrow()
    }

    /// Mutate the working copy, unless the task already ended
    pub(crate) fn update(&self, f: impl FnOnce(&mut TaskSnapshot)) -> bool {
        self.working.send_if_modified(|snapshot| {
            if snapshot.phase.is_terminal() {
                return false;
            }
            let before = snapshot.clone();
            f(snapshot);
            *snapshot != before
        })
    }

    /// Make `next` visible to observers
    ///
    /// Refused when the task already reached a terminal phase, or when `next`
    /// would move the phase or the combined progress backwards.
    pub(crate) fn publish(&self, next: TaskSnapshot) -> bool {
        self.published.send_if_modified(|current| {
            if current.phase.is_terminal()
                || phase_rank(next.phase) < phase_rank(current.phase)
                || next.progress < current.progress
                || *current == next
            {
                return false;
            }
            *current = next;
            true
        })
    }

    /// Publish the working copy right away
    pub(crate) fn flush(&self) -> bool {
        self.publish(self.working())
    }

    /// Request termination of the job
    ///
    /// The first call wins: the visible state flips to cancelled immediately and
    /// the poller observes the token at its next suspension point. Returns false
    /// when the task had already ended.
    pub(crate) fn cancel(&self, reason: CancelReason) -> bool {
        if self.published.borrow().phase.is_terminal() {
            return false;
        }
        let _ = self.cancel_reason.set(reason);
        let reason = self.cancel_reason().unwrap_or(reason);

        let status = reason.status_text().to_string();
        self.working.send_modify(|snapshot| {
            if !snapshot.phase.is_terminal() {
                snapshot.phase = Phase::Cancelled;
                snapshot.status = status.clone();
            }
        });

        let mut terminal = self.snapshot();
        terminal.phase = Phase::Cancelled;
        terminal.status = status;
        let changed = self.publish(terminal);

        self.cancel_token.cancel();
        changed
    }

    /// Signal that the poller has finished, history included
    pub(crate) fn mark_settled(&self) {
        self.settled.send_replace(true);
    }
}

/// Cloneable handle to a task in the registry
///
/// Handles are read-only views plus [`cancel`](TaskHandle::cancel); the
/// poller is the only writer of task state.
///
/// # Examples
///
/// ```no_run
/// # use fetchy_dl::{FetchManager, Config, JobRequest};
/// # async fn example(manager: FetchManager) -> fetchy_dl::Result<()> {
/// let handle = manager.add_download(JobRequest::new("https://example.com/v/1")).await?;
///
/// let mut updates = handle.subscribe();
/// while updates.changed().await.is_ok() {
///     let snapshot = updates.borrow().clone();
///     println!("{} {:.0}%", snapshot.status, snapshot.progress * 100.0);
///     if snapshot.phase.is_terminal() {
///         break;
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) task: Arc<Task>,
}

impl TaskHandle {
    pub(crate) fn new(task: Arc<Task>) -> Self {
        Self { task }
    }

    /// Registry id
    pub fn id(&self) -> TaskId {
        self.task.id
    }

    /// The request this task was created with
    pub fn request(&self) -> &JobRequest {
        &self.task.request
    }

    /// Current snapshot
    pub fn snapshot(&self) -> TaskSnapshot {
        self.task.snapshot()
    }

    /// Whether the task reached a terminal phase
    pub fn is_finished(&self) -> bool {
        self.task.snapshot().phase.is_terminal()
    }

    /// Receiver for throttled snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.task.published.subscribe()
    }

    /// [`subscribe`](TaskHandle::subscribe) as a `Stream`, starting with the current snapshot
    pub fn updates(&self) -> WatchStream<TaskSnapshot> {
        WatchStream::new(self.subscribe())
    }

    /// Wait until the task has ended and its history entry was written
    pub async fn wait(&self) -> TaskSnapshot {
        let mut settled = self.task.settled.subscribe();
        // Err only if the sender is gone, which cannot outlive the task
        let _ = settled.wait_for(|done| *done).await;
        self.task.snapshot()
    }

    /// Cancel the task
    ///
    /// Returns false if it had already ended. Cancelled tasks stay in the
    /// registry until removed.
    pub fn cancel(&self) -> bool {
        self.task.cancel(CancelReason::User)
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.task.id)
            .field("url", &self.task.request.url)
            .field("phase", &self.task.snapshot().phase)
            .finish()
    }
}
