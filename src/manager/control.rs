//! Registry queries and task lifecycle control: cancel, remove and shutdown.

use super::task::CancelReason;
use super::{FetchManager, TaskHandle};
use crate::error::{Error, Result};
use crate::types::{Event, TaskId};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// How long shutdown waits for pollers to record their outcome
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl FetchManager {
    /// All tasks in the registry, oldest first
    pub async fn tasks(&self) -> Vec<TaskHandle> {
        self.registry.tasks.lock().await.clone()
    }

    /// Look up a task by id
    pub async fn get(&self, id: TaskId) -> Option<TaskHandle> {
        self.registry
            .tasks
            .lock()
            .await
            .iter()
            .find(|handle| handle.id() == id)
            .cloned()
    }

    /// Number of tasks that have not reached a terminal phase
    pub async fn active_count(&self) -> usize {
        self.registry
            .tasks
            .lock()
            .await
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Cancel a task
    ///
    /// The task shows `CANCELLED` immediately and stays in the registry. Its
    /// poller stops at the next suspension point, issues no further network
    /// calls and records a `cancelled` history entry. Cancelling a task that
    /// already ended is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no task has this id.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use fetchy_dl::*;
    /// # async fn example(manager: FetchManager, id: TaskId) -> Result<()> {
    /// manager.cancel(id).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let handle = self
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))?;

        if handle.task.cancel(CancelReason::User) {
            tracing::info!(task_id = %id, "Cancellation requested");
        } else {
            tracing::debug!(task_id = %id, "Cancel ignored, task already finished");
        }
        Ok(())
    }

    /// Remove a task from the registry, cancelling it first if still running
    ///
    /// The history entry of the job is not affected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no task has this id.
    pub async fn remove(&self, id: TaskId) -> Result<()> {
        let handle = {
            let mut tasks = self.registry.tasks.lock().await;
            let index = tasks
                .iter()
                .position(|handle| handle.id() == id)
                .ok_or_else(|| Error::NotFound(format!("task {}", id)))?;
            tasks.remove(index)
        };

        handle.task.cancel(CancelReason::User);
        self.emit_event(Event::TaskRemoved { id });
        Ok(())
    }

    /// Drop every finished task from the registry and return how many were removed
    pub async fn clear_finished(&self) -> usize {
        let removed: Vec<TaskId> = {
            let mut tasks = self.registry.tasks.lock().await;
            let mut removed = Vec::new();
            tasks.retain(|handle| {
                if handle.is_finished() {
                    removed.push(handle.id());
                    false
                } else {
                    true
                }
            });
            removed
        };

        for id in &removed {
            self.emit_event(Event::TaskRemoved { id: *id });
        }
        removed.len()
    }

    /// Gracefully shut down the manager
    ///
    /// 1. Stops accepting new downloads
    /// 2. Cancels every live task, recording its outcome as `aborted`
    /// 3. Waits (up to 30 seconds) for pollers to write their history entries
    /// 4. Closes the history database
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        let live: Vec<TaskHandle> = {
            let tasks = self.registry.tasks.lock().await;
            self.registry.accepting_new.store(false, Ordering::SeqCst);
            tasks
                .iter()
                .filter(|handle| !handle.task.is_settled())
                .cloned()
                .collect()
        };
        tracing::info!(active_count = live.len(), "Stopped accepting new downloads");

        for handle in &live {
            handle.task.cancel(CancelReason::Shutdown);
        }

        let settled = futures::future::join_all(live.iter().map(|handle| handle.wait()));
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, settled).await {
            Ok(_) => tracing::info!("All tasks settled"),
            Err(_) => tracing::warn!("Timeout waiting for tasks to settle, proceeding with shutdown"),
        }

        self.db.close().await;
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
