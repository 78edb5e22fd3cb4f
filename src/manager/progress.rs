//! Progress arithmetic and the throttled publisher

use super::task::Task;
use crate::types::{Event, Phase};
use std::sync::Arc;
use std::time::Duration;

/// Combined progress for `phase_progress` within `phase`
///
/// Polling fills `[0, 1 - transfer_weight]`, the transfer fills the rest, so
/// the transfer restarting at zero still reads as a continuation of one bar.
pub(crate) fn combined_progress(phase: Phase, phase_progress: f64, transfer_weight: f64) -> f64 {
    let polling_share = 1.0 - transfer_weight;
    match phase {
        Phase::Queued | Phase::Submitting => 0.0,
        Phase::Polling => polling_share * phase_progress,
        Phase::Transferring => polling_share + transfer_weight * phase_progress,
        Phase::Succeeded => 1.0,
        Phase::Failed | Phase::Cancelled | Phase::TimedOut => 0.0,
    }
}

/// Clamp a reported fraction into `[0, 1]`; NaN reads as "no information"
pub(crate) fn clamp_fraction(fraction: f64) -> Option<f64> {
    if fraction.is_nan() {
        None
    } else {
        Some(fraction.clamp(0.0, 1.0))
    }
}

/// Spawn the task that copies working state to observers at most once per `throttle`.
///
/// A burst of updates inside one window collapses into its latest value, which
/// is published when the window closes. Exits once the working state is terminal.
pub(crate) fn spawn_progress_publisher(
    task: Arc<Task>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    throttle: Duration,
) -> tokio::task::JoinHandle<()> {
    let mut working = task.watch_working();
    tokio::spawn(async move {
        while working.changed().await.is_ok() {
            let next = working.borrow_and_update().clone();
            if next.phase.is_terminal() {
                break;
            }

            let (phase, progress) = (next.phase, next.progress);
            if task.publish(next) {
                event_tx
                    .send(Event::Progress {
                        id: task.id,
                        phase,
                        progress,
                    })
                    .ok();
            }

            tokio::time::sleep(throttle).await;
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::TaskHandle;
    use crate::manager::task::CancelReason;
    use crate::types::{JobRequest, TaskId};

    #[test]
    fn combined_progress_is_continuous_across_phase_change() {
        let end_of_polling = combined_progress(Phase::Polling, 1.0, 0.5);
        let start_of_transfer = combined_progress(Phase::Transferring, 0.0, 0.5);
        assert!((end_of_polling - start_of_transfer).abs() < f64::EPSILON);
        assert!((combined_progress(Phase::Transferring, 1.0, 0.5) - 1.0).abs() < f64::EPSILON);
        assert!((combined_progress(Phase::Polling, 0.5, 0.2) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn clamp_fraction_bounds_and_nan() {
        assert_eq!(clamp_fraction(1.7), Some(1.0));
        assert_eq!(clamp_fraction(-0.2), Some(0.0));
        assert_eq!(clamp_fraction(f64::NAN), None);
    }

    #[tokio::test]
    async fn burst_collapses_and_final_value_is_published() {
        let task = Arc::new(Task::new(
            TaskId(7),
            JobRequest::new("https://example.com/v/7"),
        ));
        let (event_tx, mut events) = tokio::sync::broadcast::channel(1000);
        let publisher =
            spawn_progress_publisher(task.clone(), event_tx, Duration::from_millis(50));

        task.update(|s| s.phase = Phase::Transferring);
        for i in 1..=500 {
            task.update(|s| s.progress = i as f64 / 500.0);
        }

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!((task.snapshot().progress - 1.0).abs() < f64::EPSILON);

        let mut seen = 0;
        while let Ok(event) = events.try_recv() {
            assert!(matches!(event, Event::Progress { id: TaskId(7), .. }));
            seen += 1;
        }
        assert!(seen >= 1);
        assert!(seen < 10, "expected a handful of throttled updates, got {}", seen);

        task.cancel(CancelReason::User);
        tokio::time::timeout(Duration::from_secs(1), publisher)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn observed_progress_never_decreases() {
        let task = Arc::new(Task::new(
            TaskId(8),
            JobRequest::new("https://example.com/v/8"),
        ));
        let (event_tx, _events) = tokio::sync::broadcast::channel(1000);
        let _publisher = spawn_progress_publisher(task.clone(), event_tx, Duration::from_millis(1));

        let mut rx = TaskHandle::new(task.clone()).subscribe();
        let collector = tokio::spawn(async move {
            let mut values = Vec::new();
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                values.push(snapshot.progress);
                if snapshot.phase.is_terminal() {
                    break;
                }
            }
            values
        });

        task.update(|s| s.phase = Phase::Polling);
        for p in [0.1, 0.3, 0.2, 0.5, 0.4, 0.9] {
            task.update(|s| s.progress = s.progress.max(p));
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        // A stale copy arriving late is refused
        let mut stale = task.working();
        stale.progress = 0.1;
        assert!(!task.publish(stale));
        task.cancel(CancelReason::User);

        let values = collector.await.unwrap();
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?}", values);
    }
}
