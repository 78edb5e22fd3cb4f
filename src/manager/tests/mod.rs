use super::test_helpers::{
    FakeJobApi, TransferBehavior, body_for, completed, create_test_manager,
    create_test_manager_with, status,
};
use super::*;
use crate::error::JobError;
use crate::types::{HistoryStatus, Phase, RemoteStatus, TaskSnapshot};
use std::time::Duration;


/// Upper bound for any single wait in these tests
const WAIT: Duration = Duration::from_secs(10);

/// Wait for the task to settle, failing the test instead of hanging
async fn settle(handle: &TaskHandle) -> TaskSnapshot {
    tokio::time::timeout(WAIT, handle.wait())
        .await
        .expect("task did not settle in time")
}

/// Wait until the visible phase is `phase`
async fn reach_phase(handle: &TaskHandle, phase: Phase) {
    let mut rx = handle.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(|s| s.phase == phase))
        .await
        .expect("phase not reached in time")
        .expect("task dropped");
}

/// Poll `condition` every few milliseconds until it holds
async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
