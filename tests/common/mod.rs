//! Shared helpers for integration tests against a mocked job service

#![allow(dead_code)]

use fetchy_dl::{Config, FetchManager};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Upper bound for waiting on a task in these tests
pub const WAIT: Duration = Duration::from_secs(15);

/// Config pointing at `server`, rooted in `temp_dir`, tuned for fast polling
pub fn test_config(server: &MockServer, temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.log_fetch_timeout = Duration::from_secs(2);
    config.polling.interval = Duration::from_millis(10);
    config.polling.max_attempts = 50;
    config.download.progress_throttle = Duration::from_millis(10);
    config.download.download_dir = temp_dir.path().join("downloads");
    config.persistence.database_path = temp_dir.path().join("history.sqlite");
    config
}

/// Build a manager against `server` with a fresh temp directory
pub async fn create_manager(server: &MockServer) -> (FetchManager, TempDir) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let manager = FetchManager::new(test_config(server, &temp_dir))
        .await
        .expect("manager");
    (manager, temp_dir)
}

/// Accept submissions with `job_id`
pub async fn mount_submit(server: &MockServer, job_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobId": job_id })))
        .mount(server)
        .await;
}

/// Answer `running` for the first `running_polls` status checks, then `last`
pub async fn mount_status_sequence(
    server: &MockServer,
    job_id: &str,
    running_polls: u64,
    last: serde_json::Value,
) {
    let status_path = format!("/api/status/{}", job_id);
    if running_polls > 0 {
        Mock::given(method("GET"))
            .and(path(status_path.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "running",
                "progress": 0.5,
                "message": "Downloading"
            })))
            .up_to_n_times(running_polls)
            .with_priority(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(status_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(last))
        .with_priority(2)
        .mount(server)
        .await;
}

/// Serve `log` for the job
pub async fn mount_log(server: &MockServer, job_id: &str, log: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/log/{}", job_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "log": log })))
        .mount(server)
        .await;
}

/// Serve `body` as the job's result file
pub async fn mount_file(server: &MockServer, job_id: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/api/download/{}", job_id)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}
