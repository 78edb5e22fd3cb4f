//! Streaming a result body to disk

use crate::error::JobError;
use crate::types::JobId;
use crate::utils::sanitize_filename;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Temporary sibling a transfer of `job_id` writes to before moving into place
///
/// `downloads/clip.mp4` becomes `downloads/clip.mp4.<jobId>.part`, so two jobs
/// aimed at the same destination never share a part file. Keeping it in the
/// same directory keeps the final rename on one filesystem.
pub fn partial_path(destination: &Path, job_id: &JobId) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    if let Some(tag) = sanitize_filename(job_id.as_str()) {
        name.push(".");
        name.push(tag);
    }
    name.push(".part");
    destination.with_file_name(name)
}

/// Write `response` to `destination` through the job's `.part` file
///
/// The part file is removed on every error path, including cancellation.
pub(crate) async fn stream_to_file(
    mut response: reqwest::Response,
    job_id: &JobId,
    destination: &Path,
    progress: &watch::Sender<f64>,
    cancel: &CancellationToken,
) -> Result<u64, JobError> {
    let expected = response.content_length().filter(|len| *len > 0);
    let part = partial_path(destination, job_id);

    let written = match write_body(&mut response, &part, expected, progress, cancel).await {
        Ok(written) => written,
        Err(e) => {
            remove_partial(&part).await;
            return Err(e);
        }
    };

    // Last chance to honour a cancel before the file becomes visible
    if cancel.is_cancelled() {
        remove_partial(&part).await;
        return Err(JobError::Cancelled);
    }

    if let Err(e) = tokio::fs::rename(&part, destination).await {
        remove_partial(&part).await;
        return Err(JobError::Transfer(format!(
            "failed to move result into {}: {}",
            destination.display(),
            e
        )));
    }

    Ok(written)
}

async fn write_body(
    response: &mut reqwest::Response,
    part: &Path,
    expected: Option<u64>,
    progress: &watch::Sender<f64>,
    cancel: &CancellationToken,
) -> Result<u64, JobError> {
    if let Some(parent) = part.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            JobError::Transfer(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }

    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| JobError::Transfer(format!("failed to create {}: {}", part.display(), e)))?;

    let mut received: u64 = 0;
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
            chunk = response.chunk() => chunk.map_err(|e| {
                JobError::Transfer(format!("connection lost after {} bytes: {}", received, e))
            })?,
        };
        let Some(chunk) = chunk else {
            break;
        };

        file.write_all(&chunk)
            .await
            .map_err(|e| JobError::Transfer(format!("write to {} failed: {}", part.display(), e)))?;
        received += chunk.len() as u64;

        if let Some(total) = expected {
            progress.send_replace((received as f64 / total as f64).min(1.0));
        }
    }

    file.flush()
        .await
        .map_err(|e| JobError::Transfer(format!("flush of {} failed: {}", part.display(), e)))?;
    file.sync_all()
        .await
        .map_err(|e| JobError::Transfer(format!("sync of {} failed: {}", part.display(), e)))?;

    if let Some(total) = expected
        && received < total
    {
        return Err(JobError::Transfer(format!(
            "short body: received {} of {} bytes",
            received, total
        )));
    }

    Ok(received)
}

async fn remove_partial(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %part.display(), error = %e, "Failed to remove partial file");
        }
    }
}
