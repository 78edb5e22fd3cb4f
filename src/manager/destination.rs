//! Where result files land

use crate::types::{JobId, JobRequest, RemoteJobStatus};
use crate::utils::sanitize_filename;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Chooses the local path for a finished job's result file
///
/// Called once per job, after the service reported `completed` and before the
/// transfer starts. When another live task already holds the returned path,
/// the task gets `name (2).ext`, `name (3).ext` and so on instead. A file left
/// on disk by an earlier job is replaced.
pub trait DestinationPolicy: Send + Sync {
    /// Path to write the result of `job_id` to
    fn destination(
        &self,
        request: &JobRequest,
        job_id: &JobId,
        status: &RemoteJobStatus,
    ) -> PathBuf;
}

/// Writes results into one directory, named after the remote filename
///
/// Falls back to `<jobId>.<format>` when the service reports no usable filename.
///
/// # Examples
///
/// ```
/// use fetchy_dl::manager::{DestinationPolicy, DownloadDirPolicy};
/// use fetchy_dl::types::{JobId, JobRequest, RemoteJobStatus};
///
/// let policy = DownloadDirPolicy::new("/downloads");
/// let status: RemoteJobStatus =
///     serde_json::from_str(r#"{"status":"completed","filename":"../clip.mp4"}"#).unwrap();
///
/// let path = policy.destination(&JobRequest::new("https://example.com"), &JobId::from("j1"), &status);
/// assert_eq!(path, std::path::Path::new("/downloads/_clip.mp4"));
/// ```
#[derive(Clone, Debug)]
pub struct DownloadDirPolicy {
    dir: PathBuf,
}

impl DownloadDirPolicy {
    /// Policy writing into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DestinationPolicy for DownloadDirPolicy {
    fn destination(
        &self,
        request: &JobRequest,
        job_id: &JobId,
        status: &RemoteJobStatus,
    ) -> PathBuf {
        let name = status
            .filename
            .as_deref()
            .and_then(sanitize_filename)
            .or_else(|| sanitize_filename(&format!("{}.{}", job_id, request.format)))
            .unwrap_or_else(|| format!("download.{}", request.format));

        self.dir.join(name)
    }
}

/// Destinations currently held by live tasks of one manager
#[derive(Clone, Debug, Default)]
pub(crate) struct DestinationClaims {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl DestinationClaims {
    /// Hold `wanted`, or the first free ` (N)` variant of it
    pub(crate) fn claim(&self, wanted: PathBuf) -> ClaimedDestination {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        let mut path = wanted.clone();
        let mut n = 2u32;
        while held.contains(&path) {
            path = numbered(&wanted, n);
            n += 1;
        }
        held.insert(path.clone());

        ClaimedDestination {
            path,
            claims: self.clone(),
        }
    }

    fn release(&self, path: &Path) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }
}

/// A destination owned by one task; released on drop
#[derive(Debug)]
pub(crate) struct ClaimedDestination {
    path: PathBuf,
    claims: DestinationClaims,
}

impl ClaimedDestination {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ClaimedDestination {
    fn drop(&mut self) {
        self.claims.release(&self.path);
    }
}

/// `dir/clip.mp4` with `n = 2` becomes `dir/clip (2).mp4`
fn numbered(path: &Path, n: u32) -> PathBuf {
    let mut name: OsString = path.file_stem().map(OsString::from).unwrap_or_default();
    name.push(format!(" ({})", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RemoteStatus;

    fn completed(filename: Option<&str>) -> RemoteJobStatus {
        RemoteJobStatus {
            status: RemoteStatus::Completed,
            progress: 1.0,
            message: String::new(),
            download_url: None,
            title: None,
            filename: filename.map(String::from),
            extractor: None,
        }
    }

    #[test]
    fn uses_remote_filename() {
        let policy = DownloadDirPolicy::new("/dl");
        let path = policy.destination(
            &JobRequest::new("https://example.com"),
            &JobId::from("j1"),
            &completed(Some("My Clip.mp4")),
        );
        assert_eq!(path, PathBuf::from("/dl/My Clip.mp4"));
    }

    #[test]
    fn falls_back_to_job_id_and_format() {
        let policy = DownloadDirPolicy::new("/dl");
        let request = JobRequest::new("https://example.com").audio("mp3", "320");

        let path = policy.destination(&request, &JobId::from("j1"), &completed(None));
        assert_eq!(path, PathBuf::from("/dl/j1.mp3"));

        let path = policy.destination(&request, &JobId::from("j1"), &completed(Some("..")));
        assert_eq!(path, PathBuf::from("/dl/j1.mp3"));
    }

    #[test]
    fn never_escapes_the_directory() {
        let policy = DownloadDirPolicy::new("/dl");
        let path = policy.destination(
            &JobRequest::new("https://example.com"),
            &JobId::from("../../etc"),
            &completed(Some("/etc/passwd")),
        );
        assert_eq!(path.parent(), Some(std::path::Path::new("/dl")));
    }

    #[test]
    fn claims_suffix_paths_held_by_live_tasks() {
        let claims = DestinationClaims::default();
        let first = claims.claim(PathBuf::from("/dl/clip.mp4"));
        let second = claims.claim(PathBuf::from("/dl/clip.mp4"));
        let third = claims.claim(PathBuf::from("/dl/clip.mp4"));

        assert_eq!(first.path(), Path::new("/dl/clip.mp4"));
        assert_eq!(second.path(), Path::new("/dl/clip (2).mp4"));
        assert_eq!(third.path(), Path::new("/dl/clip (3).mp4"));
    }

    #[test]
    fn released_claims_are_reused() {
        let claims = DestinationClaims::default();
        let first = claims.claim(PathBuf::from("/dl/clip.mp4"));
        let second = claims.claim(PathBuf::from("/dl/clip.mp4"));
        drop(first);

        let again = claims.claim(PathBuf::from("/dl/clip.mp4"));
        assert_eq!(again.path(), Path::new("/dl/clip.mp4"));
        drop(second);
        assert_eq!(
            claims.claim(PathBuf::from("/dl/clip.mp4")).path(),
            Path::new("/dl/clip (2).mp4")
        );
    }

    #[test]
    fn numbered_keeps_names_without_extension() {
        assert_eq!(numbered(Path::new("/dl/README"), 2), PathBuf::from("/dl/README (2)"));
        assert_eq!(
            numbered(Path::new("/dl/archive.tar.gz"), 4),
            PathBuf::from("/dl/archive.tar (4).gz")
        );
    }
}
