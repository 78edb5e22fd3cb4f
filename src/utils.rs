//! Utility functions for log handling, labels and path manipulation

/// Maximum number of characters of raw log kept per history entry
pub const MAX_LOG_CHARS: usize = 10_000;

/// Prefix placed in front of a truncated log
pub const LOG_TRUNCATION_MARKER: &str = "[Log truncated for brevity...]\n";

/// Cap a raw log at [`MAX_LOG_CHARS`] characters, keeping the tail.
///
/// Logs within the cap are returned unchanged. Longer logs keep their last
/// [`MAX_LOG_CHARS`] characters behind [`LOG_TRUNCATION_MARKER`]. Counting is by
/// `char`, so multi-byte text is never split.
///
/// # Examples
///
/// ```
/// use fetchy_dl::utils::{truncate_log, LOG_TRUNCATION_MARKER, MAX_LOG_CHARS};
///
/// assert_eq!(truncate_log("short log"), "short log");
///
/// let long = "x".repeat(MAX_LOG_CHARS + 5);
/// let stored = truncate_log(&long);
/// assert!(stored.starts_with(LOG_TRUNCATION_MARKER));
/// assert_eq!(stored.len(), LOG_TRUNCATION_MARKER.len() + MAX_LOG_CHARS);
/// ```
pub fn truncate_log(log: &str) -> String {
    let total = log.chars().count();
    if total <= MAX_LOG_CHARS {
        return log.to_string();
    }

    // Byte offset of the first kept character
    let start = log
        .char_indices()
        .nth(total - MAX_LOG_CHARS)
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    let mut truncated = String::with_capacity(LOG_TRUNCATION_MARKER.len() + log.len() - start);
    truncated.push_str(LOG_TRUNCATION_MARKER);
    truncated.push_str(&log[start..]);
    truncated
}

/// Host component of a URL, if it parses and has one
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

/// Service label for a history entry: the extractor name, else the URL host, else "Unknown"
pub fn service_label(url: &str, extractor: Option<&str>) -> String {
    extractor
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .or_else(|| host_of(url))
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Title recorded for a job that produced no file
pub fn failure_title(url: &str) -> String {
    labelled_title("Failed", url)
}

/// `"<label>: <host>"`, or `"<label>: Link"` when the URL has no host
pub fn labelled_title(label: &str, url: &str) -> String {
    format!("{}: {}", label, host_of(url).unwrap_or_else(|| "Link".to_string()))
}

/// Make a remote-supplied filename safe to use as a single path component.
///
/// Path separators, control characters and characters rejected by common
/// filesystems are replaced with `_`; leading dots are stripped so the result
/// can never be `.`/`..` or a hidden file. Returns `None` when nothing usable remains.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim().trim_start_matches('.').trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_at_cap_is_stored_verbatim() {
        let log = "a".repeat(MAX_LOG_CHARS);
        assert_eq!(truncate_log(&log), log);
    }

    #[test]
    fn log_over_cap_keeps_tail_behind_marker() {
        let mut log = "HEAD".to_string();
        log.push_str(&"m".repeat(MAX_LOG_CHARS));
        log.push_str("TAIL");

        let stored = truncate_log(&log);
        assert!(stored.starts_with(LOG_TRUNCATION_MARKER));
        assert!(stored.ends_with("TAIL"));
        assert!(!stored.contains("HEAD"));
        assert_eq!(
            stored.chars().count(),
            LOG_TRUNCATION_MARKER.chars().count() + MAX_LOG_CHARS
        );
    }

    #[test]
    fn truncation_never_splits_multibyte_characters() {
        let log = "日本語".repeat(MAX_LOG_CHARS);
        let stored = truncate_log(&log);
        let tail = stored.strip_prefix(LOG_TRUNCATION_MARKER).unwrap();
        assert_eq!(tail.chars().count(), MAX_LOG_CHARS);
        assert!(log.ends_with(tail));
    }

    #[test]
    fn service_label_prefers_extractor_then_host() {
        assert_eq!(
            service_label("https://www.youtube.com/watch?v=1", Some("youtube")),
            "youtube"
        );
        assert_eq!(
            service_label("https://www.youtube.com/watch?v=1", Some("  ")),
            "youtube.com"
        );
        assert_eq!(service_label("not a url", None), "Unknown");
    }

    #[test]
    fn failure_title_uses_host_or_placeholder() {
        assert_eq!(failure_title("https://vimeo.com/123"), "Failed: vimeo.com");
        assert_eq!(failure_title("garbage"), "Failed: Link");
        assert_eq!(
            labelled_title("Cancelled", "https://www.tiktok.com/@a/video/1"),
            "Cancelled: tiktok.com"
        );
    }

    #[test]
    fn sanitize_filename_strips_traversal_and_separators() {
        assert_eq!(
            sanitize_filename("../../etc/passwd").as_deref(),
            Some("_.._etc_passwd")
        );
        assert_eq!(sanitize_filename("My Video: Part 1.mp4").as_deref(), Some("My Video_ Part 1.mp4"));
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("   "), None);
        assert_eq!(sanitize_filename("///"), None);
    }
}
