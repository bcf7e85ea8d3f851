//! Error types for the download module.
//!
//! Engine failures never escape the queue controller; they are logged and
//! turned into `fail` events. These types carry the context for that log line.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while an engine processes one item.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The playlist could not be parsed or holds nothing to download.
    #[error("invalid playlist {url}: {reason}")]
    Playlist {
        /// The playlist URL.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The transcoder process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that was invoked.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The transcoder process exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    ProcessFailed {
        /// The program that was invoked.
        program: String,
        /// Exit status description.
        status: String,
        /// Tail of the process error output.
        stderr: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a playlist error.
    pub fn playlist(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Playlist {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a spawn error.
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Creates a process-exit error.
    pub fn process_failed(
        program: impl Into<String>,
        status: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ProcessFailed {
            program: program.into(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }
}

// No From<reqwest::Error>/From<std::io::Error>: every variant needs the url or
// path the source error does not carry.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/a.m3u8", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://example.com/a.m3u8"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_download_error_playlist_display() {
        let error = DownloadError::playlist("https://example.com/a.m3u8", "no segments");
        let msg = error.to_string();
        assert!(msg.contains("invalid playlist"), "Expected kind in: {msg}");
        assert!(msg.contains("no segments"), "Expected reason in: {msg}");
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/test.ts"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/test.ts"), "Expected path in: {msg}");
    }

    #[test]
    fn test_download_error_process_failed_display() {
        let error = DownloadError::process_failed("ffmpeg", "exit status: 1", "Invalid data");
        let msg = error.to_string();
        assert!(msg.contains("ffmpeg"), "Expected program in: {msg}");
        assert!(msg.contains("exit status: 1"), "Expected status in: {msg}");
        assert!(msg.contains("Invalid data"), "Expected stderr in: {msg}");
    }

    #[test]
    fn test_download_error_spawn_display() {
        let error = DownloadError::spawn(
            "ffmpeg",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(error.to_string().contains("failed to start ffmpeg"));
    }
}
