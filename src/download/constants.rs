//! Constants for the download module (timeouts, transcoder options).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes, covers slow segment servers).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// User agent sent with playlist and segment requests.
pub const USER_AGENT: &str = concat!("stream-downloader/", env!("CARGO_PKG_VERSION"));

/// Fixed `ffmpeg` output options: stream copy, ADTS-to-ASC audio bitstream
/// filter, variable frame-rate timestamp resync.
pub const FFMPEG_OUTPUT_ARGS: [&str; 6] = ["-c", "copy", "-bsf:a", "aac_adtstoasc", "-vsync", "2"];

/// Container extension written by the transcoding engine.
pub const TRANSCODE_EXTENSION: &str = "mp4";

/// Number of trailing stderr lines kept for failure messages.
pub const STDERR_TAIL_LINES: usize = 8;
