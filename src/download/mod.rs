//! Download engines and local path resolution.
//!
//! This module provides everything needed to turn one queue item into a
//! file on disk: the path resolver that names it, and the two engines that
//! fetch it.
//!
//! # Features
//!
//! - Deterministic local paths from a placeholder template
//! - Native HLS streaming engine (master/media playlists, segment concatenation)
//! - `ffmpeg` transcoding engine with stream copy into `.mp4`
//! - One [`DownloadEngine`] contract so hosts and tests can swap engines
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use stream_downloader::download::{DownloadEngine, ProgressSink, StreamEngine};
//!
//! struct Log;
//! impl ProgressSink for Log {
//!     fn started(&self) {}
//!     fn progress(&self, percent: f64) { println!("{percent}%"); }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = StreamEngine::new();
//! let path = engine
//!     .download("https://example.com/show/index.m3u8", Path::new("./show.ts"), &Log)
//!     .await?;
//! println!("Downloaded: {}", path.display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
mod stream;
mod transcode;

pub use client::{FetchedBody, HttpClient};
pub use engine::{DownloadEngine, EngineSet, ProgressSink, ratio_percent};
pub use error::DownloadError;
pub use filename::{STREAM_EXTENSION, render_local_path, render_template, resolve_local_path};
pub use stream::{SegmentKey, SegmentRequest, StreamEngine};
pub use transcode::TranscodeEngine;
