//! Stream Downloader Core Library
//!
//! A durable, sequential download queue for HLS video streams. Requests are
//! persisted as they arrive, processed one at a time through a pluggable
//! download engine, and recorded in a completion history so hosts can avoid
//! downloading the same video twice.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`settings`] - Download settings consumed by the queue (engine, naming, history)
//! - [`download`] - Path resolution and the streaming/transcoding download engines
//! - [`queue`] - Queue items, lifecycle events, persistence and the queue controller

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod queue;
pub mod settings;

// Re-export commonly used types
pub use download::{
    DownloadEngine, DownloadError, EngineSet, ProgressSink, StreamEngine, TranscodeEngine,
    resolve_local_path,
};
pub use queue::{
    HistoryRecord, MediaId, QueueController, QueueEvent, QueueItem, QueueStore, StoreError, User,
    Video,
};
pub use settings::{DownloadSettings, EngineKind, FileMode, Settings};
