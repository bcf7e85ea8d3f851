//! Durable sequential download queue.
//!
//! The queue keeps pending items in FIFO order, hands them one at a time to
//! the selected [`DownloadEngine`](crate::download::DownloadEngine) and
//! remembers finished video ids. State is mirrored to two JSON files in the
//! data directory (`downloadQueue.json`, `downloadHistory.json`).
//!
//! # Overview
//!
//! - [`QueueController`] - the public operations (`add`, `remove`, `pause`, ...)
//! - [`QueueItem`] - one pending download with its user and video metadata
//! - [`QueueEvent`] - lifecycle notifications for observers
//! - [`QueueStore`] - JSON persistence with ordered background writes
//!
//! # Example
//!
//! ```no_run
//! use stream_downloader::{QueueController, QueueItem, Settings};
//!
//! # async fn example() {
//! let queue = QueueController::init(Settings::default(), "/tmp/queue-data").await;
//! let mut events = queue.subscribe();
//! queue.load().await;
//! queue.add(QueueItem::new(42_i64, "https://cdn.example.com/v/42/index.m3u8"));
//!
//! while let Ok(event) = events.recv().await {
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! queue.force_save().await;
//! # }
//! ```

mod controller;
mod error;
mod events;
mod history;
mod item;
mod processor;
mod store;

pub use controller::QueueController;
pub use error::StoreError;
pub use events::{EVENT_CHANNEL_CAPACITY, QueueEvent};
pub use history::{History, HistoryRecord};
pub use item::{MediaId, QueueItem, User, Video};
pub use store::{HISTORY_FILE_NAME, QUEUE_FILE_NAME, QueueStore};
