//! JSON persistence for the pending queue and the download history.
//!
//! Reads are tolerant: a missing or unparsable file yields an empty list.
//! Writes are best-effort and fire-and-forget. Every snapshot goes through a
//! single background writer so files land on disk in the order snapshots
//! were taken; [`QueueStore::flush`] waits for the writer to catch up and is
//! the only durability point. A crash between a terminal event and the next
//! write can lose an item from the queue file without it reaching history.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{MediaId, QueueItem, StoreError};

/// Queue file name under the data directory.
pub const QUEUE_FILE_NAME: &str = "downloadQueue.json";

/// History file name under the data directory.
pub const HISTORY_FILE_NAME: &str = "downloadHistory.json";

enum WriteRequest {
    Queue(Vec<QueueItem>),
    History(Vec<MediaId>),
    DeleteHistory,
    Flush(oneshot::Sender<()>),
}

/// Loads and saves the queue and history files.
///
/// Must be created inside a Tokio runtime; it spawns the writer task.
#[derive(Debug, Clone)]
pub struct QueueStore {
    data_dir: PathBuf,
    writer: mpsc::UnboundedSender<WriteRequest>,
}

impl std::fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue(items) => write!(f, "Queue({} items)", items.len()),
            Self::History(ids) => write!(f, "History({} ids)", ids.len()),
            Self::DeleteHistory => f.write_str("DeleteHistory"),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl QueueStore {
    /// Creates a store rooted at `data_dir` and starts its writer task.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let (writer, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(
            rx,
            data_dir.join(QUEUE_FILE_NAME),
            data_dir.join(HISTORY_FILE_NAME),
        ));
        Self { data_dir, writer }
    }

    /// Returns the data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the queue file path.
    #[must_use]
    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join(QUEUE_FILE_NAME)
    }

    /// Returns the history file path.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE_NAME)
    }

    /// Reads the queue file, strictly.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Json`] if it does not hold a list of queue items.
    pub async fn read_queue(&self) -> Result<Vec<QueueItem>, StoreError> {
        read_json(&self.queue_path()).await
    }

    /// Reads the history file, strictly.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Json`] if it does not hold a list of ids.
    pub async fn read_history(&self) -> Result<Vec<MediaId>, StoreError> {
        read_json(&self.history_path()).await
    }

    /// Loads the queue, treating a missing or corrupt file as empty.
    pub async fn load_queue(&self) -> Vec<QueueItem> {
        tolerate(self.read_queue().await, "queue")
    }

    /// Loads the history, treating a missing or corrupt file as empty.
    pub async fn load_history(&self) -> Vec<MediaId> {
        tolerate(self.read_history().await, "history")
    }

    /// Schedules a queue snapshot write. Failures are logged and dropped.
    pub fn save_queue(&self, items: Vec<QueueItem>) {
        self.submit(WriteRequest::Queue(items));
    }

    /// Schedules a history snapshot write. Failures are logged and dropped.
    pub fn save_history(&self, ids: Vec<MediaId>) {
        self.submit(WriteRequest::History(ids));
    }

    /// Schedules deletion of the history file.
    pub fn delete_history(&self) {
        self.submit(WriteRequest::DeleteHistory);
    }

    /// Waits until every previously scheduled write has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(WriteRequest::Flush(tx));
        // The writer is gone when the runtime is shutting down; nothing left to wait for.
        let _ = rx.await;
    }

    fn submit(&self, request: WriteRequest) {
        if let Err(error) = self.writer.send(request) {
            warn!(request = ?error.0, "persistence writer stopped, dropping write");
        }
    }
}

async fn run_writer(
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
    queue_path: PathBuf,
    history_path: PathBuf,
) {
    while let Some(request) = rx.recv().await {
        match request {
            WriteRequest::Queue(items) => {
                if let Err(error) = write_json(&queue_path, &items).await {
                    warn!(error = %error, "failed to save download queue");
                }
            }
            WriteRequest::History(ids) => {
                if let Err(error) = write_json(&history_path, &ids).await {
                    warn!(error = %error, "failed to save download history");
                }
            }
            WriteRequest::DeleteHistory => match tokio::fs::remove_file(&history_path).await {
                Ok(()) => debug!(path = %history_path.display(), "deleted download history"),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => warn!(error = %error, "failed to delete download history"),
            },
            WriteRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&raw).map_err(|e| StoreError::json(path, e))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let encoded = serde_json::to_vec(value).map_err(|e| StoreError::json(path, e))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    tokio::fs::write(path, encoded)
        .await
        .map_err(|e| StoreError::io(path, e))
}

fn tolerate<T: Default>(result: Result<T, StoreError>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(error) if error.is_not_found() => {
            debug!(what, "no persisted {what}, starting empty");
            T::default()
        }
        Err(error) => {
            warn!(what, error = %error, "discarding unreadable persisted {what}");
            T::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_items() -> Vec<QueueItem> {
        vec![
            QueueItem::new(1_i64, "http://x/a.m3u8").with_user(7_i64, "Bob"),
            QueueItem::new("two", "http://x/b.m3u8").with_title("Second"),
        ]
    }

    #[tokio::test]
    async fn test_load_queue_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = QueueStore::new(temp.path());
        assert!(store.load_queue().await.is_empty());
        assert!(store.read_queue().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_load_queue_corrupt_file_is_empty() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(QUEUE_FILE_NAME), b"{not json").unwrap();
        let store = QueueStore::new(temp.path());
        assert!(store.load_queue().await.is_empty());
        assert!(matches!(
            store.read_queue().await,
            Err(StoreError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_then_load_queue_preserves_order() {
        let temp = TempDir::new().unwrap();
        let store = QueueStore::new(temp.path());
        store.save_queue(sample_items());
        store.flush().await;

        assert_eq!(store.load_queue().await, sample_items());
    }

    #[tokio::test]
    async fn test_writes_apply_in_submission_order() {
        let temp = TempDir::new().unwrap();
        let store = QueueStore::new(temp.path());
        store.save_queue(sample_items());
        store.save_queue(Vec::new());
        store.flush().await;

        assert!(store.read_queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_history_removes_file() {
        let temp = TempDir::new().unwrap();
        let store = QueueStore::new(temp.path());
        store.save_history(vec![MediaId::from(1_i64)]);
        store.flush().await;
        assert!(store.history_path().exists());

        store.delete_history();
        store.flush().await;
        assert!(!store.history_path().exists());
        assert!(store.load_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_creates_missing_data_dir() {
        let temp = TempDir::new().unwrap();
        let store = QueueStore::new(temp.path().join("nested").join("data"));
        store.save_history(vec![MediaId::from("abc")]);
        store.flush().await;
        assert_eq!(store.load_history().await, vec![MediaId::from("abc")]);
    }
}
