//! The queue controller: owns the pending queue, the history and the run flags.
//!
//! All mutation goes through [`QueueController`]. Queue operations are
//! synchronous and never fail; persistence happens in the background and
//! outcomes surface only as [`QueueEvent`]s. At most one drain cycle runs at
//! a time, started by `add`, `start`, `resume` or `load` when the queue is
//! idle and not paused.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::events::EventBus;
use super::history::History;
use super::processor;
use super::{MediaId, QueueEvent, QueueItem, QueueStore};
use crate::download::EngineSet;
use crate::settings::{EngineKind, Settings};

/// Pending items and run flags, guarded by one lock.
#[derive(Debug)]
pub(super) struct QueueState {
    pub(super) pending: VecDeque<QueueItem>,
    pub(super) history: History,
    /// Pause flag; false after `pause()`.
    pub(super) can_run: bool,
    /// True while a drain cycle owns the queue.
    pub(super) running: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            history: History::default(),
            can_run: true,
            running: false,
        }
    }

    /// Pops the next item if processing may continue, otherwise ends the
    /// cycle by clearing `running` under the same lock.
    pub(super) fn next_or_finish(&mut self) -> Option<QueueItem> {
        let next = if self.can_run {
            self.pending.pop_front()
        } else {
            None
        };
        if next.is_none() {
            self.running = false;
        }
        next
    }

    pub(super) fn snapshot(&self) -> Vec<QueueItem> {
        self.pending.iter().cloned().collect()
    }
}

pub(super) struct Inner {
    state: Mutex<QueueState>,
    settings: RwLock<Settings>,
    pub(super) engines: EngineSet,
    pub(super) store: QueueStore,
    pub(super) events: EventBus,
    pub(super) running_tx: watch::Sender<bool>,
    ffmpeg_available: AtomicBool,
}

impl Inner {
    pub(super) fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Schedules queue and (when tracked) history snapshots.
    pub(super) fn persist(&self, history_enabled: bool) {
        let (queue, history) = {
            let state = self.lock_state();
            (state.snapshot(), state.history.ids().to_vec())
        };
        self.store.save_queue(queue);
        if history_enabled {
            self.store.save_history(history);
        }
    }
}

/// Durable, sequential download queue.
///
/// Cheap to clone; clones share the same queue. Must be used inside a Tokio
/// runtime: drain cycles and persistence run as spawned tasks.
#[derive(Clone)]
pub struct QueueController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QueueController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("QueueController")
            .field("pending", &state.pending.len())
            .field("history", &state.history.len())
            .field("can_run", &state.can_run)
            .field("running", &state.running)
            .field("engines", &self.inner.engines)
            .finish_non_exhaustive()
    }
}

impl QueueController {
    /// Creates a controller with the real streaming and transcoding engines.
    ///
    /// `data_dir` is where the queue and history files live. The transcoder
    /// is checked once here; see [`QueueController::is_engine_available`].
    pub async fn init(settings: Settings, data_dir: impl Into<PathBuf>) -> Self {
        let engines = EngineSet::from_settings(&settings.downloads);
        Self::with_engines(settings, data_dir, engines).await
    }

    /// Creates a controller dispatching to the given engines.
    pub async fn with_engines(
        settings: Settings,
        data_dir: impl Into<PathBuf>,
        engines: EngineSet,
    ) -> Self {
        let ffmpeg_available = engines.get(EngineKind::Ffmpeg).is_available().await;
        let store = QueueStore::new(data_dir);
        info!(
            data_dir = %store.data_dir().display(),
            engine = %settings.downloads.engine,
            ffmpeg_available,
            "download queue initialized"
        );
        let (running_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::new()),
                settings: RwLock::new(settings),
                engines,
                store,
                events: EventBus::new(),
                running_tx,
                ffmpeg_available: AtomicBool::new(ffmpeg_available),
            }),
        }
    }

    /// Subscribes to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Reloads the persisted queue (and history, when tracked).
    ///
    /// Replaces the in-memory queue, emits `add` for every reloaded item and
    /// starts processing if anything was reloaded. An empty reload triggers
    /// nothing, so it never runs the transcoder check. Missing or corrupt files
    /// load as empty.
    #[instrument(skip(self))]
    pub async fn load(&self) {
        let history_enabled = self.inner.settings().downloads.history;
        let pending = self.inner.store.load_queue().await;
        let history = if history_enabled {
            Some(History::from_ids(self.inner.store.load_history().await))
        } else {
            None
        };

        let reloaded: Vec<(MediaId, String)> = pending
            .iter()
            .map(|item| (item.video.id.clone(), item.video.url.clone()))
            .collect();
        {
            let mut state = self.inner.lock_state();
            state.pending = pending.into();
            if let Some(history) = history {
                state.history = history;
            }
            info!(
                pending = state.pending.len(),
                history = state.history.len(),
                "loaded persisted queue"
            );
        }

        let any_pending = !reloaded.is_empty();
        for (id, value) in reloaded {
            self.inner.events.emit(QueueEvent::Add { id, value });
        }
        if any_pending {
            self.trigger();
        }
    }

    /// Appends an item, persists the queue and starts processing if idle.
    ///
    /// Duplicate ids are accepted; both entries are processed.
    #[instrument(skip(self, item), fields(video_id = %item.video.id))]
    pub fn add(&self, item: QueueItem) {
        let event = QueueEvent::Add {
            id: item.video.id.clone(),
            value: item.video.url.clone(),
        };
        let snapshot = {
            let mut state = self.inner.lock_state();
            state.pending.push_back(item);
            state.snapshot()
        };
        self.inner.events.emit(event);
        self.inner.store.save_queue(snapshot);
        self.trigger();
    }

    /// Removes the first pending item with `video_id`.
    ///
    /// Returns false, with no side effects, if no pending item matches. An
    /// item already handed to an engine is no longer pending and cannot be
    /// removed or cancelled.
    #[instrument(skip(self))]
    pub fn remove(&self, video_id: &MediaId) -> bool {
        let snapshot = {
            let mut state = self.inner.lock_state();
            let Some(index) = state.pending.iter().position(|i| &i.video.id == video_id) else {
                return false;
            };
            state.pending.remove(index);
            state.snapshot()
        };
        self.inner.store.save_queue(snapshot);
        self.inner.events.emit(QueueEvent::Remove {
            id: video_id.clone(),
        });
        true
    }

    /// Starts processing if idle and not paused; otherwise does nothing.
    pub fn start(&self) {
        self.trigger();
    }

    /// Stops processing before the next item. The in-flight item finishes.
    #[instrument(skip(self))]
    pub fn pause(&self) {
        self.inner.lock_state().can_run = false;
        self.inner.events.emit(QueueEvent::Pause);
    }

    /// Allows processing again and starts it if idle.
    #[instrument(skip(self))]
    pub fn resume(&self) {
        self.inner.lock_state().can_run = true;
        self.inner.events.emit(QueueEvent::Resume);
        self.trigger();
    }

    /// Drops every pending item. An in-flight item still runs to completion.
    #[instrument(skip(self))]
    pub fn purge_queue(&self) {
        self.inner.lock_state().pending.clear();
        self.inner.store.save_queue(Vec::new());
        self.inner.events.emit(QueueEvent::ClearQueue);
    }

    /// Forgets the history and deletes its file.
    #[instrument(skip(self))]
    pub fn purge_history(&self) {
        self.inner.lock_state().history.clear();
        self.inner.store.delete_history();
    }

    /// Returns true if `video_id` finished while history tracking was on.
    #[must_use]
    pub fn has_been_downloaded(&self, video_id: &MediaId) -> bool {
        self.inner.lock_state().history.contains(video_id)
    }

    /// Returns true while a drain cycle is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock_state().running
    }

    /// Returns true after `pause()` (or a forced pause) until `resume()`.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        !self.inner.lock_state().can_run
    }

    /// Returns whether the transcoding engine was found on this host.
    #[must_use]
    pub fn is_engine_available(&self) -> bool {
        self.inner.ffmpeg_available.load(Ordering::SeqCst)
    }

    /// Checks the transcoding engine again, e.g. after the user installed it.
    pub async fn recheck_engine_availability(&self) -> bool {
        let available = self
            .inner
            .engines
            .get(EngineKind::Ffmpeg)
            .is_available()
            .await;
        self.inner.ffmpeg_available.store(available, Ordering::SeqCst);
        debug!(available, "transcoder availability rechecked");
        available
    }

    /// Writes the queue and history now and waits for every pending write.
    ///
    /// This is the only durability point; call it on shutdown.
    #[instrument(skip(self))]
    pub async fn force_save(&self) {
        let history_enabled = self.inner.settings().downloads.history;
        self.inner.persist(history_enabled);
        self.inner.store.flush().await;
    }

    /// Pending items in processing order.
    #[must_use]
    pub fn pending(&self) -> Vec<QueueItem> {
        self.inner.lock_state().snapshot()
    }

    /// Downloaded video ids in completion order.
    #[must_use]
    pub fn history(&self) -> Vec<MediaId> {
        self.inner.lock_state().history.ids().to_vec()
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.inner.settings()
    }

    /// Replaces the settings; the next item picked up uses them.
    pub fn replace_settings(&self, settings: Settings) {
        *self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// The persistence store backing this queue.
    #[must_use]
    pub fn store(&self) -> &QueueStore {
        &self.inner.store
    }

    /// Waits until no drain cycle is running.
    pub async fn wait_idle(&self) {
        let mut running = self.inner.running_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = running.wait_for(|running| !running).await;
    }

    /// Starts a drain cycle when idle, unpaused and something is pending.
    fn trigger(&self) {
        let engine = self.inner.settings().downloads.engine;
        let mut state = self.inner.lock_state();
        if state.running || !state.can_run {
            return;
        }

        if engine == EngineKind::Ffmpeg && !self.is_engine_available() {
            state.can_run = false;
            drop(state);
            warn!("ffmpeg engine selected but not available, pausing queue");
            self.inner.events.emit(QueueEvent::FfmpegDanger);
            self.inner.events.emit(QueueEvent::Pause);
            return;
        }

        if state.pending.is_empty() {
            return;
        }

        state.running = true;
        self.inner.running_tx.send_replace(true);
        drop(state);

        debug!("starting drain cycle");
        tokio::spawn(processor::drain(Arc::clone(&self.inner)));
    }
}
