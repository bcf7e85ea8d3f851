//! The drain cycle: pops items one at a time and hands them to an engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::controller::Inner;
use super::events::EventBus;
use super::{MediaId, QueueEvent, QueueItem};
use crate::download::{ProgressSink, resolve_local_path};
use crate::settings::DownloadSettings;

/// Resets the run flag if the cycle unwinds.
struct PanicReset<'a>(&'a Inner);

impl Drop for PanicReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.0.lock_state();
            state.running = false;
            self.0.running_tx.send_replace(false);
        }
    }
}

/// Processes pending items until the queue empties or is paused.
///
/// The caller has already set `running`. The cycle clears it under the state
/// lock in the same step that observes an empty or paused queue, so a
/// concurrent `add` either sees `running == false` and starts a new cycle or
/// lands in the queue before the check.
pub(super) async fn drain(inner: Arc<Inner>) {
    let _reset = PanicReset(&inner);
    info!("processing download queue");

    loop {
        let next = {
            let mut state = inner.lock_state();
            let next = state.next_or_finish();
            if next.is_none() {
                inner.running_tx.send_replace(false);
            }
            next
        };
        let Some(item) = next else {
            break;
        };

        let settings = inner.settings().downloads;
        process_item(&inner, &item, &settings).await;
        inner.persist(settings.history);
    }

    debug!("drain cycle finished");
}

async fn process_item(inner: &Inner, item: &QueueItem, settings: &DownloadSettings) {
    let id = item.video.id.clone();
    let url = item.video.url.clone();
    let reporter = ItemProgress::new(&inner.events, id.clone(), url.clone());

    let outcome = match resolve_local_path(item, settings) {
        Ok(local_path) => {
            debug!(
                video_id = %id,
                engine = %settings.engine,
                path = %local_path.display(),
                "handing item to engine"
            );
            inner
                .engines
                .get(settings.engine)
                .download(&url, &local_path, &reporter)
                .await
        }
        Err(error) => Err(error),
    };

    // Every item gets a start before its terminal event.
    reporter.started();

    match outcome {
        Ok(path) => {
            if settings.history {
                inner.lock_state().history.record(id.clone());
            }
            info!(video_id = %id, path = %path.display(), "download finished");
            inner.events.emit(QueueEvent::Finish { id });
        }
        Err(error) => {
            warn!(video_id = %id, url = %url, error = %error, "download failed");
            inner.events.emit(QueueEvent::Fail { id });
        }
    }
}

/// Turns engine callbacks into `start`/`progress` events for one item.
struct ItemProgress<'a> {
    events: &'a EventBus,
    id: MediaId,
    url: String,
    started: AtomicBool,
}

impl<'a> ItemProgress<'a> {
    fn new(events: &'a EventBus, id: MediaId, url: String) -> Self {
        Self {
            events,
            id,
            url,
            started: AtomicBool::new(false),
        }
    }
}

impl ProgressSink for ItemProgress<'_> {
    fn started(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.events.emit(QueueEvent::Start {
            id: self.id.clone(),
            url: self.url.clone(),
        });
    }

    fn progress(&self, percent: f64) {
        self.started();
        self.events.emit(QueueEvent::Progress {
            id: self.id.clone(),
            url: self.url.clone(),
            value: percent,
        });
    }
}
