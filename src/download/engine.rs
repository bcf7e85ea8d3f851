//! The download engine contract and per-kind dispatch.
//!
//! An engine processes exactly one item per [`DownloadEngine::download`]
//! call. It reports `started` once it has begun, any number of `progress`
//! updates after that, and resolves with either the written path or a
//! [`DownloadError`]: the return value is the single terminal outcome.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::{DownloadError, StreamEngine, TranscodeEngine};
use crate::settings::{DownloadSettings, EngineKind};

/// Receives progress for the item an engine is working on.
pub trait ProgressSink: Send + Sync {
    /// The engine has started transferring. Repeated calls are ignored.
    fn started(&self);

    /// Percentage complete, `0.0..=100.0`.
    fn progress(&self, percent: f64);
}

/// Uniform contract implemented by the streaming and transcoding engines.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Which engine kind this implementation serves.
    fn kind(&self) -> EngineKind;

    /// Checks whether the engine can run on this host.
    async fn is_available(&self) -> bool;

    /// Downloads `remote_url` into `local_path`.
    ///
    /// Returns the path actually written, which may differ from `local_path`
    /// when the engine picks its own container extension.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] describing the network, playlist, IO or
    /// process failure. Engines never panic on a bad item.
    async fn download(
        &self,
        remote_url: &str,
        local_path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf, DownloadError>;
}

/// The engines a queue controller dispatches to, one per [`EngineKind`].
#[derive(Clone)]
pub struct EngineSet {
    internal: Arc<dyn DownloadEngine>,
    ffmpeg: Arc<dyn DownloadEngine>,
}

impl EngineSet {
    /// Groups explicit engine implementations.
    #[must_use]
    pub fn new(internal: Arc<dyn DownloadEngine>, ffmpeg: Arc<dyn DownloadEngine>) -> Self {
        Self { internal, ffmpeg }
    }

    /// Builds the real streaming and transcoding engines for `settings`.
    #[must_use]
    pub fn from_settings(settings: &DownloadSettings) -> Self {
        Self::new(
            Arc::new(StreamEngine::new()),
            Arc::new(TranscodeEngine::new(settings.ffmpeg_path.clone())),
        )
    }

    /// Returns the engine serving `kind`.
    #[must_use]
    pub fn get(&self, kind: EngineKind) -> &Arc<dyn DownloadEngine> {
        match kind {
            EngineKind::Internal => &self.internal,
            EngineKind::Ffmpeg => &self.ffmpeg,
        }
    }
}

impl fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSet")
            .field("internal", &self.internal.kind())
            .field("ffmpeg", &self.ffmpeg.kind())
            .finish()
    }
}

/// Converts a `current/total` ratio to a whole percentage.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ratio_percent(current: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((current as f64 / total as f64) * 100.0).round()
}
