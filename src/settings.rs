//! Download settings consumed by the queue controller.
//!
//! These mirror the `downloads.*` keys of the host's settings store. The
//! controller keeps one [`Settings`] value and the processing loop snapshots
//! it once per item, so a change takes effect from the next item on.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Placeholder template used when the host does not provide one.
pub const DEFAULT_FILE_TEMPLATE: &str = "%%username%%_%%videoid%%";

/// Selects which download engine processes queue items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Native HLS streaming engine.
    #[default]
    Internal,
    /// External `ffmpeg` transcoding engine.
    Ffmpeg,
}

impl EngineKind {
    /// Returns the settings-store string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Ffmpeg => "ffmpeg",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(Self::Internal),
            "ffmpeg" => Ok(Self::Ffmpeg),
            _ => Err(format!("invalid download engine: {s}")),
        }
    }
}

/// How local filenames are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    /// Basename of the remote URL (`filemode = 0`).
    #[default]
    Simple,
    /// Rendered from the placeholder template (any other `filemode`).
    Templated,
}

impl From<i64> for FileMode {
    fn from(value: i64) -> Self {
        if value == 0 {
            Self::Simple
        } else {
            Self::Templated
        }
    }
}

/// The `downloads.*` settings group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Engine used for the next item.
    pub engine: EngineKind,
    /// Base directory downloads are written under.
    pub directory: PathBuf,
    /// Simple or templated naming.
    pub filemode: FileMode,
    /// Template with `%%username%%`, `%%userid%%`, `%%videoid%%`,
    /// `%%videotitle%%` and `%%videotime%%` placeholders.
    pub filetemplate: String,
    /// Whether completed video ids are recorded in the history.
    pub history: bool,
    /// Program invoked by the transcoding engine.
    pub ffmpeg_path: PathBuf,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            directory: PathBuf::from("."),
            filemode: FileMode::default(),
            filetemplate: DEFAULT_FILE_TEMPLATE.to_string(),
            history: true,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

/// Settings handed to [`crate::QueueController::init`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// The `downloads.*` group.
    pub downloads: DownloadSettings,
}
