//! Queue item types.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Opaque identifier for users and videos.
///
/// Hosts hand out either numeric or string ids; both are accepted and
/// written back in the same JSON shape. Ids compare by their textual form,
/// so `42` and `"42"` name the same video.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaId {
    /// Numeric id.
    Number(serde_json::Number),
    /// String id.
    Text(String),
}

impl MediaId {
    /// Returns the textual form used for comparison and path templates.
    #[must_use]
    pub fn as_key(&self) -> String {
        self.to_string()
    }

    /// Reads an id typed by a user: integers become numeric ids, anything
    /// else is kept as text.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) => Self::from(n),
            Err(_) => Self::from(raw),
        }
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl PartialEq for MediaId {
    fn eq(&self, other: &Self) -> bool {
        self.as_key() == other.as_key()
    }
}

impl Eq for MediaId {}

impl Hash for MediaId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_key().hash(state);
    }
}

impl From<i64> for MediaId {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for MediaId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for MediaId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MediaId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// The user a download was requested for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque user id.
    #[serde(default)]
    pub id: MediaId,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// The streaming-media source to download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    /// Unique key used for removal and history.
    pub id: MediaId,
    /// Optional title; templates render `untitled` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Timestamp or duration supplied by the host.
    #[serde(default)]
    pub time: f64,
    /// Remote playlist address.
    pub url: String,
}

/// One pending or in-flight download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Requesting user.
    #[serde(default)]
    pub user: User,
    /// Source descriptor.
    pub video: Video,
}

impl QueueItem {
    /// Creates an item with an anonymous user and no title.
    #[must_use]
    pub fn new(video_id: impl Into<MediaId>, url: impl Into<String>) -> Self {
        Self {
            user: User::default(),
            video: Video {
                id: video_id.into(),
                title: None,
                time: 0.0,
                url: url.into(),
            },
        }
    }

    /// Sets the requesting user.
    #[must_use]
    pub fn with_user(mut self, id: impl Into<MediaId>, name: impl Into<String>) -> Self {
        self.user = User {
            id: id.into(),
            name: name.into(),
        };
        self
    }

    /// Sets the video title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.video.title = Some(title.into());
        self
    }

    /// Sets the video time.
    #[must_use]
    pub fn with_time(mut self, time: f64) -> Self {
        self.video.time = time;
        self
    }
}
