//! Completed-download history.

use super::MediaId;

/// A video id that finished downloading while history tracking was enabled.
pub type HistoryRecord = MediaId;

/// Ordered set of downloaded video ids.
///
/// Insertion order is kept so the persisted list stays stable across saves;
/// duplicates are dropped on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    ids: Vec<HistoryRecord>,
}

impl History {
    /// Builds a history from persisted ids, dropping duplicates.
    #[must_use]
    pub fn from_ids(ids: Vec<HistoryRecord>) -> Self {
        let mut history = Self::default();
        for id in ids {
            history.record(id);
        }
        history
    }

    /// Records an id. Returns false if it was already present.
    pub fn record(&mut self, id: HistoryRecord) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Returns true if the id has been downloaded.
    #[must_use]
    pub fn contains(&self, id: &MediaId) -> bool {
        self.ids.iter().any(|known| known == id)
    }

    /// Forgets every recorded id.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Returns the recorded ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> &[HistoryRecord] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
