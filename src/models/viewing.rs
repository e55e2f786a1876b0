use chrono::NaiveDateTime;
use std::collections::HashMap;

use crate::services::normalizer::{display_title, normalize};

/// One parsed row of the viewing-history export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub title: String,
    pub watched_at: NaiveDateTime,
}

/// Accumulated watches of one title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewingEntry {
    pub key: String,
    /// First-seen display variant, used for searching
    pub display_title: String,
    pub dates: Vec<NaiveDateTime>,
    pub frequency: u32,
}

impl ViewingEntry {
    /// Watch dates in ascending order
    pub fn sorted_dates(&self) -> Vec<NaiveDateTime> {
        let mut dates = self.dates.clone();
        dates.sort();
        dates
    }
}

/// Per-run map from title key to its watches, iterated in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ViewingIndex {
    entries: Vec<ViewingEntry>,
    positions: HashMap<String, usize>,
}

impl ViewingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a watch event under its normalized title.
    ///
    /// Returns `false` when the title normalizes to nothing and the event is dropped.
    pub fn record(&mut self, event: WatchEvent) -> bool {
        let key = normalize(&event.title);
        if key.is_empty() {
            return false;
        }

        let display = display_title(&event.title);
        self.merge(&key, &display, &[event.watched_at], 1);
        true
    }

    /// Folds dates and a frequency into the entry for `key`, creating it if needed
    pub fn merge(&mut self, key: &str, display_title: &str, dates: &[NaiveDateTime], frequency: u32) {
        let position = match self.positions.get(key) {
            Some(position) => *position,
            None => {
                self.entries.push(ViewingEntry {
                    key: key.to_string(),
                    display_title: display_title.to_string(),
                    dates: Vec::new(),
                    frequency: 0,
                });
                self.positions.insert(key.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[position];
        entry.dates.extend_from_slice(dates);
        entry.frequency += frequency;
    }

    pub fn get(&self, key: &str) -> Option<&ViewingEntry> {
        self.positions.get(key).map(|position| &self.entries[*position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<WatchEvent> for ViewingIndex {
    fn from_iter<I: IntoIterator<Item = WatchEvent>>(iter: I) -> Self {
        let mut index = ViewingIndex::new();
        for event in iter {
            index.record(event);
        }
        index
    }
}
