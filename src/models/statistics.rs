use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::MediaKind;

/// Unique canonical titles seen in a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleCounts {
    pub total: u32,
    pub series: u32,
    pub movies: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreCount {
    pub genre: String,
    pub count: u32,
}

/// Minutes watched of one canonical title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleWatchTime {
    pub title: String,
    pub kind: MediaKind,
    pub poster_path: Option<String>,
    pub minutes: u64,
}

/// Longest run of closely spaced watches of one title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BingeStreak {
    pub title: String,
    pub poster_path: Option<String>,
    pub episodes: u32,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldestTitle {
    pub title: String,
    pub poster_path: Option<String>,
    pub release_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedTitles {
    pub count: u32,
    pub titles: Vec<String>,
}

/// Viewing analytics for one import run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStatistics {
    /// Number of unique titles carrying each genre
    pub genres: BTreeMap<String, u32>,
    pub top_genres: Vec<GenreCount>,
    pub unique_titles: TitleCounts,
    pub total_watch_minutes: u64,
    pub watch_time_by_title: BTreeMap<String, TitleWatchTime>,
    pub top_titles_by_time: Vec<TitleWatchTime>,
    pub most_watched: Option<TitleWatchTime>,
    pub most_binged: Option<BingeStreak>,
    pub completed_shows: Vec<String>,
    pub oldest_series: Option<OldestTitle>,
    pub oldest_movie: Option<OldestTitle>,
    pub missed: MissedTitles,
}

impl UserStatistics {
    /// Total watch time in hours, rounded to two decimals
    pub fn total_watch_hours(&self) -> f64 {
        (self.total_watch_minutes as f64 / 60.0 * 100.0).round() / 100.0
    }

    pub fn completed_count(&self) -> usize {
        self.completed_shows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_watch_hours_rounds() {
        let stats = UserStatistics {
            total_watch_minutes: 100,
            ..Default::default()
        };
        assert_eq!(stats.total_watch_hours(), 1.67);
    }

    #[test]
    fn test_default_is_empty() {
        let stats = UserStatistics::default();
        assert_eq!(stats.unique_titles, TitleCounts::default());
        assert!(stats.most_binged.is_none());
        assert_eq!(stats.missed.count, 0);
        assert_eq!(stats.completed_count(), 0);
    }
}
