use std::collections::{HashMap, HashSet};

use crate::{
    models::{
        BingeStreak, GenreCount, MediaKind, OldestTitle, TitleRecord, TitleWatchTime,
        UserStatistics,
    },
    services::binge::BingeRun,
};

const TOP_GENRES: usize = 3;
const TOP_TITLES: usize = 5;

/// Builds the statistics of one run from resolved titles.
///
/// Counters are updated per ingestion; the rankings are recomputed from the
/// counters every time so they never drift from them.
pub struct Aggregator {
    stats: UserStatistics,
    default_runtime: u32,
    seen: HashSet<(u64, MediaKind)>,
    frequencies: HashMap<String, u32>,
}

impl Aggregator {
    pub fn new(default_runtime: u32) -> Self {
        Self {
            stats: UserStatistics::default(),
            default_runtime,
            seen: HashSet::new(),
            frequencies: HashMap::new(),
        }
    }

    /// Adds `frequency` watches of the canonical title `title`
    pub fn ingest(&mut self, title: &str, record: &TitleRecord, frequency: u32) {
        let first_seen = self.seen.insert((record.external_id, record.kind));

        if first_seen {
            self.count_title(record);
            self.track_oldest(title, record);
        }

        let runtime = record.authoritative_runtime().unwrap_or(self.default_runtime);
        let minutes = u64::from(runtime) * u64::from(frequency);
        self.stats.total_watch_minutes += minutes;

        self.stats
            .watch_time_by_title
            .entry(title.to_string())
            .and_modify(|entry| entry.minutes += minutes)
            .or_insert_with(|| TitleWatchTime {
                title: title.to_string(),
                kind: record.kind,
                poster_path: record.poster_path.clone(),
                minutes,
            });

        let watched = self.frequencies.entry(title.to_string()).or_insert(0);
        *watched += frequency;
        let watched = *watched;
        self.track_completion(title, record, watched);

        self.recompute_rankings();

        tracing::debug!(
            title = %title,
            kind = %record.kind,
            frequency = frequency,
            minutes = minutes,
            "Title aggregated"
        );
    }

    /// Records a title the resolver could not match
    pub fn record_miss(&mut self, title: &str) {
        self.stats.missed.count += 1;
        self.stats.missed.titles.push(title.to_string());
    }

    /// Attaches the longest binge, borrowing artwork from the title's watch-time entry
    pub fn set_binge(&mut self, run: BingeRun) {
        let poster_path = self
            .stats
            .watch_time_by_title
            .get(&run.title)
            .and_then(|entry| entry.poster_path.clone());

        self.stats.most_binged = Some(BingeStreak {
            title: run.title,
            poster_path,
            episodes: run.episodes,
            started_at: run.started_at,
            ended_at: run.ended_at,
        });
    }

    pub fn statistics(&self) -> &UserStatistics {
        &self.stats
    }

    pub fn finish(self) -> UserStatistics {
        self.stats
    }

    fn count_title(&mut self, record: &TitleRecord) {
        self.stats.unique_titles.total += 1;
        match record.kind {
            MediaKind::Series => self.stats.unique_titles.series += 1,
            MediaKind::Movie => self.stats.unique_titles.movies += 1,
        }

        // Once per title, whatever the watch count
        let genres: HashSet<&String> = record.genres.iter().collect();
        for genre in genres {
            *self.stats.genres.entry(genre.clone()).or_insert(0) += 1;
        }
    }

    fn track_oldest(&mut self, title: &str, record: &TitleRecord) {
        let Some(release_date) = record.release_date else {
            return;
        };

        let slot = match record.kind {
            MediaKind::Series => &mut self.stats.oldest_series,
            MediaKind::Movie => &mut self.stats.oldest_movie,
        };

        if slot.as_ref().map_or(true, |oldest| release_date < oldest.release_date) {
            *slot = Some(OldestTitle {
                title: title.to_string(),
                poster_path: record.poster_path.clone(),
                release_date,
            });
        }
    }

    fn track_completion(&mut self, title: &str, record: &TitleRecord, watched: u32) {
        if record.kind != MediaKind::Series {
            return;
        }
        let Some(episodes) = record.episode_count.filter(|count| *count > 0) else {
            return;
        };

        if watched >= episodes && !self.stats.completed_shows.iter().any(|t| t == title) {
            self.stats.completed_shows.push(title.to_string());
        }
    }

    fn recompute_rankings(&mut self) {
        let mut genres: Vec<GenreCount> = self
            .stats
            .genres
            .iter()
            .map(|(genre, count)| GenreCount {
                genre: genre.clone(),
                count: *count,
            })
            .collect();
        // BTreeMap order is alphabetical, so the stable sort breaks ties by name
        genres.sort_by(|a, b| b.count.cmp(&a.count));
        genres.truncate(TOP_GENRES);
        self.stats.top_genres = genres;

        let mut titles: Vec<TitleWatchTime> =
            self.stats.watch_time_by_title.values().cloned().collect();
        titles.sort_by(|a, b| b.minutes.cmp(&a.minutes));
        titles.truncate(TOP_TITLES);
        self.stats.most_watched = titles.first().cloned();
        self.stats.top_titles_by_time = titles;
    }
}
