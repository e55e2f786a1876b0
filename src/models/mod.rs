use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

pub mod statistics;
pub mod title;
pub mod viewing;

pub use statistics::{
    BingeStreak, GenreCount, MissedTitles, OldestTitle, TitleCounts, TitleWatchTime,
    UserStatistics,
};
pub use title::{
    Candidate, MediaKind, MovieDetails, SeriesDetails, TitleOverride, TitleRecord, WatchProviders,
};
pub use viewing::{ViewingEntry, ViewingIndex, WatchEvent};

// ============================================================================
// TMDb API Types
// ============================================================================

/// TMDb sends missing dates as empty strings
fn empty_date_as_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
}

/// Paged response from /search/multi, /search/tv and /search/movie
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSearchResponse {
    #[serde(default)]
    pub results: Vec<ApiSearchResult>,
}

/// Raw search hit. Movies use `title`/`release_date`, series use `name`/`first_air_date`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSearchResult {
    pub id: u64,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub origin_country: Vec<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<u64>,
    #[serde(default, deserialize_with = "empty_date_as_none")]
    pub release_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "empty_date_as_none")]
    pub first_air_date: Option<NaiveDate>,
}

impl ApiSearchResult {
    /// Converts to a candidate. Kind-specific searches omit `media_type`, so the
    /// caller passes the kind it searched for; multi-search hits that are not
    /// series or movies are discarded.
    pub fn into_candidate(self, searched_kind: Option<MediaKind>) -> Option<Candidate> {
        let kind = match self.media_type.as_deref() {
            Some(media_type) => MediaKind::from_provider(media_type)?,
            None => searched_kind?,
        };

        let (title, original_title, release_date) = match kind {
            MediaKind::Series => (
                self.name.or(self.title)?,
                self.original_name.or(self.original_title),
                self.first_air_date.or(self.release_date),
            ),
            MediaKind::Movie => (
                self.title.or(self.name)?,
                self.original_title.or(self.original_name),
                self.release_date.or(self.first_air_date),
            ),
        };

        Some(Candidate {
            id: self.id,
            kind,
            title,
            original_title,
            language: self.original_language,
            origin_countries: self.origin_country,
            popularity: self.popularity.unwrap_or_default(),
            vote_average: self.vote_average.unwrap_or_default(),
            vote_count: self.vote_count.unwrap_or_default(),
            release_date,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiGenre {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEpisode {
    #[serde(default)]
    pub runtime: Option<u32>,
}

/// Response from /tv/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSeriesDetails {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub genres: Vec<ApiGenre>,
    #[serde(default)]
    pub number_of_episodes: Option<u32>,
    #[serde(default)]
    pub episode_run_time: Vec<u32>,
    #[serde(default)]
    pub last_episode_to_air: Option<ApiEpisode>,
    #[serde(default, deserialize_with = "empty_date_as_none")]
    pub first_air_date: Option<NaiveDate>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

impl From<ApiSeriesDetails> for SeriesDetails {
    fn from(details: ApiSeriesDetails) -> Self {
        // Newer shows often leave episode_run_time empty; the latest episode still has one
        let episode_runtime = details
            .episode_run_time
            .first()
            .copied()
            .or_else(|| details.last_episode_to_air.and_then(|ep| ep.runtime));

        SeriesDetails {
            id: details.id,
            name: details.name,
            original_name: details.original_name,
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            episode_count: details.number_of_episodes,
            episode_runtime,
            first_air_date: details.first_air_date,
            poster_path: details.poster_path,
        }
    }
}

/// Response from /movie/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMovieDetails {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub genres: Vec<ApiGenre>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default, deserialize_with = "empty_date_as_none")]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

impl From<ApiMovieDetails> for MovieDetails {
    fn from(details: ApiMovieDetails) -> Self {
        MovieDetails {
            id: details.id,
            title: details.title,
            original_title: details.original_title,
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            runtime: details.runtime,
            release_date: details.release_date,
            poster_path: details.poster_path,
        }
    }
}

/// Response from /{tv|movie}/{id}/watch/providers
#[derive(Debug, Clone, Deserialize)]
pub struct ApiWatchProviders {
    #[serde(default)]
    pub results: HashMap<String, ApiRegionProviders>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRegionProviders {
    #[serde(default)]
    pub flatrate: Vec<ApiProvider>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiProvider {
    pub provider_name: String,
}

impl From<ApiWatchProviders> for WatchProviders {
    fn from(api: ApiWatchProviders) -> Self {
        let regions = api
            .results
            .into_iter()
            .map(|(region, providers)| {
                let names = providers
                    .flatrate
                    .into_iter()
                    .map(|p| p.provider_name)
                    .collect();
                (region, names)
            })
            .collect();

        WatchProviders { regions }
    }
}
