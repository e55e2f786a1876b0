use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Display};

use crate::services::normalizer::normalize;

/// Kind of catalog entry. Provider strings are converted at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Series,
    Movie,
}

impl MediaKind {
    /// Parses TMDb's `media_type`; anything other than tv/movie (e.g. "person") is not a title
    pub fn from_provider(media_type: &str) -> Option<Self> {
        match media_type {
            "tv" => Some(MediaKind::Series),
            "movie" => Some(MediaKind::Movie),
            _ => None,
        }
    }

    /// Integer code used by the title cache schema
    pub fn code(self) -> i16 {
        match self {
            MediaKind::Series => 0,
            MediaKind::Movie => 1,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(MediaKind::Series),
            1 => Some(MediaKind::Movie),
            _ => None,
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Series => write!(f, "series"),
            MediaKind::Movie => write!(f, "movie"),
        }
    }
}

/// Canonical catalog entry a watched title resolves to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRecord {
    /// Lookup key in the title cache
    pub normalized_title: String,
    /// Canonical display title
    pub title: String,
    pub original_title: Option<String>,
    pub external_id: u64,
    pub kind: MediaKind,
    pub genres: Vec<String>,
    /// Movie runtime in minutes
    pub runtime: Option<u32>,
    /// Series episode runtime in minutes
    pub episode_run_time: Option<u32>,
    pub episode_count: Option<u32>,
    /// Release date for movies, first air date for series
    pub release_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
}

impl TitleRecord {
    pub fn from_series(details: SeriesDetails) -> Self {
        Self {
            normalized_title: normalize(&details.name),
            title: details.name,
            original_title: details.original_name,
            external_id: details.id,
            kind: MediaKind::Series,
            genres: details.genres,
            runtime: None,
            episode_run_time: details.episode_runtime,
            episode_count: details.episode_count,
            release_date: details.first_air_date,
            poster_path: details.poster_path,
        }
    }

    pub fn from_movie(details: MovieDetails) -> Self {
        Self {
            normalized_title: normalize(&details.title),
            title: details.title,
            original_title: details.original_title,
            external_id: details.id,
            kind: MediaKind::Movie,
            genres: details.genres,
            runtime: details.runtime,
            episode_run_time: None,
            episode_count: None,
            release_date: details.release_date,
            poster_path: details.poster_path,
        }
    }

    /// The duration field that counts for this kind; zero is treated as unknown
    pub fn authoritative_runtime(&self) -> Option<u32> {
        let runtime = match self.kind {
            MediaKind::Series => self.episode_run_time,
            MediaKind::Movie => self.runtime,
        };
        runtime.filter(|minutes| *minutes > 0)
    }
}

/// Manual override entry: fetch this record by id instead of searching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleOverride {
    pub id: u64,
    pub kind: MediaKind,
}

/// A search hit from the metadata provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: u64,
    pub kind: MediaKind,
    pub title: String,
    pub original_title: Option<String>,
    pub language: Option<String>,
    pub origin_countries: Vec<String>,
    pub popularity: f64,
    pub vote_average: f64,
    pub vote_count: u64,
    pub release_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDetails {
    pub id: u64,
    pub name: String,
    pub original_name: Option<String>,
    pub genres: Vec<String>,
    pub episode_count: Option<u32>,
    pub episode_runtime: Option<u32>,
    pub first_air_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: u64,
    pub title: String,
    pub original_title: Option<String>,
    pub genres: Vec<String>,
    pub runtime: Option<u32>,
    pub release_date: Option<NaiveDate>,
    pub poster_path: Option<String>,
}

const MAJOR_PLATFORMS: [&str; 4] = ["Netflix", "Hulu", "Max", "Disney Plus"];
const MAJOR_PLATFORM_REGIONS: [&str; 3] = ["US", "CA", "GB"];

/// Flat-rate streaming platforms per region for one title
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchProviders {
    pub regions: HashMap<String, Vec<String>>,
}

impl WatchProviders {
    /// True if any region streams the title on `platform`
    pub fn offers(&self, platform: &str) -> bool {
        self.regions
            .values()
            .any(|platforms| platforms.iter().any(|p| p.eq_ignore_ascii_case(platform)))
    }

    /// True if a major platform streams the title in one of the major regions
    pub fn on_major_platform(&self) -> bool {
        MAJOR_PLATFORM_REGIONS.iter().any(|region| {
            self.regions.get(*region).is_some_and(|platforms| {
                platforms.iter().any(|p| MAJOR_PLATFORMS.contains(&p.as_str()))
            })
        })
    }
}
