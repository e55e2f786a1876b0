/// Metadata provider abstraction
///
/// The resolver only sees this trait, so the catalog source (TMDb today) can be
/// swapped or stubbed. Every call may fail; callers in the resolver treat a
/// failure as an empty result rather than aborting the run.
use crate::{
    error::AppResult,
    models::{Candidate, MediaKind, MovieDetails, SeriesDetails, WatchProviders},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Trait for catalog metadata providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Keyword search across series and movies, in the provider's ranking order
    async fn search_by_keyword(&self, query: &str) -> AppResult<Vec<Candidate>>;

    /// Keyword search restricted to one kind
    async fn search_by_kind(&self, query: &str, kind: MediaKind) -> AppResult<Vec<Candidate>>;

    async fn series_details(&self, id: u64) -> AppResult<SeriesDetails>;

    async fn movie_details(&self, id: u64) -> AppResult<MovieDetails>;

    /// Per-region streaming availability for a title
    async fn watch_providers(&self, id: u64, kind: MediaKind) -> AppResult<WatchProviders>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
