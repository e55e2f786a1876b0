/// TMDb API provider
///
/// API Flow:
/// 1. Search: /search/multi (or /search/tv, /search/movie) → candidates
/// 2. Availability: /{tv|movie}/{id}/watch/providers → flat-rate platforms per region
/// 3. Details: /tv/{id} or /movie/{id} → genres, runtimes, dates, artwork
///
/// Responses are cached in redis so repeated runs over similar histories stay
/// inside TMDb's rate limits.
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{
        ApiMovieDetails, ApiSearchResponse, ApiSeriesDetails, ApiWatchProviders, Candidate,
        MediaKind, MovieDetails, SeriesDetails, WatchProviders,
    },
    services::providers::MetadataProvider,
};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;

const SEARCH_CACHE_TTL: u64 = 86_400; // 1 day
const DETAILS_CACHE_TTL: u64 = 604_800; // 1 week
const PROVIDERS_CACHE_TTL: u64 = 86_400; // 1 day

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
}

/// TMDb path segment for a kind
fn kind_path(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Series => "tv",
        MediaKind::Movie => "movie",
    }
}

/// Converts a search page, dropping people and malformed hits
fn candidates_from(response: ApiSearchResponse, searched_kind: Option<MediaKind>) -> Vec<Candidate> {
    response
        .results
        .into_iter()
        .filter_map(|result| result.into_candidate(searched_kind))
        .collect()
}

impl TmdbProvider {
    pub fn new(cache: Cache, api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
            cache,
        }
    }

    /// GET a TMDb endpoint and decode the JSON body
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDb API returned status {}: {}",
                status, body
            )));
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                path = %path,
                "Failed to deserialize TMDb response"
            );
            AppError::ExternalApi(format!("Failed to parse TMDb response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbProvider {
    async fn search_by_keyword(&self, query: &str) -> AppResult<Vec<Candidate>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        cached!(
            self.cache,
            CacheKey::Search(query.to_string()),
            SEARCH_CACHE_TTL,
            async move {
                let response: ApiSearchResponse = self
                    .get_json("/search/multi", &[("query", query), ("page", "1")])
                    .await?;
                let candidates = candidates_from(response, None);

                tracing::info!(
                    query = %query,
                    results = candidates.len(),
                    provider = "tmdb",
                    "Keyword search completed"
                );

                Ok::<_, AppError>(candidates)
            }
        )
    }

    async fn search_by_kind(&self, query: &str, kind: MediaKind) -> AppResult<Vec<Candidate>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        cached!(
            self.cache,
            CacheKey::KindSearch(kind, query.to_string()),
            SEARCH_CACHE_TTL,
            async move {
                let path = format!("/search/{}", kind_path(kind));
                let response: ApiSearchResponse =
                    self.get_json(&path, &[("query", query), ("page", "1")]).await?;
                let candidates = candidates_from(response, Some(kind));

                tracing::info!(
                    query = %query,
                    kind = %kind,
                    results = candidates.len(),
                    provider = "tmdb",
                    "Kind search completed"
                );

                Ok::<_, AppError>(candidates)
            }
        )
    }

    async fn series_details(&self, id: u64) -> AppResult<SeriesDetails> {
        cached!(
            self.cache,
            CacheKey::Details(MediaKind::Series, id),
            DETAILS_CACHE_TTL,
            async move {
                let details: ApiSeriesDetails = self.get_json(&format!("/tv/{}", id), &[]).await?;
                Ok::<_, AppError>(SeriesDetails::from(details))
            }
        )
    }

    async fn movie_details(&self, id: u64) -> AppResult<MovieDetails> {
        cached!(
            self.cache,
            CacheKey::Details(MediaKind::Movie, id),
            DETAILS_CACHE_TTL,
            async move {
                let details: ApiMovieDetails =
                    self.get_json(&format!("/movie/{}", id), &[]).await?;
                Ok::<_, AppError>(MovieDetails::from(details))
            }
        )
    }

    async fn watch_providers(&self, id: u64, kind: MediaKind) -> AppResult<WatchProviders> {
        cached!(
            self.cache,
            CacheKey::WatchProviders(kind, id),
            PROVIDERS_CACHE_TTL,
            async move {
                let path = format!("/{}/{}/watch/providers", kind_path(kind), id);
                let providers: ApiWatchProviders = self.get_json(&path, &[]).await?;
                let providers = WatchProviders::from(providers);

                tracing::debug!(
                    id = id,
                    kind = %kind,
                    regions = providers.regions.len(),
                    provider = "tmdb",
                    "Watch providers fetched"
                );

                Ok::<_, AppError>(providers)
            }
        )
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_path() {
        assert_eq!(kind_path(MediaKind::Series), "tv");
        assert_eq!(kind_path(MediaKind::Movie), "movie");
    }

    #[test]
    fn test_candidates_from_multi_search_keeps_ranking_order() {
        let json = r#"{
            "page": 1,
            "results": [
                { "id": 3, "media_type": "movie", "title": "Dark", "vote_count": 10 },
                { "id": 1, "media_type": "person", "name": "Dark Person" },
                { "id": 2, "media_type": "tv", "name": "Dark", "vote_count": 900 }
            ]
        }"#;

        let response: ApiSearchResponse = serde_json::from_str(json).unwrap();
        let candidates = candidates_from(response, None);
        let ids: Vec<u64> = candidates.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(candidates[1].kind, MediaKind::Series);
    }

    #[test]
    fn test_candidates_from_kind_search() {
        let json = r#"{ "results": [ { "id": 1396, "name": "Breaking Bad", "first_air_date": "2008-01-20" } ] }"#;
        let response: ApiSearchResponse = serde_json::from_str(json).unwrap();
        let candidates = candidates_from(response, Some(MediaKind::Series));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, MediaKind::Series);
        assert_eq!(candidates[0].title, "Breaking Bad");
    }

    #[test]
    fn test_empty_search_response() {
        let response: ApiSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(candidates_from(response, None).is_empty());
    }
}
