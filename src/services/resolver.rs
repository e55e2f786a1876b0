//! Resolves watched titles to canonical catalog records.
//!
//! Fallback chain, first success wins:
//! 1. Manual override → fetch by id
//! 2. Exact title cache lookup
//! 3. Cache lookup with "&" spelled out and any parenthetical dropped
//! 4. Fuzzy cache match over progressively shorter colon prefixes
//! 5-6. Live keyword search over the same prefixes, scored, best fetched
//! 7. Series-only and movie-only searches, scored together
//!
//! Provider and cache failures are logged and treated as empty results, so
//! `resolve` never errors; running out of stages yields `None`.

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::ResolverSettings,
    db::TitleCache,
    error::AppResult,
    models::{Candidate, MediaKind, TitleRecord},
    services::{
        normalizer::{colon_prefixes, normalize, search_term},
        providers::MetadataProvider,
        scorer::{best_candidate, score, PlatformAvailability},
    },
};

/// Candidates considered per search, in the provider's ranking order
const MAX_CANDIDATES: usize = 10;

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStage {
    Override,
    Cache,
    AlternateCache,
    Fuzzy,
    LiveSearch,
    KindSearch,
}

impl ResolutionStage {
    /// Live stages hit the provider and are persisted and throttled
    fn is_live(self) -> bool {
        matches!(
            self,
            ResolutionStage::Override | ResolutionStage::LiveSearch | ResolutionStage::KindSearch
        )
    }
}

/// "&" spelled out and everything from the first "(" dropped
fn alternate_spelling(title: &str) -> String {
    let replaced = title.replace('&', "and");
    let cut = replaced.split('(').next().unwrap_or_default();
    normalize(cut)
}

/// Per-run title resolver. The memo lives as long as the resolver, so build one per run.
pub struct Resolver {
    cache: Arc<dyn TitleCache>,
    provider: Arc<dyn MetadataProvider>,
    settings: ResolverSettings,
    memo: HashMap<String, Option<TitleRecord>>,
}

impl Resolver {
    pub fn new(
        cache: Arc<dyn TitleCache>,
        provider: Arc<dyn MetadataProvider>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            cache,
            provider,
            settings,
            memo: HashMap::new(),
        }
    }

    /// Resolves a display title to its canonical record, or `None` if every stage fails
    pub async fn resolve(&mut self, title: &str) -> Option<TitleRecord> {
        let key = normalize(title);
        if key.is_empty() {
            return None;
        }

        if let Some(memoized) = self.memo.get(&key) {
            tracing::debug!(title = %title, hit = memoized.is_some(), "Resolution memoized");
            return memoized.clone();
        }

        let resolved = self.run_stages(title, &key).await;

        let record = match resolved {
            Some((stage, mut record)) => {
                tracing::info!(
                    title = %title,
                    canonical = %record.title,
                    external_id = record.external_id,
                    kind = %record.kind,
                    stage = ?stage,
                    "Title resolved"
                );

                if stage.is_live() {
                    // Store under the watched title's key so the next run hits stage 2
                    record.normalized_title = key.clone();
                    if let Err(e) = self.cache.upsert(&record).await {
                        tracing::warn!(error = %e, title = %title, "Failed to persist resolved title");
                    }
                }
                Some(record)
            }
            None => {
                tracing::info!(title = %title, "Title unresolved");
                None
            }
        };

        self.memo.insert(key, record.clone());
        record
    }

    async fn run_stages(&self, title: &str, key: &str) -> Option<(ResolutionStage, TitleRecord)> {
        if let Some(record) = self.from_override(key).await {
            self.throttle().await;
            return Some((ResolutionStage::Override, record));
        }

        if let Some(record) = self.from_cache(key).await {
            return Some((ResolutionStage::Cache, record));
        }

        let alternate = alternate_spelling(title);
        if !alternate.is_empty() && alternate != key {
            if let Some(record) = self.from_cache(&alternate).await {
                return Some((ResolutionStage::AlternateCache, record));
            }
        }

        if let Some(record) = self.from_fuzzy(title).await {
            return Some((ResolutionStage::Fuzzy, record));
        }

        let live = self.from_live_search(title).await;
        self.throttle().await;
        live
    }

    async fn from_override(&self, key: &str) -> Option<TitleRecord> {
        let entry = self.settings.overrides.get(key)?;
        tracing::debug!(key = %key, id = entry.id, kind = %entry.kind, "Applying manual override");

        match self.fetch_record(entry.id, entry.kind).await {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, key = %key, id = entry.id, "Override fetch failed, falling back to search");
                None
            }
        }
    }

    async fn from_cache(&self, key: &str) -> Option<TitleRecord> {
        match self.cache.get_by_normalized_title(key).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Title cache lookup failed");
                None
            }
        }
    }

    async fn from_fuzzy(&self, title: &str) -> Option<TitleRecord> {
        for prefix in colon_prefixes(title) {
            let key = normalize(&prefix);
            if key.is_empty() {
                continue;
            }

            match self
                .cache
                .get_best_fuzzy_match(&key, self.settings.fuzzy_threshold)
                .await
            {
                Ok(Some(record)) => return Some(record),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "Fuzzy cache lookup failed");
                }
            }
        }
        None
    }

    async fn from_live_search(&self, title: &str) -> Option<(ResolutionStage, TitleRecord)> {
        let (target, candidates) = self.search_prefixes(title).await;

        if !candidates.is_empty() {
            if let Some(record) = self.pick_and_fetch(&target, &candidates).await {
                return Some((ResolutionStage::LiveSearch, record));
            }
            tracing::debug!(title = %title, candidates = candidates.len(), "No candidate survived scoring");
        }

        let mut by_kind = Vec::new();
        for kind in [MediaKind::Series, MediaKind::Movie] {
            by_kind.extend(self.search_kind(&target, kind).await);
        }

        if by_kind.is_empty() {
            return None;
        }
        self.pick_and_fetch(&target, &by_kind)
            .await
            .map(|record| (ResolutionStage::KindSearch, record))
    }

    /// Keyword search over shrinking colon prefixes until something comes back.
    ///
    /// Returns the prefix that produced candidates (the full title if none did) and the top candidates.
    async fn search_prefixes(&self, title: &str) -> (String, Vec<Candidate>) {
        for prefix in colon_prefixes(title) {
            let term = search_term(&prefix);
            if term.is_empty() {
                continue;
            }

            match self.provider.search_by_keyword(&term).await {
                Ok(mut candidates) if !candidates.is_empty() => {
                    candidates.truncate(MAX_CANDIDATES);
                    return (prefix, candidates);
                }
                Ok(_) => {
                    tracing::debug!(term = %term, "Keyword search returned nothing");
                }
                Err(e) => {
                    tracing::warn!(error = %e, term = %term, provider = self.provider.name(), "Keyword search failed");
                }
            }
        }
        (title.to_string(), Vec::new())
    }

    async fn search_kind(&self, target: &str, kind: MediaKind) -> Vec<Candidate> {
        let term = search_term(target);
        if term.is_empty() {
            return Vec::new();
        }

        match self.provider.search_by_kind(&term, kind).await {
            Ok(mut candidates) => {
                candidates.truncate(MAX_CANDIDATES);
                candidates
            }
            Err(e) => {
                tracing::warn!(error = %e, term = %term, kind = %kind, "Kind search failed");
                Vec::new()
            }
        }
    }

    async fn availability(&self, candidate: &Candidate) -> PlatformAvailability {
        match self.provider.watch_providers(candidate.id, candidate.kind).await {
            Ok(providers) => {
                PlatformAvailability::from_providers(&providers, &self.settings.primary_platform)
            }
            Err(e) => {
                tracing::warn!(error = %e, id = candidate.id, "Watch provider lookup failed");
                PlatformAvailability::default()
            }
        }
    }

    /// Scores every candidate and fetches details for the winner
    async fn pick_and_fetch(&self, target: &str, candidates: &[Candidate]) -> Option<TitleRecord> {
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let availability = self.availability(candidate).await;
            let candidate_score = score(candidate, target, availability);
            tracing::debug!(
                candidate = %candidate.title,
                id = candidate.id,
                kind = %candidate.kind,
                score = ?candidate_score,
                "Candidate scored"
            );
            scored.push((candidate, candidate_score));
        }

        let (best, best_score) = best_candidate(scored)?;
        tracing::debug!(target = %target, best = %best.title, score = best_score, "Best candidate chosen");

        match self.fetch_record(best.id, best.kind).await {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, id = best.id, kind = %best.kind, "Details fetch failed");
                None
            }
        }
    }

    async fn fetch_record(&self, id: u64, kind: MediaKind) -> AppResult<TitleRecord> {
        match kind {
            MediaKind::Series => self
                .provider
                .series_details(id)
                .await
                .map(TitleRecord::from_series),
            MediaKind::Movie => self
                .provider
                .movie_details(id)
                .await
                .map(TitleRecord::from_movie),
        }
    }

    async fn throttle(&self) {
        if !self.settings.throttle.is_zero() {
            tokio::time::sleep(self.settings.throttle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::title_cache::MockTitleCache,
        error::AppError,
        models::{MovieDetails, SeriesDetails, TitleOverride, WatchProviders},
        services::providers::MockMetadataProvider,
    };
    use chrono::NaiveDate;
    use std::time::Duration;

    fn settings() -> ResolverSettings {
        ResolverSettings {
            throttle: Duration::ZERO,
            ..Default::default()
        }
    }

    fn cached_record(title: &str, id: u64) -> TitleRecord {
        TitleRecord {
            normalized_title: normalize(title),
            title: title.to_string(),
            original_title: None,
            external_id: id,
            kind: MediaKind::Series,
            genres: vec!["Drama".to_string()],
            runtime: None,
            episode_run_time: Some(50),
            episode_count: Some(10),
            release_date: None,
            poster_path: None,
        }
    }

    fn candidate(id: u64, title: &str, kind: MediaKind) -> Candidate {
        Candidate {
            id,
            kind,
            title: title.to_string(),
            original_title: None,
            language: Some("en".to_string()),
            origin_countries: vec!["US".to_string()],
            popularity: 40.0,
            vote_average: 8.0,
            vote_count: 500,
            release_date: NaiveDate::from_ymd_opt(2016, 7, 15),
        }
    }

    fn series_details(id: u64, name: &str) -> SeriesDetails {
        SeriesDetails {
            id,
            name: name.to_string(),
            original_name: None,
            genres: vec!["Sci-Fi & Fantasy".to_string()],
            episode_count: Some(34),
            episode_runtime: Some(51),
            first_air_date: NaiveDate::from_ymd_opt(2016, 7, 15),
            poster_path: None,
        }
    }

    fn empty_cache() -> MockTitleCache {
        let mut cache = MockTitleCache::new();
        cache
            .expect_get_by_normalized_title()
            .returning(|_| Ok(None));
        cache
            .expect_get_best_fuzzy_match()
            .returning(|_, _| Ok(None));
        cache
    }

    fn netflix() -> WatchProviders {
        let mut providers = WatchProviders::default();
        providers
            .regions
            .insert("US".to_string(), vec!["Netflix".to_string()]);
        providers
    }

    fn resolver(cache: MockTitleCache, provider: MockMetadataProvider, settings: ResolverSettings) -> Resolver {
        Resolver::new(Arc::new(cache), Arc::new(provider), settings)
    }

    #[test]
    fn test_alternate_spelling() {
        assert_eq!(alternate_spelling("Pride & Prejudice"), "pride and prejudice");
        assert_eq!(alternate_spelling("The Office (U.S.)"), "the office");
        assert_eq!(alternate_spelling("(500) Days of Summer"), "");
    }

    #[tokio::test]
    async fn test_cache_hit_never_searches() {
        let mut cache = MockTitleCache::new();
        cache
            .expect_get_by_normalized_title()
            .withf(|key: &str| key == "dark")
            .times(1)
            .returning(|_| Ok(Some(cached_record("Dark", 70523))));
        cache.expect_upsert().times(0);

        let mut provider = MockMetadataProvider::new();
        provider.expect_search_by_keyword().times(0);
        provider.expect_search_by_kind().times(0);
        provider.expect_watch_providers().times(0);

        let mut resolver = resolver(cache, provider, settings());
        let record = resolver.resolve("Dark").await.unwrap();
        assert_eq!(record.external_id, 70523);
    }

    #[tokio::test]
    async fn test_memo_prevents_repeat_lookups() {
        let mut cache = MockTitleCache::new();
        cache
            .expect_get_by_normalized_title()
            .times(1)
            .returning(|_| Ok(Some(cached_record("Dark", 70523))));

        let provider = MockMetadataProvider::new();
        let mut resolver = resolver(cache, provider, settings());

        assert!(resolver.resolve("Dark").await.is_some());
        assert!(resolver.resolve("DARK").await.is_some());
    }

    #[tokio::test]
    async fn test_alternate_spelling_hits_cache() {
        let mut cache = MockTitleCache::new();
        cache
            .expect_get_by_normalized_title()
            .returning(|key| {
                if key == "the office" {
                    Ok(Some(cached_record("The Office", 2316)))
                } else {
                    Ok(None)
                }
            });

        let mut provider = MockMetadataProvider::new();
        provider.expect_search_by_keyword().times(0);

        let mut resolver = resolver(cache, provider, settings());
        let record = resolver.resolve("The Office (U.S.)").await.unwrap();
        assert_eq!(record.external_id, 2316);
    }

    #[tokio::test]
    async fn test_fuzzy_tries_shorter_prefixes() {
        let mut cache = MockTitleCache::new();
        cache
            .expect_get_by_normalized_title()
            .returning(|_| Ok(None));
        cache
            .expect_get_best_fuzzy_match()
            .returning(|key, _| {
                if key == "black mirror" {
                    Ok(Some(cached_record("Black Mirror", 42009)))
                } else {
                    Ok(None)
                }
            });

        let mut provider = MockMetadataProvider::new();
        provider.expect_search_by_keyword().times(0);

        let mut resolver = resolver(cache, provider, settings());
        let record = resolver.resolve("Black Mirror: Bandersnatch").await.unwrap();
        assert_eq!(record.external_id, 42009);
    }

    #[tokio::test]
    async fn test_live_search_scores_fetches_and_persists() {
        let mut cache = empty_cache();
        cache
            .expect_upsert()
            .withf(|record: &TitleRecord| {
                record.external_id == 66732 && record.normalized_title == "stranger things"
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search_by_keyword()
            .withf(|query: &str| query == "Stranger Things")
            .times(1)
            .returning(|_| {
                Ok(vec![
                    candidate(1, "Stranger Things Behind the Scenes", MediaKind::Movie),
                    candidate(66732, "Stranger Things", MediaKind::Series),
                ])
            });
        provider
            .expect_watch_providers()
            .returning(|id, _| {
                if id == 66732 {
                    Ok(netflix())
                } else {
                    Ok(WatchProviders::default())
                }
            });
        provider
            .expect_series_details()
            .withf(|id: &u64| *id == 66732)
            .times(1)
            .returning(|id| Ok(series_details(id, "Stranger Things")));
        provider.expect_movie_details().times(0);
        provider.expect_search_by_kind().times(0);

        let mut resolver = resolver(cache, provider, settings());
        let record = resolver.resolve("Stranger Things").await.unwrap();
        assert_eq!(record.external_id, 66732);
        assert_eq!(record.kind, MediaKind::Series);
        assert_eq!(record.episode_run_time, Some(51));
    }

    #[tokio::test]
    async fn test_all_rejected_candidates_fall_through_to_kind_search() {
        let mut cache = empty_cache();
        cache.expect_upsert().times(0);

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search_by_keyword()
            .times(1)
            .returning(|_| {
                let mut foreign = candidate(7, "Heimat", MediaKind::Series);
                foreign.language = Some("de".to_string());
                foreign.origin_countries = vec!["DE".to_string()];
                foreign.release_date = NaiveDate::from_ymd_opt(1984, 9, 16);
                Ok(vec![foreign])
            });
        provider
            .expect_watch_providers()
            .returning(|_, _| Ok(WatchProviders::default()));
        provider
            .expect_search_by_kind()
            .times(2)
            .returning(|_, _| Ok(vec![]));
        provider.expect_series_details().times(0);
        provider.expect_movie_details().times(0);

        let mut resolver = resolver(cache, provider, settings());
        assert!(resolver.resolve("Heimat").await.is_none());
    }

    #[tokio::test]
    async fn test_kind_search_recovers_title() {
        let mut cache = empty_cache();
        cache.expect_upsert().times(1).returning(|_| Ok(()));

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search_by_keyword()
            .returning(|_| Ok(vec![]));
        provider
            .expect_search_by_kind()
            .returning(|_, kind| match kind {
                MediaKind::Movie => Ok(vec![candidate(949, "Heat", MediaKind::Movie)]),
                MediaKind::Series => Ok(vec![]),
            });
        provider
            .expect_watch_providers()
            .returning(|_, _| Ok(WatchProviders::default()));
        provider
            .expect_movie_details()
            .times(1)
            .returning(|id| {
                Ok(MovieDetails {
                    id,
                    title: "Heat".to_string(),
                    original_title: None,
                    genres: vec!["Crime".to_string()],
                    runtime: Some(170),
                    release_date: NaiveDate::from_ymd_opt(1995, 12, 15),
                    poster_path: None,
                })
            });

        let mut resolver = resolver(cache, provider, settings());
        let record = resolver.resolve("Heat").await.unwrap();
        assert_eq!(record.kind, MediaKind::Movie);
        assert_eq!(record.runtime, Some(170));
    }

    #[tokio::test]
    async fn test_provider_errors_are_not_fatal() {
        let mut cache = MockTitleCache::new();
        cache
            .expect_get_by_normalized_title()
            .returning(|_| Err(AppError::Internal("db down".to_string())));
        cache
            .expect_get_best_fuzzy_match()
            .returning(|_, _| Err(AppError::Internal("db down".to_string())));

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search_by_keyword()
            .returning(|_| Err(AppError::ExternalApi("timeout".to_string())));
        provider
            .expect_search_by_kind()
            .returning(|_, _| Err(AppError::ExternalApi("timeout".to_string())));
        provider.expect_name().return_const("mock");

        let mut resolver = resolver(cache, provider, settings());
        assert!(resolver.resolve("Anything At All").await.is_none());
    }

    #[tokio::test]
    async fn test_live_search_trims_colon_segments() {
        let mut cache = empty_cache();
        cache.expect_upsert().returning(|_| Ok(()));

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search_by_keyword()
            .returning(|query| {
                if query == "Stranger Things" {
                    Ok(vec![candidate(66732, "Stranger Things", MediaKind::Series)])
                } else {
                    Ok(vec![])
                }
            });
        provider
            .expect_watch_providers()
            .returning(|_, _| Ok(netflix()));
        provider
            .expect_series_details()
            .returning(|id| Ok(series_details(id, "Stranger Things")));
        provider.expect_name().return_const("mock");

        let mut resolver = resolver(cache, provider, settings());
        let record = resolver
            .resolve("Stranger Things: Stranger Things 2")
            .await
            .unwrap();
        assert_eq!(record.external_id, 66732);
    }

    #[tokio::test]
    async fn test_override_skips_search() {
        let mut cache = MockTitleCache::new();
        cache.expect_get_by_normalized_title().times(0);
        cache.expect_upsert().times(1).returning(|_| Ok(()));

        let mut provider = MockMetadataProvider::new();
        provider.expect_search_by_keyword().times(0);
        provider
            .expect_series_details()
            .withf(|id: &u64| *id == 1396)
            .returning(|id| Ok(series_details(id, "Breaking Bad")));

        let mut settings = settings();
        settings.overrides.insert(
            "breaking bad".to_string(),
            TitleOverride {
                id: 1396,
                kind: MediaKind::Series,
            },
        );

        let mut resolver = resolver(cache, provider, settings);
        let record = resolver.resolve("Breaking Bad").await.unwrap();
        assert_eq!(record.external_id, 1396);
    }

    #[tokio::test]
    async fn test_unresolvable_title_is_memoized_as_miss() {
        let mut cache = MockTitleCache::new();
        cache
            .expect_get_by_normalized_title()
            .times(1)
            .returning(|_| Ok(None));
        cache
            .expect_get_best_fuzzy_match()
            .times(1)
            .returning(|_, _| Ok(None));

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search_by_keyword()
            .times(1)
            .returning(|_| Ok(vec![]));
        provider
            .expect_search_by_kind()
            .times(2)
            .returning(|_, _| Ok(vec![]));

        let mut resolver = resolver(cache, provider, settings());
        assert!(resolver.resolve("Qwzx").await.is_none());
        assert!(resolver.resolve("qwzx").await.is_none());
    }
}
