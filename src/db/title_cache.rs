use chrono::NaiveDate;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{MediaKind, TitleRecord},
};

/// Durable store of resolved titles, shared across runs.
///
/// Writes are idempotent upserts keyed by the record's external id and kind,
/// so concurrent runs need no locking beyond last-writer-wins.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TitleCache: Send + Sync {
    /// Exact, case-insensitive lookup on the normalized title
    async fn get_by_normalized_title(&self, key: &str) -> AppResult<Option<TitleRecord>>;

    /// Most similar cached title, only if its similarity exceeds `threshold`
    async fn get_best_fuzzy_match(&self, key: &str, threshold: f64) -> AppResult<Option<TitleRecord>>;

    async fn upsert(&self, record: &TitleRecord) -> AppResult<()>;
}

/// Picks the cached key most similar to `key` (Sørensen–Dice over bigrams).
/// Ties keep the first key seen.
pub fn best_fuzzy_key<'a, I>(key: &str, candidates: I, threshold: f64) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let key = key.to_lowercase();
    let mut best: Option<(&str, f64)> = None;

    for candidate in candidates {
        let rating = strsim::sorensen_dice(&key, &candidate.to_lowercase());
        if best.map_or(true, |(_, top)| rating > top) {
            best = Some((candidate, rating));
        }
    }

    best.filter(|(_, rating)| *rating > threshold)
        .map(|(candidate, _)| candidate)
}

// ============================================================================
// Postgres
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TitleRow {
    normalized_title: String,
    title: String,
    original_title: Option<String>,
    external_id: i64,
    media_kind: i16,
    genres: Vec<String>,
    runtime: Option<i32>,
    episode_run_time: Option<i32>,
    episode_count: Option<i32>,
    release_date: Option<NaiveDate>,
    poster_path: Option<String>,
}

fn to_minutes(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn from_minutes(value: Option<u32>) -> Option<i32> {
    value.and_then(|v| i32::try_from(v).ok())
}

impl TryFrom<TitleRow> for TitleRecord {
    type Error = AppError;

    fn try_from(row: TitleRow) -> Result<Self, Self::Error> {
        let kind = MediaKind::from_code(row.media_kind).ok_or_else(|| {
            AppError::Internal(format!("Unknown media kind code {}", row.media_kind))
        })?;
        let external_id = u64::try_from(row.external_id)
            .map_err(|_| AppError::Internal(format!("Negative external id {}", row.external_id)))?;

        Ok(TitleRecord {
            normalized_title: row.normalized_title,
            title: row.title,
            original_title: row.original_title,
            external_id,
            kind,
            genres: row.genres,
            runtime: to_minutes(row.runtime),
            episode_run_time: to_minutes(row.episode_run_time),
            episode_count: to_minutes(row.episode_count),
            release_date: row.release_date,
            poster_path: row.poster_path,
        })
    }
}

const SELECT_COLUMNS: &str = "normalized_title, title, original_title, external_id, media_kind, \
     genres, runtime, episode_run_time, episode_count, release_date, poster_path";

/// Title cache backed by the `title_records` table
#[derive(Clone)]
pub struct PgTitleCache {
    pool: PgPool,
}

impl PgTitleCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TitleCache for PgTitleCache {
    async fn get_by_normalized_title(&self, key: &str) -> AppResult<Option<TitleRecord>> {
        let query = format!(
            "SELECT {} FROM title_records WHERE LOWER(normalized_title) = LOWER($1) \
             ORDER BY updated_at DESC LIMIT 1",
            SELECT_COLUMNS
        );

        let row: Option<TitleRow> = sqlx::query_as(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TitleRecord::try_from).transpose()
    }

    async fn get_best_fuzzy_match(&self, key: &str, threshold: f64) -> AppResult<Option<TitleRecord>> {
        let titles: Vec<String> = sqlx::query_scalar("SELECT DISTINCT normalized_title FROM title_records")
            .fetch_all(&self.pool)
            .await?;

        match best_fuzzy_key(key, titles.iter().map(String::as_str), threshold) {
            Some(best) => self.get_by_normalized_title(best).await,
            None => Ok(None),
        }
    }

    async fn upsert(&self, record: &TitleRecord) -> AppResult<()> {
        let external_id = i64::try_from(record.external_id)
            .map_err(|_| AppError::InvalidInput(format!("External id {} out of range", record.external_id)))?;

        sqlx::query(
            r#"
            INSERT INTO title_records (
                normalized_title, title, original_title, external_id, media_kind, genres,
                runtime, episode_run_time, episode_count, release_date, poster_path
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (external_id, media_kind) DO UPDATE SET
                normalized_title = EXCLUDED.normalized_title,
                title = EXCLUDED.title,
                original_title = EXCLUDED.original_title,
                genres = EXCLUDED.genres,
                runtime = EXCLUDED.runtime,
                episode_run_time = EXCLUDED.episode_run_time,
                episode_count = EXCLUDED.episode_count,
                release_date = EXCLUDED.release_date,
                poster_path = EXCLUDED.poster_path,
                updated_at = NOW()
            "#,
        )
        .bind(&record.normalized_title)
        .bind(&record.title)
        .bind(&record.original_title)
        .bind(external_id)
        .bind(record.kind.code())
        .bind(&record.genres)
        .bind(from_minutes(record.runtime))
        .bind(from_minutes(record.episode_run_time))
        .bind(from_minutes(record.episode_count))
        .bind(record.release_date)
        .bind(&record.poster_path)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            title = %record.title,
            external_id = record.external_id,
            kind = %record.kind,
            "Title record upserted"
        );

        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Title cache held in process memory, for tests and cache-less deployments
#[derive(Default)]
pub struct InMemoryTitleCache {
    records: RwLock<Vec<TitleRecord>>,
}

impl InMemoryTitleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<TitleRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl TitleCache for InMemoryTitleCache {
    async fn get_by_normalized_title(&self, key: &str) -> AppResult<Option<TitleRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.normalized_title.eq_ignore_ascii_case(key))
            .cloned())
    }

    async fn get_best_fuzzy_match(&self, key: &str, threshold: f64) -> AppResult<Option<TitleRecord>> {
        let records = self.records.read().await;
        let best = best_fuzzy_key(
            key,
            records.iter().map(|r| r.normalized_title.as_str()),
            threshold,
        );

        Ok(best.and_then(|best| records.iter().find(|r| r.normalized_title == best).cloned()))
    }

    async fn upsert(&self, record: &TitleRecord) -> AppResult<()> {
        let mut records = self.records.write().await;
        match records
            .iter_mut()
            .find(|r| r.external_id == record.external_id && r.kind == record.kind)
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, id: u64, kind: MediaKind) -> TitleRecord {
        TitleRecord {
            normalized_title: crate::services::normalizer::normalize(title),
            title: title.to_string(),
            original_title: None,
            external_id: id,
            kind,
            genres: vec!["Drama".to_string()],
            runtime: None,
            episode_run_time: Some(50),
            episode_count: Some(10),
            release_date: None,
            poster_path: None,
        }
    }

    #[test]
    fn test_best_fuzzy_key_above_threshold() {
        let keys = ["the crown", "breaking bad", "the office"];
        assert_eq!(best_fuzzy_key("breaking bd", keys, 0.8), Some("breaking bad"));
    }

    #[test]
    fn test_best_fuzzy_key_rejects_weak_match() {
        let keys = ["the crown", "breaking bad"];
        assert_eq!(best_fuzzy_key("dark", keys, 0.9), None);
    }

    #[test]
    fn test_best_fuzzy_key_exact_is_one() {
        let keys = ["the crown"];
        assert_eq!(best_fuzzy_key("The Crown", keys, 0.9), Some("the crown"));
        assert_eq!(best_fuzzy_key("anything", std::iter::empty::<&str>(), 0.9), None);
    }

    #[test]
    fn test_title_row_conversion() {
        let row = TitleRow {
            normalized_title: "dark".to_string(),
            title: "Dark".to_string(),
            original_title: None,
            external_id: 70523,
            media_kind: 0,
            genres: vec!["Mystery".to_string()],
            runtime: None,
            episode_run_time: Some(60),
            episode_count: Some(26),
            release_date: NaiveDate::from_ymd_opt(2017, 12, 1),
            poster_path: None,
        };

        let record = TitleRecord::try_from(row).unwrap();
        assert_eq!(record.kind, MediaKind::Series);
        assert_eq!(record.external_id, 70523);
        assert_eq!(record.episode_run_time, Some(60));
    }

    #[test]
    fn test_title_row_unknown_kind_fails() {
        let row = TitleRow {
            normalized_title: "x".to_string(),
            title: "X".to_string(),
            original_title: None,
            external_id: 1,
            media_kind: 9,
            genres: vec![],
            runtime: None,
            episode_run_time: None,
            episode_count: None,
            release_date: None,
            poster_path: None,
        };
        assert!(TitleRecord::try_from(row).is_err());
    }

    #[tokio::test]
    async fn test_in_memory_lookup_is_case_insensitive() {
        let cache = InMemoryTitleCache::with_records(vec![record("Dark", 70523, MediaKind::Series)]);
        let hit = cache.get_by_normalized_title("DARK").await.unwrap();
        assert_eq!(hit.unwrap().external_id, 70523);
        assert!(cache.get_by_normalized_title("ozark").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_upsert_replaces_by_external_id() {
        let cache = InMemoryTitleCache::new();
        cache.upsert(&record("Dark", 70523, MediaKind::Series)).await.unwrap();

        let mut updated = record("Dark", 70523, MediaKind::Series);
        updated.episode_count = Some(26);
        cache.upsert(&updated).await.unwrap();
        // Same id, different kind is a different catalog entry
        cache.upsert(&record("Dark", 70523, MediaKind::Movie)).await.unwrap();

        assert_eq!(cache.len().await, 2);
        let hit = cache.get_by_normalized_title("dark").await.unwrap().unwrap();
        assert_eq!(hit.episode_count, Some(26));
    }

    #[tokio::test]
    async fn test_upsert_moves_key_to_latest_variant() {
        let cache = InMemoryTitleCache::new();
        let mut first = record("The Office", 2316, MediaKind::Series);
        first.normalized_title = "the office us".to_string();
        cache.upsert(&first).await.unwrap();
        cache.upsert(&record("The Office", 2316, MediaKind::Series)).await.unwrap();

        // One row per catalog entry: the earlier variant's key is gone
        assert_eq!(cache.len().await, 1);
        assert!(cache.get_by_normalized_title("the office us").await.unwrap().is_none());
        assert!(cache.get_by_normalized_title("the office").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_in_memory_fuzzy_match() {
        let cache = InMemoryTitleCache::with_records(vec![
            record("The Crown", 1, MediaKind::Series),
            record("Breaking Bad", 2, MediaKind::Series),
        ]);

        let hit = cache.get_best_fuzzy_match("breaking bad", 0.9).await.unwrap();
        assert_eq!(hit.unwrap().external_id, 2);
        assert!(cache.get_best_fuzzy_match("dark", 0.9).await.unwrap().is_none());
    }
}
