use std::{io::Read, time::Duration};

use crate::{
    db::TitleCache,
    error::{AppError, AppResult},
    models::{MediaKind, TitleRecord},
    services::{normalizer::normalize, providers::MetadataProvider},
};

/// Counts from one seeding pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub seeded: usize,
    pub skipped: usize,
}

/// One `show_id,title` row of a catalog dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: u64,
    pub title: String,
}

/// Reads a catalog CSV with `show_id` and `title` columns; other columns are ignored
pub fn parse_catalog<R: Read>(reader: R) -> AppResult<Vec<CatalogEntry>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| AppError::InvalidFileShape(format!("unreadable header row: {}", e)))?;
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(id_column), Some(title_column)) = (column("show_id"), column("title")) else {
        return Err(AppError::InvalidFileShape(
            "catalog needs 'show_id' and 'title' columns".to_string(),
        ));
    };

    let mut entries = Vec::new();
    for row in csv_reader.records() {
        let Ok(row) = row else { continue };
        let id = row.get(id_column).and_then(|raw| raw.parse::<u64>().ok());
        let title = row.get(title_column).filter(|t| !t.is_empty());

        match (id, title) {
            (Some(id), Some(title)) => entries.push(CatalogEntry {
                id,
                title: title.to_string(),
            }),
            _ => tracing::debug!(row = ?row, "Skipping catalog row"),
        }
    }
    Ok(entries)
}

/// Fetches each catalog entry's details and stores it under the catalog's own title.
///
/// Row failures are logged and skipped; only an unreadable catalog fails the pass.
pub async fn seed_catalog<R: Read>(
    reader: R,
    kind: MediaKind,
    provider: &dyn MetadataProvider,
    cache: &dyn TitleCache,
    throttle: Duration,
) -> AppResult<SeedReport> {
    let entries = parse_catalog(reader)?;
    let mut report = SeedReport::default();

    tracing::info!(entries = entries.len(), kind = %kind, "Seeding title cache");

    for entry in entries {
        let key = normalize(&entry.title);
        if key.is_empty() {
            report.skipped += 1;
            continue;
        }

        let fetched = match kind {
            MediaKind::Series => provider
                .series_details(entry.id)
                .await
                .map(TitleRecord::from_series),
            MediaKind::Movie => provider
                .movie_details(entry.id)
                .await
                .map(TitleRecord::from_movie),
        };

        let stored = match fetched {
            Ok(mut record) => {
                record.normalized_title = key;
                cache.upsert(&record).await
            }
            Err(e) => Err(e),
        };

        match stored {
            Ok(()) => {
                report.seeded += 1;
                tracing::debug!(id = entry.id, title = %entry.title, "Seeded");
            }
            Err(e) => {
                report.skipped += 1;
                tracing::warn!(error = %e, id = entry.id, title = %entry.title, "Failed to seed title");
            }
        }

        if !throttle.is_zero() {
            tokio::time::sleep(throttle).await;
        }
    }

    tracing::info!(seeded = report.seeded, skipped = report.skipped, kind = %kind, "Seeding done");
    Ok(report)
}
