//! Viewing-history export parsing.
//!
//! The export must have exactly a `Title` and a `Date` column (any case, any
//! order). Rows with an empty cell, an unparseable date or a title that
//! normalizes to nothing are dropped.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::io::Read;

use crate::{
    error::{AppError, AppResult},
    models::{ViewingIndex, WatchEvent},
};

const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: [&str; 3] = ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d"];

/// Column positions of the two required headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    title: usize,
    date: usize,
}

fn locate_columns(headers: &csv::StringRecord) -> AppResult<Columns> {
    let names: Vec<String> = headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
        .collect();

    let position = |wanted: &str| names.iter().position(|name| name == wanted);

    match (names.len(), position("title"), position("date")) {
        (2, Some(title), Some(date)) => Ok(Columns { title, date }),
        _ => Err(AppError::InvalidFileShape(format!(
            "expected exactly 'Title' and 'Date' columns, found [{}]",
            names.join(", ")
        ))),
    }
}

/// Parses a watch date in any of the formats the export has been seen in
pub fn parse_watch_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }

    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Reads watch events from a CSV export.
///
/// Fails with `InvalidFileShape` before any row is read if the headers are wrong.
pub fn parse_history<R: Read>(reader: R) -> AppResult<Vec<WatchEvent>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| AppError::InvalidFileShape(format!("unreadable header row: {}", e)))?;
    let columns = locate_columns(headers)?;

    let mut events = Vec::new();
    let mut dropped = 0usize;

    for (line, row) in csv_reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::debug!(error = %e, line = line + 2, "Skipping unreadable row");
                dropped += 1;
                continue;
            }
        };

        let title = row.get(columns.title).unwrap_or_default();
        let date = row.get(columns.date).unwrap_or_default();
        if title.is_empty() || date.is_empty() {
            dropped += 1;
            continue;
        }

        match parse_watch_date(date) {
            Some(watched_at) => events.push(WatchEvent {
                title: title.to_string(),
                watched_at,
            }),
            None => {
                tracing::debug!(date = %date, line = line + 2, "Skipping row with invalid date");
                dropped += 1;
            }
        }
    }

    tracing::info!(rows = events.len(), dropped = dropped, "Viewing history parsed");
    Ok(events)
}

/// Parses a CSV export straight into a viewing index
pub fn build_index(csv_text: &str) -> AppResult<ViewingIndex> {
    let events = parse_history(csv_text.as_bytes())?;
    Ok(events.into_iter().collect())
}
