//! Title canonicalization.
//!
//! Viewing-history rows name episodes, not titles ("Dark: Season 2: Secrets").
//! Everything from the first episodic qualifier onward is dropped before a
//! title is used as a key or a search term.

use once_cell::sync::Lazy;
use regex::Regex;

/// A colon-delimited qualifier containing one of these words is episodic
static EPISODIC_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(season|part|volume|chapter|episode|limited series)\b")
        .expect("episodic segment regex should compile")
});

/// Without a colon the marker only counts when numbered ("Stranger Things Season 2")
static NUMBERED_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:(?:season|part|volume|chapter|episode)\s+(?:\d+|[ivx]+)\b|limited series\b)")
        .expect("numbered marker regex should compile")
});

/// Drops the first colon segment (after the leading one) that carries an episodic marker, and all that follow
fn strip_episodic_segments(raw: &str) -> String {
    let segments: Vec<&str> = raw.split(':').collect();
    let keep = segments
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, segment)| EPISODIC_SEGMENT.is_match(segment))
        .map(|(i, _)| i)
        .unwrap_or(segments.len());

    segments[..keep].join(":")
}

fn cut_at_numbered_marker(text: &str) -> &str {
    match NUMBERED_MARKER.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, alphanumeric-only lookup key for a raw title.
///
/// Idempotent and case-insensitive; an empty result means the row carries no title.
pub fn normalize(raw: &str) -> String {
    let folded = fold(&strip_episodic_segments(raw));
    cut_at_numbered_marker(&folded).trim().to_string()
}

/// Lowercases, then keeps letters, digits and single spaces. Episodic markers are left in place.
///
/// Lowercasing comes first: some capitals lower into a letter plus a combining mark.
pub fn fold(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    collapse_whitespace(&cleaned)
}

/// Episode-free title keeping its punctuation, used for searching and display
pub fn display_title(raw: &str) -> String {
    let base = strip_episodic_segments(raw);
    let base = cut_at_numbered_marker(&base);
    collapse_whitespace(base)
        .trim_end_matches(&[':', '-', ',', ' '][..])
        .to_string()
}

/// Strips everything but letters, digits and spaces, keeping case
pub fn search_term(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    collapse_whitespace(&cleaned)
}

/// The title followed by progressively shorter colon-delimited prefixes:
/// `"A: B: C"` yields `["A: B: C", "A: B", "A"]`
pub fn colon_prefixes(title: &str) -> Vec<String> {
    let segments: Vec<&str> = title.split(':').collect();
    (1..=segments.len())
        .rev()
        .map(|n| segments[..n].join(":").trim().to_string())
        .filter(|prefix| !prefix.is_empty())
        .collect()
}
