//! Heuristic ranking of search candidates against a watched title.
//!
//! The weights are empirical. The viewing history comes from one platform, so
//! availability there outweighs every other signal.

use chrono::Datelike;
use std::collections::HashSet;

use crate::models::{Candidate, WatchProviders};
use crate::services::normalizer::fold;

const EXACT_MATCH_BONUS: f64 = 50.0;
const TOKEN_SIMILARITY_WEIGHT: f64 = 40.0;
const PRIMARY_PLATFORM_BONUS: f64 = 100.0;
const MAJOR_PLATFORM_BONUS: f64 = 25.0;
const ENGLISH_BONUS: f64 = 20.0;
const US_ORIGIN_BONUS: f64 = 15.0;
const GB_ORIGIN_BONUS: f64 = 8.0;
const RECENT_RELEASE_BONUS: f64 = 15.0;
const LAST_DECADE_RELEASE_BONUS: f64 = 8.0;
const POPULARITY_WEIGHT: f64 = 0.05;
const VOTE_AVERAGE_WEIGHT: f64 = 1.5;
const VOTE_COUNT_WEIGHT: f64 = 0.005;
const VOTE_COUNT_CAP: u64 = 2_000;

const RECENT_RELEASE_YEAR: i32 = 2020;
const LAST_DECADE_START_YEAR: i32 = 2010;
const OLDEST_UNAVAILABLE_YEAR: i32 = 1990;
const MIN_TOKEN_SIMILARITY: f64 = 0.1;

/// Where a candidate can be streamed, looked up before scoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformAvailability {
    pub on_primary: bool,
    pub on_major: bool,
}

impl PlatformAvailability {
    pub fn from_providers(providers: &WatchProviders, primary_platform: &str) -> Self {
        Self {
            on_primary: providers.offers(primary_platform),
            on_major: providers.on_major_platform(),
        }
    }
}

fn tokens(title: &str) -> HashSet<String> {
    fold(title)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Intersection over union of the folded word sets
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let a = tokens(a);
    let b = tokens(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Scores `candidate` against the watched `target` title.
///
/// Returns `None` when a hard filter rejects the candidate outright.
pub fn score(candidate: &Candidate, target: &str, availability: PlatformAvailability) -> Option<f64> {
    let exact = fold(&candidate.title) == fold(target);
    let similarity = token_similarity(&candidate.title, target);
    let english = candidate.language.as_deref() == Some("en");
    let non_english = candidate.language.as_deref().is_some_and(|lang| lang != "en");
    let year = candidate.release_date.map(|d| d.year());

    if !exact && similarity < MIN_TOKEN_SIMILARITY {
        return None;
    }
    if !availability.on_primary {
        if non_english || candidate.vote_count == 0 {
            return None;
        }
        if year.is_some_and(|y| y < OLDEST_UNAVAILABLE_YEAR) {
            return None;
        }
    }

    let mut total = similarity * TOKEN_SIMILARITY_WEIGHT;

    if exact {
        total += EXACT_MATCH_BONUS;
    }
    if availability.on_primary {
        total += PRIMARY_PLATFORM_BONUS;
    }
    if availability.on_major {
        total += MAJOR_PLATFORM_BONUS;
    }
    if english {
        total += ENGLISH_BONUS;
    }

    if candidate.origin_countries.iter().any(|c| c == "US") {
        total += US_ORIGIN_BONUS;
    } else if candidate.origin_countries.iter().any(|c| c == "GB") {
        total += GB_ORIGIN_BONUS;
    }

    match year {
        Some(y) if y >= RECENT_RELEASE_YEAR => total += RECENT_RELEASE_BONUS,
        Some(y) if y >= LAST_DECADE_START_YEAR => total += LAST_DECADE_RELEASE_BONUS,
        _ => {}
    }

    total += candidate.popularity.max(0.0) * POPULARITY_WEIGHT;
    total += candidate.vote_average.max(0.0) * VOTE_AVERAGE_WEIGHT;
    total += candidate.vote_count.min(VOTE_COUNT_CAP) as f64 * VOTE_COUNT_WEIGHT;

    Some(total)
}

/// Highest-scoring surviving candidate; ties go to the earlier one
pub fn best_candidate<'a, I>(scored: I) -> Option<(&'a Candidate, f64)>
where
    I: IntoIterator<Item = (&'a Candidate, Option<f64>)>,
{
    let mut best: Option<(&Candidate, f64)> = None;
    for (candidate, score) in scored {
        let Some(score) = score else { continue };
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;
    use chrono::NaiveDate;

    fn candidate(title: &str) -> Candidate {
        Candidate {
            id: 1,
            kind: MediaKind::Series,
            title: title.to_string(),
            original_title: None,
            language: Some("en".to_string()),
            origin_countries: vec!["US".to_string()],
            popularity: 50.0,
            vote_average: 7.5,
            vote_count: 1_000,
            release_date: NaiveDate::from_ymd_opt(2021, 3, 1),
        }
    }

    const AVAILABLE: PlatformAvailability = PlatformAvailability {
        on_primary: true,
        on_major: true,
    };
    const UNAVAILABLE: PlatformAvailability = PlatformAvailability {
        on_primary: false,
        on_major: false,
    };

    #[test]
    fn test_token_similarity() {
        assert_eq!(token_similarity("The Crown", "the crown"), 1.0);
        assert_eq!(token_similarity("The Crown", "The Jewel in the Crown"), 0.5);
        assert_eq!(token_similarity("Dark", "Ozark"), 0.0);
        assert_eq!(token_similarity("", ""), 0.0);
    }

    #[test]
    fn test_exact_match_beats_partial_match() {
        let exact = score(&candidate("Ozark"), "Ozark", UNAVAILABLE).unwrap();
        let partial = score(&candidate("Ozark Henry Live"), "Ozark", UNAVAILABLE).unwrap();
        assert!(exact > partial);
    }

    #[test]
    fn test_exact_match_keeps_part_numbers() {
        let target = "Harry Potter and the Deathly Hallows";
        let whole = score(&candidate("Harry Potter and the Deathly Hallows"), target, UNAVAILABLE).unwrap();
        let part = score(&candidate("Harry Potter and the Deathly Hallows: Part 1"), target, UNAVAILABLE).unwrap();
        assert!(whole - part >= EXACT_MATCH_BONUS);

        let part_two = "Harry Potter and the Deathly Hallows: Part 2";
        let first = score(&candidate("Harry Potter and the Deathly Hallows: Part 1"), part_two, UNAVAILABLE).unwrap();
        let second = score(&candidate(part_two), part_two, UNAVAILABLE).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_primary_platform_dominates() {
        let mut obscure = candidate("Dark");
        obscure.popularity = 1.0;
        obscure.vote_count = 10;
        obscure.origin_countries = vec!["DE".to_string()];
        let mut popular = candidate("Dark");
        popular.popularity = 300.0;

        let on_primary = score(&obscure, "Dark", AVAILABLE).unwrap();
        let elsewhere = score(
            &popular,
            "Dark",
            PlatformAvailability {
                on_primary: false,
                on_major: true,
            },
        )
        .unwrap();
        assert!(on_primary > elsewhere);
    }

    #[test]
    fn test_non_english_unavailable_is_rejected() {
        let mut c = candidate("Dark");
        c.language = Some("de".to_string());
        assert_eq!(score(&c, "Dark", UNAVAILABLE), None);
        assert!(score(&c, "Dark", AVAILABLE).is_some());
    }

    #[test]
    fn test_zero_votes_unavailable_is_rejected() {
        let mut c = candidate("Dark");
        c.vote_count = 0;
        assert_eq!(score(&c, "Dark", UNAVAILABLE), None);
        assert!(score(&c, "Dark", AVAILABLE).is_some());
    }

    #[test]
    fn test_pre_1990_unavailable_is_rejected() {
        let mut c = candidate("Dark");
        c.release_date = NaiveDate::from_ymd_opt(1985, 6, 1);
        assert_eq!(score(&c, "Dark", UNAVAILABLE), None);
        assert!(score(&c, "Dark", AVAILABLE).is_some());
    }

    #[test]
    fn test_dissimilar_title_is_rejected_even_on_primary() {
        assert_eq!(score(&candidate("Ozark"), "Dark", AVAILABLE), None);
    }

    #[test]
    fn test_origin_and_recency_tiers() {
        let mut us = candidate("Heat");
        us.release_date = NaiveDate::from_ymd_opt(2015, 1, 1);
        let mut gb = us.clone();
        gb.origin_countries = vec!["GB".to_string()];
        let mut other = us.clone();
        other.origin_countries = vec!["FR".to_string()];

        let us_score = score(&us, "Heat", UNAVAILABLE).unwrap();
        let gb_score = score(&gb, "Heat", UNAVAILABLE).unwrap();
        let other_score = score(&other, "Heat", UNAVAILABLE).unwrap();
        assert!(us_score > gb_score && gb_score > other_score);

        let mut recent = us.clone();
        recent.release_date = NaiveDate::from_ymd_opt(2022, 1, 1);
        let mut older = us.clone();
        older.release_date = NaiveDate::from_ymd_opt(2001, 1, 1);
        let recent_score = score(&recent, "Heat", UNAVAILABLE).unwrap();
        let older_score = score(&older, "Heat", UNAVAILABLE).unwrap();
        assert!(recent_score > us_score && us_score > older_score);
    }

    #[test]
    fn test_vote_count_is_capped() {
        let mut capped = candidate("Heat");
        capped.vote_count = VOTE_COUNT_CAP;
        let mut huge = candidate("Heat");
        huge.vote_count = 1_000_000;
        assert_eq!(score(&capped, "Heat", AVAILABLE), score(&huge, "Heat", AVAILABLE));
    }

    #[test]
    fn test_best_candidate_prefers_first_on_tie() {
        let mut first = candidate("Heat");
        first.id = 10;
        let mut second = candidate("Heat");
        second.id = 20;
        let rejected = candidate("Nope");

        let best = best_candidate(vec![
            (&rejected, None),
            (&first, Some(42.0)),
            (&second, Some(42.0)),
        ])
        .unwrap();
        assert_eq!(best.0.id, 10);
    }

    #[test]
    fn test_best_candidate_none_when_all_rejected() {
        let c = candidate("Heat");
        assert!(best_candidate(vec![(&c, None)]).is_none());
    }
}
