//! Longest binge streak across a viewing index.
//!
//! Watches of a title continue a streak when they follow the previous one
//! within two hours. Once three or more have come back-to-back, one longer gap
//! (under 30 hours) is tolerated without breaking the streak; that resets the
//! back-to-back count, so a second long gap needs three fast watches again.

use chrono::NaiveDateTime;

use crate::models::ViewingIndex;

const FAST_GAP_HOURS: f64 = 2.0;
const INERTIA_GAP_HOURS: f64 = 30.0;
const INERTIA_MIN_FAST_WATCHES: u32 = 3;

/// A run of watches of one title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BingeRun {
    pub title: String,
    pub episodes: u32,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    length: u32,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

fn hours_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    (later - earlier).num_seconds() as f64 / 3600.0
}

/// Longest run within one title's ascending watch dates; the earliest wins ties
fn longest_run(dates: &[NaiveDateTime]) -> Option<Run> {
    let first = *dates.first()?;
    let mut current = Run {
        length: 1,
        start: first,
        end: first,
    };
    let mut best = current;
    let mut fast_watches = 1;

    for pair in dates.windows(2) {
        let gap = hours_between(pair[0], pair[1]);

        if gap <= FAST_GAP_HOURS {
            fast_watches += 1;
            current.length += 1;
        } else if fast_watches >= INERTIA_MIN_FAST_WATCHES && gap < INERTIA_GAP_HOURS {
            fast_watches = 1;
            current.length += 1;
        } else {
            fast_watches = 1;
            current.length = 1;
            current.start = pair[1];
        }
        current.end = pair[1];

        if current.length > best.length {
            best = current;
        }
    }

    Some(best)
}

/// Finds the longest streak over all titles, preferring the earliest-indexed title on ties
pub fn detect_binge(index: &ViewingIndex) -> Option<BingeRun> {
    let mut best: Option<BingeRun> = None;

    for entry in index.iter() {
        let Some(run) = longest_run(&entry.sorted_dates()) else {
            continue;
        };

        if best.as_ref().map_or(true, |b| run.length > b.episodes) {
            best = Some(BingeRun {
                title: entry.key.clone(),
                episodes: run.length,
                started_at: run.start,
                ended_at: run.end,
            });
        }
    }

    best
}
